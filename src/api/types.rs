use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Some servers send `"content": null` on empty choices.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Content of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: usize,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}

/// What a Language Model Collaborator hands back: either bare text or a
/// structured chat response. Resolved to text once, at the client boundary.
#[derive(Debug, Clone)]
pub enum Completion {
    Text(String),
    Chat(ChatResponse),
}

impl Completion {
    /// The generated text, if the reply carried any.
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            Completion::Text(t) => t.as_str(),
            Completion::Chat(resp) => resp.content()?,
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn into_text(self) -> Option<String> {
        let text = match self {
            Completion::Text(t) => t,
            Completion::Chat(resp) => resp.choices.into_iter().next()?.message.content,
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl From<String> for Completion {
    fn from(text: String) -> Self {
        Completion::Text(text)
    }
}

impl From<&str> for Completion {
    fn from(text: &str) -> Self {
        Completion::Text(text.to_string())
    }
}

/// Response bodies accepted from OpenAI-compatible and Ollama-native servers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCompletion {
    Chat(ChatResponse),
    Ollama { message: Message },
    Legacy { choices: Vec<TextChoice> },
    Bare(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextChoice {
    #[serde(default)]
    pub text: String,
}

impl From<RawCompletion> for Completion {
    fn from(raw: RawCompletion) -> Self {
        match raw {
            RawCompletion::Chat(resp) => Completion::Chat(resp),
            RawCompletion::Ollama { message } => Completion::Text(message.content),
            RawCompletion::Legacy { choices } => Completion::Text(
                choices.into_iter().next().map(|c| c.text).unwrap_or_default(),
            ),
            RawCompletion::Bare(text) => Completion::Text(text),
        }
    }
}
