//! Structural syntax check for generated Python test files.
//!
//! This is not a full Python parser. It tokenizes enough of the language to
//! catch the mistakes models actually make: unterminated strings, unbalanced
//! brackets, broken indentation, block headers without a colon, headers with
//! no body, stray markdown that leaked into the file, and token sequences no
//! Python statement allows (two operands with nothing between them, a binary
//! operator without an operand on each side). The first problem is reported
//! with its 1-based line number.
//!
//! When a Python interpreter is available the runner module confirms the
//! verdict with `ast.parse`; see `runner::ast_check`.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for SyntaxError {}

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "class", "try", "except", "finally", "with",
    "async",
];

const TAB_SIZE: usize = 8;

/// A logical line with strings collapsed to `""` and comments dropped.
struct LogicalLine {
    start_line: usize,
    indent: usize,
    code: String,
}

struct Checker {
    indent_stack: Vec<usize>,
    /// Line of the header that opened a block still waiting for its body.
    pending_block: Option<usize>,
}

impl Checker {
    fn new() -> Self {
        Self {
            indent_stack: vec![0],
            pending_block: None,
        }
    }

    fn logical(&mut self, line: LogicalLine) -> Result<(), SyntaxError> {
        let code = line.code.trim();
        let top = *self.indent_stack.last().unwrap_or(&0);

        if let Some(header) = self.pending_block.take() {
            if line.indent <= top {
                return Err(SyntaxError::new(
                    line.start_line,
                    format!("expected an indented block after line {}", header),
                ));
            }
            self.indent_stack.push(line.indent);
        } else if line.indent > top {
            return Err(SyntaxError::new(line.start_line, "unexpected indent"));
        } else if line.indent < top {
            while self.indent_stack.last().is_some_and(|&t| t > line.indent) {
                self.indent_stack.pop();
            }
            if self.indent_stack.last() != Some(&line.indent) {
                return Err(SyntaxError::new(
                    line.start_line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }

        let keyword = leading_word(code);
        let colon_at_depth0 = has_top_level_colon(code);
        if COMPOUND_KEYWORDS.contains(&keyword) && !colon_at_depth0 {
            return Err(SyntaxError::new(
                line.start_line,
                format!("expected ':' after '{}' statement", keyword),
            ));
        }
        if matches!(keyword, "else" | "try" | "finally") {
            let rest = code[keyword.len()..].trim_start();
            if !rest.starts_with(':') {
                return Err(SyntaxError::new(line.start_line, "invalid syntax"));
            }
        }

        check_tokens(code, line.start_line)?;

        if code.ends_with(':') {
            self.pending_block = Some(line.start_line);
        }
        Ok(())
    }

    fn finish(&self, last_line: usize) -> Result<(), SyntaxError> {
        if let Some(header) = self.pending_block {
            return Err(SyntaxError::new(
                last_line + 1,
                format!("expected an indented block after line {}", header),
            ));
        }
        Ok(())
    }
}

fn leading_word(code: &str) -> &str {
    let end = code
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(code.len());
    &code[..end]
}

fn has_top_level_colon(code: &str) -> bool {
    let mut depth = 0i32;
    for c in code.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ':' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
            '\x0c' => width = 0,
            _ => break,
        }
    }
    width
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Keywords that are ordinary names everywhere except at the start of a statement.
const SOFT_KEYWORDS: &[&str] = &["match", "case", "type"];

const STRING_PREFIXES: &[&str] = &["r", "u", "f", "b", "br", "rb", "fr", "rf"];

/// Longest first.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "==", "!=", "<=", ">=", "->", ":=", "**", "//", "<<", ">>",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=",
];

/// Operators that need an operand on both sides. Operators with a prefix
/// form (`+ - * ** ~ @`) are not listed.
const BINARY_OPERATORS: &[&str] = &[
    "=", "==", "!=", "<", ">", "<=", ">=", "+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=",
    "^=", ">>=", "<<=", "@=", "//", "%", "|", "&", "^", "<<", ">>", "->", ":=",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Number,
    Str,
    Open,
    Close,
    Op(String),
}

impl Token {
    fn is_keyword(&self) -> bool {
        matches!(self, Token::Name(name) if KEYWORDS.contains(&name.as_str()))
    }

    /// Names, literals and strings; `True`/`False`/`None` included.
    fn is_operand(&self) -> bool {
        match self {
            Token::Name(_) => !self.is_keyword(),
            Token::Number | Token::Str => true,
            _ => false,
        }
    }

    fn ends_operand(&self) -> bool {
        self.is_operand() || *self == Token::Close
    }

    fn is_binary_op(&self) -> bool {
        matches!(self, Token::Op(op) if BINARY_OPERATORS.contains(&op.as_str()))
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self, Token::Op(o) if o == op)
    }

    fn is_name_in(&self, names: &[&str]) -> bool {
        matches!(self, Token::Name(name) if names.contains(&name.as_str()))
    }
}

/// Skip a collapsed string starting at the quote at `start`.
fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    chars[start + 1..]
        .iter()
        .position(|&c| c == quote)
        .map_or(chars.len(), |offset| start + offset + 2)
}

fn tokenize(code: &str) -> Vec<Token> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            i = skip_string(&chars, i);
            tokens.push(Token::Str);
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let quoted = matches!(chars.get(i), Some('"') | Some('\''));
            if quoted && STRING_PREFIXES.contains(&word.to_ascii_lowercase().as_str()) {
                i = skip_string(&chars, i);
                tokens.push(Token::Str);
            } else {
                tokens.push(Token::Name(word));
            }
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                let exponent_sign = matches!(d, '+' | '-') && matches!(chars[i - 1], 'e' | 'E');
                if d.is_alphanumeric() || d == '_' || d == '.' || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            tokens.push(Token::Number);
            continue;
        }
        match c {
            '(' | '[' | '{' => {
                tokens.push(Token::Open);
                i += 1;
                continue;
            }
            ')' | ']' | '}' => {
                tokens.push(Token::Close);
                i += 1;
                continue;
            }
            _ => {}
        }
        let op = OPERATORS.iter().find(|op| {
            let len = op.chars().count();
            chars
                .get(i..i + len)
                .is_some_and(|window| window.iter().copied().eq(op.chars()))
        });
        match op {
            Some(op) => {
                i += op.chars().count();
                tokens.push(Token::Op((*op).to_string()));
            }
            None => {
                i += 1;
                tokens.push(Token::Op(c.to_string()));
            }
        }
    }
    tokens
}

/// Token order checks on one logical line.
fn check_tokens(code: &str, line: usize) -> Result<(), SyntaxError> {
    let tokens = tokenize(code);

    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next = tokens.get(i + 1);

        if token.is_name_in(&["def", "class"])
            && !next.is_some_and(|n| matches!(n, Token::Name(_)) && !n.is_keyword())
        {
            return Err(SyntaxError::new(line, "invalid syntax"));
        }

        if let Some(prev) = prev {
            let both_strings = *prev == Token::Str && *token == Token::Str;
            let soft_keyword_lead = i == 1 && prev.is_name_in(SOFT_KEYWORDS);
            if prev.ends_operand() && token.is_operand() && !both_strings && !soft_keyword_lead {
                if i == 1 && prev.is_name_in(&["print"]) {
                    return Err(SyntaxError::new(
                        line,
                        "Missing parentheses in call to 'print'. Did you mean print(...)?",
                    ));
                }
                return Err(SyntaxError::new(
                    line,
                    "invalid syntax. Perhaps you forgot a comma?",
                ));
            }
        }

        if token.is_binary_op() {
            let lhs = prev.is_some_and(Token::ends_operand);
            let rhs = next.is_some_and(|n| {
                !(n.is_binary_op()
                    || *n == Token::Close
                    || n.is_op(",")
                    || n.is_op(":")
                    || n.is_op(";"))
            });
            if !lhs || !rhs {
                return Err(SyntaxError::new(line, "invalid syntax"));
            }
        }
    }
    Ok(())
}

/// Check `source` and return the first structural error.
pub fn check(source: &str) -> Result<(), SyntaxError> {
    if let Some(idx) = source.lines().position(|l| l.contains('\0')) {
        return Err(SyntaxError::new(
            idx + 1,
            "source code cannot contain null bytes",
        ));
    }
    let mut checker = Checker::new();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    // (quote char, start line) of an open triple-quoted string
    let mut triple: Option<(char, usize)> = None;
    let mut current: Option<LogicalLine> = None;
    let mut backslash_continuation = false;
    let mut last_line = 0;

    for (idx, raw) in source.lines().enumerate() {
        let lineno = idx + 1;
        last_line = lineno;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        if current.is_none() {
            let stripped = raw.trim_start();
            if stripped.is_empty() || stripped.starts_with('#') {
                continue;
            }
            current = Some(LogicalLine {
                start_line: lineno,
                indent: indent_width(raw),
                code: String::new(),
            });
        }
        backslash_continuation = false;

        let chars: Vec<char> = raw.chars().collect();
        let mut i = 0;
        let mut code = String::new();

        while i < chars.len() {
            if let Some((q, _)) = triple {
                if chars[i] == '\\' {
                    i += 2;
                    continue;
                }
                if chars[i] == q && chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                    triple = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }

            let c = chars[i];
            match c {
                '#' => break,
                '"' | '\'' => {
                    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        triple = Some((c, lineno));
                        // marker goes at the opening so a prefix stays attached
                        code.push_str("\"\"");
                        i += 3;
                        continue;
                    }
                    let mut j = i + 1;
                    let mut closed = false;
                    while j < chars.len() {
                        if chars[j] == '\\' {
                            j += 2;
                            continue;
                        }
                        if chars[j] == c {
                            closed = true;
                            break;
                        }
                        j += 1;
                    }
                    if !closed {
                        return Err(SyntaxError::new(lineno, "unterminated string literal"));
                    }
                    code.push_str("\"\"");
                    i = j + 1;
                    continue;
                }
                '(' | '[' | '{' => brackets.push((c, lineno)),
                ')' | ']' | '}' => match brackets.pop() {
                    Some((open, _)) if closing_for(open) == c => {}
                    Some((open, open_line)) => {
                        return Err(SyntaxError::new(
                            lineno,
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}' on line {}",
                                c, open, open_line
                            ),
                        ))
                    }
                    None => return Err(SyntaxError::new(lineno, format!("unmatched '{}'", c))),
                },
                '`' | '$' | '?' => {
                    return Err(SyntaxError::new(
                        lineno,
                        format!("invalid character '{}'", c),
                    ))
                }
                '!' if chars.get(i + 1) != Some(&'=') => {
                    return Err(SyntaxError::new(lineno, "invalid syntax"))
                }
                '\\' if i + 1 == chars.len() => {
                    backslash_continuation = true;
                    i += 1;
                    continue;
                }
                _ => {}
            }
            code.push(c);
            i += 1;
        }

        if let Some(line) = current.as_mut() {
            if !line.code.is_empty() {
                line.code.push(' ');
            }
            line.code.push_str(&code);
        }

        if triple.is_some() || !brackets.is_empty() || backslash_continuation {
            continue;
        }
        if let Some(line) = current.take() {
            checker.logical(line)?;
        }
    }

    if let Some((_, start)) = triple {
        return Err(SyntaxError::new(
            start,
            "unterminated triple-quoted string literal",
        ));
    }
    if let Some((open, line)) = brackets.first() {
        return Err(SyntaxError::new(*line, format!("'{}' was never closed", open)));
    }
    if backslash_continuation {
        return Err(SyntaxError::new(last_line, "unexpected EOF while parsing"));
    }
    checker.finish(last_line)
}

/// Convenience wrapper for callers that only need a yes/no.
pub fn is_valid(source: &str) -> bool {
    check(source).is_ok()
}
