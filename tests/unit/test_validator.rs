//! Validator tests across generator output and hand-written candidates

use testsmith::generator::{FallbackGenerator, GenerationRequest};
use testsmith::page::PageElement;
use testsmith::testcase::{parse_test_cases, renumber, TestCase};
use testsmith::validator::validate;

use crate::helpers::GOOD_CODE;

#[test]
fn test_fallback_output_validates() {
    let cases = parse_test_cases(
        "Test 1: Search for products\nDescription: Use the search box\nSteps:\n1. Enter 'laptop' in the search input with name=\"q\"\n2. Click the Search button\nExpected: Results are listed\nPriority: High\n\n\
         Test 2: Open pricing page\nDescription: Navigate via header link\nSteps:\n1. Click the Pricing link in the header\nExpected: Pricing page opens\nPriority: Low\n",
    );
    assert_eq!(cases.len(), 2);
    let elements = vec![
        PageElement::new("input").with_name("q"),
        PageElement::new("button").with_text("Search"),
        PageElement::new("a").with_text("Pricing"),
    ];
    let code = FallbackGenerator::new().render(
        &GenerationRequest {
            url: "https://shop.example.com",
            suite_name: "Shop",
            cases: &cases,
            elements: &elements,
        },
        "2026-10-18 12:00:00",
    );
    let report = validate(&code, &cases);
    assert!(report.ok, "{:?}", report.syntax_error);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert!(code.contains("web_page.get_q_input().fill(\"laptop\")"));
    assert!(code.contains("web_page.get_pricing_a().click()"));
}

#[test]
fn test_good_candidate_is_clean() {
    let mut cases = vec![TestCase::new("Click Login button")];
    renumber(&mut cases);
    assert!(validate(GOOD_CODE, &cases).is_clean());
}

#[test]
fn test_missing_case_is_advisory() {
    let mut cases = vec![
        TestCase::new("Click Login button"),
        TestCase::new("Reset forgotten password"),
    ];
    renumber(&mut cases);
    let report = validate(GOOD_CODE, &cases);
    assert!(report.ok);
    assert_eq!(
        report.issues,
        vec!["Test case 2 'Reset forgotten password' does not appear to be implemented".to_string()]
    );
}

#[test]
fn test_indentation_error_reported_with_line() {
    let broken = GOOD_CODE.replace(
        "        page.wait_for_load_state",
        "            page.wait_for_load_state",
    );
    let report = validate(&broken, &[]);
    assert!(!report.ok);
    let err = report.syntax_error.unwrap();
    assert_eq!(err.line, 17);
    assert!(err.message.contains("unexpected indent"));
}
