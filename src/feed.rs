//! Assessment-import feed: tab-delimited rows, one question per line.
//!
//! The feed consumes the HTML-transcoded tree. Fragments are guaranteed
//! newline- and tab-free by the splitter's post-processing, so each row
//! stays a single line. Text fields are never quote-delimited.

use serde_yaml::Value;

use crate::error::TranscodeError;
use crate::quiz::{QuestionKind, answer_is_correct, entry_kind, header_and_questions};

/// Render the import feed for an HTML-transcoded quiz.
pub fn render_feed(doc: &Value) -> Result<String, TranscodeError> {
    let (_, questions) = header_and_questions(doc);

    let mut out = String::new();
    for entry in questions {
        let row = match entry_kind(entry)? {
            QuestionKind::MultipleChoice => choice_row("MC", entry),
            QuestionKind::MultipleAnswer => choice_row("MA", entry),
            QuestionKind::Essay => essay_row(entry),
            QuestionKind::Ordering => ordering_row(entry),
            QuestionKind::Matching => matching_row(entry),
            QuestionKind::Header => continue,
        };
        out.push_str(&row.join("\t"));
        out.push('\n');
    }

    Ok(out)
}

fn field(value: &Value) -> String {
    value.as_str().unwrap_or("").to_string()
}

fn answers(entry: &Value) -> &[Value] {
    entry["answers"].as_sequence().map_or(&[], Vec::as_slice)
}

fn correctness(answer: &Value) -> &'static str {
    if answer_is_correct(answer) {
        "correct"
    } else {
        "incorrect"
    }
}

fn choice_row(tag: &str, entry: &Value) -> Vec<String> {
    let mut row = vec![tag.to_string(), field(&entry["question"])];
    for answer in answers(entry) {
        row.push(field(&answer["answer"]));
        row.push(correctness(answer).to_string());
    }
    row
}

fn essay_row(entry: &Value) -> Vec<String> {
    vec![
        "ESS".to_string(),
        field(&entry["question"]),
        field(&entry["answer"]),
    ]
}

fn ordering_row(entry: &Value) -> Vec<String> {
    let mut row = vec!["ORD".to_string(), field(&entry["question"])];
    for answer in answers(entry) {
        row.push(field(&answer["answer"]));
    }
    row
}

/// Matching pairs each prompt with its match text, which lives in the
/// `correct` field.
fn matching_row(entry: &Value) -> Vec<String> {
    let mut row = vec!["MAT".to_string(), field(&entry["question"])];
    for answer in answers(entry) {
        row.push(field(&answer["answer"]));
        row.push(field(&answer["correct"]));
    }
    row
}
