//! Quiz-level structure: entry kinds, header/question split, and statistics.

use serde::Serialize;
use serde_yaml::Value;

use crate::error::TranscodeError;

/// The entry kinds a quiz may contain, per the `type` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    MultipleAnswer,
    Essay,
    Ordering,
    Matching,
    Header,
}

impl QuestionKind {
    pub fn parse(tag: &str) -> Result<Self, TranscodeError> {
        match tag {
            "mc" => Ok(Self::MultipleChoice),
            "ma" => Ok(Self::MultipleAnswer),
            "essay" => Ok(Self::Essay),
            "ordering" => Ok(Self::Ordering),
            "matching" => Ok(Self::Matching),
            "header" => Ok(Self::Header),
            other => Err(TranscodeError::UnknownQuestionKind(other.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::MultipleChoice => "Multiple choice",
            Self::MultipleAnswer => "Multiple answer",
            Self::Essay => "Essay",
            Self::Ordering => "Ordering",
            Self::Matching => "Matching",
            Self::Header => "Header",
        }
    }
}

/// The `type` discriminant is mandatory: guessing a kind for an untyped
/// entry would mislabel a malformed quiz instead of reporting it.
pub fn entry_kind(entry: &Value) -> Result<QuestionKind, TranscodeError> {
    match entry["type"].as_str() {
        Some(tag) => QuestionKind::parse(tag),
        None => Err(TranscodeError::MissingQuestionKind),
    }
}

/// Split a quiz into its header entry (if any) and the question entries.
pub fn header_and_questions(doc: &Value) -> (Option<&Value>, Vec<&Value>) {
    let mut header = None;
    let mut questions = Vec::new();

    if let Some(entries) = doc.as_sequence() {
        for entry in entries {
            if entry["type"].as_str() == Some("header") {
                header = Some(entry);
            } else {
                questions.push(entry);
            }
        }
    }

    (header, questions)
}

/// Marks for one entry. The loader keeps scalars loosely typed, so marks may
/// arrive as a number or a string; unmarked questions are worth one mark.
pub fn entry_marks(entry: &Value) -> f64 {
    match &entry["marks"] {
        Value::Number(n) => n.as_f64().unwrap_or(1.0),
        Value::String(s) => s.trim().parse().unwrap_or(1.0),
        _ => 1.0,
    }
}

/// User LaTeX preamble declared in the quiz header. Lives under a private
/// key so the collector never treats it as markup.
pub fn user_preamble(doc: &Value) -> Option<String> {
    let (header, _) = header_and_questions(doc);
    header
        .and_then(|h| h["pre_latexpreamble"].as_str())
        .map(str::to_string)
}

/// Whether an answer entry is flagged correct. The flag survives HTML
/// transcoding as either a YAML bool or a rendered string fragment.
pub fn answer_is_correct(answer: &Value) -> bool {
    match &answer["correct"] {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.contains("true") || text.contains("yes"),
        _ => false,
    }
}

fn answer_count(entry: &Value) -> usize {
    entry["answers"].as_sequence().map_or(0, Vec::len)
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionStats {
    pub kind: QuestionKind,
    pub marks: f64,
    pub choices: usize,
    /// Opening of the question statement, for terminal summaries.
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub questions: Vec<QuestionStats>,
    pub total_marks: f64,
}

pub fn stats(doc: &Value) -> Result<Stats, TranscodeError> {
    let (_, question_entries) = header_and_questions(doc);

    let mut questions = Vec::with_capacity(question_entries.len());
    let mut total_marks = 0.0;

    for entry in question_entries {
        let marks = entry_marks(entry);
        total_marks += marks;
        let statement = entry["question"].as_str().unwrap_or("");
        questions.push(QuestionStats {
            kind: entry_kind(entry)?,
            marks,
            choices: answer_count(entry),
            excerpt: statement.chars().take(60).collect(),
        });
    }

    Ok(Stats {
        questions,
        total_marks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).expect("fixture should parse")
    }

    #[test]
    fn header_is_separated_from_questions() {
        let doc = quiz(
            "- type: header\n  title: T\n- type: mc\n  question: Q1\n- type: essay\n  question: Q2\n",
        );
        let (header, questions) = header_and_questions(&doc);
        assert!(header.is_some());
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn marks_parse_from_numbers_and_strings() {
        assert_eq!(entry_marks(&quiz("marks: 2.5")), 2.5);
        assert_eq!(entry_marks(&quiz("marks: '3'")), 3.0);
        assert_eq!(entry_marks(&quiz("question: unmarked")), 1.0);
    }

    #[test]
    fn stats_totals_marks() {
        let doc = quiz(
            "- type: mc\n  marks: 2\n  question: Q1\n  answers:\n    - answer: a\n    - answer: b\n- type: essay\n  question: Q2\n",
        );
        let stats = stats(&doc).unwrap();
        assert_eq!(stats.questions.len(), 2);
        assert_eq!(stats.total_marks, 3.0);
        assert_eq!(stats.questions[0].choices, 2);
    }

    #[test]
    fn header_preamble_is_found() {
        let doc = quiz("- type: header\n  title: T\n  pre_latexpreamble: \\usepackage{bm}\n");
        assert_eq!(user_preamble(&doc).as_deref(), Some("\\usepackage{bm}"));
        assert_eq!(user_preamble(&quiz("- type: mc\n  question: Q\n")), None);
    }

    #[test]
    fn correctness_reads_bools_and_rendered_strings() {
        assert!(answer_is_correct(&quiz("correct: true")));
        assert!(answer_is_correct(&quiz("correct: <p>true</p>")));
        assert!(!answer_is_correct(&quiz("correct: false")));
        assert!(!answer_is_correct(&quiz("answer: a")));
    }

    #[test]
    fn untyped_entry_is_an_error() {
        let doc = quiz("- question: Q\n  answers:\n    - answer: a\n");
        assert!(matches!(
            stats(&doc),
            Err(TranscodeError::MissingQuestionKind)
        ));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let doc = quiz("- type: fill_in_the_blank\n  question: Q\n");
        assert!(matches!(
            stats(&doc),
            Err(TranscodeError::UnknownQuestionKind(_))
        ));
    }
}
