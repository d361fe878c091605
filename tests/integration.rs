use std::path::Path;

use quizmd::collate::section_marker;
use quizmd::equations::{EquationBackend, EquationOptions, LatexBackend};
use quizmd::error::TranscodeError;
use quizmd::template::{compose_html, compose_latex};
use quizmd::transcode::{Format, Transcoder};
use quizmd::{Options, quiz_to_feed, quiz_to_html, quiz_to_latex};

/// Deterministic stand-in for the LaTeX toolchain: fabricates one PNG per
/// equation and reports the given depth ratios on the side channel.
struct FakeBackend {
    widths: Vec<u32>,
    ratios: Vec<f64>,
    typeset_calls: std::cell::RefCell<usize>,
}

impl FakeBackend {
    fn new(widths: Vec<u32>, ratios: Vec<f64>) -> Self {
        Self {
            widths,
            ratios,
            typeset_calls: std::cell::RefCell::new(0),
        }
    }
}

fn fake_png(width: u32) -> Vec<u8> {
    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&width.to_be_bytes());
    png.extend_from_slice(&20u32.to_be_bytes());
    png
}

impl EquationBackend for FakeBackend {
    fn typeset(&self, _dir: &Path, _source: &str) -> Result<String, TranscodeError> {
        *self.typeset_calls.borrow_mut() += 1;
        let mut log = String::new();
        for ratio in &self.ratios {
            log.push_str(&format!("::: {ratio}\n"));
        }
        Ok(log)
    }

    fn rasterize(&self, _dir: &Path, page_count: usize) -> Result<Vec<Vec<u8>>, TranscodeError> {
        Ok(self
            .widths
            .iter()
            .take(page_count)
            .map(|w| fake_png(*w))
            .collect())
    }
}

#[test]
fn plain_quiz_transcodes_without_the_toolchain() {
    // No equations anywhere, so the LatexBackend is never invoked.
    let source = include_str!("fixtures/plain.yaml");
    let page = quiz_to_html(source, &Options::default()).expect("html");

    assert!(page.starts_with("<!DOCTYPE html>"));
    assert!(page.contains("<h1><p>General Knowledge</p>"));
    assert!(page.contains("<b>Multiple choice [2.5 Marks]</b>"));
    assert!(page.contains("<b>Essay [5 Marks]</b>"));
    assert!(page.contains("Total Marks 15"));
    assert!(page.contains("<li class='correct'>"));
    assert!(page.contains("Jupiter"));
}

#[test]
fn plain_quiz_renders_a_latex_exam() {
    let source = include_str!("fixtures/plain.yaml");
    let exam = quiz_to_latex(source, &Options::default()).expect("latex");

    assert!(exam.starts_with("\\documentclass"));
    assert!(exam.contains("\\item[$\\boxtimes$]"));
    assert!(exam.contains("Mercury"));
    assert!(exam.contains("Total Marks 15"));
    assert!(exam.ends_with("\\end{document}\n"));
}

#[test]
fn plain_quiz_feed_has_one_row_per_question() {
    let source = include_str!("fixtures/plain.yaml");
    let feed = quiz_to_feed(source, &Options::default()).expect("feed");

    let rows: Vec<&str> = feed.lines().collect();
    assert_eq!(rows.len(), 5);
    assert!(rows[0].starts_with("MC\t"));
    assert!(rows[1].starts_with("MA\t"));
    assert!(rows[2].starts_with("ESS\t"));
    assert!(rows[3].starts_with("ORD\t"));
    assert!(rows[4].starts_with("MAT\t"));
    assert!(rows[4].contains("France") && rows[4].contains("Paris"));
}

#[test]
fn section_markers_never_leak_into_output() {
    let source = include_str!("fixtures/plain.yaml");
    let doc: serde_yaml::Value = serde_yaml::from_str(source).unwrap();
    let mut transcoder = Transcoder::new(&doc, Path::new("."));

    let marker = section_marker(transcoder.snippets().first().expect("snippets"));
    let tree = transcoder
        .transcode(
            Format::Html,
            &EquationOptions::default(),
            &LatexBackend::default(),
        )
        .expect("transcode");
    let page = compose_html(&tree).expect("compose");

    assert!(!page.contains(&marker));
}

#[test]
fn equation_quiz_embeds_images_and_typesets_once() {
    let source = include_str!("fixtures/equations.yaml");
    let doc: serde_yaml::Value = serde_yaml::from_str(source).unwrap();
    let mut transcoder = Transcoder::new(&doc, Path::new("."));

    // Four distinct equations in document order: three inline, one align
    // environment.
    let backend = FakeBackend::new(vec![100, 40, 120, 400], vec![0.1, 0.0, 0.05, 0.0]);
    let options = EquationOptions {
        preamble_override: None,
        user_preamble: quizmd::quiz::user_preamble(&doc),
    };
    assert_eq!(
        options.user_preamble.as_deref(),
        Some("\\usepackage{mathtools}")
    );

    let html_tree = transcoder
        .transcode(Format::Html, &options, &backend)
        .expect("html transcode");
    let question = html_tree[1]["question"].as_str().expect("fragment");
    assert!(question.contains("data:image/png;base64,"));
    // Half pixel size, offset = 0.1 * 100 * 0.5.
    assert!(question.contains("width='50' height='10'"));
    assert!(question.contains("vertical-align:-5px"));

    let latex_tree = transcoder
        .transcode(Format::Latex, &options, &backend)
        .expect("latex transcode");
    let question = latex_tree[1]["question"].as_str().expect("fragment");
    assert!(question.contains("$\\delta(t)$"));
    let essay = latex_tree[2]["question"].as_str().expect("fragment");
    assert!(essay.contains("\\begin{align}"));

    // LaTeX output keeps math as source, so only the preview compiled.
    assert_eq!(*backend.typeset_calls.borrow(), 1);
}

#[test]
fn equation_quiz_full_page_composition() {
    let source = include_str!("fixtures/equations.yaml");
    let doc: serde_yaml::Value = serde_yaml::from_str(source).unwrap();
    let mut transcoder = Transcoder::new(&doc, Path::new("."));
    let backend = FakeBackend::new(vec![100, 40, 120, 400], vec![0.1, 0.0, 0.05, 0.0]);
    let options = EquationOptions::default();

    let latex_tree = transcoder
        .transcode(Format::Latex, &options, &backend)
        .expect("latex transcode");
    let exam = compose_latex(&latex_tree, "\\usepackage{mathtools}").expect("compose");

    assert!(exam.contains("\\usepackage{mathtools}"));
    assert!(exam.contains("$\\delta(t)$"));
    assert!(exam.contains("Total Marks 7.5"));
}

#[test]
fn feed_rows_stay_single_line_despite_multiline_snippets() {
    let source = "- type: essay\n  question: |\n    First paragraph.\n\n    Second paragraph.\n  answer: Short answer.\n";
    let doc: serde_yaml::Value = serde_yaml::from_str(source).unwrap();
    let mut transcoder = Transcoder::new(&doc, Path::new("."));

    let tree = transcoder
        .transcode(
            Format::Html,
            &EquationOptions::default(),
            &LatexBackend::default(),
        )
        .expect("transcode");
    let feed = quizmd::feed::render_feed(&tree).expect("feed");

    let rows: Vec<&str> = feed.lines().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].matches('\t').count(), 2);
    assert!(rows[0].contains("First paragraph."));
    assert!(rows[0].contains("Second paragraph."));
}
