//! Preview and exam composition from a transcoded quiz tree.
//!
//! `compose_html` wraps the HTML-transcoded fragments in a self-contained
//! preview page: embedded stylesheet, header block, numbered questions with
//! the marking scheme visible, and a total. `compose_latex` does the same
//! for the LaTeX-transcoded tree, producing a standalone exam source that
//! merges the user preamble.

use serde_yaml::Value;

use crate::error::TranscodeError;
use crate::quiz::{
    QuestionKind, answer_is_correct, entry_kind, entry_marks, header_and_questions,
};
use crate::tokens::format_number;

const HTML_PRELUDE: &str = "\
<!DOCTYPE html>
<style>
p { max-width: 40em; page-break-before: avoid; }
.correct { background: #bfb; max-width: 34em; }
.incorrect { background: #fbb; max-width: 34em; }
ol.input input {
  display: none;
  float: left;
  position: relative;
  left: -2em;
  top: 1ex;
}
ol { max-width: 40em; page-break-before: avoid; }
li { max-width: 40em; page-break-before: avoid; }
div.block { border-left: 2px solid #f2f; padding-left: 1em; max-width: 30.25em; }
div.match { border-left: 2px solid #2ff; padding-left: 1em; max-width: 30.25em; }
div.model {
  background: #eee;
  max-width: 34.5em;
  padding: 1em;
  margin-top: 1em;
  margin-bottom: 1em;
}
</style>
";

/// Compose a full HTML preview page from an HTML-transcoded quiz.
pub fn compose_html(doc: &Value) -> Result<String, TranscodeError> {
    let (header, questions) = header_and_questions(doc);

    let mut page = String::from(HTML_PRELUDE);
    if let Some(header) = header {
        html_header(&mut page, header);
    }

    page.push_str("<ol>\n");
    let mut total_marks = 0.0;
    for entry in &questions {
        let kind = entry_kind(entry)?;
        let marks = entry_marks(entry);
        total_marks += marks;

        page.push_str("<li class='question'>");
        page.push_str(&format!(
            "<b>{} [{} Marks]</b>",
            kind.label(),
            format_number(marks)
        ));
        page.push_str(fragment(&entry["question"]));
        match kind {
            QuestionKind::MultipleChoice => html_answers(&mut page, entry, "radio"),
            QuestionKind::MultipleAnswer => html_answers(&mut page, entry, "checkbox"),
            QuestionKind::Essay => html_essay(&mut page, entry),
            QuestionKind::Ordering => html_ordering(&mut page, entry),
            QuestionKind::Matching => html_matching(&mut page, entry),
            QuestionKind::Header => {}
        }
        page.push_str("</li>\n");
    }
    page.push_str("</ol>\n");
    page.push_str(&format!(
        "<br><p><b>Total Marks {}</b></p><br>\n",
        format_number(total_marks)
    ));

    Ok(page)
}

fn fragment(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}

fn answers(entry: &Value) -> &[Value] {
    entry["answers"].as_sequence().map_or(&[], Vec::as_slice)
}

fn html_header(page: &mut String, header: &Value) {
    page.push_str("<h1>");
    page.push_str(fragment(&header["title"]));
    page.push_str("</h1>\n");
    for key in ["date", "author"] {
        let text = fragment(&header[key]);
        if !text.is_empty() {
            page.push_str("<p>");
            page.push_str(text);
            page.push_str("</p>\n");
        }
    }
}

fn html_answers(page: &mut String, entry: &Value, input_type: &str) {
    page.push_str("<ol class='input' type='a'>");
    for answer in answers(entry) {
        let class = if answer_is_correct(answer) {
            "correct"
        } else {
            "incorrect"
        };
        page.push_str(&format!(
            "<li class='{class}'><div class='block'><input type='{input_type}'>"
        ));
        page.push_str(fragment(&answer["answer"]));
        page.push_str("</div></li>");
    }
    page.push_str("</ol>");
}

fn html_essay(page: &mut String, entry: &Value) {
    page.push_str("<div class='model'>\n<p><b>indicative answer:</b></p>");
    page.push_str(fragment(&entry["answer"]));
    page.push_str("</div>");
}

fn html_ordering(page: &mut String, entry: &Value) {
    page.push_str("<ol>");
    for answer in answers(entry) {
        page.push_str("<li><div class='block'>");
        page.push_str(fragment(&answer["answer"]));
        page.push_str("</div></li>");
    }
    page.push_str("</ol>");
}

fn html_matching(page: &mut String, entry: &Value) {
    page.push_str("<ol class='input' type='a'>");
    for answer in answers(entry) {
        page.push_str("<li><ol><li><div class='block'>");
        page.push_str(fragment(&answer["answer"]));
        page.push_str("</div></li><li><div class='match'>");
        page.push_str(fragment(&answer["correct"]));
        page.push_str("</div></li></ol></li>");
    }
    page.push_str("</ol>");
}

/// Compose a standalone LaTeX exam source from a LaTeX-transcoded quiz.
///
/// `user_preamble` is appended verbatim after the stock packages, so quiz
/// authors can load whatever their equations need.
pub fn compose_latex(doc: &Value, user_preamble: &str) -> Result<String, TranscodeError> {
    let (header, questions) = header_and_questions(doc);

    let mut source = String::from(
        "\\documentclass[11pt]{article}\n\
         \\usepackage{amsmath}\n\
         \\usepackage{amssymb}\n\
         \\usepackage{graphicx}\n\
         \\usepackage{ulem}\n\
         \\usepackage{hyperref}\n",
    );
    if !user_preamble.trim().is_empty() {
        source.push_str(user_preamble.trim_end());
        source.push('\n');
    }
    source.push_str("\\begin{document}\n\n");

    if let Some(header) = header {
        latex_header(&mut source, header);
    }

    source.push_str("\\begin{enumerate}\n");
    let mut total_marks = 0.0;
    for entry in &questions {
        let kind = entry_kind(entry)?;
        let marks = entry_marks(entry);
        total_marks += marks;

        source.push_str(&format!(
            "\\item[{{\\bf Q. [{} Marks]}}]\n",
            format_number(marks)
        ));
        source.push_str(fragment(&entry["question"]).trim_end());
        source.push('\n');
        match kind {
            QuestionKind::MultipleChoice | QuestionKind::MultipleAnswer => {
                latex_choices(&mut source, entry);
            }
            QuestionKind::Essay => latex_essay(&mut source, entry),
            QuestionKind::Ordering | QuestionKind::Matching => {
                latex_items(&mut source, entry);
            }
            QuestionKind::Header => {}
        }
        source.push('\n');
    }
    source.push_str("\\end{enumerate}\n\n");
    source.push_str(&format!(
        "\\noindent\\textbf{{Total Marks {}}}\n\n",
        format_number(total_marks)
    ));
    source.push_str("\\end{document}\n");

    Ok(source)
}

fn latex_header(source: &mut String, header: &Value) {
    let title = fragment(&header["title"]).trim();
    if !title.is_empty() {
        source.push_str(&format!("\\section*{{{title}}}\n"));
    }
    for key in ["date", "author"] {
        let text = fragment(&header[key]).trim();
        if !text.is_empty() {
            source.push_str(&format!("\\noindent {text}\n\n"));
        }
    }
    source.push('\n');
}

fn latex_choices(source: &mut String, entry: &Value) {
    source.push_str("\\begin{enumerate}\\setlength\\itemsep{0em}\n");
    for answer in answers(entry) {
        let marker = if answer_is_correct(answer) {
            "$\\boxtimes$"
        } else {
            "$\\square$"
        };
        source.push_str(&format!(
            "  \\item[{marker}] {}\n",
            fragment(&answer["answer"]).trim()
        ));
    }
    source.push_str("\\end{enumerate}\n");
}

fn latex_essay(source: &mut String, entry: &Value) {
    let answer = fragment(&entry["answer"]).trim();
    source.push_str("\\begin{quote}\\itshape\n");
    if answer.is_empty() {
        source.push_str("no answer given\n");
    } else {
        source.push_str(answer);
        source.push('\n');
    }
    source.push_str("\\end{quote}\n");
}

fn latex_items(source: &mut String, entry: &Value) {
    source.push_str("\\begin{enumerate}\\setlength\\itemsep{0em}\n");
    for answer in answers(entry) {
        source.push_str(&format!("  \\item {}\n", fragment(&answer["answer"]).trim()));
        let matched = fragment(&answer["correct"]).trim();
        if !matched.is_empty() {
            source.push_str(&format!("  \\quad$\\rightarrow$\\quad {matched}\n"));
        }
    }
    source.push_str("\\end{enumerate}\n");
}
