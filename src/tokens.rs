//! Custom token recognition on top of the comrak grammar.
//!
//! comrak's `math_dollars` extension already handles `$...$` and `$$...$$`
//! with escape awareness. The remaining math delimiters (`\(...\)`,
//! `\[...\]` and the amsmath display environments) are recognized here by a
//! normalization pre-pass that rewrites them to dollar-delimited form before
//! parsing, so the whole closed token set surfaces as `NodeValue::Math`.
//! The pre-pass never rewrites inside code fences, inline code spans, or
//! existing dollar math, and an unterminated delimiter is left as literal
//! text rather than aborting the parse.
//!
//! Width-annotated images (`![alt](src){width=...}`) are recognized after
//! parsing: comrak yields the image node followed by a text sibling, and
//! [`take_width_attr`] peels the attribute block off that sibling.

use crate::error::TranscodeError;

/// Whether an equation renders in-line with text or as its own block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquationKind {
    Inline,
    Display,
}

/// One parsed mathematical expression. Two tokens are the same equation iff
/// kind and content are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EquationToken {
    pub kind: EquationKind,
    pub content: String,
}

impl EquationToken {
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            kind: EquationKind::Inline,
            content: content.into(),
        }
    }

    pub fn display(content: impl Into<String>) -> Self {
        Self {
            kind: EquationKind::Display,
            content: content.into(),
        }
    }

    /// Display content that is already a math environment enters math mode
    /// on its own; bare content needs wrapping.
    pub fn is_environment(&self) -> bool {
        self.content.trim_start().starts_with("\\begin{")
    }
}

/// Display-math environments recognized by the pre-pass, matched by name
/// (with an optional trailing `*`).
const DISPLAY_ENVS: &[&str] = &[
    "equation",
    "split",
    "alignat",
    "multline",
    "gather",
    "align",
    "flalign",
    "eqnarray",
    "displaymath",
];

fn is_display_env(name: &str) -> bool {
    let base = name.strip_suffix('*').unwrap_or(name);
    DISPLAY_ENVS.contains(&base)
}

/// Rewrite `\(...\)`, `\[...\]` and display environments to dollar form.
///
/// Environment spans keep their `\begin{ENV}...\end{ENV}` text as content so
/// the typeset renderer can emit them verbatim.
pub fn normalize_math(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut at_line_start = true;

    while i < bytes.len() {
        if at_line_start {
            if let Some(end) = fenced_block_end(source, i) {
                out.push_str(&source[i..end]);
                i = end;
                continue;
            }
        }

        match bytes[i] {
            b'\\' => {
                if bytes.get(i + 1) == Some(&b'\\') {
                    out.push_str("\\\\");
                    i += 2;
                } else if bytes.get(i + 1) == Some(&b'(') {
                    match find_unescaped(bytes, i + 2, b"\\)") {
                        Some(close) => {
                            out.push('$');
                            out.push_str(&source[i + 2..close]);
                            out.push('$');
                            i = close + 2;
                        }
                        None => {
                            out.push_str("\\(");
                            i += 2;
                        }
                    }
                } else if bytes.get(i + 1) == Some(&b'[') {
                    match find_unescaped(bytes, i + 2, b"\\]") {
                        Some(close) => {
                            out.push_str("$$");
                            out.push_str(&source[i + 2..close]);
                            out.push_str("$$");
                            i = close + 2;
                        }
                        None => {
                            out.push_str("\\[");
                            i += 2;
                        }
                    }
                } else if let Some((_, span_end)) = match_display_env(source, i) {
                    out.push_str("$$");
                    out.push_str(&source[i..span_end]);
                    out.push_str("$$");
                    i = span_end;
                } else {
                    // Escape of something else; copy both bytes so the next
                    // character can never open a span.
                    out.push('\\');
                    i += 1;
                    if i < bytes.len() {
                        let ch_len = char_len(bytes[i]);
                        out.push_str(&source[i..i + ch_len]);
                        i += ch_len;
                    }
                }
            }
            b'`' => {
                let end = code_span_end(bytes, i);
                out.push_str(&source[i..end]);
                i = end;
            }
            b'$' => {
                let end = dollar_span_end(bytes, i);
                out.push_str(&source[i..end]);
                i = end;
            }
            b => {
                let ch_len = char_len(b);
                out.push_str(&source[i..i + ch_len]);
                i += ch_len;
            }
        }

        at_line_start = out.ends_with('\n');
    }

    out
}

fn char_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b < 0xe0 => 2,
        b if b < 0xf0 => 3,
        _ => 4,
    }
}

/// Find `pat` at or after `from`, skipping positions shadowed by a backslash
/// escape.
fn find_unescaped(bytes: &[u8], from: usize, pat: &[u8]) -> Option<usize> {
    let mut i = from;
    while i + pat.len() <= bytes.len() {
        if bytes[i] == b'\\' && !pat.starts_with(b"\\") {
            i += 2;
            continue;
        }
        if &bytes[i..i + pat.len()] == pat {
            // `\\)` is an escaped paren, not a closer.
            if pat.starts_with(b"\\") && i > from && bytes[i - 1] == b'\\' {
                i += 1;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Match `\begin{ENV}...\end{ENV}` at `start` for a known display
/// environment, with same-name nesting. Returns the byte just past
/// `\end{ENV}` on success.
fn match_display_env(source: &str, start: usize) -> Option<(String, usize)> {
    let rest = &source[start..];
    let after_begin = rest.strip_prefix("\\begin{")?;
    let name_end = after_begin.find('}')?;
    let name = &after_begin[..name_end];
    if !is_display_env(name) {
        return None;
    }

    let begin_tag = format!("\\begin{{{name}}}");
    let end_tag = format!("\\end{{{name}}}");
    let mut depth = 1usize;
    let mut i = start + begin_tag.len();
    let bytes = source.as_bytes();

    while i < bytes.len() {
        if source[i..].starts_with(&begin_tag) {
            depth += 1;
            i += begin_tag.len();
        } else if source[i..].starts_with(&end_tag) {
            depth -= 1;
            i += end_tag.len();
            if depth == 0 {
                return Some((name.to_string(), i));
            }
        } else {
            i += char_len(bytes[i]);
        }
    }

    None
}

/// Span of an inline code run starting at a backtick: the opener is a run of
/// N backticks, closed by the next run of exactly N. Unterminated runs
/// extend to end of input (the backticks then read as literal text either
/// way).
fn code_span_end(bytes: &[u8], start: usize) -> usize {
    let mut open = start;
    while open < bytes.len() && bytes[open] == b'`' {
        open += 1;
    }
    let fence = open - start;

    let mut i = open;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let mut run = i;
            while run < bytes.len() && bytes[run] == b'`' {
                run += 1;
            }
            if run - i == fence {
                return run;
            }
            i = run;
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Span of existing dollar math starting at `$` or `$$`; nothing inside is
/// rewritten. An unterminated span covers only the opener so the rest of the
/// text is still scanned.
fn dollar_span_end(bytes: &[u8], start: usize) -> usize {
    let double = bytes.get(start + 1) == Some(&b'$');
    let pat: &[u8] = if double { b"$$" } else { b"$" };
    let from = start + pat.len();
    match find_unescaped(bytes, from, pat) {
        Some(close) => close + pat.len(),
        None => from,
    }
}

/// If `i` starts a fenced code block line, return the byte just past its
/// closing fence line (or end of input).
fn fenced_block_end(source: &str, i: usize) -> Option<usize> {
    let rest = &source[i..];
    let line_end = rest.find('\n').map_or(rest.len(), |n| n + 1);
    let line = rest[..line_end].trim_end();
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }

    let fence_char = match trimmed.chars().next() {
        Some(c @ ('`' | '~')) => c,
        _ => return None,
    };
    let fence_len = trimmed.chars().take_while(|&c| c == fence_char).count();
    if fence_len < 3 {
        return None;
    }

    let mut pos = i + line_end;
    for body_line in source[pos..].split_inclusive('\n') {
        let candidate = body_line.trim();
        pos += body_line.len();
        if candidate.chars().take_while(|&c| c == fence_char).count() >= fence_len
            && candidate.chars().all(|c| c == fence_char)
        {
            return Some(pos);
        }
    }
    Some(source.len())
}

// ---------------------------------------------------------------------------
// Width-annotated images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthUnit {
    Percent,
    Px,
    Em,
    Cm,
    Mm,
    In,
    Pt,
}

/// Parsed `{width=...}` attribute value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthSpec {
    pub value: f64,
    pub unit: WidthUnit,
}

impl WidthSpec {
    pub fn parse(raw: &str) -> Result<Self, TranscodeError> {
        let raw = raw.trim();
        let (number, unit) = match raw.find(|c: char| c.is_ascii_alphabetic() || c == '%') {
            Some(split) => raw.split_at(split),
            None => (raw, ""),
        };

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| TranscodeError::MalformedWidth(raw.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(TranscodeError::MalformedWidth(raw.to_string()));
        }

        let unit = match unit.trim() {
            "%" => WidthUnit::Percent,
            "px" | "" => WidthUnit::Px,
            "em" => WidthUnit::Em,
            "cm" => WidthUnit::Cm,
            "mm" => WidthUnit::Mm,
            "in" => WidthUnit::In,
            "pt" => WidthUnit::Pt,
            _ => return Err(TranscodeError::MalformedWidth(raw.to_string())),
        };

        Ok(Self { value, unit })
    }

    pub fn css(&self) -> String {
        let v = format_number(self.value);
        match self.unit {
            WidthUnit::Percent => format!("{v}%"),
            WidthUnit::Px => format!("{v}px"),
            WidthUnit::Em => format!("{v}em"),
            WidthUnit::Cm => format!("{v}cm"),
            WidthUnit::Mm => format!("{v}mm"),
            WidthUnit::In => format!("{v}in"),
            WidthUnit::Pt => format!("{v}pt"),
        }
    }

    /// LaTeX dimension: percentages become a `\linewidth` fraction and CSS
    /// pixels become points at 0.75pt/px, so both formats agree on size.
    pub fn latex(&self) -> String {
        match self.unit {
            WidthUnit::Percent => format!("{}\\linewidth", format_number(self.value / 100.0)),
            WidthUnit::Px => format!("{}pt", format_number(self.value * 0.75)),
            WidthUnit::Em => format!("{}em", format_number(self.value)),
            WidthUnit::Cm => format!("{}cm", format_number(self.value)),
            WidthUnit::Mm => format!("{}mm", format_number(self.value)),
            WidthUnit::In => format!("{}in", format_number(self.value)),
            WidthUnit::Pt => format!("{}pt", format_number(self.value)),
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let s = format!("{value:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Peel a leading `{width=VALUE}` attribute off a text node that follows an
/// image. Returns the raw value and the remaining text. Text without the
/// attribute shape is left alone (it is ordinary prose).
pub fn take_width_attr(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('{')?;
    let close = rest.find('}')?;
    let (attr, remainder) = (&rest[..close], &rest[close + 1..]);
    let (key, value) = attr.split_once('=')?;
    if key.trim() != "width" {
        return None;
    }
    Some((value.trim(), remainder))
}
