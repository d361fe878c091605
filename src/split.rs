//! Splits a rendered collated document back into per-snippet fragments.
//!
//! Each snippet's region is delimited by the rendered form of its section
//! marker heading: `<h1>marker</h1>` in HTML, `\section{marker}` in LaTeX.
//! Markers are anchored to those heading constructs, so a snippet whose text
//! happens to contain another snippet's hash as plain prose still splits
//! correctly. A marker that cannot be located means the collate/render/split
//! pipeline diverged, which is a bug, not an input problem.

use std::collections::HashMap;

use crate::collate::section_marker;
use crate::error::TranscodeError;

/// Split rendered HTML into a snippet → fragment map.
///
/// Fragments are post-processed for the preview/feed consumers: the feed is
/// tab-delimited, so stray newlines and tabs must go, but line breaks inside
/// `<code>` regions carry meaning and become explicit `<br>` tags first.
pub fn split_html(
    rendered: &str,
    snippets: &[String],
) -> Result<HashMap<String, String>, TranscodeError> {
    let mut fragments = HashMap::with_capacity(snippets.len());

    for snippet in snippets {
        let heading = format!("<h1>{}</h1>", section_marker(snippet));
        let at = rendered.find(&heading).ok_or_else(|| {
            TranscodeError::Internal(format!(
                "section marker for snippet {snippet:?} not found in rendered HTML"
            ))
        })?;
        let start = at + heading.len();
        let end = rendered[start..]
            .find("<h1>")
            .map_or(rendered.len(), |offset| start + offset);

        let fragment = flatten_for_feed(rendered[start..end].trim());
        fragments.insert(snippet.clone(), restyle(&fragment));
    }

    Ok(fragments)
}

/// Split rendered LaTeX into a snippet → fragment map.
pub fn split_latex(
    rendered: &str,
    snippets: &[String],
) -> Result<HashMap<String, String>, TranscodeError> {
    let mut fragments = HashMap::with_capacity(snippets.len());

    for snippet in snippets {
        let heading = format!("\\section{{{}}}", section_marker(snippet));
        let at = rendered.find(&heading).ok_or_else(|| {
            TranscodeError::Internal(format!(
                "section marker for snippet {snippet:?} not found in rendered LaTeX"
            ))
        })?;
        let start = at + heading.len();
        let end = rendered[start..]
            .find("\\section{")
            .map_or(rendered.len(), |offset| start + offset);

        fragments.insert(snippet.clone(), rendered[start..end].trim().to_string());
    }

    Ok(fragments)
}

/// Collapse newlines and tabs so the fragment survives a tab-delimited row,
/// converting newlines inside `<code>` regions to `<br>` first.
fn flatten_for_feed(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;

    while let Some(open) = rest.find("<code") {
        let Some(tag_end) = rest[open..].find('>') else {
            break;
        };
        let body_start = open + tag_end + 1;
        let Some(close) = rest[body_start..].find("</code>") else {
            break;
        };
        let body_end = body_start + close;

        out.push_str(&rest[..body_start]);
        out.push_str(&rest[body_start..body_end].replace('\n', "<br>"));
        out.push_str("</code>");
        rest = &rest[body_end + "</code>".len()..];
    }
    out.push_str(rest);

    out.replace('\n', " ").replace('\t', "  ")
}

/// Inline styling the downstream feed consumer cannot get from a stylesheet.
fn restyle(fragment: &str) -> String {
    fragment
        .replace(
            "<code>",
            "<code style=\"font-family:'Courier New'; font-size:80%\">",
        )
        .replace(
            "<pre>",
            "<pre style=\"background:#eee; padding: 1em; max-width: 80em;\">",
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::collate;

    #[test]
    fn html_split_recovers_every_snippet() {
        let snippets = vec!["first".to_string(), "second".to_string()];
        let rendered = format!(
            "<h1>{}</h1>\n<p>first</p>\n<h1>{}</h1>\n<p>second</p>\n",
            section_marker("first"),
            section_marker("second"),
        );
        let fragments = split_html(&rendered, &snippets).unwrap();
        assert_eq!(fragments["first"], "<p>first</p>");
        assert_eq!(fragments["second"], "<p>second</p>");
    }

    #[test]
    fn latex_split_recovers_every_snippet() {
        let snippets = vec!["a".to_string(), "b".to_string()];
        let rendered = format!(
            "\\section{{{}}}\n\nalpha\n\n\\section{{{}}}\n\nbeta\n",
            section_marker("a"),
            section_marker("b"),
        );
        let fragments = split_latex(&rendered, &snippets).unwrap();
        assert_eq!(fragments["a"], "alpha");
        assert_eq!(fragments["b"], "beta");
    }

    #[test]
    fn missing_marker_is_internal_error() {
        let snippets = vec!["present".to_string(), "absent".to_string()];
        let rendered = format!("<h1>{}</h1>\n<p>present</p>\n", section_marker("present"));
        assert!(matches!(
            split_html(&rendered, &snippets),
            Err(TranscodeError::Internal(_))
        ));
    }

    #[test]
    fn marker_hash_as_prose_does_not_confuse_the_split() {
        // One snippet's text contains another snippet's hash, but not as a
        // heading, so anchoring to <h1> keeps the split correct.
        let decoy = section_marker("target");
        let snippets = vec![format!("mentions {decoy}"), "target".to_string()];
        let rendered = format!(
            "<h1>{}</h1>\n<p>mentions {decoy}</p>\n<h1>{decoy}</h1>\n<p>target</p>\n",
            section_marker(&snippets[0]),
        );
        let fragments = split_html(&rendered, &snippets).unwrap();
        assert_eq!(fragments[&snippets[0]], format!("<p>mentions {decoy}</p>"));
        assert_eq!(fragments["target"], "<p>target</p>");
    }

    #[test]
    fn fragments_are_newline_and_tab_free() {
        let snippets = vec!["x".to_string()];
        let rendered = format!(
            "<h1>{}</h1>\n<p>line one\nline two\tcolumn</p>\n",
            section_marker("x"),
        );
        let fragments = split_html(&rendered, &snippets).unwrap();
        assert!(!fragments["x"].contains('\n'));
        assert!(!fragments["x"].contains('\t'));
        assert!(fragments["x"].contains("line one line two"));
    }

    #[test]
    fn code_region_newlines_become_breaks() {
        let snippets = vec!["c".to_string()];
        let rendered = format!(
            "<h1>{}</h1>\n<pre><code>line1\nline2</code></pre>\n",
            section_marker("c"),
        );
        let fragments = split_html(&rendered, &snippets).unwrap();
        assert!(fragments["c"].contains("line1<br>line2"));
    }

    #[test]
    fn splits_collated_headings_end_to_end() {
        // The collator's marker headings, once rendered, are exactly what
        // the splitter anchors on.
        let snippets = vec!["only".to_string()];
        let collated = collate(&snippets);
        assert!(collated.contains(&format!("# {}", section_marker("only"))));
    }
}
