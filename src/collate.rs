//! Batches all snippets into one synthetic markdown document.
//!
//! Each snippet is prefixed by a top-level heading whose text is a
//! content-derived marker, so the rendered output can later be split back
//! into per-snippet fragments. Top-level headings are reserved for markers;
//! snippet content never reaches heading level 1 on its own line in the
//! collated document because every snippet sits under its marker heading.

/// Content-derived section marker: lowercase hex SHA-1 of the snippet text.
///
/// Fixed width (40 hex chars), collision-resistant for any practical snippet
/// set, and stable across the render/split process boundary.
pub fn section_marker(text: &str) -> String {
    sha1_smol::Sha1::from(text.as_bytes()).hexdigest()
}

/// Concatenate the snippet list into one markdown document, each snippet
/// preceded by its marker heading. Preserves snippet order.
pub fn collate(snippets: &[String]) -> String {
    let mut out = String::new();
    for snippet in snippets {
        out.push_str("\n\n# ");
        out.push_str(&section_marker(snippet));
        out.push_str("\n\n");
        out.push_str(snippet);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_is_fixed_width_hex() {
        let marker = section_marker("What is $x$?");
        assert_eq!(marker.len(), 40);
        assert!(marker.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn marker_is_content_derived() {
        assert_eq!(section_marker("abc"), section_marker("abc"));
        assert_ne!(section_marker("abc"), section_marker("abd"));
    }

    #[test]
    fn collation_preserves_order_and_content() {
        let snippets = vec!["first".to_string(), "second".to_string()];
        let doc = collate(&snippets);
        let first_at = doc.find(&section_marker("first")).unwrap();
        let second_at = doc.find(&section_marker("second")).unwrap();
        assert!(first_at < second_at);
        assert!(doc.contains("\n\nfirst"));
        assert!(doc.contains("\n\nsecond"));
    }

    #[test]
    fn markers_are_level_one_headings() {
        let doc = collate(&["body".to_string()]);
        let expected = format!("\n\n# {}\n\n", section_marker("body"));
        assert!(doc.starts_with(&expected));
    }
}
