//! Drives the full pipeline: collect → collate → parse → compile equations
//! → render → split → substitute.
//!
//! One [`Transcoder`] serves one quiz document and any number of target
//! formats. The snippet list and normalized collated source are computed
//! once; equation lookups are cached per distinct option set, so rendering
//! the same format twice (or two formats sharing options) invokes the
//! toolchain at most once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use comrak::{Arena, nodes::AstNode, parse_document};
use serde_yaml::Value;

use crate::collate::collate;
use crate::document::{collect_snippets, substitute_fragments};
use crate::equations::{
    EquationBackend, EquationLookup, EquationOptions, collect_equations, compile_equations,
};
use crate::error::TranscodeError;
use crate::render::{RenderContext, render_html, render_latex};
use crate::split::{split_html, split_latex};
use crate::tokens::normalize_math;

/// Target rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Markup preview: HTML with embedded equation images.
    Html,
    /// Typeset document: LaTeX source.
    Latex,
}

/// comrak options shared by every parse of the collated document.
pub(crate) fn comrak_options() -> comrak::Options<'static> {
    let mut options = comrak::Options::default();
    options.extension.strikethrough = true;
    options.extension.autolink = true;
    options.extension.math_dollars = true;
    options
}

pub struct Transcoder {
    document: Value,
    snippets: Vec<String>,
    /// Collated document with non-dollar math delimiters normalized, ready
    /// for parsing.
    normalized: String,
    image_root: PathBuf,
    equation_cache: HashMap<EquationOptions, EquationLookup>,
}

impl Transcoder {
    /// Prepare a transcoder for one quiz document. `image_root` is the
    /// directory relative image paths resolve against.
    pub fn new(document: &Value, image_root: &Path) -> Self {
        let snippets = collect_snippets(document);
        let normalized = normalize_math(&collate(&snippets));
        Self {
            document: document.clone(),
            snippets,
            normalized,
            image_root: image_root.to_path_buf(),
            equation_cache: HashMap::new(),
        }
    }

    pub fn snippets(&self) -> &[String] {
        &self.snippets
    }

    /// Transcode the quiz into one target format: a new structured document
    /// with every markup leaf replaced by its rendered fragment.
    pub fn transcode(
        &mut self,
        format: Format,
        options: &EquationOptions,
        backend: &dyn EquationBackend,
    ) -> Result<Value, TranscodeError> {
        let arena = Arena::new();
        let root = parse_document(&arena, &self.normalized, &comrak_options());

        let fragments = match format {
            Format::Html => {
                let equations =
                    Self::equations_for(&mut self.equation_cache, root, options, backend)?;
                let ctx = RenderContext {
                    equations,
                    image_root: &self.image_root,
                };
                split_html(&render_html(root, &ctx)?, &self.snippets)?
            }
            // LaTeX output keeps equations as source, so no artifacts are
            // compiled for it.
            Format::Latex => {
                let equations = EquationLookup::new();
                let ctx = RenderContext {
                    equations: &equations,
                    image_root: &self.image_root,
                };
                split_latex(&render_latex(root, &ctx)?, &self.snippets)?
            }
        };

        Ok(substitute_fragments(&self.document, &fragments))
    }

    fn equations_for<'a, 'c>(
        cache: &'c mut HashMap<EquationOptions, EquationLookup>,
        root: &'a AstNode<'a>,
        options: &EquationOptions,
        backend: &dyn EquationBackend,
    ) -> Result<&'c EquationLookup, TranscodeError> {
        match cache.entry(options.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let tokens = collect_equations(root);
                Ok(entry.insert(compile_equations(&tokens, options, backend)?))
            }
        }
    }
}
