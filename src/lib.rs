//! # quizmd
//!
//! Quiz transcoder: collates the markdown snippets of a YAML quiz into one
//! document, typesets the equations once with LaTeX, and renders each
//! snippet back into the quiz structure as HTML or LaTeX fragments.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use quizmd::{Options, quiz_to_html};
//!
//! let source = std::fs::read_to_string("quiz.yaml").unwrap();
//! let page = quiz_to_html(&source, &Options::default())
//!     .expect("transcoding failed");
//! std::fs::write("quiz.html", &page).unwrap();
//! ```
//!
//! ## Lower-level API
//!
//! For more control, drive the pipeline directly:
//!
//! ```rust,no_run
//! use std::path::Path;
//! use quizmd::equations::{EquationOptions, LatexBackend};
//! use quizmd::transcode::{Format, Transcoder};
//!
//! let doc: serde_yaml::Value =
//!     serde_yaml::from_str("- type: essay\n  question: What is $x$?\n").unwrap();
//! let mut transcoder = Transcoder::new(&doc, Path::new("."));
//! let backend = LatexBackend::default();
//! let html_tree = transcoder
//!     .transcode(Format::Html, &EquationOptions::default(), &backend)
//!     .unwrap();
//! let page = quizmd::template::compose_html(&html_tree).unwrap();
//! ```

pub mod collate;
pub mod document;
pub mod equations;
pub mod error;
pub mod feed;
pub mod quiz;
pub mod render;
pub mod split;
pub mod template;
pub mod tokens;
pub mod transcode;

#[cfg(feature = "cli")]
pub mod watch;

pub use error::TranscodeError;
pub use transcode::{Format, Transcoder};

/// Output formats the command line can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Html,
    Latex,
    Feed,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Latex => "tex",
            Self::Feed => "txt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatParseError {
    value: String,
}

impl std::fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported format: {}", self.value)
    }
}

impl std::error::Error for FormatParseError {}

impl TryFrom<&str> for OutputFormat {
    type Error = FormatParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "html" => Ok(Self::Html),
            "latex" => Ok(Self::Latex),
            "feed" => Ok(Self::Feed),
            _ => Err(FormatParseError {
                value: value.to_string(),
            }),
        }
    }
}

/// High-level options for the one-shot `quiz_to_*` functions.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Replace the stock equation preamble entirely.
    pub preamble_override: Option<String>,
    /// Extra preamble appended after the stock one. `None` = use the
    /// quiz header's `pre_latexpreamble`, if any.
    pub user_preamble: Option<String>,
    /// Directory relative image paths resolve against. `None` = the
    /// current directory.
    pub image_root: Option<std::path::PathBuf>,
}

/// Top-level error type combining all pipeline stages.
#[derive(Debug)]
pub enum Error {
    Yaml(serde_yaml::Error),
    Transcode(TranscodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yaml(e) => write!(f, "quiz parse: {e}"),
            Self::Transcode(e) => write!(f, "transcode: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Yaml(e) => Some(e),
            Self::Transcode(e) => Some(e),
        }
    }
}

impl From<TranscodeError> for Error {
    fn from(err: TranscodeError) -> Self {
        Self::Transcode(err)
    }
}

fn one_shot(source: &str, options: &Options, format: OutputFormat) -> Result<String, Error> {
    let doc: serde_yaml::Value = serde_yaml::from_str(source).map_err(Error::Yaml)?;
    let image_root = options
        .image_root
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let equation_options = equations::EquationOptions {
        preamble_override: options.preamble_override.clone(),
        user_preamble: options.user_preamble.clone().or_else(|| quiz::user_preamble(&doc)),
    };

    let mut transcoder = Transcoder::new(&doc, &image_root);
    let backend = equations::LatexBackend::default();

    match format {
        OutputFormat::Html => {
            let tree = transcoder.transcode(Format::Html, &equation_options, &backend)?;
            Ok(template::compose_html(&tree)?)
        }
        OutputFormat::Latex => {
            let tree = transcoder.transcode(Format::Latex, &equation_options, &backend)?;
            let preamble = equation_options.user_preamble.as_deref().unwrap_or("");
            Ok(template::compose_latex(&tree, preamble)?)
        }
        OutputFormat::Feed => {
            let tree = transcoder.transcode(Format::Html, &equation_options, &backend)?;
            Ok(feed::render_feed(&tree)?)
        }
    }
}

/// Render a quiz source to a complete HTML preview page in one call.
///
/// Runs the LaTeX toolchain when the quiz contains equations. For watch /
/// multi-format use cases, drive [`Transcoder`] directly so the equation
/// work is shared.
pub fn quiz_to_html(source: &str, options: &Options) -> Result<String, Error> {
    one_shot(source, options, OutputFormat::Html)
}

/// Render a quiz source to a standalone LaTeX exam in one call.
pub fn quiz_to_latex(source: &str, options: &Options) -> Result<String, Error> {
    one_shot(source, options, OutputFormat::Latex)
}

/// Render a quiz source to the tab-delimited assessment feed in one call.
pub fn quiz_to_feed(source: &str, options: &Options) -> Result<String, Error> {
    one_shot(source, options, OutputFormat::Feed)
}
