use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Errors produced by the transcoding pipeline.
///
/// None of these are retried here. Retrying (e.g. on the next file change in
/// watch mode) is the caller's business.
#[derive(Debug)]
pub enum TranscodeError {
    /// The `pdflatex` binary could not be located.
    LatexNotFound,
    /// The `gs` (ghostscript) binary could not be located.
    GhostscriptNotFound,
    /// pdflatex reported a compilation failure. Carries the log excerpt
    /// starting at the first `!` line, verbatim.
    LatexCompilation(String),
    /// A pipeline invariant was violated (marker not found while splitting,
    /// equation/page count mismatch). Always a bug, never a user error.
    Internal(String),
    /// A `{width=...}` image attribute that could not be parsed. Carries the
    /// offending value.
    MalformedWidth(String),
    /// An image referenced by the document could not be read.
    Image(PathBuf, std::io::Error),
    /// A quiz entry with a `type` this compiler does not know.
    UnknownQuestionKind(String),
    /// A quiz entry with no `type` field at all.
    MissingQuestionKind,
    Io(std::io::Error),
}

impl Display for TranscodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatexNotFound => write!(f, "pdflatex not found on PATH"),
            Self::GhostscriptNotFound => write!(f, "gs (ghostscript) not found on PATH"),
            Self::LatexCompilation(log) => write!(f, "latex compilation failed:\n{log}"),
            Self::Internal(msg) => write!(f, "internal consistency error: {msg}"),
            Self::MalformedWidth(value) => {
                write!(f, "unparseable image width attribute: {value:?}")
            }
            Self::Image(path, err) => write!(f, "cannot read image {}: {err}", path.display()),
            Self::UnknownQuestionKind(kind) => write!(f, "unknown question type: {kind:?}"),
            Self::MissingQuestionKind => write!(f, "quiz entry has no type field"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for TranscodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(_, err) | Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TranscodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
