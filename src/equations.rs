//! Compiles the document's equations into embeddable images.
//!
//! All distinct equations are written into one LaTeX job, one equation per
//! page (the `preview` package in active/tightpage mode crops each page to
//! its content). The job is typeset with `pdflatex` and rasterized with
//! ghostscript, and each page's PNG is read back for pixel geometry.
//!
//! For inline equations the text baseline matters: the depth of the equation
//! box below the baseline cannot be recovered from the rasterized image, so
//! the job emits a machine-readable `::: <depth/width>` line into the
//! pdflatex diagnostic stream for every page. Tokens, `:::` lines, PDF pages
//! and PNGs are index-aligned parallel sequences; that correspondence is the
//! load-bearing invariant here, and any count mismatch aborts the transcode
//! instead of silently shifting every later equation.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

use base64::Engine as _;
use comrak::nodes::{AstNode, NodeValue};

use crate::error::TranscodeError;
use crate::tokens::{EquationKind, EquationToken};

/// Rasterization density passed to ghostscript. Images render in documents
/// at half their pixel size, giving ~125dpi effective resolution.
pub const RASTER_DPI: u32 = 250;

const LATEX_JOB: &str = "equations.tex";
const PDF_JOB: &str = "equations.pdf";
const PNG_PREFIX: &str = "eq_img_";

/// Options affecting equation typesetting. Lookups are cached per distinct
/// option set for the duration of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EquationOptions {
    /// Full replacement for the stock document preamble (documentclass
    /// included).
    pub preamble_override: Option<String>,
    /// Preamble supplied by the quiz author.
    pub user_preamble: Option<String>,
}

/// Compiled image plus measured geometry for one equation.
#[derive(Debug, Clone)]
pub struct EquationArtifact {
    pub width_px: u32,
    pub height_px: u32,
    /// Depth below the text baseline as a fraction of the box width; zero
    /// for display equations.
    pub depth_ratio: f64,
    /// Self-contained `data:image/png;base64,...` payload.
    pub data_uri: String,
}

pub type EquationLookup = HashMap<EquationToken, EquationArtifact>;

/// Build an [`EquationToken`] from a comrak math node, the single point
/// deciding token identity for both collection and rendering.
pub fn token_from_math(math: &comrak::nodes::NodeMath) -> EquationToken {
    let content = math.literal.trim().to_string();
    if math.display_math {
        EquationToken::display(content)
    } else {
        EquationToken::inline(content)
    }
}

/// Collect the deduplicated, first-occurrence-ordered equation list from a
/// parsed tree.
pub fn collect_equations<'a>(root: &'a AstNode<'a>) -> Vec<EquationToken> {
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();

    for node in root.descendants() {
        if let NodeValue::Math(ref math) = node.data.borrow().value {
            let token = token_from_math(math);
            if seen.insert(token.clone()) {
                tokens.push(token);
            }
        }
    }

    tokens
}

/// Seam to the external typesetting toolchain, so tests can substitute a
/// counting mock and the rasterization strategy stays swappable.
pub trait EquationBackend {
    /// Typeset `source` in `dir`, producing a multi-page PDF. Returns the
    /// toolchain's diagnostic log.
    fn typeset(&self, dir: &Path, source: &str) -> Result<String, TranscodeError>;

    /// Convert the typeset document into one PNG per page, in page order.
    fn rasterize(&self, dir: &Path, page_count: usize) -> Result<Vec<Vec<u8>>, TranscodeError>;
}

/// Production backend: `pdflatex` + ghostscript as external batch processes.
#[derive(Debug, Clone)]
pub struct LatexBackend {
    pub resolution: u32,
}

impl Default for LatexBackend {
    fn default() -> Self {
        Self {
            resolution: RASTER_DPI,
        }
    }
}

impl EquationBackend for LatexBackend {
    fn typeset(&self, dir: &Path, source: &str) -> Result<String, TranscodeError> {
        let pdflatex = which::which("pdflatex").map_err(|_| TranscodeError::LatexNotFound)?;

        std::fs::write(dir.join(LATEX_JOB), source)?;

        let output = Command::new(pdflatex)
            .arg("-interaction=nonstopmode")
            .arg(LATEX_JOB)
            .current_dir(dir)
            .output()?;

        // Errors are detected from the log, not the exit status: nonstopmode
        // keeps going and the `!` lines carry the useful excerpt.
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn rasterize(&self, dir: &Path, page_count: usize) -> Result<Vec<Vec<u8>>, TranscodeError> {
        let gs = which::which("gs").map_err(|_| TranscodeError::GhostscriptNotFound)?;

        let status = Command::new(gs)
            .args(["-dBATCH", "-q", "-dNOPAUSE", "-sDEVICE=pngalpha"])
            .arg(format!("-r{}", self.resolution))
            .args(["-dTextAlphaBits=4", "-dGraphicsAlphaBits=4"])
            .arg(format!("-sOutputFile={PNG_PREFIX}%05d.png"))
            .arg(PDF_JOB)
            .current_dir(dir)
            .status()?;

        if !status.success() {
            return Err(TranscodeError::Internal(format!(
                "ghostscript exited with {status}"
            )));
        }

        collect_pages(dir, page_count)
    }
}

/// Read back the rasterized pages. Exactly `page_count` PNGs must exist: a
/// missing page means the PDF came up short, a surplus page means some
/// equation spilled onto a second page and every later artifact would be
/// shifted off by one.
fn collect_pages(dir: &Path, page_count: usize) -> Result<Vec<Vec<u8>>, TranscodeError> {
    let mut pages = Vec::with_capacity(page_count);
    for page in 1..=page_count {
        let path = dir.join(format!("{PNG_PREFIX}{page:05}.png"));
        let data = std::fs::read(&path).map_err(|_| {
            TranscodeError::Internal(format!(
                "expected {page_count} rasterized pages, page {page} is missing"
            ))
        })?;
        pages.push(data);
    }

    let surplus = dir.join(format!("{PNG_PREFIX}{:05}.png", page_count + 1));
    if surplus.exists() {
        return Err(TranscodeError::Internal(format!(
            "expected {page_count} rasterized pages but more exist, an equation spilled onto an extra page"
        )));
    }

    Ok(pages)
}

const DEFAULT_PREAMBLE: &str = "\\documentclass{article}\n\
                                \\usepackage{amsmath}\n";

const PREVIEW_SETUP: &str = "\\PassOptionsToPackage{active,tightpage}{preview}\n\
                             \\usepackage{preview}\n\
                             \\newenvironment{standalone}{\\begin{preview}}{\\end{preview}}\n";

fn build_job(tokens: &[EquationToken], options: &EquationOptions) -> String {
    let mut src = String::new();
    match options.preamble_override {
        Some(ref preamble) => {
            src.push_str(preamble.trim_end());
            src.push('\n');
        }
        None => src.push_str(DEFAULT_PREAMBLE),
    }
    if let Some(ref preamble) = options.user_preamble {
        src.push_str(preamble);
        src.push('\n');
    }
    src.push_str(PREVIEW_SETUP);
    src.push_str("\\begin{document}\n");

    for token in tokens {
        match token.kind {
            EquationKind::Inline => {
                // Measurement box first; its depth-to-width ratio goes out on
                // the side channel before the page that shows it.
                let _ = writeln!(src, "\\setbox0=\\hbox{{${}$}}", token.content);
                src.push_str(
                    "\\makeatletter\\typeout{::: \\strip@pt\\dimexpr 1pt * \\dp0 / \\wd0\\relax}\\makeatother\n",
                );
                src.push_str("\\begin{standalone}\\copy0\\end{standalone}\n");
            }
            EquationKind::Display => {
                src.push_str("\\typeout{::: 0}\n");
                if token.is_environment() {
                    let _ = writeln!(
                        src,
                        "\\begin{{standalone}}{}\\end{{standalone}}",
                        token.content
                    );
                } else {
                    let _ = writeln!(
                        src,
                        "\\begin{{standalone}}$\\displaystyle {}$\\end{{standalone}}",
                        token.content
                    );
                }
            }
        }
    }

    src.push_str("\\end{document}\n");
    src
}

/// Split the pdflatex log into side-channel depth ratios and, if present,
/// the error excerpt starting at the first `!` line.
fn parse_log(log: &str) -> Result<Vec<f64>, TranscodeError> {
    let mut ratios = Vec::new();
    let mut error: Option<String> = None;

    for line in log.lines() {
        if let Some(ref mut excerpt) = error {
            excerpt.push_str(line);
            excerpt.push('\n');
            continue;
        }
        if let Some(value) = line.strip_prefix(":::") {
            let ratio: f64 = value.trim().parse().map_err(|_| {
                TranscodeError::Internal(format!("unreadable depth side-channel line: {line:?}"))
            })?;
            ratios.push(ratio);
        } else if line.starts_with('!') {
            error = Some(format!("{line}\n"));
        }
    }

    match error {
        Some(excerpt) => Err(TranscodeError::LatexCompilation(excerpt)),
        None => Ok(ratios),
    }
}

/// Width and height from a PNG's own IHDR header, big-endian at bytes 16..24.
fn png_dimensions(data: &[u8]) -> Result<(u32, u32), TranscodeError> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if data.len() < 24 || &data[..8] != SIGNATURE {
        return Err(TranscodeError::Internal(
            "rasterizer produced a non-PNG page".to_string(),
        ));
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Ok((width, height))
}

/// Compile every token into an artifact. An empty token list short-circuits
/// without touching the toolchain.
pub fn compile_equations(
    tokens: &[EquationToken],
    options: &EquationOptions,
    backend: &dyn EquationBackend,
) -> Result<EquationLookup, TranscodeError> {
    if tokens.is_empty() {
        return Ok(EquationLookup::new());
    }

    // Scratch directory owned by this run alone; dropped (and deleted) on
    // return.
    let workdir = tempfile::tempdir()?;
    let source = build_job(tokens, options);

    let log = backend.typeset(workdir.path(), &source)?;
    let ratios = parse_log(&log)?;
    if ratios.len() != tokens.len() {
        return Err(TranscodeError::Internal(format!(
            "{} equations but {} depth side-channel lines",
            tokens.len(),
            ratios.len()
        )));
    }

    let pages = backend.rasterize(workdir.path(), tokens.len())?;
    if pages.len() != tokens.len() {
        return Err(TranscodeError::Internal(format!(
            "{} equations but {} rasterized pages",
            tokens.len(),
            pages.len()
        )));
    }

    let mut lookup = EquationLookup::with_capacity(tokens.len());
    for ((token, page), ratio) in tokens.iter().zip(&pages).zip(&ratios) {
        let (width_px, height_px) = png_dimensions(page)?;
        let data_uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(page)
        );
        lookup.insert(
            token.clone(),
            EquationArtifact {
                width_px,
                height_px,
                depth_ratio: *ratio,
                data_uri,
            },
        );
    }

    Ok(lookup)
}


#[cfg(test)]
mod tests {
    use super::testing::MockBackend;
    use super::*;
    use comrak::{Arena, parse_document};

    fn collect(md: &str) -> Vec<EquationToken> {
        let arena = Arena::new();
        let root = parse_document(&arena, md, &crate::transcode::comrak_options());
        collect_equations(root)
    }

    #[test]
    fn collection_is_ordered_and_deduplicated() {
        let tokens = collect("$a$ then $$b$$ then $a$ then $c$");
        assert_eq!(
            tokens,
            vec![
                EquationToken::inline("a"),
                EquationToken::display("b"),
                EquationToken::inline("c"),
            ]
        );
    }

    #[test]
    fn inline_and_display_with_equal_content_are_distinct() {
        let tokens = collect("$x$ and $$x$$");
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn escaped_dollars_produce_no_tokens() {
        assert!(collect(r"\$5 \$10").is_empty());
    }

    #[test]
    fn single_inline_token_content() {
        let tokens = collect("$x+y$");
        assert_eq!(tokens, vec![EquationToken::inline("x+y")]);
    }

    #[test]
    fn job_pages_follow_token_order() {
        let tokens = vec![
            EquationToken::inline("a"),
            EquationToken::display("b"),
            EquationToken::display("\\begin{align}c\\end{align}"),
        ];
        let job = build_job(&tokens, &EquationOptions::default());

        let inline_at = job.find("\\setbox0=\\hbox{$a$}").unwrap();
        let display_at = job.find("$\\displaystyle b$").unwrap();
        let env_at = job.find("\\begin{align}c\\end{align}").unwrap();
        assert!(inline_at < display_at && display_at < env_at);
        // One side-channel line per page.
        assert_eq!(job.matches("\\typeout{:::").count(), 3);
        assert_eq!(job.matches("\\begin{standalone}").count(), 3);
    }

    #[test]
    fn user_preamble_follows_the_stock_one() {
        let options = EquationOptions {
            preamble_override: None,
            user_preamble: Some("\\usepackage{bm}".to_string()),
        };
        let job = build_job(&[EquationToken::inline("x")], &options);
        let amsmath = job.find("amsmath").unwrap();
        let bm = job.find("{bm}").unwrap();
        let begin = job.find("\\begin{document}").unwrap();
        assert!(amsmath < bm && bm < begin);
    }

    #[test]
    fn override_replaces_the_stock_preamble() {
        let options = EquationOptions {
            preamble_override: Some(
                "\\documentclass{article}\n\\usepackage{fourier}".to_string(),
            ),
            user_preamble: None,
        };
        let job = build_job(&[EquationToken::inline("x")], &options);
        assert!(!job.contains("amsmath"));
        let fourier = job.find("fourier").unwrap();
        let begin = job.find("\\begin{document}").unwrap();
        assert!(fourier < begin);
    }

    #[test]
    fn log_parsing_reads_depth_ratios() {
        let ratios = parse_log("junk\n::: 0.31\nmore junk\n::: 0\n").unwrap();
        assert_eq!(ratios, vec![0.31, 0.0]);
    }

    #[test]
    fn log_error_excerpt_is_preserved() {
        let log = "::: 0.2\n! Undefined control sequence.\nl.9 \\frobnicate\n";
        match parse_log(log) {
            Err(TranscodeError::LatexCompilation(excerpt)) => {
                assert!(excerpt.starts_with("! Undefined control sequence."));
                assert!(excerpt.contains("\\frobnicate"));
            }
            other => panic!("expected compilation error, got {other:?}"),
        }
    }

    #[test]
    fn png_header_geometry() {
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(&[0, 0, 0, 13]); // IHDR length
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&120u32.to_be_bytes());
        png.extend_from_slice(&45u32.to_be_bytes());
        assert_eq!(png_dimensions(&png).unwrap(), (120, 45));
    }

    #[test]
    fn truncated_png_is_an_internal_error() {
        assert!(matches!(
            png_dimensions(b"\x89PNG"),
            Err(TranscodeError::Internal(_))
        ));
    }

    #[test]
    fn empty_token_list_skips_the_toolchain() {
        let backend = MockBackend::new(vec![], vec![]);
        let lookup = compile_equations(&[], &EquationOptions::default(), &backend).unwrap();
        assert!(lookup.is_empty());
        assert_eq!(*backend.typeset_calls.borrow(), 0);
        assert_eq!(*backend.rasterize_calls.borrow(), 0);
    }

    #[test]
    fn lookup_geometry_follows_token_order() {
        // Monotonically increasing widths make any page misalignment visible.
        let tokens = vec![
            EquationToken::inline("a"),
            EquationToken::inline("aa"),
            EquationToken::inline("aaa"),
        ];
        let backend = MockBackend::new(vec![10, 20, 30], vec![0.1, 0.2, 0.3]);
        let lookup = compile_equations(&tokens, &EquationOptions::default(), &backend).unwrap();

        assert_eq!(lookup.len(), 3);
        let widths: Vec<u32> = tokens.iter().map(|t| lookup[t].width_px).collect();
        assert_eq!(widths, vec![10, 20, 30]);
        assert!((lookup[&tokens[1]].depth_ratio - 0.2).abs() < 1e-9);
    }

    fn write_pages(dir: &Path, count: usize) {
        for page in 1..=count {
            let path = dir.join(format!("{PNG_PREFIX}{page:05}.png"));
            std::fs::write(path, MockBackend::fake_png(10)).unwrap();
        }
    }

    #[test]
    fn collected_pages_come_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_pages(dir.path(), 3);
        let pages = collect_pages(dir.path(), 3).unwrap();
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn missing_page_is_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        write_pages(dir.path(), 2);
        assert!(matches!(
            collect_pages(dir.path(), 3),
            Err(TranscodeError::Internal(_))
        ));
    }

    #[test]
    fn surplus_page_is_an_internal_error() {
        // An equation spilling onto a second page shifts every later
        // artifact, so the extra PNG must abort instead of being ignored.
        let dir = tempfile::tempdir().unwrap();
        write_pages(dir.path(), 4);
        assert!(matches!(
            collect_pages(dir.path(), 3),
            Err(TranscodeError::Internal(_))
        ));
    }

    #[test]
    fn page_count_mismatch_fails_loudly() {
        let tokens = vec![EquationToken::inline("a"), EquationToken::inline("b")];
        // Only one ratio line for two equations.
        let backend = MockBackend::new(vec![10, 20], vec![0.1]);
        let result = compile_equations(&tokens, &EquationOptions::default(), &backend);
        assert!(matches!(result, Err(TranscodeError::Internal(_))));
    }
}
