//! Renders the parsed collated tree once per target format.
//!
//! The HTML renderer produces the markup-preview form: equations become
//! embedded `<img>` elements sized from their measured geometry, and all
//! images are base64-embedded so the output is self-contained. The LaTeX
//! renderer produces typeset source: equations go back to math delimiters
//! and images become `\includegraphics` directives.

use std::path::Path;

use base64::Engine as _;
use comrak::nodes::{AstNode, ListType, NodeValue};

use crate::equations::{EquationArtifact, EquationLookup, token_from_math};
use crate::error::TranscodeError;
use crate::tokens::{EquationKind, WidthSpec, take_width_attr};

/// Preview images render at half their rasterized pixel size.
const DISPLAY_SCALE: f64 = 0.5;

pub struct RenderContext<'a> {
    pub equations: &'a EquationLookup,
    /// Directory image paths resolve against (the quiz file's directory).
    pub image_root: &'a Path,
}

impl RenderContext<'_> {
    fn artifact(&self, kind: EquationKind, content: &str) -> Result<&EquationArtifact, TranscodeError> {
        let token = crate::tokens::EquationToken {
            kind,
            content: content.to_string(),
        };
        self.equations.get(&token).ok_or_else(|| {
            TranscodeError::Internal(format!("no compiled artifact for equation {content:?}"))
        })
    }
}

pub fn render_html<'a>(
    root: &'a AstNode<'a>,
    ctx: &RenderContext<'_>,
) -> Result<String, TranscodeError> {
    HtmlRenderer { ctx }.render_blocks(root)
}

pub fn render_latex<'a>(
    root: &'a AstNode<'a>,
    _ctx: &RenderContext<'_>,
) -> Result<String, TranscodeError> {
    LatexRenderer.render_blocks(root)
}

// ---------------------------------------------------------------------------
// HTML (markup-preview) format
// ---------------------------------------------------------------------------

struct HtmlRenderer<'a> {
    ctx: &'a RenderContext<'a>,
}

impl HtmlRenderer<'_> {
    fn render_blocks<'a>(&self, parent: &'a AstNode<'a>) -> Result<String, TranscodeError> {
        let mut out = String::new();
        for node in parent.children() {
            out.push_str(&self.render_block(node)?);
        }
        Ok(out)
    }

    fn render_block<'a>(&self, node: &'a AstNode<'a>) -> Result<String, TranscodeError> {
        let value = node.data.borrow().value.clone();
        Ok(match value {
            NodeValue::Document => self.render_blocks(node)?,
            NodeValue::Paragraph => {
                let inner = self.render_inlines(node)?;
                format!("<p>{}</p>\n", inner.trim())
            }
            NodeValue::Heading(heading) => {
                let level = u32::from(heading.level.clamp(1, 6));
                let inner = self.render_inlines(node)?;
                format!("<h{level}>{}</h{level}>\n", inner.trim())
            }
            NodeValue::List(list) => {
                let mut items = String::new();
                for item in node.children() {
                    items.push_str("<li>");
                    items.push_str(self.render_item(item, list.tight)?.trim());
                    items.push_str("</li>\n");
                }
                if list.list_type == ListType::Ordered {
                    if list.start == 1 {
                        format!("<ol>\n{items}</ol>\n")
                    } else {
                        format!("<ol start=\"{}\">\n{items}</ol>\n", list.start)
                    }
                } else {
                    format!("<ul>\n{items}</ul>\n")
                }
            }
            NodeValue::Item(_) => self.render_blocks(node)?,
            NodeValue::CodeBlock(code) => {
                let language = code.info.split_whitespace().next().unwrap_or("");
                let class = if language.is_empty() {
                    String::new()
                } else {
                    format!(" class=\"language-{}\"", escape_html(language))
                };
                format!(
                    "<pre><code{class}>{}</code></pre>\n",
                    escape_html(code.literal.trim_end_matches('\n'))
                )
            }
            NodeValue::BlockQuote => {
                format!("<blockquote>\n{}</blockquote>\n", self.render_blocks(node)?)
            }
            NodeValue::ThematicBreak => "<hr />\n".to_string(),
            NodeValue::HtmlBlock(block) => block.literal,
            other if other.block() => self.render_blocks(node)?,
            _ => self.render_inlines(node)?,
        })
    }

    /// Items of a tight list drop the `<p>` wrappers around their text;
    /// loose items keep them.
    fn render_item<'a>(&self, item: &'a AstNode<'a>, tight: bool) -> Result<String, TranscodeError> {
        if !tight {
            return self.render_blocks(item);
        }
        let mut out = String::new();
        for child in item.children() {
            let is_paragraph = matches!(child.data.borrow().value, NodeValue::Paragraph);
            if is_paragraph {
                out.push_str(self.render_inlines(child)?.trim());
                out.push('\n');
            } else {
                out.push_str(&self.render_block(child)?);
            }
        }
        Ok(out)
    }

    fn render_inlines<'a>(&self, parent: &'a AstNode<'a>) -> Result<String, TranscodeError> {
        let mut out = String::new();
        let mut cursor = parent.first_child();

        while let Some(node) = cursor {
            let mut next = node.next_sibling();
            let value = node.data.borrow().value.clone();

            if let NodeValue::Image(ref link) = value {
                let alt = plain_text(node);
                let title = link.title.clone();
                // An immediately following `{width=...}` text prefix belongs
                // to this image, not to the prose.
                let mut width = None;
                if let Some(sibling) = next
                    && let NodeValue::Text(ref text) = sibling.data.borrow().value
                    && let Some((raw, rest)) = take_width_attr(text)
                {
                    width = Some(WidthSpec::parse(raw)?);
                    out.push_str(&self.render_image(&link.url, &alt, &title, width)?);
                    out.push_str(&escape_html(rest));
                    next = sibling.next_sibling();
                    cursor = next;
                    continue;
                }
                out.push_str(&self.render_image(&link.url, &alt, &title, width)?);
                cursor = next;
                continue;
            }

            out.push_str(&self.render_inline(node, &value)?);
            cursor = next;
        }

        Ok(out)
    }

    fn render_inline<'a>(
        &self,
        node: &'a AstNode<'a>,
        value: &NodeValue,
    ) -> Result<String, TranscodeError> {
        Ok(match value {
            NodeValue::Text(text) => escape_html(text),
            NodeValue::Code(code) => format!("<code>{}</code>", escape_html(&code.literal)),
            NodeValue::SoftBreak => "\n".to_string(),
            NodeValue::LineBreak => "<br />\n".to_string(),
            NodeValue::Emph => format!("<em>{}</em>", self.render_inlines(node)?),
            NodeValue::Strong => format!("<strong>{}</strong>", self.render_inlines(node)?),
            NodeValue::Strikethrough => format!("<del>{}</del>", self.render_inlines(node)?),
            NodeValue::Link(link) => format!(
                "<a href=\"{}\">{}</a>",
                escape_html(&link.url),
                self.render_inlines(node)?
            ),
            NodeValue::Math(math) => {
                let token = token_from_math(math);
                let artifact = self.ctx.artifact(token.kind, &token.content)?;
                self.render_equation(&token.content, token.kind, artifact)
            }
            NodeValue::HtmlInline(html) => html.clone(),
            other if !other.block() => self.render_inlines(node)?,
            _ => String::new(),
        })
    }

    fn render_equation(
        &self,
        content: &str,
        kind: EquationKind,
        artifact: &EquationArtifact,
    ) -> String {
        let w = round2(f64::from(artifact.width_px) * DISPLAY_SCALE);
        let h = round2(f64::from(artifact.height_px) * DISPLAY_SCALE);
        let alt = escape_html(content);
        match kind {
            EquationKind::Inline => {
                // Offset the image below the baseline by its measured depth.
                let depth = round2(artifact.depth_ratio * f64::from(artifact.width_px) * DISPLAY_SCALE);
                format!(
                    "<img src='{}' alt='{alt}' width='{w}' height='{h}' style='vertical-align:-{depth}px;'>",
                    artifact.data_uri
                )
            }
            EquationKind::Display => format!(
                "<img src='{}' alt='{alt}' width='{w}' height='{h}'>",
                artifact.data_uri
            ),
        }
    }

    fn render_image(
        &self,
        url: &str,
        alt: &str,
        title: &str,
        width: Option<WidthSpec>,
    ) -> Result<String, TranscodeError> {
        let src = self.embed_image(url)?;
        let title_attr = if title.is_empty() {
            String::new()
        } else {
            format!(" title=\"{}\"", escape_html(title))
        };
        let style_attr = match width {
            Some(spec) => format!(" style=\"width:{}\"", spec.css()),
            None => String::new(),
        };
        Ok(format!(
            "<img src=\"{src}\" alt=\"{}\"{title_attr}{style_attr} />",
            escape_html(alt)
        ))
    }

    /// Inline the image bytes as a data URI so the preview is self-contained.
    /// URLs and pre-encoded data URIs pass through untouched.
    fn embed_image(&self, url: &str) -> Result<String, TranscodeError> {
        if url.starts_with("data:") || url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        let path = self.ctx.image_root.join(url);
        let data = std::fs::read(&path).map_err(|err| TranscodeError::Image(path.clone(), err))?;
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some("svg") => "svg+xml",
            Some("jpg") | Some("jpeg") => "jpeg",
            Some("gif") => "gif",
            _ => "png",
        };
        Ok(format!(
            "data:image/{mime};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&data)
        ))
    }
}

// ---------------------------------------------------------------------------
// LaTeX (typeset-document) format
// ---------------------------------------------------------------------------

/// Stateless: equations go back to delimiters and images stay as paths,
/// so no compiled artifacts or image root are needed.
struct LatexRenderer;

impl LatexRenderer {
    fn render_blocks<'a>(&self, parent: &'a AstNode<'a>) -> Result<String, TranscodeError> {
        let mut out = String::new();
        for node in parent.children() {
            out.push_str(&self.render_block(node)?);
        }
        Ok(out)
    }

    fn render_block<'a>(&self, node: &'a AstNode<'a>) -> Result<String, TranscodeError> {
        let value = node.data.borrow().value.clone();
        Ok(match value {
            NodeValue::Document => self.render_blocks(node)?,
            NodeValue::Paragraph => {
                let inner = self.render_inlines(node)?;
                format!("{}\n\n", inner.trim())
            }
            NodeValue::Heading(heading) => {
                let command = match heading.level {
                    1 => "section",
                    2 => "subsection",
                    3 => "subsubsection",
                    _ => "paragraph",
                };
                let inner = self.render_inlines(node)?;
                format!("\\{command}{{{}}}\n\n", inner.trim())
            }
            NodeValue::List(list) => {
                let environment = if list.list_type == ListType::Ordered {
                    "enumerate"
                } else {
                    "itemize"
                };
                let mut out = format!("\\begin{{{environment}}}\n");
                for item in node.children() {
                    out.push_str("\\item ");
                    out.push_str(self.render_blocks(item)?.trim());
                    out.push('\n');
                }
                out.push_str(&format!("\\end{{{environment}}}\n\n"));
                out
            }
            NodeValue::Item(_) => self.render_blocks(node)?,
            NodeValue::CodeBlock(code) => format!(
                "\\begin{{verbatim}}\n{}\n\\end{{verbatim}}\n\n",
                code.literal.trim_end_matches('\n')
            ),
            NodeValue::BlockQuote => {
                format!("\\begin{{quote}}\n{}\\end{{quote}}\n\n", self.render_blocks(node)?)
            }
            NodeValue::ThematicBreak => "\\noindent\\hrulefill\n\n".to_string(),
            NodeValue::HtmlBlock(_) => String::new(),
            other if other.block() => self.render_blocks(node)?,
            _ => self.render_inlines(node)?,
        })
    }

    fn render_inlines<'a>(&self, parent: &'a AstNode<'a>) -> Result<String, TranscodeError> {
        let mut out = String::new();
        let mut cursor = parent.first_child();

        while let Some(node) = cursor {
            let mut next = node.next_sibling();
            let value = node.data.borrow().value.clone();

            if let NodeValue::Image(ref link) = value {
                let mut width = None;
                if let Some(sibling) = next
                    && let NodeValue::Text(ref text) = sibling.data.borrow().value
                    && let Some((raw, rest)) = take_width_attr(text)
                {
                    width = Some(WidthSpec::parse(raw)?);
                    out.push_str(&render_includegraphics(&link.url, width));
                    out.push_str(&escape_latex(rest));
                    next = sibling.next_sibling();
                    cursor = next;
                    continue;
                }
                out.push_str(&render_includegraphics(&link.url, width));
                cursor = next;
                continue;
            }

            out.push_str(&self.render_inline(node, &value)?);
            cursor = next;
        }

        Ok(out)
    }

    fn render_inline<'a>(
        &self,
        node: &'a AstNode<'a>,
        value: &NodeValue,
    ) -> Result<String, TranscodeError> {
        Ok(match value {
            NodeValue::Text(text) => escape_latex(text),
            NodeValue::Code(code) => format!("\\texttt{{{}}}", escape_latex(&code.literal)),
            NodeValue::SoftBreak => "\n".to_string(),
            NodeValue::LineBreak => "\\\\\n".to_string(),
            NodeValue::Emph => format!("\\emph{{{}}}", self.render_inlines(node)?),
            NodeValue::Strong => format!("\\textbf{{{}}}", self.render_inlines(node)?),
            NodeValue::Strikethrough => format!("\\sout{{{}}}", self.render_inlines(node)?),
            NodeValue::Link(link) => format!(
                "\\href{{{}}}{{{}}}",
                link.url.clone(),
                self.render_inlines(node)?
            ),
            NodeValue::Math(math) => {
                let token = token_from_math(math);
                match token.kind {
                    EquationKind::Inline => format!("${}$", token.content),
                    EquationKind::Display if token.is_environment() => token.content,
                    EquationKind::Display => {
                        format!("\\begin{{equation}}\n{}\n\\end{{equation}}", token.content)
                    }
                }
            }
            NodeValue::HtmlInline(_) => String::new(),
            other if !other.block() => self.render_inlines(node)?,
            _ => String::new(),
        })
    }
}

/// Image paths stay as the author wrote them: the exam source is written
/// next to the quiz file, so relative paths keep resolving.
fn render_includegraphics(url: &str, width: Option<WidthSpec>) -> String {
    // The typeset toolchain cannot load SVG directly; authors keep a PDF
    // sibling next to each SVG.
    let src = if let Some(stem) = url.strip_suffix(".svg") {
        format!("{stem}.pdf")
    } else {
        url.to_string()
    };
    match width {
        Some(spec) => format!("\\includegraphics[width={}]{{{src}}}", spec.latex()),
        None => format!("\\includegraphics{{{src}}}"),
    }
}

// ---------------------------------------------------------------------------

fn plain_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut out = String::new();
    for child in node.descendants() {
        if let NodeValue::Text(ref text) = child.data.borrow().value {
            out.push_str(text);
        }
    }
    out
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape the characters that always break LaTeX text mode. Backslashes,
/// braces, carets and tildes pass through: quiz authors write literal LaTeX
/// in their prose. Math spans were already lifted into their own nodes, so
/// any dollar still in a text node is a literal one (escaped currency).
fn escape_latex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '$' => out.push_str("\\$"),
            _ => out.push(ch),
        }
    }
    out
}
