use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::OutputFormat;
use crate::equations::{EquationOptions, LatexBackend};
use crate::feed::render_feed;
use crate::quiz;
use crate::template::{compose_html, compose_latex};
use crate::transcode::{Format, Transcoder};

pub struct WatchCommand {
    pub formats: Vec<OutputFormat>,
    pub output: Option<PathBuf>,
    pub preamble_override: Option<String>,
    pub user_preamble_override: Option<String>,
    pub multiple_inputs: bool,
    pub verbose: bool,
}

#[derive(Debug)]
pub enum WatchError {
    Io(std::io::Error),
    Notify(notify::Error),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Notify(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for WatchError {}

/// Watch quiz files and re-transcode on every change. Rebuild failures are
/// reported and swallowed so a transient syntax error never kills the loop.
pub fn watch_inputs(paths: &[PathBuf], command: &WatchCommand) -> Result<(), WatchError> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        Config::default(),
    )
    .map_err(WatchError::Notify)?;

    let mut tracked_files = HashMap::<PathBuf, PathBuf>::new();
    for path in paths {
        let watch_path = canonicalize(path);
        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(WatchError::Notify)?;
        tracked_files.insert(watch_path.clone(), path.clone());
        println!("watching {}", watch_path.display());
    }

    loop {
        let event = rx
            .recv()
            .map_err(|e| WatchError::Io(std::io::Error::other(e.to_string())))?;
        match event {
            Ok(Event {
                kind: EventKind::Modify(_) | EventKind::Create(_),
                paths,
                ..
            }) => {
                for changed in paths {
                    let canonical = canonicalize(&changed);
                    let Some(source_path) = tracked_files.get(&canonical) else {
                        continue;
                    };

                    if let Err(err) = rebuild_one(source_path, command) {
                        eprintln!("[watch] failed: {err}");
                    } else if command.verbose {
                        println!("[watch] updated {}", source_path.display());
                    }
                }
            }
            Ok(_) => {}
            Err(err) => return Err(WatchError::Notify(err)),
        }
    }
}

fn rebuild_one(path: &Path, command: &WatchCommand) -> Result<(), String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("{e}"))?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&source).map_err(|e| format!("{e}"))?;

    let user_preamble = command
        .user_preamble_override
        .clone()
        .or_else(|| quiz::user_preamble(&doc));
    let equation_options = EquationOptions {
        preamble_override: command.preamble_override.clone(),
        user_preamble: user_preamble.clone(),
    };

    let image_root = path.parent().unwrap_or(Path::new("."));
    let mut transcoder = Transcoder::new(&doc, image_root);
    let backend = LatexBackend::default();

    // Formats stay independent here too: a LaTeX failure must not keep the
    // HTML preview from refreshing.
    let mut failures = 0;
    for &format in &command.formats {
        let content = match format {
            OutputFormat::Html => transcoder
                .transcode(Format::Html, &equation_options, &backend)
                .map_err(|e| e.to_string())
                .and_then(|tree| compose_html(&tree).map_err(|e| e.to_string())),
            OutputFormat::Latex => transcoder
                .transcode(Format::Latex, &equation_options, &backend)
                .map_err(|e| e.to_string())
                .and_then(|tree| {
                    compose_latex(&tree, user_preamble.as_deref().unwrap_or(""))
                        .map_err(|e| e.to_string())
                }),
            OutputFormat::Feed => transcoder
                .transcode(Format::Html, &equation_options, &backend)
                .map_err(|e| e.to_string())
                .and_then(|tree| render_feed(&tree).map_err(|e| e.to_string())),
        };

        let out_path = resolve_output_path(
            path,
            command.output.as_deref(),
            command.multiple_inputs,
            format,
        );
        let written = content.and_then(|content| {
            if let Some(parent) = out_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| format!("{e}"))?;
            }
            std::fs::write(&out_path, &content).map_err(|e| format!("{e}"))
        });

        if let Err(err) = written {
            eprintln!("[watch] {}: {err}", out_path.display());
            failures += 1;
        }
    }

    if failures > 0 {
        Err(format!("{failures} output(s) failed"))
    } else {
        Ok(())
    }
}

fn resolve_output_path(
    input: &Path,
    output: Option<&Path>,
    multiple_inputs: bool,
    format: OutputFormat,
) -> PathBuf {
    match output {
        Some(base) if multiple_inputs => base
            .join(input.file_name().unwrap_or_default())
            .with_extension(format.extension()),
        Some(base) => base.with_extension(format.extension()),
        None => input.with_extension(format.extension()),
    }
}

fn canonicalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
