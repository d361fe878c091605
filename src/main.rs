use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use quizmd::{
    OutputFormat,
    equations::{EquationOptions, LatexBackend},
    feed::render_feed,
    quiz,
    template::{compose_html, compose_latex},
    transcode::{Format, Transcoder},
    watch::{WatchCommand, watch_inputs},
};

#[derive(Debug, Parser)]
#[command(name = "quizmd")]
#[command(about = "YAML quiz transcoder: HTML preview, LaTeX exam, import feed")]
struct Cli {
    #[arg(help = "Input quiz files (YAML).")]
    inputs: Vec<PathBuf>,

    #[arg(
        short,
        long,
        help = "Output base path. Defaults to the input path; the format extension is appended."
    )]
    output: Option<PathBuf>,

    #[arg(short, long, default_value = "html", value_name = "format", value_parser = clap::builder::PossibleValuesParser::new(["html", "latex", "feed", "all"]))]
    format: String,

    #[arg(
        long = "preamble",
        help = "Path to a LaTeX preamble file replacing the stock equation preamble."
    )]
    preamble: Option<PathBuf>,

    #[arg(
        long = "user-preamble",
        help = "Path to an extra preamble file, overriding the quiz header's pre_latexpreamble."
    )]
    user_preamble: Option<PathBuf>,

    #[arg(short, long, help = "Watch input files and re-transcode on change.")]
    watch: bool,

    #[arg(short, long, default_value_t = false, help = "Verbose diagnostics.")]
    verbose: bool,
}

struct ProcessOptions<'a> {
    formats: &'a [OutputFormat],
    output: &'a Option<PathBuf>,
    preamble_override: Option<String>,
    user_preamble_override: Option<String>,
    verbose: bool,
    multiple_inputs: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("[quizmd] {error}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if cli.inputs.is_empty() {
        return Err("no input files given".to_string());
    }

    let multiple_inputs = cli.inputs.len() > 1;
    if multiple_inputs
        && let Some(output) = &cli.output
        && output.extension().is_some()
    {
        return Err("multiple input files require output directory path".to_string());
    }

    let formats = resolve_formats(&cli.format)?;
    let preamble_override = read_optional(cli.preamble.as_deref())?;
    let user_preamble_override = read_optional(cli.user_preamble.as_deref())?;

    if cli.watch {
        let command = WatchCommand {
            formats: formats.clone(),
            output: cli.output.clone(),
            preamble_override,
            user_preamble_override,
            multiple_inputs,
            verbose: cli.verbose,
        };
        return watch_inputs(&cli.inputs, &command).map_err(|e| format!("watch failed: {e}"));
    }

    let process_options = ProcessOptions {
        formats: &formats,
        output: &cli.output,
        preamble_override,
        user_preamble_override,
        verbose: cli.verbose,
        multiple_inputs,
    };

    cli.inputs
        .iter()
        .try_for_each(|input| process_one(input, &process_options))?;

    Ok(())
}

fn process_one(input: &Path, options: &ProcessOptions<'_>) -> Result<(), String> {
    let source = fs::read_to_string(input).map_err(|e| format!("read quiz failed: {e}"))?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&source).map_err(|e| format!("quiz parse failed: {e}"))?;

    if options.verbose
        && let Ok(stats) = quiz::stats(&doc)
    {
        println!(
            "{}: {} questions, {} marks",
            input.display(),
            stats.questions.len(),
            stats.total_marks
        );
    }

    let user_preamble = options
        .user_preamble_override
        .clone()
        .or_else(|| quiz::user_preamble(&doc));
    let equation_options = EquationOptions {
        preamble_override: options.preamble_override.clone(),
        user_preamble: user_preamble.clone(),
    };

    let image_root = input.parent().unwrap_or(Path::new("."));
    let mut transcoder = Transcoder::new(&doc, image_root);
    let backend = LatexBackend::default();

    // Each format is produced independently so one failure still leaves
    // the other outputs on disk.
    let mut failures = 0;
    for &format in options.formats {
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

        let out_path = resolve_output_path(input, options.output.as_deref(), options.multiple_inputs, format);
        let written = content.and_then(|content| {
            if let Some(parent) = out_path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).map_err(|e| format!("create output dir: {e}"))?;
            }
            fs::write(&out_path, &content).map_err(|e| format!("write output: {e}"))?;
            Ok(content.len())
        });

        match written {
            Ok(bytes) => {
                if options.verbose {
                    println!("written {} ({bytes} bytes)", out_path.display());
                }
            }
            Err(err) => {
                eprintln!("[quizmd] {}: {err}", out_path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        Err(format!("{failures} output(s) failed for {}", input.display()))
    } else {
        Ok(())
    }
}

fn resolve_formats(value: &str) -> Result<Vec<OutputFormat>, String> {
    if value == "all" {
        return Ok(vec![
            OutputFormat::Html,
            OutputFormat::Latex,
            OutputFormat::Feed,
        ]);
    }
    OutputFormat::try_from(value)
        .map(|f| vec![f])
        .map_err(|e| e.to_string())
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

fn read_optional(path: Option<&Path>) -> Result<Option<String>, String> {
    path.map(|p| fs::read_to_string(p).map_err(|e| format!("read {}: {e}", p.display())))
        .transpose()
}
