use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use flatbridge_ast::Diagnostics;
use flatbridge_codegen::writer::write_changed;
use flatbridge_codegen::{
    BridgeGenerator, FsReader, FsWriter, GeneratedFiles, HeaderGenerator, MemoryFs, RunReport,
};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod diagnostic;
mod load;
mod report;

use config::{FlatbridgeConfig, CONFIG_FILE};
use diagnostic::{report_diagnostics, report_load_error};
use load::LoadError;

#[derive(Parser, Debug)]
#[command(
    name = "flatbridge",
    version,
    about = "Generate C ABI mirrors and bridge adapters from annotated C++ declarations"
)]
struct Cli {
    /// Enable verbose debug logging (or set FLATBRIDGE_LOG=debug)
    #[arg(short, long, global = true)]
    debug: bool,

    /// Project configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate C headers and bridge adapters
    Generate {
        /// Declaration files, in dependency order (default: [input] files)
        files: Vec<PathBuf>,
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Output root (default: [output] root, or the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write the JSON run report here (default: [output] report)
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the canonical text of every declaration as JSON
    Canonical {
        /// Declaration files, in dependency order (default: [input] files)
        files: Vec<PathBuf>,
    },
    /// Parse and link declarations without generating anything
    Check {
        /// Declaration files, in dependency order (default: [input] files)
        files: Vec<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    // FLATBRIDGE_LOG wins unless --debug is given; default is "warn".
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("FLATBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = FlatbridgeConfig::load_from_path(&cli.config).and_then(|config| {
        let config = config.unwrap_or_default();
        match cli.command {
            Command::Generate {
                files,
                dry_run,
                out,
                report,
            } => run_generate(&config, &files, dry_run, out.as_deref(), report.as_deref()),
            Command::Canonical { files } => run_canonical(&config, &files),
            Command::Check { files } => run_check(&config, &files),
        }
    });

    if let Err(err) = result {
        match err.downcast_ref::<LoadError>() {
            Some(load) => report_load_error(load),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

/// CLI files win over the configured input list.
fn input_files(config: &FlatbridgeConfig, files: &[PathBuf]) -> Vec<PathBuf> {
    if files.is_empty() {
        config.input.files.clone()
    } else {
        files.to_vec()
    }
}

fn run_generate(
    config: &FlatbridgeConfig,
    files: &[PathBuf],
    dry_run: bool,
    out: Option<&Path>,
    report_path: Option<&Path>,
) -> anyhow::Result<()> {
    let dialect = config.dialect();
    let sources = load::read_sources(&input_files(config, files))?;
    let mut diags = Diagnostics::new();
    let model = load::build_model(&sources, &dialect, &mut diags)?;

    let dirs = config.output.dirs();
    let root = out.unwrap_or(config.output.root());
    let reader = FsReader::new(root);
    debug!(root = %root.display(), dry_run, "generating");

    let mut generated = GeneratedFiles::new();
    for class in model.classes() {
        generated.record(&class.name, false);
    }
    if config.generate.headers() {
        let headers = HeaderGenerator::new(&dialect, &dirs)
            .generate(&model)
            .context("header generation failed")?;
        generated.merge(headers);
    }
    if config.generate.bridges() {
        let bridges = BridgeGenerator::new(&dialect, &dirs)
            .generate(&model, &reader, &mut diags)
            .context("bridge generation failed")?;
        generated.merge(bridges);
    }

    let summary = if dry_run {
        write_changed(&generated, &reader, &mut MemoryFs::new())?
    } else {
        write_changed(&generated, &reader, &mut FsWriter::new(root))?
    };
    info!(
        written = summary.written.len(),
        unchanged = summary.unchanged.len(),
        "generation finished"
    );

    let run = RunReport::new(
        generated.classes,
        summary,
        model.canonical_declarations(),
        &diags,
    );
    report_diagnostics(&diags);
    report::print_summary(&run, dry_run).context("failed to print summary")?;

    if let Some(path) = report_path.or(config.output.report.as_deref()) {
        report::write_report(path, &run)?;
        debug!(path = %path.display(), "wrote run report");
    }
    Ok(())
}

fn run_canonical(config: &FlatbridgeConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let sources = load::read_sources(&input_files(config, files))?;
    let mut diags = Diagnostics::new();
    let model = load::build_model(&sources, &config.dialect(), &mut diags)?;
    let json = serde_json::to_string_pretty(&model.canonical_declarations())
        .context("failed to serialize declarations")?;
    println!("{json}");
    Ok(())
}

fn run_check(config: &FlatbridgeConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let sources = load::read_sources(&input_files(config, files))?;
    let mut diags = Diagnostics::new();
    let model = load::build_model(&sources, &config.dialect(), &mut diags)?;
    report_diagnostics(&diags);
    println!(
        "ok: {} classes, {} global functions in {} files",
        model.classes().count(),
        model.functions().len(),
        sources.len()
    );
    Ok(())
}
