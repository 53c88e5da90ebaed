use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::Level;

use gcodepost::{
    apply_overrides, init_logging_with_level, process_file, Config, EnrichPrintProgress,
    ProcessorConfig, ProcessorRegistry, ScriptSettings,
};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("BUILD_DATE"),
    ")"
);

/// Post-process sliced G-code
#[derive(Parser, Debug)]
#[command(
    name = "gcodepost",
    author,
    version,
    long_version = LONG_VERSION,
    about = "Post-process sliced G-code: print progress, calibration towers, dry runs",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Script list (.json or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Script to run after the configured ones (repeatable)
    #[arg(short, long = "script")]
    scripts: Vec<String>,

    /// Option override: `script.key=value` for one script, or a bare
    /// `key=value` for every script that takes the key
    /// (e.g. -p temperature_calibration.start=215, -p show_on_display=false)
    #[arg(short, long = "param", value_parser = parse_key_val, number_of_values = 1)]
    params: Vec<(String, String)>,

    /// Output file; stdout when absent
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sliced G-code file
    input: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available scripts.
    List,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid KEY=VAL: no `=` found in '{}'.", s)),
    }
}

fn list_scripts(registry: &ProcessorRegistry) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    for name in registry.list_registered() {
        let processor = registry.create(name, &ProcessorConfig::new())?;
        writeln!(stdout, "{:<28} {}", name, processor.description())?;
        let keys = processor.option_keys();
        if !keys.is_empty() {
            writeln!(stdout, "{:<28} options: {}", "", keys.join(", "))?;
        }
    }
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::new(),
    };

    config
        .scripts
        .extend(cli.scripts.iter().map(ScriptSettings::new));

    if config.scripts.is_empty() {
        config.scripts.push(ScriptSettings::new(EnrichPrintProgress::NAME));
    }

    apply_overrides(&mut config, &cli.params)?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_logging_with_level(level)?;

    let registry = ProcessorRegistry::with_defaults();
    if let Some(Commands::List) = cli.command {
        return list_scripts(&registry);
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("No input file given (see --help)");
    };

    let config = build_config(&cli)?;
    let names: Vec<&str> = config.scripts.iter().map(|s| s.name.as_str()).collect();
    tracing::info!("Running scripts: {}", names.join(", "));

    let job = process_file(input, &config)?;

    match &cli.output {
        Some(path) => job
            .write_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(job.to_gcode().as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}
