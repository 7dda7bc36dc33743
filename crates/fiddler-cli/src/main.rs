//! Fiddler CLI
//!
//! Renders, compiles and runs Skia fiddles in a sandbox. The executed
//! program's stdout is this tool's stdout; logs and diagnostics go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fiddler::{
    Artifacts, Config, DrawOptions, EXAMPLE_CONFIG, OutputMode, PipelineError, Runner,
    Submission, SubmissionName, Synthesizer, ZeroDimension,
};
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fiddler")]
#[command(about = "Compile and run Skia fiddles in a sandbox")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: fiddler.toml)
        #[arg(short, long, default_value = "fiddler.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Render a code fragment into a source file without compiling it
    Synthesize(SubmissionArgs),

    /// Compile and run an already rendered source file
    Run {
        /// Source file; its name without extension names the submission
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
    },

    /// Render, compile and run a code fragment
    Fiddle(SubmissionArgs),

    /// Show the effective configuration
    ShowConfig,
}

#[derive(Args)]
struct SubmissionArgs {
    /// File containing the code fragment
    #[arg(value_name = "CODE")]
    code: PathBuf,

    /// Submission name (default: the code file name without extension)
    #[arg(short, long)]
    name: Option<String>,

    #[command(flatten)]
    draw: DrawArgs,
}

#[derive(Args)]
struct DrawArgs {
    /// Canvas width in pixels
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,

    /// Disable the raster backend
    #[arg(long)]
    no_raster: bool,

    /// Enable the GPU backend
    #[arg(long)]
    gpu: bool,

    /// Enable the PDF backend
    #[arg(long)]
    pdf: bool,

    /// Input image source
    #[arg(long, default_value = "")]
    source: String,
}

impl TryFrom<DrawArgs> for DrawOptions {
    type Error = ZeroDimension;

    fn try_from(args: DrawArgs) -> Result<Self, Self::Error> {
        Self {
            raster: !args.no_raster,
            gpu: args.gpu,
            pdf: args.pdf,
            source: args.source,
            ..Self::default()
        }
        .with_dimensions(args.width, args.height)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // stdout carries the fiddle's output, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    let outcome = match cli.command {
        Commands::Init { output, force } => return init_config(&output, force).await,
        Commands::ShowConfig => {
            show_config(&config);
            return Ok(());
        }
        Commands::Synthesize(args) => return synthesize(&config, args).await,
        Commands::Run { source } => run_source(config, &source).await?,
        Commands::Fiddle(args) => run_fiddle(config, args).await?,
    };

    // Single exit point for failed submissions: print the diagnostic buffer
    // and exit non-zero
    if let Err(err) = outcome {
        error!(%err, "submission failed");
        eprintln!("{}", err.diagnostic());
        std::process::exit(1);
    }

    Ok(())
}

fn submission(args: SubmissionArgs, code: String) -> Result<Submission> {
    let name = match args.name {
        Some(name) => SubmissionName::new(name),
        None => SubmissionName::from_source_path(&args.code),
    }
    .context("invalid submission name")?;

    let options = DrawOptions::try_from(args.draw).context("invalid draw options")?;
    Ok(Submission::new(name, code).with_options(options))
}

async fn read_code(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read code file '{}'", path.display()))
}

async fn synthesize(config: &Config, args: SubmissionArgs) -> Result<()> {
    let code = read_code(&args.code).await?;
    let submission = submission(args, code)?;
    let synthesizer = Synthesizer::from_config(config)
        .await
        .context("failed to load source template")?;

    let path = synthesizer
        .write(&submission)
        .await
        .context("failed to write source file")?;

    println!("{}", path.display());
    Ok(())
}

async fn run_source(
    config: Config,
    source: &Path,
) -> Result<std::result::Result<(), PipelineError>> {
    let artifacts = Artifacts::for_source(source, &config).context("invalid source file")?;

    info!(name = %artifacts.name(), source = %source.display(), "running source");

    let runner = Runner::new(config);
    Ok(runner
        .compile_and_run(&artifacts, OutputMode::Inherit)
        .await
        .map(|result| {
            debug!(status = %result.status, "execution succeeded");
        }))
}

async fn run_fiddle(
    config: Config,
    args: SubmissionArgs,
) -> Result<std::result::Result<(), PipelineError>> {
    let code = read_code(&args.code).await?;
    let submission = submission(args, code)?;

    info!(name = %submission.name, "running fiddle");

    let synthesizer = Synthesizer::from_config(&config)
        .await
        .context("failed to load source template")?;
    let runner = Runner::new(config);
    Ok(runner
        .run_submission(&synthesizer, &submission, OutputMode::Inherit)
        .await
        .map(|result| {
            debug!(status = %result.status, "execution succeeded");
        }))
}

fn show_config(config: &Config) {
    println!("Sandbox mode: {:?}", config.sandbox.mode);
    if let Some(ref chroot) = config.sandbox.chroot {
        println!("  Chroot: {chroot}");
    }
    println!();
    println!("Resource limits:");
    println!("  CPU time limit: {} s", config.limits.cpu_time_limit);
    println!("  Memory limit: {} bytes", config.limits.memory_limit);
    println!();
    println!("Paths:");
    println!("  Sources: {}", config.paths.source_dir.display());
    println!("  Binaries: {}", config.paths.binary_dir.display());
    println!("  Library: {}", config.paths.library_dir.display());
    println!("  Skia: {}", config.paths.skia_dir.display());
    println!("  Wrapper: {}", config.paths.wrapper.display());
    println!();
    println!("Compiler: {} --std={}", config.compiler.program, config.compiler.standard);
    println!("Retention: {:?}", config.retention);
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
