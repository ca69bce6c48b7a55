use anyhow::{Context, Result};
use bookreel::compose::Sidecar;
use bookreel::config::Config;
use bookreel::pipeline::{
    print_summary, render_episode_with_cancel, EpisodeManifest, PipelineOptions,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "bookreel")]
#[command(version, about = "Assemble narrated book-review videos")]
#[command(
    long_about = "Render a book-review episode from narration, images, external clips and infographics: Ken Burns slideshow, aligned subtitles, background music and section transitions."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render an episode described by a TOML manifest
    Render {
        /// Episode manifest
        manifest: PathBuf,

        /// Output video (overrides the manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip speech-to-text and time subtitles proportionally
        #[arg(long)]
        no_stt: bool,

        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print YouTube chapter lines from a section sidecar
    Chapters {
        /// `<video>.sections.json` written by `render`
        sidecar: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            // Second Ctrl+C: stop waiting for the current stage.
            std::process::exit(130);
        }
        warn!("Interrupt received, stopping after the current step (press Ctrl+C again to force)");
    })
    .context("Failed to install Ctrl+C handler")?;
    Ok(cancelled)
}

async fn run_render(
    manifest: PathBuf,
    output: Option<PathBuf>,
    no_stt: bool,
    quiet: bool,
) -> Result<()> {
    let manifest = EpisodeManifest::load(&manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;

    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    let output_path = output.clone().unwrap_or_else(|| manifest.output.clone());
    info!("Output:   {}", output_path.display());
    info!("Language: {}", manifest.language);
    info!("Parts:    {}", manifest.parts.len());
    info!(
        "Render:   {} @ {}fps, preset {}",
        config.render.resolution, config.render.fps, config.render.preset
    );

    let cancelled = install_cancel_handler()?;
    let options = PipelineOptions {
        output,
        use_stt: !no_stt,
        show_progress: !quiet,
    };

    let result = render_episode_with_cancel(&manifest, &config, options, cancelled)
        .await
        .context("Episode render failed")?;

    print_summary(&result);
    Ok(())
}

fn run_chapters(sidecar: PathBuf) -> Result<()> {
    let sidecar = Sidecar::load(&sidecar)
        .with_context(|| format!("Failed to read sidecar {}", sidecar.display()))?;
    for line in sidecar.chapters() {
        println!("{}", line);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Render {
            manifest,
            output,
            no_stt,
            quiet,
        } => run_render(manifest, output, no_stt, quiet).await,
        Command::Chapters { sidecar } => run_chapters(sidecar),
    }
}
