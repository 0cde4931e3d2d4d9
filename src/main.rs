use anyhow::{Context, Result};
use audio_features::audio::{list_sources, CaptureSource};
use audio_features::config::PipelineConfig;
use audio_features::monitor::{run_monitor, MonitorOptions};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "audio-features")]
#[command(author, version, about = "Live audio capture and spectral features")]
struct Args {
    /// Audio to capture
    #[arg(short, long, value_enum, default_value_t = CaptureSource::Microphone)]
    source: CaptureSource,

    /// Config file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target frame rate, overriding the config
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Print every frame as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_sources: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_sources {
        for device in list_sources()? {
            println!(
                "{:?}\t{}{}",
                device.kind,
                device.name,
                if device.is_default { " (default)" } else { "" }
            );
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.frames.target_fps = fps;
        config.validate()?;
    }

    let options = MonitorOptions {
        source: args.source,
        duration: args.duration.map(Duration::from_secs),
        json: args.json,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    let summary = runtime.block_on(run_monitor(config, options))?;

    log::info!("Captured {} frame(s)", summary.frames);
    Ok(())
}
