use anyhow::{Context, Result};
use clap::Parser;
use common::{PipelineEvent, RenderMode};
use engine::config::Config;
use engine::media::FileSink;
use engine::render::FrameBufferSurface;
use engine::shader::{PresetRegistry, RendererFactory};
use engine::source::TestPatternSource;
use engine::{CaptureCoordinator, CaptureSettings, EventBus, RenderPipeline, RenderPipelineOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "retrocast")]
#[command(about = "Handheld console capture with shader enhancement", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, env = "RETROCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many seconds (runs until Ctrl-C otherwise)
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Save a screenshot once the first frames are rendered
    #[arg(short, long)]
    screenshot: bool,

    /// Record a clip for the whole run
    #[arg(short, long)]
    record: bool,

    /// Force a rendering tier (gpu, raster-2d, raw)
    #[arg(short, long)]
    mode: Option<String>,
}

/// Delay before the screenshot so the tier has something on screen
const WARMUP: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.general.log_level))
        .init();

    log::info!("Starting retrocast v{}", env!("CARGO_PKG_VERSION"));
    log::info!("  General settings:");
    log::info!("    - Render scale: {}x", config.general.render_scale);
    log::info!("    - Preset: {}", config.general.preset);
    log::info!("    - Preferred mode: {}", config.general.preferred_mode);
    log::info!("  Recording settings:");
    log::info!("    - Frame rate: {} fps", config.recording.frame_rate);
    log::info!("    - Output: {}", config.recording.output_dir);
    log::info!(
        "  Health check: every {}ms, {} stalls to downgrade",
        config.health.check_interval_ms,
        config.health.max_consecutive_stalls
    );

    let forced_mode = match cli.mode.as_deref() {
        Some(name) => Some(
            RenderMode::from_str(name)
                .with_context(|| format!("Unknown render mode '{}' (expected gpu, raster-2d or raw)", name))?,
        ),
        None => None,
    };

    #[cfg(feature = "gpu")]
    match pollster::block_on(engine::gpu::probe()) {
        Some(adapter) => log::info!("GPU adapter: {}", adapter),
        None => log::info!("No GPU adapter found, shader tier will be skipped"),
    }

    #[cfg(not(feature = "gpu"))]
    log::info!("Built without the gpu feature, shader tier disabled");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;

    runtime.block_on(run(cli, config, forced_mode))
}

async fn run(cli: Cli, config: Config, forced_mode: Option<RenderMode>) -> Result<()> {
    let registry = PresetRegistry::with_config(&config.shader_preset);
    let preset = registry.resolve(&config.general.preset);
    log::info!("Using shader preset '{}' ({})", preset.id, preset.name);

    let factory: Arc<dyn RendererFactory> = {
        #[cfg(feature = "gpu")]
        {
            Arc::new(engine::gpu::WgpuRendererFactory {
                render_scale: config.general.render_scale,
                preset,
            })
        }
        #[cfg(not(feature = "gpu"))]
        {
            let _ = preset;
            Arc::new(engine::shader::NoRenderer)
        }
    };

    let events = EventBus::default();
    spawn_event_logger(&events);

    let source = Arc::new(TestPatternSource::new(60));
    let display = Arc::new(FrameBufferSurface::new());

    let mut options = RenderPipelineOptions::from_config(&config);
    if forced_mode.is_some() {
        options.preferred_mode = forced_mode;
    }

    let pipeline = RenderPipeline::new(source.clone(), display.clone(), factory, events, options);
    let output_dir = config.recording.output_path()?;
    let coordinator = CaptureCoordinator::new(
        pipeline.clone(),
        Arc::new(FileSink::new(&output_dir)),
        CaptureSettings::from_recording(&config.recording),
    );

    source.start();
    let mode = pipeline.start_stream().await;
    log::info!("Capture running in {} mode, saving to {}", mode, output_dir.display());

    if cli.record {
        coordinator.toggle_recording().await;
    }

    if cli.screenshot {
        tokio::time::sleep(WARMUP).await;
        coordinator.take_screenshot().await;
    }

    let deadline = async {
        match cli.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = deadline => {
            log::info!("Run duration elapsed");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            log::info!("Received Ctrl-C, shutting down...");
        }
    }

    coordinator.shutdown().await;
    pipeline.stop().await;
    source.stop();

    log::info!(
        "Shut down after {} source frames, {} presented",
        source.published(),
        display.presented()
    );
    Ok(())
}

/// Print every pipeline event as a JSON line at debug level
fn spawn_event_logger(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &PipelineEvent) {
    match serde_json::to_string(event) {
        Ok(json) => log::debug!("{}", json),
        Err(e) => log::warn!("Failed to serialize {} event: {}", event.name(), e),
    }
}
