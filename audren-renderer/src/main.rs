//! audren renderer daemon
//!
//! Opens the configured number of sessions against one shared DSP mixer and
//! drives each of them once per audio frame: encode an update request, apply
//! it, then submit the frame's command list.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audren_common::config::LoggingConfig;
use audren_common::timing::frame_duration;
use audren_renderer::server::memory_pool::IdentityTranslator;
use audren_renderer::server::upsampler::UpsamplerManager;
use audren_renderer::types::{SampleFormat, FINAL_MIX_ID};
use audren_renderer::{
    get_work_buffer_size, AudioRenderSystem, DspMixer, MixingConsumer, SessionResources, TomlConfig, UpdateBuilder,
};

/// Frames between statistics lines (one second at 5ms frames)
const STATS_INTERVAL_FRAMES: u64 = 200;

#[derive(Parser, Debug)]
#[command(name = "audren-renderer")]
#[command(about = "Audio renderer command scheduler")]
#[command(version)]
struct Args {
    /// Config file (defaults to AUDREN_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of sessions
    #[arg(long)]
    sessions: Option<u32>,

    /// Override the synthetic voices started per session
    #[arg(long)]
    voices: Option<u32>,

    /// Stop after this many frames instead of waiting for Ctrl+C
    #[arg(long)]
    frames: Option<u64>,
}

struct Session {
    system: AudioRenderSystem,
    builder: UpdateBuilder,
    reply: Vec<u8>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("audren_renderer={level},audren_common={level}", level = logging.level).into()
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let stderr_layer = logging.file.is_none().then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn open_session(config: &TomlConfig, session_id: u32, voices: u32, resources: SessionResources) -> Result<Session> {
    let renderer = &config.renderer;
    let work_buffer_size = get_work_buffer_size(renderer).context("Invalid renderer configuration")?;
    let system = AudioRenderSystem::initialize(renderer.clone(), vec![0u8; work_buffer_size], session_id, resources)
        .with_context(|| format!("Failed to initialize session {}", session_id))?;
    system.set_rendering_time_limit_percent(config.session.rendering_time_limit_percent);
    system.set_voice_drop_parameter(config.session.voice_drop_parameter);

    let mut builder = UpdateBuilder::new(renderer);
    let channels = renderer.device_channel_count.min(renderer.mix_buffer_count);
    builder.use_final_mix(channels);
    if renderer.sink_count > 0 {
        let inputs: Vec<u8> = (0..channels as u8).collect();
        builder.device_sink(0, &inputs);
    }
    for id in 0..voices.min(renderer.voice_count) {
        // spread the voices over four priority levels below the highest
        builder.play_voice(id, SampleFormat::PcmInt16, 1 + id % 4, FINAL_MIX_ID);
    }

    info!(
        "Session {} opened: {} voices, work buffer {} bytes",
        session_id,
        voices.min(renderer.voice_count),
        work_buffer_size
    );
    system.start();
    Ok(Session {
        system,
        reply: vec![0u8; builder.reply_size()],
        builder,
    })
}

fn run_frame(session: &mut Session) {
    let request = match session.builder.build() {
        Ok(request) => request,
        Err(e) => {
            warn!("Session {} request encoding failed: {}", session.system.session_id(), e);
            return;
        }
    };
    match session.system.update(&request, &mut session.reply) {
        Ok(written) => {
            debug!("Session {} update wrote {} bytes", session.system.session_id(), written);
            session.builder.acknowledge();
        }
        Err(e) => warn!("Session {} update rejected: {}", session.system.session_id(), e),
    }
    session.system.send_commands();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(sessions) = args.sessions {
        config.session.sessions = sessions;
    }
    if let Some(voices) = args.voices {
        config.session.voices = voices;
    }

    init_tracing(&config.logging)?;
    info!(
        "Starting audren-renderer {} ({}, {} build, {})",
        env!("CARGO_PKG_VERSION"),
        env!("AUDREN_GIT_HASH"),
        env!("AUDREN_BUILD_PROFILE"),
        env!("AUDREN_BUILD_TIMESTAMP")
    );

    let mixer = Arc::new(DspMixer::new(config.session.sessions as usize));
    let resources = SessionResources {
        consumer: Arc::clone(&mixer) as Arc<dyn MixingConsumer>,
        upsamplers: UpsamplerManager::new(config.session.upsampler_count),
        translator: Arc::new(IdentityTranslator),
    };

    let mut sessions = (0..config.session.sessions)
        .map(|id| open_session(&config, id, config.session.voices, resources.clone()))
        .collect::<Result<Vec<_>>>()?;
    drop(resources);

    let period = frame_duration(config.renderer.sample_rate, config.renderer.sample_count);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!("Rendering frames every {:?}", period);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut frame: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        for session in sessions.iter_mut() {
            run_frame(session);
        }
        frame += 1;

        if frame % STATS_INTERVAL_FRAMES == 0 {
            for session in &sessions {
                info!(
                    "Session {}: frame {}, {} voices dropped, dsp behind: {}",
                    session.system.session_id(),
                    session.system.elapsed_frame_count(),
                    session.system.voice_drop_count(),
                    session.system.is_dsp_running_behind()
                );
            }
            info!(
                "Mixer: {} frames executed, {} over deadline",
                mixer.executed_frames(),
                mixer.late_frames()
            );
        }

        if args.frames.is_some_and(|limit| frame >= limit) {
            info!("Frame limit reached");
            break;
        }
    }

    for session in &sessions {
        session.system.stop();
    }
    drop(sessions);

    match Arc::try_unwrap(mixer) {
        Ok(mixer) => mixer.shutdown(),
        Err(_) => warn!("Mixer still referenced at shutdown"),
    }
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
