//! Frame budget report
//!
//! Builds one session from the config file, generates a single frame with
//! the requested number of playing voices and prints where the estimated DSP
//! time goes.
//!
//! **Usage:**
//! ```bash
//! frame-budget [--config <file>] [--voices 24] [--percent 100]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audren_common::timing::{frame_load, ticks_to_duration};
use audren_renderer::server::memory_pool::IdentityTranslator;
use audren_renderer::server::upsampler::UpsamplerManager;
use audren_renderer::types::{SampleFormat, FINAL_MIX_ID};
use audren_renderer::{get_work_buffer_size, AudioRenderSystem, DspMixer, SessionResources, TomlConfig, UpdateBuilder};

#[derive(Parser, Debug)]
#[clap(name = "frame-budget")]
#[clap(about = "Report the estimated DSP cost of one rendered frame")]
struct Args {
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Voices playing in the frame (capped at the configured voice count)
    #[clap(long)]
    voices: Option<u32>,

    /// Rendering time limit percent
    #[clap(long, default_value = "100")]
    percent: u32,
}

#[derive(Default)]
struct Bucket {
    commands: usize,
    disabled: usize,
    ticks: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audren_renderer=warn,frame_budget=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let renderer = config.renderer.clone();
    let voices = args.voices.unwrap_or(renderer.voice_count).min(renderer.voice_count);

    let resources = SessionResources {
        consumer: Arc::new(DspMixer::new(1)),
        upsamplers: UpsamplerManager::new(config.session.upsampler_count),
        translator: Arc::new(IdentityTranslator),
    };
    let work_buffer_size = get_work_buffer_size(&renderer).context("Invalid renderer configuration")?;
    let system = AudioRenderSystem::initialize(renderer.clone(), vec![0u8; work_buffer_size], 0, resources)
        .context("Failed to initialize session")?;
    system.set_rendering_time_limit_percent(args.percent);
    system.start();

    let mut builder = UpdateBuilder::new(&renderer);
    let channels = renderer.device_channel_count.min(renderer.mix_buffer_count);
    builder.use_final_mix(channels);
    if renderer.sink_count > 0 {
        let inputs: Vec<u8> = (0..channels as u8).collect();
        builder.device_sink(0, &inputs);
    }
    for id in 0..voices {
        builder.play_voice(id, SampleFormat::PcmInt16, 1 + id % 4, FINAL_MIX_ID);
    }
    let request = builder.build().context("Failed to encode update")?;
    let mut reply = vec![0u8; builder.reply_size()];
    system.update(&request, &mut reply).context("Update rejected")?;

    let list = system.generate_command_list();
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    for command in list.iter() {
        let bucket = buckets.entry(format!("{:?}", command.node_id.kind())).or_default();
        bucket.commands += 1;
        if command.enabled {
            bucket.ticks += u64::from(command.estimated_processing_time);
        } else {
            bucket.disabled += 1;
        }
    }

    info!(
        "Work buffer {} bytes, work budget {} ticks ({:?})",
        work_buffer_size,
        system.max_allocated_time_for_dsp(),
        ticks_to_duration(system.max_allocated_time_for_dsp())
    );
    println!("{:<12} {:>8} {:>8} {:>10} {:>8}", "node", "commands", "disabled", "ticks", "load");
    for (kind, bucket) in &buckets {
        println!(
            "{:<12} {:>8} {:>8} {:>10} {:>7.1}%",
            kind,
            bucket.commands,
            bucket.disabled,
            bucket.ticks,
            frame_load(bucket.ticks, renderer.sample_rate, renderer.sample_count) * 100.0
        );
    }
    let total = list.enabled_estimated_time();
    println!(
        "{:<12} {:>8} {:>8} {:>10} {:>7.1}%",
        "total",
        list.len(),
        buckets.values().map(|b| b.disabled).sum::<usize>(),
        total,
        frame_load(total, renderer.sample_rate, renderer.sample_count) * 100.0
    );
    println!("voices dropped: {}", system.voice_drop_count());

    system.release_list(list);
    Ok(())
}
