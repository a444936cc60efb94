//! Update request benchmark
//!
//! Encodes and applies a full update request; the server side is what runs
//! once per frame per session.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use audren_renderer::server::memory_pool::IdentityTranslator;
use audren_renderer::server::upsampler::UpsamplerManager;
use audren_renderer::types::{RendererConfiguration, SampleFormat, FINAL_MIX_ID};
use audren_renderer::{get_work_buffer_size, AudioRenderSystem, DspMixer, SessionResources, UpdateBuilder};

fn bench_update(c: &mut Criterion) {
    let config = RendererConfiguration {
        voice_count: 64,
        ..Default::default()
    };
    let resources = SessionResources {
        consumer: Arc::new(DspMixer::new(1)),
        upsamplers: UpsamplerManager::new(1),
        translator: Arc::new(IdentityTranslator),
    };
    let size = get_work_buffer_size(&config).unwrap();
    let system = AudioRenderSystem::initialize(config.clone(), vec![0u8; size], 0, resources).unwrap();

    let mut builder = UpdateBuilder::new(&config);
    builder.use_final_mix(2);
    builder.device_sink(0, &[0, 1]);
    for id in 0..64 {
        builder.play_voice(id, SampleFormat::PcmInt16, 1 + id % 8, FINAL_MIX_ID);
    }
    let mut reply = vec![0u8; builder.reply_size()];
    system.update(&builder.build().unwrap(), &mut reply).unwrap();
    builder.acknowledge();

    let request = builder.build().unwrap();
    c.bench_function("apply_update_64_voices", |b| {
        b.iter(|| {
            let written = system.update(black_box(&request), &mut reply).unwrap();
            black_box(written);
        });
    });

    c.bench_function("encode_update_64_voices", |b| {
        b.iter(|| black_box(builder.build().unwrap()));
    });
}

criterion_group!(benches, bench_update);
criterion_main!(benches);
