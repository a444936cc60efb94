//! Authoritative graph state of one session
//!
//! Everything here is sized once from the `RendererConfiguration` and then
//! updated in place; cross references are ids into these arrays.

pub mod effect;
pub mod memory_pool;
pub mod mix;
pub mod performance;
pub mod sink;
pub mod splitter;
pub mod upsampler;
pub mod voice;

use crate::behaviour::BehaviourInfo;
use crate::types::RendererConfiguration;

use effect::EffectState;
use memory_pool::MemoryPoolState;
use mix::MixContext;
use performance::PerformanceManager;
use sink::SinkState;
use splitter::SplitterContext;
use voice::VoiceContext;

#[derive(Debug)]
pub struct RendererState {
    pub voices: VoiceContext,
    pub mixes: MixContext,
    pub effects: Vec<EffectState>,
    pub sinks: Vec<SinkState>,
    pub splitters: SplitterContext,
    pub memory_pools: Vec<MemoryPoolState>,
    pub performance: Option<PerformanceManager>,
}

impl RendererState {
    pub fn new(config: &RendererConfiguration, behaviour: &BehaviourInfo) -> Self {
        Self {
            voices: VoiceContext::new(config.voice_count),
            mixes: MixContext::new(config.mix_count(), config.mix_buffer_count),
            effects: vec![EffectState::default(); config.effect_count as usize],
            sinks: (0..config.sink_count).map(SinkState::new).collect(),
            splitters: SplitterContext::new(
                behaviour,
                config.splitter_count,
                config.splitter_destination_count,
            ),
            memory_pools: vec![MemoryPoolState::default(); config.memory_pool_count() as usize],
            performance: PerformanceManager::new(config.performance_frame_count),
        }
    }
}
