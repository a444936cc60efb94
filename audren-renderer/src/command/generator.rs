//! Graph-to-command compiler
//!
//! Walks the updated graph in dependency order and emits each node's
//! commands: voices (least important first), submixes in sorted order, the
//! final mix, then sinks. Voice channels render into scratch buffers placed
//! after the mix buffers and are mixed from there into their destinations.

use std::sync::Arc;

use tracing::{error, trace};

use super::{
    AuxiliaryCommand, CommandBuffer, CommandType, DataSourceCommand, EffectCommand, MixRampGroupedCommand,
    PerformanceCommandState, WaveBufferRef,
};
use crate::behaviour::BehaviourInfo;
use crate::parameter::effect::{EffectSpecific, EffectType};
use crate::server::effect::{EffectBuffers, EffectState};
use crate::server::memory_pool::MemoryPoolState;
use crate::server::mix::{MixContext, MixState};
use crate::server::performance::{PerformanceEntryType, PerformanceManager};
use crate::server::sink::{SinkKind, SinkState};
use crate::server::splitter::{SplitterContext, SplitterDestination};
use crate::server::upsampler::UpsamplerManager;
use crate::server::voice::{VoiceChannelResource, VoiceContext, VoiceState};
use crate::server::RendererState;
use crate::types::{
    NodeId, RendererConfiguration, SampleFormat, MAX_EFFECT_CHANNELS, MIX_BUFFER_COUNT_MAX,
    TARGET_SAMPLE_RATE, VOICE_CHANNEL_COUNT_MAX,
};

/// Mixes with more buffers than this get one grouped ramp instead of one per buffer
const MIX_RAMP_GROUPED_THRESHOLD: u32 = 6;

/// Front, center, LFE and rear weights of the stock surround-to-stereo fold
pub const DEFAULT_DOWNMIX_COEFFICIENTS: [f32; 4] = [1.0, 0.707, 0.251, 0.707];

pub struct CommandGenerator<'g, 'b> {
    buffer: &'g mut CommandBuffer<'b>,
    voices: &'g mut VoiceContext,
    mixes: &'g MixContext,
    effects: &'g mut [EffectState],
    sinks: &'g mut [SinkState],
    splitters: &'g mut SplitterContext,
    pools: &'g mut [MemoryPoolState],
    performance: Option<&'g mut PerformanceManager>,
    behaviour: &'g BehaviourInfo,
    config: &'g RendererConfiguration,
    upsamplers: &'g Arc<UpsamplerManager>,
    session_id: u32,
}

fn performance_start(
    buffer: &mut CommandBuffer<'_>,
    performance: Option<&mut PerformanceManager>,
    entry_type: PerformanceEntryType,
    node_id: NodeId,
) -> Option<u32> {
    let entry = performance?.next_entry(entry_type, node_id)?;
    buffer.generate_performance(PerformanceCommandState::Start, entry, node_id);
    Some(entry)
}

fn performance_end(buffer: &mut CommandBuffer<'_>, entry: Option<u32>, node_id: NodeId) {
    if let Some(entry) = entry {
        buffer.generate_performance(PerformanceCommandState::End, entry, node_id);
    }
}

/// Routed splitter destinations of one channel: `channel`, `channel + stride`, ...
fn channel_destinations<'s>(
    splitters: &'s SplitterContext,
    splitter_id: u32,
    channel: u32,
    stride: u32,
) -> impl Iterator<Item = &'s SplitterDestination> + 's {
    let count = splitters.destination_count(splitter_id);
    (channel as usize..count)
        .step_by(stride.max(1) as usize)
        .filter_map(move |index| splitters.destination(splitter_id, index))
        .filter(|destination| destination.is_routed())
}

/// Mix through a splitter destination, filtering when the destination has taps
#[allow(clippy::too_many_arguments)]
fn generate_splitter_mix(
    buffer: &mut CommandBuffer<'_>,
    filter_supported: bool,
    destination: &SplitterDestination,
    input: u16,
    output: u16,
    volume: f32,
    previous_volume: f32,
    node_id: NodeId,
) {
    let filters = destination.biquad_filters;
    if !filter_supported || !destination.has_enabled_filter() {
        buffer.generate_mix_ramp(input, output, volume, previous_volume, node_id);
        return;
    }
    let needs_init = [
        !destination.biquad_previously_enabled[0],
        !destination.biquad_previously_enabled[1],
    ];
    if filters[0].enable && filters[1].enable {
        buffer.generate_multi_tap_biquad_filter_and_mix(
            input,
            output,
            filters,
            volume,
            previous_volume,
            needs_init,
            node_id,
        );
    } else {
        let tap = usize::from(!filters[0].enable);
        buffer.generate_biquad_filter_and_mix(
            input,
            output,
            filters[tap],
            volume,
            previous_volume,
            needs_init[tap],
            node_id,
        );
    }
}

impl<'g, 'b> CommandGenerator<'g, 'b> {
    pub fn new(
        buffer: &'g mut CommandBuffer<'b>,
        state: &'g mut RendererState,
        behaviour: &'g BehaviourInfo,
        config: &'g RendererConfiguration,
        upsamplers: &'g Arc<UpsamplerManager>,
        session_id: u32,
    ) -> Self {
        let RendererState {
            voices,
            mixes,
            effects,
            sinks,
            splitters,
            memory_pools,
            performance,
        } = state;
        Self {
            buffer,
            voices,
            mixes,
            effects,
            sinks,
            splitters,
            pools: memory_pools,
            performance: performance.as_mut(),
            behaviour,
            config,
            upsamplers,
            session_id,
        }
    }

    /// Running estimate of everything generated so far
    pub fn estimated_processing_time(&self) -> u64 {
        self.buffer.estimated_processing_time()
    }

    pub fn generate_voices(&mut self) {
        for position in 0..self.voices.sorted().len() {
            let index = self.voices.sorted()[position] as usize;
            let voice = &mut self.voices.voices[index];
            if voice.should_skip() {
                continue;
            }
            voice.prepare_for_generation();

            if !voice.was_playing && !voice.sample_format.is_renderable() {
                error!("Voice {} has unsupported format {:?}", voice.id, voice.sample_format);
                continue;
            }

            for channel in 0..voice.channel_count {
                let scratch = (self.config.mix_buffer_count + channel) as u16;
                self.generate_voice_channel(index, channel, scratch);
            }
            self.voices.voices[index].finish_generation(self.config.sample_count);
        }
    }

    fn generate_voice_channel(&mut self, index: usize, channel: u32, scratch: u16) {
        let voice = &self.voices.voices[index];
        let node_id = voice.channel_node_id(channel);

        let entry = performance_start(
            self.buffer,
            self.performance.as_deref_mut(),
            PerformanceEntryType::Voice,
            node_id,
        );

        // depop state is always prepared so a later drop can fade the voice out
        if let Some(mix) = self.mixes.used_mix(voice.mix_id) {
            self.buffer
                .generate_depop_prepare(mix.buffer_offset, mix.buffer_count, node_id, voice.was_playing);
        } else if self.splitters.is_in_use() {
            for destination in channel_destinations(self.splitters, voice.splitter_id, channel, voice.channel_count) {
                if let Some(mix) = self.mixes.used_mix(destination.destination_mix_id) {
                    self.buffer
                        .generate_depop_prepare(mix.buffer_offset, mix.buffer_count, node_id, voice.was_playing);
                }
            }
        }

        let adpcm_extra_channel = voice.sample_format == SampleFormat::Adpcm && channel != 0;
        if !voice.was_playing && !adpcm_extra_channel {
            let version2 = self.behaviour.is_wave_buffer_v2_supported();
            if let Some(command_type) = CommandType::data_source(voice.sample_format, version2) {
                let mut wave_buffers = [WaveBufferRef::default(); 4];
                for (target, wave_buffer) in wave_buffers.iter_mut().zip(&voice.wave_buffers) {
                    *target = WaveBufferRef {
                        dsp_address: wave_buffer.address.reference(self.pools),
                        size: wave_buffer.address.size,
                        start_sample_offset: wave_buffer.start_sample_offset,
                        end_sample_offset: wave_buffer.end_sample_offset,
                        looping: wave_buffer.looping,
                        is_end_of_stream: wave_buffer.is_end_of_stream,
                    };
                }
                let source = DataSourceCommand {
                    voice_id: voice.id,
                    channel_index: channel,
                    channel_count: voice.channel_count,
                    output_buffer: scratch,
                    sample_rate: voice.sample_rate,
                    pitch: voice.pitch,
                    wave_buffer_index: voice.wave_buffer_index,
                    wave_buffers,
                };
                self.buffer.generate_data_source(command_type, source, node_id);
            }
        }

        performance_end(self.buffer, entry, node_id);

        if voice.was_playing || !voice.has_destination() {
            return;
        }

        Self::generate_voice_biquads(self.buffer, self.behaviour, voice, scratch, node_id);
        self.buffer
            .generate_volume_ramp(scratch, scratch, voice.volume, voice.previous_volume, node_id);

        let resource = self
            .voices
            .resources
            .get(voice.channel_resource_ids[channel as usize] as usize);
        if let Some(mix) = self.mixes.used_mix(voice.mix_id) {
            if let Some(resource) = resource {
                Self::generate_voice_mix(self.buffer, mix, resource, scratch, node_id);
            }
        } else if self.splitters.is_in_use() {
            let filter_supported = self.splitters.is_biquad_supported();
            for destination in channel_destinations(self.splitters, voice.splitter_id, channel, voice.channel_count) {
                let Some(mix) = self.mixes.used_mix(destination.destination_mix_id) else {
                    continue;
                };
                for i in 0..mix.buffer_count as usize {
                    let (volume, previous) = (destination.volumes[i], destination.previous_volumes[i]);
                    if volume == 0.0 && previous == 0.0 {
                        continue;
                    }
                    generate_splitter_mix(
                        self.buffer,
                        filter_supported,
                        destination,
                        scratch,
                        (mix.buffer_offset as usize + i) as u16,
                        volume,
                        previous,
                        node_id,
                    );
                }
            }
        }
    }

    fn generate_voice_biquads(
        buffer: &mut CommandBuffer<'_>,
        behaviour: &BehaviourInfo,
        voice: &VoiceState,
        scratch: u16,
        node_id: NodeId,
    ) {
        let filters = voice.biquad_filters;
        if filters[0].enable && filters[1].enable && behaviour.is_biquad_grouped_optimization_supported() {
            buffer.generate_multi_tap_biquad_filter(scratch, scratch, filters, voice.biquad_needs_init, node_id);
            return;
        }
        for (filter, needs_init) in filters.iter().zip(voice.biquad_needs_init) {
            if filter.enable {
                buffer.generate_biquad_filter(scratch, scratch, *filter, needs_init, node_id);
            }
        }
    }

    fn generate_voice_mix(
        buffer: &mut CommandBuffer<'_>,
        mix: &MixState,
        resource: &VoiceChannelResource,
        scratch: u16,
        node_id: NodeId,
    ) {
        let count = (mix.buffer_count as usize).min(MIX_BUFFER_COUNT_MAX);
        if mix.buffer_count > MIX_RAMP_GROUPED_THRESHOLD {
            let mut grouped = MixRampGroupedCommand {
                buffer_count: count as u32,
                ..Default::default()
            };
            for i in 0..count {
                grouped.inputs[i] = scratch;
                grouped.outputs[i] = (mix.buffer_offset as usize + i) as u16;
                grouped.volumes[i] = resource.mix[i];
                grouped.previous_volumes[i] = resource.previous_mix[i];
            }
            buffer.generate_mix_ramp_grouped(grouped, node_id);
            return;
        }
        for i in 0..count {
            let (volume, previous) = (resource.mix[i], resource.previous_mix[i]);
            if volume != 0.0 || previous != 0.0 {
                buffer.generate_mix_ramp(scratch, (mix.buffer_offset as usize + i) as u16, volume, previous, node_id);
            }
        }
    }

    fn generate_effects(&mut self, mix: &MixState) {
        let buffer_base = mix.buffer_offset as usize;
        let node_id = mix.node_id;
        for &effect_index in &mix.effect_processing_order {
            let Some(effect) = self.effects.get(effect_index as usize) else {
                continue;
            };
            if !effect.is_enabled || effect.should_skip {
                continue;
            }
            let channels = effect.channel_count();
            let input = |c: usize| (buffer_base + usize::from(effect.mapping.input[c])) as u16;
            let output = |c: usize| (buffer_base + usize::from(effect.mapping.output[c])) as u16;

            match (effect.effect_type, effect.specific) {
                (EffectType::BufferMix, EffectSpecific::BufferMix { volumes }) => {
                    for c in 0..channels {
                        if volumes[c] != 0.0 {
                            self.buffer.generate_mix(input(c), output(c), volumes[c], node_id);
                        }
                    }
                }
                (EffectType::AuxiliaryBuffer | EffectType::CaptureBuffer, EffectSpecific::Auxiliary { count_max, .. }) => {
                    let EffectBuffers::Auxiliary {
                        send_info,
                        send,
                        return_info,
                        return_,
                    } = effect.buffers
                    else {
                        continue;
                    };
                    let command_type = if effect.effect_type == EffectType::AuxiliaryBuffer {
                        CommandType::AuxiliaryBuffer
                    } else {
                        CommandType::CaptureBuffer
                    };
                    for c in 0..channels {
                        let aux = AuxiliaryCommand {
                            input: input(c),
                            output: output(c),
                            send_info: send_info.reference(self.pools),
                            send_buffer: send.reference(self.pools),
                            return_info: return_info.reference(self.pools),
                            return_buffer: return_.reference(self.pools),
                            count_max,
                        };
                        self.buffer.generate_auxiliary(command_type, aux, node_id);
                    }
                }
                (EffectType::BiquadFilter, EffectSpecific::BiquadFilter { filter }) => {
                    for c in 0..channels {
                        self.buffer
                            .generate_biquad_filter(input(c), output(c), filter, effect.needs_init, node_id);
                    }
                }
                (
                    EffectType::Delay
                    | EffectType::Reverb
                    | EffectType::Reverb3d
                    | EffectType::Limiter
                    | EffectType::Compressor,
                    _,
                ) => {
                    let command_type = match effect.effect_type {
                        EffectType::Delay => CommandType::Delay,
                        EffectType::Reverb => CommandType::Reverb,
                        EffectType::Reverb3d => CommandType::Reverb3d,
                        EffectType::Compressor => CommandType::Compressor,
                        _ if self.behaviour.is_limiter_v2_supported() => CommandType::LimiterVersion2,
                        _ => CommandType::LimiterVersion1,
                    };
                    let mut command = EffectCommand {
                        channel_count: effect.mapping.channel_count,
                        needs_init: effect.needs_init,
                        ..Default::default()
                    };
                    for c in 0..channels {
                        command.inputs[c] = input(c);
                        command.outputs[c] = output(c);
                    }
                    if let EffectBuffers::Work(work) = effect.buffers {
                        command.work_buffer = work.reference(self.pools);
                    }
                    self.buffer.generate_effect(command_type, command, node_id);
                }
                (effect_type, _) => trace!("No commands for {:?} effect", effect_type),
            }
        }
    }

    /// Mix a submix into its destination mix or splitter destinations
    fn generate_mix_destination(&mut self, mix: &MixState) {
        let node_id = mix.node_id;
        if mix.routes_to_mix() {
            let Some(destination) = self.mixes.used_mix(mix.destination_mix_id) else {
                return;
            };
            for i in 0..mix.buffer_count as usize {
                for j in 0..destination.buffer_count as usize {
                    let volume = mix.volume * mix.volumes[i][j];
                    if volume != 0.0 {
                        self.buffer.generate_mix(
                            (mix.buffer_offset as usize + i) as u16,
                            (destination.buffer_offset as usize + j) as u16,
                            volume,
                            node_id,
                        );
                    }
                }
            }
        } else if mix.routes_to_splitter() && self.splitters.is_in_use() {
            let filter_supported = self.splitters.is_biquad_supported();
            let count = self.splitters.destination_count(mix.destination_splitter_id);
            for index in 0..count {
                let Some(destination) = self.splitters.destination(mix.destination_splitter_id, index) else {
                    continue;
                };
                if !destination.is_routed() {
                    continue;
                }
                let Some(target) = self.mixes.used_mix(destination.destination_mix_id) else {
                    continue;
                };
                for i in 0..mix.buffer_count.min(target.buffer_count) as usize {
                    let volume = mix.volume * destination.volumes[i];
                    let previous = mix.volume * destination.previous_volumes[i];
                    if volume == 0.0 && previous == 0.0 {
                        continue;
                    }
                    generate_splitter_mix(
                        self.buffer,
                        filter_supported,
                        destination,
                        (mix.buffer_offset as usize + i) as u16,
                        (target.buffer_offset as usize + i) as u16,
                        volume,
                        previous,
                        node_id,
                    );
                }
            }
        }
    }

    pub fn generate_sub_mixes(&mut self) {
        let mixes = self.mixes;
        for &mix_id in mixes.sorted() {
            let mix = &mixes.mixes[mix_id as usize];
            if mix.is_final() {
                continue;
            }
            let entry = performance_start(
                self.buffer,
                self.performance.as_deref_mut(),
                PerformanceEntryType::SubMix,
                mix.node_id,
            );
            self.buffer
                .generate_depop_for_mix_buffers(mix.buffer_offset, mix.buffer_count, mix.node_id);
            self.generate_effects(mix);
            self.generate_mix_destination(mix);
            performance_end(self.buffer, entry, mix.node_id);
        }
    }

    pub fn generate_final_mix(&mut self) {
        let mixes = self.mixes;
        let mix = mixes.final_mix();
        if !mix.is_used {
            return;
        }
        let entry = performance_start(
            self.buffer,
            self.performance.as_deref_mut(),
            PerformanceEntryType::FinalMix,
            mix.node_id,
        );
        self.buffer
            .generate_depop_for_mix_buffers(mix.buffer_offset, mix.buffer_count, mix.node_id);
        self.generate_effects(mix);

        // unity gain never costs a command
        if mix.volume != 1.0 {
            for i in 0..mix.buffer_count {
                let buffer = (mix.buffer_offset + i) as u16;
                self.buffer.generate_volume(buffer, buffer, mix.volume, mix.node_id);
            }
        }
        performance_end(self.buffer, entry, mix.node_id);
    }

    pub fn generate_sinks(&mut self) {
        let final_offset = self.mixes.final_mix().buffer_offset as usize;
        let sample_rate = self.config.sample_rate;

        for sink in self.sinks.iter_mut() {
            if !sink.is_used {
                continue;
            }
            let node_id = sink.node_id;
            let entry = performance_start(
                self.buffer,
                self.performance.as_deref_mut(),
                PerformanceEntryType::Sink,
                node_id,
            );

            match &mut sink.kind {
                SinkKind::Device { param, upsampler } => {
                    let mut input_count = param.input_count.min(VOICE_CHANNEL_COUNT_MAX as u32);
                    let mut inputs = [0u16; MAX_EFFECT_CHANNELS];
                    for (target, source) in inputs.iter_mut().zip(param.input).take(input_count as usize) {
                        *target = (final_offset + usize::from(source)) as u16;
                    }

                    if sample_rate != TARGET_SAMPLE_RATE && upsampler.is_none() {
                        *upsampler = self.upsamplers.allocate();
                    }

                    let downmix =
                        param.downmix_enabled || (self.config.device_channel_count == 2 && input_count == 6);
                    if downmix {
                        let coefficients = if param.downmix_enabled {
                            param.downmix_coefficients
                        } else {
                            DEFAULT_DOWNMIX_COEFFICIENTS
                        };
                        self.buffer
                            .generate_downmix_surround_to_stereo(inputs, inputs, coefficients, node_id);
                        input_count = 2;
                    }

                    if let Some(handle) = upsampler {
                        self.buffer
                            .generate_upsample(inputs, input_count, handle.index() as u32, node_id);
                    }
                    self.buffer
                        .generate_device_sink(self.session_id, inputs, input_count, node_id);
                }
                SinkKind::CircularBuffer {
                    param,
                    buffer: ring,
                    write_offset,
                    ..
                } => {
                    let input_count = param.input_count.min(VOICE_CHANNEL_COUNT_MAX as u32);
                    let mut inputs = [0u16; MAX_EFFECT_CHANNELS];
                    for (target, source) in inputs.iter_mut().zip(param.input).take(input_count as usize) {
                        *target = (final_offset + usize::from(source)) as u16;
                    }
                    let address = ring.reference(self.pools);
                    self.buffer
                        .generate_circular_buffer_sink(inputs, input_count, address, param.size, *write_offset, node_id);
                }
                SinkKind::Invalid => {}
            }
            sink.advance_write_offset(self.config.sample_count);

            performance_end(self.buffer, entry, node_id);
        }
    }

    /// Commit the per-frame state that later frames ramp from
    pub fn finish(self) {
        for resource in self.voices.resources.iter_mut().filter(|r| r.is_used) {
            resource.finish_generation();
        }
        self.splitters.update_internal_state();
        for effect in self.effects.iter_mut() {
            effect.finish_generation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::CURRENT_REVISION;
    use crate::command::{create_estimator, CommandList, CommandPayload, CommandPool};
    use crate::parameter::sink::DeviceSinkParameter;
    use crate::types::{NodeIdType, PlayState};

    struct Fixture {
        config: RendererConfiguration,
        behaviour: BehaviourInfo,
        state: RendererState,
        upsamplers: Arc<UpsamplerManager>,
    }

    fn fixture(final_buffers: u32) -> Fixture {
        let config = RendererConfiguration::default();
        let behaviour = BehaviourInfo::new(CURRENT_REVISION);
        let mut state = RendererState::new(&config, &behaviour);
        let final_mix = &mut state.mixes.mixes[0];
        final_mix.is_used = true;
        final_mix.buffer_count = final_buffers;
        state.mixes.sort(&state.splitters).unwrap();
        state.mixes.assign_buffer_offsets().unwrap();
        Fixture {
            config,
            behaviour,
            state,
            upsamplers: UpsamplerManager::new(2),
        }
    }

    fn start_voice(state: &mut RendererState, id: usize) {
        let voice = &mut state.voices.voices[id];
        voice.in_use = true;
        voice.play_state = PlayState::Started;
        voice.sample_format = SampleFormat::PcmInt16;
        voice.sample_rate = 48_000;
        voice.channel_count = 1;
        voice.wave_buffer_count = 1;
        voice.mix_id = 0;
        voice.volume = 1.0;
        voice.channel_resource_ids[0] = id as u32;
        state.voices.resources[id].is_used = true;
        state.voices.resources[id].mix[0] = 1.0;
        state.voices.sort();
    }

    fn generate(fixture: &mut Fixture) -> CommandList {
        let estimator = create_estimator(5, fixture.config.sample_count).unwrap();
        let mut pool = CommandPool::empty();
        let mut buffer = CommandBuffer::new(
            CommandList::new(48_000, 240, fixture.config.total_buffer_count(), 64),
            &mut pool,
            estimator.as_ref(),
        );
        {
            let mut generator = CommandGenerator::new(
                &mut buffer,
                &mut fixture.state,
                &fixture.behaviour,
                &fixture.config,
                &fixture.upsamplers,
                1,
            );
            generator.generate_voices();
            generator.generate_sub_mixes();
            generator.generate_final_mix();
            generator.generate_sinks();
            generator.finish();
        }
        buffer.into_list()
    }

    fn enabled_types(list: &CommandList) -> Vec<CommandType> {
        list.iter().filter(|c| c.enabled).map(|c| c.command_type).collect()
    }

    #[test]
    fn test_voice_renders_into_final_mix() {
        let mut fixture = fixture(2);
        start_voice(&mut fixture.state, 0);
        let list = generate(&mut fixture);

        let first = &list.commands()[0];
        assert_eq!(first.command_type, CommandType::DepopPrepare);
        assert!(!first.enabled);

        let types = enabled_types(&list);
        assert!(types[0].is_data_source());
        assert_eq!(
            &types[1..],
            &[CommandType::VolumeRamp, CommandType::MixRamp, CommandType::DepopForMixBuffers]
        );

        let voice = &fixture.state.voices.voices[0];
        assert_eq!(voice.previous_volume, 1.0);
        assert_eq!(voice.played_sample_count, 240);
        assert_eq!(fixture.state.voices.resources[0].previous_mix[0], 1.0);
    }

    #[test]
    fn test_voice_commands_use_scratch_and_channel_node() {
        let mut fixture = fixture(2);
        start_voice(&mut fixture.state, 3);
        let list = generate(&mut fixture);

        let source = list.iter().find(|c| c.command_type.is_data_source()).unwrap();
        assert_eq!(source.node_id, NodeId::new(NodeIdType::Voice, 3, 0));
        match source.payload {
            CommandPayload::DataSource(source) => assert_eq!(source.output_buffer, 24),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_dropped_voice_is_skipped() {
        let mut fixture = fixture(2);
        start_voice(&mut fixture.state, 0);
        fixture.state.voices.voices[0].voice_drop_flag = true;
        let list = generate(&mut fixture);

        assert_eq!(enabled_types(&list), vec![CommandType::DepopForMixBuffers]);
        assert!(list.iter().all(|c| !c.node_id.is_voice()));
    }

    #[test]
    fn test_stopping_voice_only_depops() {
        let mut fixture = fixture(2);
        start_voice(&mut fixture.state, 0);
        let voice = &mut fixture.state.voices.voices[0];
        voice.play_state = PlayState::Stopped;
        voice.was_playing = true;
        let list = generate(&mut fixture);

        let depop = &list.commands()[0];
        assert_eq!(depop.command_type, CommandType::DepopPrepare);
        assert!(depop.enabled);
        assert!(list.iter().all(|c| !c.command_type.is_data_source()));
        assert_eq!(fixture.state.voices.voices[0].previous_volume, 0.0);
        assert!(!fixture.state.voices.voices[0].was_playing);
    }

    #[test]
    fn test_final_mix_volume_only_when_not_unity() {
        let mut fixture = fixture(2);
        let list = generate(&mut fixture);
        assert!(list.iter().all(|c| c.command_type != CommandType::Volume));

        fixture.state.mixes.mixes[0].volume = 0.5;
        let list = generate(&mut fixture);
        let volumes = list.iter().filter(|c| c.command_type == CommandType::Volume).count();
        assert_eq!(volumes, 2);
    }

    #[test]
    fn test_surround_sink_downmixes_to_stereo_device() {
        let mut fixture = fixture(6);
        let sink = &mut fixture.state.sinks[0];
        sink.is_used = true;
        sink.kind = SinkKind::Device {
            param: DeviceSinkParameter {
                input_count: 6,
                input: [0, 1, 2, 3, 4, 5],
                ..Default::default()
            },
            upsampler: None,
        };
        let list = generate(&mut fixture);

        let sink_commands: Vec<_> = list
            .iter()
            .filter(|c| c.node_id.kind() == NodeIdType::Sink)
            .collect();
        assert_eq!(sink_commands.len(), 2);
        match sink_commands[0].payload {
            CommandPayload::DownMixSurroundToStereo { coefficients, .. } => {
                assert_eq!(coefficients, DEFAULT_DOWNMIX_COEFFICIENTS)
            }
            other => panic!("unexpected payload {:?}", other),
        }
        match sink_commands[1].payload {
            CommandPayload::DeviceSink {
                session_id, input_count, ..
            } => {
                assert_eq!(session_id, 1);
                assert_eq!(input_count, 2);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(fixture.upsamplers.in_use(), 0);
    }

    #[test]
    fn test_low_rate_session_holds_an_upsampler() {
        let mut fixture = fixture(2);
        fixture.config.sample_rate = 32_000;
        let sink = &mut fixture.state.sinks[0];
        sink.is_used = true;
        sink.kind = SinkKind::Device {
            param: DeviceSinkParameter {
                input_count: 2,
                input: [0, 1, 0, 0, 0, 0],
                ..Default::default()
            },
            upsampler: None,
        };
        let list = generate(&mut fixture);
        assert!(list.iter().any(|c| c.command_type == CommandType::Upsample));
        assert_eq!(fixture.upsamplers.in_use(), 1);

        generate(&mut fixture);
        assert_eq!(fixture.upsamplers.in_use(), 1);
    }
}
