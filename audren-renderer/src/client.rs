//! Client-side encoder for update requests
//!
//! Mirrors the layout decisions the state updater makes for a revision so
//! the daemon, tests and benches can drive a session without hand-packing
//! bytes.

use tracing::trace;

use crate::behaviour::{BehaviourInfo, FLAG_MEMORY_POOL_FORCE_MAPPING};
use crate::error::ResultCode;
use crate::parameter::effect::{
    ChannelMapping, EffectOutStatusV1, EffectOutStatusV2, EffectParameter, EffectParameterV1,
    EffectParameterV2, EffectSpecific, EffectType,
};
use crate::parameter::mix::{MixDirtyOnlyHeader, MixParameter};
use crate::parameter::sink::{
    DeviceSinkParameter, SinkOutStatus, SinkParameter, SinkSpecific, SinkType, DEVICE_NAME_SIZE,
};
use crate::parameter::splitter::{
    SplitterDestinationParameter, SplitterDestinationV1, SplitterDestinationV2, SplitterHeader,
    SplitterParameter,
};
use crate::parameter::voice::{
    VoiceChannelResourceParameter, VoiceOutStatus, VoiceParameter, VoiceParameterV1, VoiceParameterV2,
    WaveBufferParameter,
};
use crate::parameter::{
    BehaviourErrorInfoOutStatus, BehaviourParameter, MemoryPoolOutStatus, MemoryPoolParameter,
    PerformanceOutStatus, PerformanceParameter, RendererInfoOutStatus, SpanWriter, UpdateDataHeader,
    WireRecord, WireResult,
};
use crate::types::{
    PlayState, RendererConfiguration, SampleFormat, FINAL_MIX_ID, MIX_BUFFER_COUNT_MAX, TARGET_SAMPLE_RATE,
    UNUSED_MIX_ID, UNUSED_SPLITTER_ID, VOICE_CHANNEL_COUNT_MAX,
};

/// Guest address the synthetic wave buffers are placed at
const WAVE_BUFFER_BASE: u64 = 0x1000_0000;
const WAVE_BUFFER_SIZE: u64 = 0x1000;

/// Builds `UpdateDataHeader`-prefixed request blobs for one session
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    behaviour: BehaviourInfo,
    splitter_in_use: bool,
    pub flags: u64,
    pub memory_pools: Vec<MemoryPoolParameter>,
    pub voice_resources: Vec<VoiceChannelResourceParameter>,
    pub voices: Vec<VoiceParameter>,
    pub effects: Vec<EffectParameter>,
    pub splitters: Vec<SplitterParameter>,
    pub splitter_destinations: Vec<SplitterDestinationParameter>,
    pub mixes: Vec<MixParameter>,
    pub sinks: Vec<SinkParameter>,
    pub performance: PerformanceParameter,
}

impl UpdateBuilder {
    /// Empty request sized for `config`
    ///
    /// Force mapping is requested so voices can reference wave buffers
    /// without attaching a pool first.
    pub fn new(config: &RendererConfiguration) -> Self {
        let behaviour = BehaviourInfo::new(config.revision);
        let splitter_in_use =
            behaviour.is_splitter_supported() && config.splitter_count > 0 && config.splitter_destination_count > 0;

        let voices = (0..config.voice_count)
            .map(|id| VoiceParameter {
                id,
                play_state: PlayState::Stopped.to_raw(),
                pitch: 1.0,
                volume: 1.0,
                mix_id: UNUSED_MIX_ID,
                splitter_id: UNUSED_SPLITTER_ID,
                ..Default::default()
            })
            .collect();
        let voice_resources = (0..config.voice_count)
            .map(|id| VoiceChannelResourceParameter {
                id,
                ..Default::default()
            })
            .collect();
        let mixes = (0..config.mix_count())
            .map(|mix_id| MixParameter {
                mix_id,
                sample_rate: config.sample_rate,
                ..Default::default()
            })
            .collect();
        let (splitters, splitter_destinations) = if splitter_in_use {
            (
                (0..config.splitter_count)
                    .map(|id| SplitterParameter {
                        id,
                        sample_rate: config.sample_rate,
                        destination_ids: Vec::new(),
                    })
                    .collect(),
                (0..config.splitter_destination_count)
                    .map(|id| SplitterDestinationParameter {
                        id,
                        destination_mix_id: UNUSED_MIX_ID,
                        ..Default::default()
                    })
                    .collect(),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Self {
            behaviour,
            splitter_in_use,
            flags: FLAG_MEMORY_POOL_FORCE_MAPPING,
            memory_pools: vec![MemoryPoolParameter::default(); config.memory_pool_count() as usize],
            voice_resources,
            voices,
            effects: vec![EffectParameter::default(); config.effect_count as usize],
            splitters,
            splitter_destinations,
            mixes,
            sinks: vec![SinkParameter::default(); config.sink_count as usize],
            performance: PerformanceParameter::default(),
        }
    }

    pub fn revision(&self) -> u32 {
        self.behaviour.user_revision()
    }

    /// Mark the final mix used with `buffer_count` output channels
    pub fn use_final_mix(&mut self, buffer_count: u32) -> &mut MixParameter {
        self.use_mix(FINAL_MIX_ID, buffer_count, UNUSED_MIX_ID)
    }

    /// Mark a mix used, routed to `destination_mix_id` with identity volumes
    pub fn use_mix(&mut self, mix_id: u32, buffer_count: u32, destination_mix_id: u32) -> &mut MixParameter {
        let mix = &mut self.mixes[mix_id as usize];
        mix.is_used = true;
        mix.is_dirty = true;
        mix.buffer_count = buffer_count;
        mix.destination_mix_id = destination_mix_id;
        mix.destination_splitter_id = UNUSED_SPLITTER_ID;
        if destination_mix_id != UNUSED_MIX_ID {
            for channel in 0..buffer_count as usize {
                mix.volumes[channel][channel] = 1.0;
            }
        }
        mix
    }

    /// Start a mono voice on one looping wave buffer, feeding channel 0 of `mix_id`
    pub fn play_voice(&mut self, id: u32, format: SampleFormat, priority: u32, mix_id: u32) -> &mut VoiceParameter {
        let index = id as usize;
        let resource = &mut self.voice_resources[index];
        resource.is_used = true;
        resource.mix_volumes = [0.0; MIX_BUFFER_COUNT_MAX];
        resource.mix_volumes[0] = 1.0;

        let voice = &mut self.voices[index];
        voice.is_new = true;
        voice.in_use = true;
        voice.play_state = PlayState::Started.to_raw();
        voice.sample_format = format.to_raw();
        voice.sample_rate = TARGET_SAMPLE_RATE;
        voice.priority = priority;
        voice.sorting_order = id;
        voice.channel_count = 1;
        voice.mix_id = mix_id;
        voice.splitter_id = UNUSED_SPLITTER_ID;
        voice.channel_resource_ids[0] = id;
        voice.wave_buffer_count = 1;
        voice.wave_buffer_index = 0;
        voice.wave_buffers[0] = WaveBufferParameter {
            address: WAVE_BUFFER_BASE + u64::from(id) * WAVE_BUFFER_SIZE,
            size: WAVE_BUFFER_SIZE,
            start_sample_offset: 0,
            end_sample_offset: (WAVE_BUFFER_SIZE / 2) as u32,
            looping: true,
            ..Default::default()
        };
        voice
    }

    pub fn stop_voice(&mut self, id: u32) {
        self.voices[id as usize].play_state = PlayState::Stopped.to_raw();
    }

    /// Configure a device sink reading `inputs` from the final mix
    pub fn device_sink(&mut self, index: usize, inputs: &[u8]) -> &mut SinkParameter {
        let mut name = [0u8; DEVICE_NAME_SIZE];
        let label = b"MainAudioOut";
        name[..label.len()].copy_from_slice(label);

        let mut input = [0u8; VOICE_CHANNEL_COUNT_MAX];
        let count = inputs.len().min(input.len());
        input[..count].copy_from_slice(&inputs[..count]);

        let device = DeviceSinkParameter {
            name,
            input_count: count as u32,
            input,
            ..Default::default()
        };
        let sink = &mut self.sinks[index];
        sink.sink_type = SinkType::Device as u8;
        sink.is_used = true;
        sink.specific = SinkSpecific::Device(device).encode();
        sink
    }

    /// Place an effect of `effect_type` in `mix_id`
    pub fn set_effect(
        &mut self,
        index: usize,
        effect_type: EffectType,
        mix_id: u32,
        mapping: ChannelMapping,
        specific: EffectSpecific,
    ) -> &mut EffectParameter {
        let effect = &mut self.effects[index];
        effect.effect_type = effect_type as u8;
        effect.is_new = true;
        effect.is_enabled = true;
        effect.mix_id = mix_id;
        effect.processing_order = index as u32;
        effect.specific = specific.encode(&mapping);
        effect
    }

    /// Route a splitter to the given destination ids
    pub fn set_splitter(&mut self, id: u32, destination_ids: &[u32]) {
        if let Some(splitter) = self.splitters.get_mut(id as usize) {
            splitter.destination_ids = destination_ids.to_vec();
        }
    }

    pub fn set_splitter_destination(&mut self, id: u32, destination_mix_id: u32, volumes: &[f32]) {
        if let Some(destination) = self.splitter_destinations.get_mut(id as usize) {
            destination.is_used = true;
            destination.destination_mix_id = destination_mix_id;
            for (slot, volume) in destination.volumes.iter_mut().zip(volumes) {
                *slot = *volume;
            }
        }
    }

    /// Clear one-shot flags after a request has been applied
    pub fn acknowledge(&mut self) {
        for voice in &mut self.voices {
            voice.is_new = false;
        }
        for effect in &mut self.effects {
            effect.is_new = false;
        }
        for mix in &mut self.mixes {
            mix.is_dirty = false;
        }
    }

    fn voice_record_size(&self) -> usize {
        if self.behaviour.is_voice_parameter_v2_supported() {
            VoiceParameterV2::SIZE
        } else {
            VoiceParameterV1::SIZE
        }
    }

    fn effect_record_size(&self) -> usize {
        if self.behaviour.is_effect_info_v2_supported() {
            EffectParameterV2::SIZE
        } else {
            EffectParameterV1::SIZE
        }
    }

    fn splitter_blob_size(&self) -> usize {
        if !self.splitter_in_use {
            return 0;
        }
        let destination_size = if self.behaviour.is_splitter_biquad_supported() {
            SplitterDestinationV2::SIZE
        } else {
            SplitterDestinationV1::SIZE
        };
        SplitterHeader::SIZE
            + self.splitters.iter().map(SplitterParameter::encoded_size).sum::<usize>()
            + self.splitter_destinations.len() * destination_size
    }

    fn sent_mixes(&self) -> Vec<&MixParameter> {
        if self.behaviour.is_mix_dirty_only_update_supported() {
            self.mixes.iter().filter(|mix| mix.is_dirty).collect()
        } else {
            self.mixes.iter().collect()
        }
    }

    fn mixes_section_size(&self) -> usize {
        let records = self.sent_mixes().len() * MixParameter::SIZE;
        if self.behaviour.is_mix_dirty_only_update_supported() {
            MixDirtyOnlyHeader::SIZE + records
        } else {
            records
        }
    }

    /// Size of the reply the server writes for this request
    pub fn reply_size(&self) -> usize {
        let effect_status = if self.behaviour.is_effect_info_v2_supported() {
            EffectOutStatusV2::SIZE
        } else {
            EffectOutStatusV1::SIZE
        };
        let render_info = if self.behaviour.is_elapsed_frame_count_supported() {
            RendererInfoOutStatus::SIZE
        } else {
            0
        };
        UpdateDataHeader::SIZE
            + self.memory_pools.len() * MemoryPoolOutStatus::SIZE
            + self.voices.len() * VoiceOutStatus::SIZE
            + self.effects.len() * effect_status
            + self.sinks.len() * SinkOutStatus::SIZE
            + PerformanceOutStatus::SIZE
            + BehaviourErrorInfoOutStatus::SIZE
            + render_info
    }

    /// Encode the request
    pub fn build(&self) -> WireResult<Vec<u8>> {
        let header_size = |len: usize| u32::try_from(len).map_err(|_| ResultCode::InsufficientBuffer);

        let mut header = UpdateDataHeader {
            revision: self.behaviour.user_revision(),
            behaviour_size: header_size(BehaviourParameter::SIZE)?,
            memory_pools_size: header_size(self.memory_pools.len() * MemoryPoolParameter::SIZE)?,
            voices_size: header_size(self.voices.len() * self.voice_record_size())?,
            voice_resources_size: header_size(self.voice_resources.len() * VoiceChannelResourceParameter::SIZE)?,
            effects_size: header_size(self.effects.len() * self.effect_record_size())?,
            mixes_size: header_size(self.mixes_section_size())?,
            sinks_size: header_size(self.sinks.len() * SinkParameter::SIZE)?,
            performance_buffer_size: header_size(PerformanceParameter::SIZE)?,
            render_info_size: 0,
            total_size: 0,
        };
        let total = UpdateDataHeader::SIZE
            + [
                header.behaviour_size,
                header.memory_pools_size,
                header.voices_size,
                header.voice_resources_size,
                header.effects_size,
                header.mixes_size,
                header.sinks_size,
                header.performance_buffer_size,
            ]
            .iter()
            .map(|&size| size as usize)
            .sum::<usize>()
            + self.splitter_blob_size();
        header.total_size = header_size(total)?;

        let mut bytes = vec![0u8; total];
        let mut w = SpanWriter::new(&mut bytes);
        header.write(&mut w)?;
        BehaviourParameter {
            user_revision: self.behaviour.user_revision(),
            flags: self.flags,
        }
        .write(&mut w)?;
        for pool in &self.memory_pools {
            pool.write(&mut w)?;
        }
        for resource in &self.voice_resources {
            resource.write(&mut w)?;
        }
        let voice_v2 = self.behaviour.is_voice_parameter_v2_supported();
        for voice in &self.voices {
            if voice_v2 {
                VoiceParameterV2(*voice).write(&mut w)?;
            } else {
                VoiceParameterV1(*voice).write(&mut w)?;
            }
        }
        let effect_v2 = self.behaviour.is_effect_info_v2_supported();
        for effect in &self.effects {
            if effect_v2 {
                EffectParameterV2(*effect).write(&mut w)?;
            } else {
                EffectParameterV1(*effect).write(&mut w)?;
            }
        }
        if self.splitter_in_use {
            self.write_splitters(&mut w)?;
        }

        let mixes = self.sent_mixes();
        if self.behaviour.is_mix_dirty_only_update_supported() {
            MixDirtyOnlyHeader {
                magic: 0,
                mix_count: mixes.len() as u32,
            }
            .write(&mut w)?;
        }
        for mix in mixes {
            mix.write(&mut w)?;
        }
        for sink in &self.sinks {
            sink.write(&mut w)?;
        }
        self.performance.write(&mut w)?;

        trace!("Encoded update request: {} bytes", w.position());
        Ok(bytes)
    }

    fn write_splitters(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        SplitterHeader {
            splitter_count: self.splitters.len() as u32,
            destination_count: self.splitter_destinations.len() as u32,
            ..Default::default()
        }
        .write(w)?;
        for splitter in &self.splitters {
            splitter.write(w)?;
        }
        let v2 = self.behaviour.is_splitter_biquad_supported();
        for destination in &self.splitter_destinations {
            if v2 {
                SplitterDestinationV2(*destination).write(w)?;
            } else {
                SplitterDestinationV1(*destination).write(w)?;
            }
        }
        Ok(())
    }
}
