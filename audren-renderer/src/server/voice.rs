//! Voice state and the priority-ordered voice context

use tracing::trace;

use super::memory_pool::{AddressInfo, MemoryPoolState, PoolMapper};
use crate::behaviour::BehaviourInfo;
use crate::parameter::voice::{VoiceChannelResourceParameter, VoiceOutStatus, VoiceParameter};
use crate::types::{
    BiquadFilterParameter, NodeId, NodeIdType, PlayState, SampleFormat, MIX_BUFFER_COUNT_MAX,
    UNUSED_MIX_ID, UNUSED_SPLITTER_ID, VOICE_BIQUAD_FILTER_COUNT, VOICE_CHANNEL_COUNT_MAX,
    VOICE_HIGHEST_PRIORITY, VOICE_WAVE_BUFFER_COUNT,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaveBuffer {
    pub address: AddressInfo,
    pub start_sample_offset: u32,
    pub end_sample_offset: u32,
    pub looping: bool,
    pub is_end_of_stream: bool,
    /// Already resolved against the pools
    pub is_sent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceState {
    pub id: u32,
    pub node_id: NodeId,
    pub in_use: bool,
    pub play_state: PlayState,
    /// Stopped since the last frame; the next frame renders a depop instead of data
    pub was_playing: bool,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    pub priority: u32,
    pub sorting_order: u32,
    pub channel_count: u32,
    pub pitch: f32,
    pub volume: f32,
    pub previous_volume: f32,
    pub biquad_filters: [BiquadFilterParameter; VOICE_BIQUAD_FILTER_COUNT],
    pub biquad_needs_init: [bool; VOICE_BIQUAD_FILTER_COUNT],
    pub wave_buffer_count: u32,
    pub wave_buffer_index: u32,
    pub flush_wave_buffer_count: u32,
    pub wave_buffers: [WaveBuffer; VOICE_WAVE_BUFFER_COUNT],
    pub mix_id: u32,
    pub splitter_id: u32,
    pub channel_resource_ids: [u32; VOICE_CHANNEL_COUNT_MAX],
    /// Set by admission control; cleared only when the client re-creates the voice
    pub voice_drop_flag: bool,
    pub played_sample_count: u64,
    pub played_wave_buffers_count: u32,
}

impl VoiceState {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            node_id: NodeId::new(NodeIdType::Voice, id, 0),
            in_use: false,
            play_state: PlayState::Stopped,
            was_playing: false,
            sample_format: SampleFormat::Invalid,
            sample_rate: 0,
            priority: 0,
            sorting_order: 0,
            channel_count: 0,
            pitch: 1.0,
            volume: 0.0,
            previous_volume: 0.0,
            biquad_filters: Default::default(),
            biquad_needs_init: [true; VOICE_BIQUAD_FILTER_COUNT],
            wave_buffer_count: 0,
            wave_buffer_index: 0,
            flush_wave_buffer_count: 0,
            wave_buffers: Default::default(),
            mix_id: UNUSED_MIX_ID,
            splitter_id: UNUSED_SPLITTER_ID,
            channel_resource_ids: [0; VOICE_CHANNEL_COUNT_MAX],
            voice_drop_flag: false,
            played_sample_count: 0,
            played_wave_buffers_count: 0,
        }
    }

    /// Node id of one channel of this voice
    pub fn channel_node_id(&self, channel: u32) -> NodeId {
        NodeId::new(NodeIdType::Voice, self.id, channel)
    }

    pub fn is_highest_priority(&self) -> bool {
        self.priority == VOICE_HIGHEST_PRIORITY
    }

    pub fn has_destination(&self) -> bool {
        self.mix_id != UNUSED_MIX_ID || self.splitter_id != UNUSED_SPLITTER_ID
    }

    pub fn update(
        &mut self,
        param: &VoiceParameter,
        mapper: &PoolMapper,
        behaviour: &mut BehaviourInfo,
        pools: &[MemoryPoolState],
    ) {
        if param.is_new {
            *self = VoiceState::new(self.id);
        }

        self.in_use = param.in_use;
        self.update_play_state(PlayState::from_raw(param.play_state));
        self.sample_format = SampleFormat::from_raw(param.sample_format);
        self.sample_rate = param.sample_rate;
        self.priority = param.priority;
        self.sorting_order = param.sorting_order;
        self.channel_count = param.channel_count.min(VOICE_CHANNEL_COUNT_MAX as u32);
        self.pitch = param.pitch;
        self.volume = param.volume;
        self.biquad_filters = param.biquad_filters;
        self.wave_buffer_count = param.wave_buffer_count;
        self.wave_buffer_index = param.wave_buffer_index;
        self.mix_id = param.mix_id;
        self.splitter_id = param.splitter_id;
        self.channel_resource_ids = param.channel_resource_ids;
        self.flush_wave_buffer_count += u32::from(param.flush_wave_buffer_count);

        for (slot, wave_buffer) in self.wave_buffers.iter_mut().zip(&param.wave_buffers) {
            if wave_buffer.address == 0 {
                *slot = WaveBuffer::default();
                continue;
            }
            let remap = param.is_new
                || !slot.is_sent
                || slot.address.cpu_address != wave_buffer.address
                || slot.address.size != wave_buffer.size;
            if remap {
                slot.address = mapper.attach_buffer(behaviour, pools, wave_buffer.address, wave_buffer.size);
                slot.is_sent = true;
            }
            slot.start_sample_offset = wave_buffer.start_sample_offset;
            slot.end_sample_offset = wave_buffer.end_sample_offset;
            slot.looping = wave_buffer.looping;
            slot.is_end_of_stream = wave_buffer.is_end_of_stream;
        }
    }

    fn update_play_state(&mut self, requested: PlayState) {
        match requested {
            PlayState::Started => self.was_playing = false,
            PlayState::Stopped | PlayState::Paused => {
                if self.play_state == PlayState::Started {
                    self.was_playing = true;
                }
            }
        }
        self.play_state = requested;
    }

    /// Whether the voice contributes nothing this frame
    pub fn should_skip(&self) -> bool {
        if !self.in_use || self.voice_drop_flag {
            return true;
        }
        let rendering = self.play_state == PlayState::Started && self.wave_buffer_count > 0;
        !rendering && !self.was_playing
    }

    /// Apply pending wave buffer flushes ahead of generation
    pub fn prepare_for_generation(&mut self) {
        if self.flush_wave_buffer_count == 0 {
            return;
        }
        let flushed = self.flush_wave_buffer_count.min(self.wave_buffer_count);
        self.wave_buffer_index = (self.wave_buffer_index + flushed) % VOICE_WAVE_BUFFER_COUNT as u32;
        self.wave_buffer_count -= flushed;
        self.played_wave_buffers_count += flushed;
        self.flush_wave_buffer_count = 0;
        trace!("Voice {} flushed {} wave buffers", self.id, flushed);
    }

    /// Roll per-frame state forward once this frame's commands exist
    pub fn finish_generation(&mut self, sample_count: u32) {
        for (needs_init, filter) in self.biquad_needs_init.iter_mut().zip(&self.biquad_filters) {
            *needs_init = !filter.enable;
        }
        if self.was_playing {
            self.previous_volume = 0.0;
        } else {
            self.previous_volume = self.volume;
            self.played_sample_count += u64::from(sample_count);
        }
        self.was_playing = false;
    }

    pub fn out_status(&self) -> VoiceOutStatus {
        VoiceOutStatus {
            played_sample_count: self.played_sample_count,
            played_wave_buffers_count: self.played_wave_buffers_count,
            voice_drop_flag: self.voice_drop_flag,
        }
    }
}

/// Per-channel destination volumes, shared by voices via `channel_resource_ids`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceChannelResource {
    pub id: u32,
    pub mix: [f32; MIX_BUFFER_COUNT_MAX],
    pub previous_mix: [f32; MIX_BUFFER_COUNT_MAX],
    pub is_used: bool,
}

impl VoiceChannelResource {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            mix: [0.0; MIX_BUFFER_COUNT_MAX],
            previous_mix: [0.0; MIX_BUFFER_COUNT_MAX],
            is_used: false,
        }
    }

    pub fn update(&mut self, param: &VoiceChannelResourceParameter) {
        self.id = param.id;
        self.mix = param.mix_volumes;
        self.is_used = param.is_used;
    }

    pub fn finish_generation(&mut self) {
        self.previous_mix = self.mix;
    }
}

#[derive(Debug)]
pub struct VoiceContext {
    pub voices: Vec<VoiceState>,
    pub resources: Vec<VoiceChannelResource>,
    sorted: Vec<u32>,
}

impl VoiceContext {
    pub fn new(voice_count: u32) -> Self {
        Self {
            voices: (0..voice_count).map(VoiceState::new).collect(),
            resources: (0..voice_count).map(VoiceChannelResource::new).collect(),
            sorted: Vec::with_capacity(voice_count as usize),
        }
    }

    pub fn clear_in_use(&mut self) {
        for voice in &mut self.voices {
            voice.in_use = false;
        }
    }

    /// Order in-use voices for generation: least important first
    ///
    /// Priority values grow as importance falls, so the largest value comes
    /// first; ties keep the client's sorting order, then index order.
    pub fn sort(&mut self) {
        self.sorted.clear();
        self.sorted
            .extend(self.voices.iter().filter(|v| v.in_use).map(|v| v.id));
        let voices = &self.voices;
        self.sorted.sort_by(|&a, &b| {
            let (a, b) = (&voices[a as usize], &voices[b as usize]);
            b.priority
                .cmp(&a.priority)
                .then(a.sorting_order.cmp(&b.sorting_order))
        });
    }

    pub fn sorted(&self) -> &[u32] {
        &self.sorted
    }

    /// Voice owning a voice-channel node id
    pub fn voice_for_node_mut(&mut self, node_id: NodeId) -> Option<&mut VoiceState> {
        if !node_id.is_voice() {
            return None;
        }
        self.voices.get_mut(node_id.base() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_use(context: &mut VoiceContext, id: usize, priority: u32, sorting_order: u32) {
        let voice = &mut context.voices[id];
        voice.in_use = true;
        voice.priority = priority;
        voice.sorting_order = sorting_order;
    }

    #[test]
    fn test_sort_least_important_first() {
        let mut context = VoiceContext::new(5);
        in_use(&mut context, 0, 0, 0);
        in_use(&mut context, 1, 200, 3);
        in_use(&mut context, 2, 200, 1);
        in_use(&mut context, 4, 50, 0);
        context.sort();
        assert_eq!(context.sorted(), &[2, 1, 4, 0]);
    }

    #[test]
    fn test_stop_marks_was_playing_once() {
        let mut voice = VoiceState::new(0);
        voice.in_use = true;
        voice.wave_buffer_count = 1;
        voice.update_play_state(PlayState::Started);
        assert!(!voice.should_skip());

        voice.update_play_state(PlayState::Stopped);
        assert!(voice.was_playing);
        assert!(!voice.should_skip());

        voice.volume = 0.5;
        voice.finish_generation(240);
        assert!(!voice.was_playing);
        assert_eq!(voice.previous_volume, 0.0);
        assert!(voice.should_skip());
    }

    #[test]
    fn test_finish_generation_advances_counters() {
        let mut voice = VoiceState::new(3);
        voice.volume = 0.8;
        voice.biquad_filters[1].enable = true;
        voice.finish_generation(240);
        voice.finish_generation(240);
        assert_eq!(voice.played_sample_count, 480);
        assert_eq!(voice.previous_volume, 0.8);
        assert_eq!(voice.biquad_needs_init, [true, false]);
    }

    #[test]
    fn test_flush_consumes_wave_buffers() {
        let mut voice = VoiceState::new(0);
        voice.wave_buffer_count = 3;
        voice.wave_buffer_index = 3;
        voice.flush_wave_buffer_count = 2;
        voice.prepare_for_generation();
        assert_eq!(voice.wave_buffer_index, 1);
        assert_eq!(voice.wave_buffer_count, 1);
        assert_eq!(voice.played_wave_buffers_count, 2);
    }

    #[test]
    fn test_dropped_voice_stays_skipped() {
        let mut context = VoiceContext::new(2);
        let node = context.voices[1].channel_node_id(1);
        let voice = context.voice_for_node_mut(node).unwrap();
        assert_eq!(voice.id, 1);
        voice.in_use = true;
        voice.play_state = PlayState::Started;
        voice.wave_buffer_count = 1;
        voice.voice_drop_flag = true;
        assert!(voice.should_skip());
    }
}
