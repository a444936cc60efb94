//! Shared identifiers, constants and small value types

use crate::error::ResultCode;

/// Mix id of the final mix
pub const FINAL_MIX_ID: u32 = 0;
/// Mix id meaning "no mix"
pub const UNUSED_MIX_ID: u32 = i32::MAX as u32;
/// Splitter id meaning "no splitter"
pub const UNUSED_SPLITTER_ID: u32 = i32::MAX as u32;
/// Effect processing order slot meaning "empty"
pub const INVALID_PROCESSING_ORDER: u32 = u32::MAX;

/// Voices with this priority are never dropped
pub const VOICE_HIGHEST_PRIORITY: u32 = 0;
pub const VOICE_LOWEST_PRIORITY: u32 = 0xFF;

pub const MIX_BUFFER_COUNT_MAX: usize = 24;
pub const VOICE_CHANNEL_COUNT_MAX: usize = 6;
pub const VOICE_WAVE_BUFFER_COUNT: usize = 4;
pub const VOICE_BIQUAD_FILTER_COUNT: usize = 2;
pub const MAX_EFFECT_CHANNELS: usize = 6;
pub const MAX_EFFECTS_PER_MIX: usize = 16;
pub const SPLITTER_BIQUAD_FILTER_COUNT: usize = 2;

/// Sample rate of the output device
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Per-session DSP time slice, in processor ticks
pub const AUDIO_PROCESSOR_MAX_UPDATE_TIME_PER_SESSION: u64 = 1_688_888;

/// Kind of graph node encoded in the top nibble of a `NodeId`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeIdType {
    Invalid = 0,
    Voice = 1,
    Mix = 2,
    Sink = 3,
    Performance = 15,
}

/// Node id carried by every command
///
/// Layout: kind in bits 28..31, base index in bits 16..27, sub id in 0..15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn new(kind: NodeIdType, base: u32, sub: u32) -> Self {
        NodeId(((kind as u32) << 28) | ((base & 0xFFF) << 16) | (sub & 0xFFFF))
    }

    pub fn kind(self) -> NodeIdType {
        match self.0 >> 28 {
            1 => NodeIdType::Voice,
            2 => NodeIdType::Mix,
            3 => NodeIdType::Sink,
            15 => NodeIdType::Performance,
            _ => NodeIdType::Invalid,
        }
    }

    pub fn base(self) -> u32 {
        (self.0 >> 16) & 0xFFF
    }

    pub fn is_voice(self) -> bool {
        self.kind() == NodeIdType::Voice
    }
}

/// Wave data format of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    #[default]
    Invalid,
    PcmInt8,
    PcmInt16,
    PcmInt24,
    PcmInt32,
    PcmFloat,
    Adpcm,
}

impl SampleFormat {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SampleFormat::PcmInt8,
            2 => SampleFormat::PcmInt16,
            3 => SampleFormat::PcmInt24,
            4 => SampleFormat::PcmInt32,
            5 => SampleFormat::PcmFloat,
            6 => SampleFormat::Adpcm,
            _ => SampleFormat::Invalid,
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            SampleFormat::Invalid => 0,
            SampleFormat::PcmInt8 => 1,
            SampleFormat::PcmInt16 => 2,
            SampleFormat::PcmInt24 => 3,
            SampleFormat::PcmInt32 => 4,
            SampleFormat::PcmFloat => 5,
            SampleFormat::Adpcm => 6,
        }
    }

    /// Formats the renderer can build a data source command for
    pub fn is_renderable(self) -> bool {
        matches!(
            self,
            SampleFormat::PcmInt16 | SampleFormat::PcmFloat | SampleFormat::Adpcm
        )
    }
}

/// Client-requested play state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    Started,
    #[default]
    Stopped,
    Paused,
}

impl PlayState {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => PlayState::Started,
            2 => PlayState::Paused,
            _ => PlayState::Stopped,
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            PlayState::Started => 0,
            PlayState::Stopped => 1,
            PlayState::Paused => 2,
        }
    }
}

/// One biquad filter tap
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BiquadFilterParameter {
    pub enable: bool,
    pub numerator: [f32; 3],
    pub denominator: [f32; 2],
}

/// Effect channel counts the DSP supports
pub fn is_channel_count_valid(channel_count: u32) -> bool {
    matches!(channel_count, 1 | 2 | 4 | 6)
}

/// How the session is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Auto,
    Manual,
}

/// Where rendering is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingDevice {
    #[default]
    Dsp,
    Cpu,
}

/// Session parameters negotiated at initialise
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct RendererConfiguration {
    pub sample_rate: u32,
    pub sample_count: u32,
    pub mix_buffer_count: u32,
    pub sub_mix_count: u32,
    pub voice_count: u32,
    pub sink_count: u32,
    pub effect_count: u32,
    pub performance_frame_count: u32,
    pub voice_drop_enabled: bool,
    pub splitter_count: u32,
    pub splitter_destination_count: u32,
    pub revision: u32,
    pub execution_mode: ExecutionMode,
    pub rendering_device: RenderingDevice,
    pub device_channel_count: u32,
}

impl Default for RendererConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            sample_count: 240,
            mix_buffer_count: 24,
            sub_mix_count: 2,
            voice_count: 24,
            sink_count: 1,
            effect_count: 4,
            performance_frame_count: 0,
            voice_drop_enabled: true,
            splitter_count: 0,
            splitter_destination_count: 0,
            revision: crate::behaviour::CURRENT_REVISION,
            execution_mode: ExecutionMode::Auto,
            rendering_device: RenderingDevice::Dsp,
            device_channel_count: 2,
        }
    }
}

impl RendererConfiguration {
    /// Total mixes including the final mix
    pub fn mix_count(&self) -> u32 {
        self.sub_mix_count + 1
    }

    /// Memory pools: one per effect plus one per voice wave buffer
    pub fn memory_pool_count(&self) -> u32 {
        self.effect_count + self.voice_count * VOICE_WAVE_BUFFER_COUNT as u32
    }

    /// Mix buffers plus the per-voice scratch buffers
    pub fn total_buffer_count(&self) -> u32 {
        self.mix_buffer_count + VOICE_CHANNEL_COUNT_MAX as u32
    }

    /// Reject shapes the renderer cannot run
    pub fn validate(&self) -> std::result::Result<(), ResultCode> {
        if !matches!((self.sample_rate, self.sample_count), (32_000, 160) | (48_000, 240)) {
            return Err(ResultCode::OperationFailed);
        }
        if self.mix_buffer_count == 0 || self.voice_count == 0 {
            return Err(ResultCode::OperationFailed);
        }
        if !matches!(self.device_channel_count, 1 | 2 | 6) {
            return Err(ResultCode::OperationFailed);
        }
        if self.execution_mode == ExecutionMode::Manual && self.rendering_device == RenderingDevice::Dsp {
            return Err(ResultCode::UnsupportedOperation);
        }
        Ok(())
    }
}
