//! DSP commands and their containers
//!
//! A `Command` is one quantum of DSP work: a type tag, the node it belongs
//! to, an enabled flag and an estimated cost. The work itself is described by
//! a payload the mixing consumer interprets; the scheduler only orders,
//! costs and enables commands.

pub mod buffer;
pub mod estimator;
pub mod generator;
pub mod list;
pub mod pool;

pub use buffer::CommandBuffer;
pub use estimator::{create_estimator, CommandEstimator};
pub use generator::CommandGenerator;
pub use list::CommandList;
pub use pool::CommandPool;

use crate::types::{BiquadFilterParameter, NodeId, SampleFormat, MAX_EFFECT_CHANNELS, MIX_BUFFER_COUNT_MAX};

/// Closed set of command types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    ClearMixBuffer,
    PcmInt16DataSourceVersion1,
    PcmInt16DataSourceVersion2,
    PcmFloatDataSourceVersion1,
    PcmFloatDataSourceVersion2,
    AdpcmDataSourceVersion1,
    AdpcmDataSourceVersion2,
    Volume,
    VolumeRamp,
    BiquadFilter,
    MultiTapBiquadFilter,
    Mix,
    MixRamp,
    MixRampGrouped,
    DepopPrepare,
    DepopForMixBuffers,
    Delay,
    Reverb,
    Reverb3d,
    Compressor,
    LimiterVersion1,
    LimiterVersion2,
    AuxiliaryBuffer,
    CaptureBuffer,
    BiquadFilterAndMix,
    MultiTapBiquadFilterAndMix,
    Performance,
    DeviceSink,
    CircularBufferSink,
    Upsample,
    DownMixSurroundToStereo,
}

impl CommandType {
    pub const COUNT: usize = 31;

    pub const ALL: [CommandType; Self::COUNT] = [
        CommandType::ClearMixBuffer,
        CommandType::PcmInt16DataSourceVersion1,
        CommandType::PcmInt16DataSourceVersion2,
        CommandType::PcmFloatDataSourceVersion1,
        CommandType::PcmFloatDataSourceVersion2,
        CommandType::AdpcmDataSourceVersion1,
        CommandType::AdpcmDataSourceVersion2,
        CommandType::Volume,
        CommandType::VolumeRamp,
        CommandType::BiquadFilter,
        CommandType::MultiTapBiquadFilter,
        CommandType::Mix,
        CommandType::MixRamp,
        CommandType::MixRampGrouped,
        CommandType::DepopPrepare,
        CommandType::DepopForMixBuffers,
        CommandType::Delay,
        CommandType::Reverb,
        CommandType::Reverb3d,
        CommandType::Compressor,
        CommandType::LimiterVersion1,
        CommandType::LimiterVersion2,
        CommandType::AuxiliaryBuffer,
        CommandType::CaptureBuffer,
        CommandType::BiquadFilterAndMix,
        CommandType::MultiTapBiquadFilterAndMix,
        CommandType::Performance,
        CommandType::DeviceSink,
        CommandType::CircularBufferSink,
        CommandType::Upsample,
        CommandType::DownMixSurroundToStereo,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Commands that produce voice samples; admission control starts at the first
    pub fn is_data_source(self) -> bool {
        matches!(
            self,
            CommandType::PcmInt16DataSourceVersion1
                | CommandType::PcmInt16DataSourceVersion2
                | CommandType::PcmFloatDataSourceVersion1
                | CommandType::PcmFloatDataSourceVersion2
                | CommandType::AdpcmDataSourceVersion1
                | CommandType::AdpcmDataSourceVersion2
        )
    }

    /// Data source command for a sample format, if the format is renderable
    pub fn data_source(format: SampleFormat, version2: bool) -> Option<Self> {
        Some(match (format, version2) {
            (SampleFormat::PcmInt16, false) => CommandType::PcmInt16DataSourceVersion1,
            (SampleFormat::PcmInt16, true) => CommandType::PcmInt16DataSourceVersion2,
            (SampleFormat::PcmFloat, false) => CommandType::PcmFloatDataSourceVersion1,
            (SampleFormat::PcmFloat, true) => CommandType::PcmFloatDataSourceVersion2,
            (SampleFormat::Adpcm, false) => CommandType::AdpcmDataSourceVersion1,
            (SampleFormat::Adpcm, true) => CommandType::AdpcmDataSourceVersion2,
            _ => return None,
        })
    }
}

/// Wave buffer as seen by a data source command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WaveBufferRef {
    pub dsp_address: u64,
    pub size: u64,
    pub start_sample_offset: u32,
    pub end_sample_offset: u32,
    pub looping: bool,
    pub is_end_of_stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataSourceCommand {
    pub voice_id: u32,
    pub channel_index: u32,
    pub channel_count: u32,
    pub output_buffer: u16,
    pub sample_rate: u32,
    pub pitch: f32,
    pub wave_buffer_index: u32,
    pub wave_buffers: [WaveBufferRef; 4],
}

/// Delay, reverb, 3D reverb, limiter and compressor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectCommand {
    pub inputs: [u16; MAX_EFFECT_CHANNELS],
    pub outputs: [u16; MAX_EFFECT_CHANNELS],
    pub channel_count: u16,
    pub work_buffer: u64,
    pub needs_init: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AuxiliaryCommand {
    pub input: u16,
    pub output: u16,
    pub send_info: u64,
    pub send_buffer: u64,
    pub return_info: u64,
    pub return_buffer: u64,
    pub count_max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MixRampGroupedCommand {
    pub buffer_count: u32,
    pub inputs: [u16; MIX_BUFFER_COUNT_MAX],
    pub outputs: [u16; MIX_BUFFER_COUNT_MAX],
    pub volumes: [f32; MIX_BUFFER_COUNT_MAX],
    pub previous_volumes: [f32; MIX_BUFFER_COUNT_MAX],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceCommandState {
    Start,
    End,
}

/// Operands of a command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CommandPayload {
    #[default]
    Empty,
    ClearMixBuffer {
        buffer_count: u32,
    },
    DataSource(DataSourceCommand),
    Volume {
        input: u16,
        output: u16,
        volume: f32,
    },
    VolumeRamp {
        input: u16,
        output: u16,
        volume: f32,
        previous_volume: f32,
    },
    BiquadFilter {
        input: u16,
        output: u16,
        filter: BiquadFilterParameter,
        needs_init: bool,
    },
    MultiTapBiquadFilter {
        input: u16,
        output: u16,
        filters: [BiquadFilterParameter; 2],
        needs_init: [bool; 2],
    },
    Mix {
        input: u16,
        output: u16,
        volume: f32,
    },
    MixRamp {
        input: u16,
        output: u16,
        volume: f32,
        previous_volume: f32,
    },
    MixRampGrouped(MixRampGroupedCommand),
    DepopPrepare {
        buffer_offset: u32,
        buffer_count: u32,
    },
    DepopForMixBuffers {
        buffer_offset: u32,
        buffer_count: u32,
        sample_rate: u32,
    },
    Effect(EffectCommand),
    Auxiliary(AuxiliaryCommand),
    BiquadFilterAndMix {
        input: u16,
        output: u16,
        filter: BiquadFilterParameter,
        volume: f32,
        previous_volume: f32,
        needs_init: bool,
    },
    MultiTapBiquadFilterAndMix {
        input: u16,
        output: u16,
        filters: [BiquadFilterParameter; 2],
        volume: f32,
        previous_volume: f32,
        needs_init: [bool; 2],
    },
    Performance {
        state: PerformanceCommandState,
        entry_index: u32,
    },
    DeviceSink {
        session_id: u32,
        input_count: u32,
        inputs: [u16; MAX_EFFECT_CHANNELS],
    },
    CircularBufferSink {
        input_count: u32,
        inputs: [u16; MAX_EFFECT_CHANNELS],
        address: u64,
        size: u32,
        write_offset: u32,
    },
    Upsample {
        input_count: u32,
        inputs: [u16; MAX_EFFECT_CHANNELS],
        source_sample_rate: u32,
        upsampler_index: u32,
    },
    DownMixSurroundToStereo {
        inputs: [u16; MAX_EFFECT_CHANNELS],
        outputs: [u16; MAX_EFFECT_CHANNELS],
        coefficients: [f32; 4],
    },
}

impl CommandPayload {
    /// Whether this payload is the operand shape of `command_type`
    pub fn matches(&self, command_type: CommandType) -> bool {
        use CommandType as T;
        match self {
            CommandPayload::Empty => true,
            CommandPayload::ClearMixBuffer { .. } => command_type == T::ClearMixBuffer,
            CommandPayload::DataSource(_) => command_type.is_data_source(),
            CommandPayload::Volume { .. } => command_type == T::Volume,
            CommandPayload::VolumeRamp { .. } => command_type == T::VolumeRamp,
            CommandPayload::BiquadFilter { .. } => command_type == T::BiquadFilter,
            CommandPayload::MultiTapBiquadFilter { .. } => command_type == T::MultiTapBiquadFilter,
            CommandPayload::Mix { .. } => command_type == T::Mix,
            CommandPayload::MixRamp { .. } => command_type == T::MixRamp,
            CommandPayload::MixRampGrouped(_) => command_type == T::MixRampGrouped,
            CommandPayload::DepopPrepare { .. } => command_type == T::DepopPrepare,
            CommandPayload::DepopForMixBuffers { .. } => command_type == T::DepopForMixBuffers,
            CommandPayload::Effect(_) => matches!(
                command_type,
                T::Delay | T::Reverb | T::Reverb3d | T::Compressor | T::LimiterVersion1 | T::LimiterVersion2
            ),
            CommandPayload::Auxiliary(_) => matches!(command_type, T::AuxiliaryBuffer | T::CaptureBuffer),
            CommandPayload::BiquadFilterAndMix { .. } => command_type == T::BiquadFilterAndMix,
            CommandPayload::MultiTapBiquadFilterAndMix { .. } => command_type == T::MultiTapBiquadFilterAndMix,
            CommandPayload::Performance { .. } => command_type == T::Performance,
            CommandPayload::DeviceSink { .. } => command_type == T::DeviceSink,
            CommandPayload::CircularBufferSink { .. } => command_type == T::CircularBufferSink,
            CommandPayload::Upsample { .. } => command_type == T::Upsample,
            CommandPayload::DownMixSurroundToStereo { .. } => command_type == T::DownMixSurroundToStereo,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub command_type: CommandType,
    pub node_id: NodeId,
    pub enabled: bool,
    /// Set once by the estimator when the command is created
    pub estimated_processing_time: u32,
    pub payload: CommandPayload,
}

impl Command {
    pub(crate) fn blank(command_type: CommandType) -> Self {
        Self {
            command_type,
            node_id: NodeId::default(),
            enabled: true,
            estimated_processing_time: 0,
            payload: CommandPayload::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_lists_every_type_in_index_order() {
        for (i, command_type) in CommandType::ALL.iter().enumerate() {
            assert_eq!(command_type.index(), i);
        }
    }

    #[test]
    fn test_data_source_selection() {
        assert_eq!(
            CommandType::data_source(SampleFormat::Adpcm, true),
            Some(CommandType::AdpcmDataSourceVersion2)
        );
        assert_eq!(CommandType::data_source(SampleFormat::PcmInt24, false), None);
        assert!(CommandType::PcmFloatDataSourceVersion1.is_data_source());
        assert!(!CommandType::DepopPrepare.is_data_source());
    }

    #[test]
    fn test_payload_matches_type() {
        let payload = CommandPayload::Mix {
            input: 0,
            output: 1,
            volume: 1.0,
        };
        assert!(payload.matches(CommandType::Mix));
        assert!(!payload.matches(CommandType::MixRamp));
    }
}
