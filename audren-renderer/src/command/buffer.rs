//! Accumulates one frame's commands from pooled instances

use tracing::trace;

use super::{
    AuxiliaryCommand, Command, CommandEstimator, CommandList, CommandPayload, CommandPool, CommandType,
    DataSourceCommand, EffectCommand, MixRampGroupedCommand, PerformanceCommandState,
};
use crate::types::{is_channel_count_valid, BiquadFilterParameter, NodeId, MAX_EFFECT_CHANNELS};

pub struct CommandBuffer<'a> {
    list: CommandList,
    pool: &'a mut CommandPool,
    estimator: &'a dyn CommandEstimator,
    estimated_processing_time: u64,
}

impl<'a> CommandBuffer<'a> {
    pub fn new(list: CommandList, pool: &'a mut CommandPool, estimator: &'a dyn CommandEstimator) -> Self {
        Self {
            list,
            pool,
            estimator,
            estimated_processing_time: 0,
        }
    }

    /// Running sum of every appended command's estimate
    pub fn estimated_processing_time(&self) -> u64 {
        self.estimated_processing_time
    }

    pub fn list(&self) -> &CommandList {
        &self.list
    }

    pub fn into_list(self) -> CommandList {
        self.list
    }

    fn push(&mut self, command_type: CommandType, node_id: NodeId, payload: CommandPayload, enabled: bool) {
        let mut command = self.pool.acquire(command_type);
        *command = Command {
            command_type,
            node_id,
            enabled,
            estimated_processing_time: 0,
            payload,
        };
        command.estimated_processing_time = self.estimator.estimate(&command);
        self.estimated_processing_time += u64::from(command.estimated_processing_time);
        trace!(
            "{:?} node {:#x} cost {}",
            command_type,
            node_id.0,
            command.estimated_processing_time
        );
        self.list.push(command);
    }

    pub fn generate_clear_mix_buffer(&mut self, node_id: NodeId) {
        let buffer_count = self.list.buffer_count;
        self.push(
            CommandType::ClearMixBuffer,
            node_id,
            CommandPayload::ClearMixBuffer { buffer_count },
            true,
        );
    }

    /// `command_type` must be one of the data source types
    pub fn generate_data_source(&mut self, command_type: CommandType, source: DataSourceCommand, node_id: NodeId) {
        debug_assert!(command_type.is_data_source());
        self.push(command_type, node_id, CommandPayload::DataSource(source), true);
    }

    pub fn generate_depop_prepare(&mut self, buffer_offset: u32, buffer_count: u32, node_id: NodeId, enabled: bool) {
        self.push(
            CommandType::DepopPrepare,
            node_id,
            CommandPayload::DepopPrepare {
                buffer_offset,
                buffer_count,
            },
            enabled,
        );
    }

    pub fn generate_depop_for_mix_buffers(&mut self, buffer_offset: u32, buffer_count: u32, node_id: NodeId) {
        let sample_rate = self.list.sample_rate;
        self.push(
            CommandType::DepopForMixBuffers,
            node_id,
            CommandPayload::DepopForMixBuffers {
                buffer_offset,
                buffer_count,
                sample_rate,
            },
            true,
        );
    }

    pub fn generate_volume(&mut self, input: u16, output: u16, volume: f32, node_id: NodeId) {
        self.push(
            CommandType::Volume,
            node_id,
            CommandPayload::Volume { input, output, volume },
            true,
        );
    }

    pub fn generate_volume_ramp(&mut self, input: u16, output: u16, volume: f32, previous_volume: f32, node_id: NodeId) {
        self.push(
            CommandType::VolumeRamp,
            node_id,
            CommandPayload::VolumeRamp {
                input,
                output,
                volume,
                previous_volume,
            },
            true,
        );
    }

    pub fn generate_biquad_filter(
        &mut self,
        input: u16,
        output: u16,
        filter: BiquadFilterParameter,
        needs_init: bool,
        node_id: NodeId,
    ) {
        self.push(
            CommandType::BiquadFilter,
            node_id,
            CommandPayload::BiquadFilter {
                input,
                output,
                filter,
                needs_init,
            },
            true,
        );
    }

    pub fn generate_multi_tap_biquad_filter(
        &mut self,
        input: u16,
        output: u16,
        filters: [BiquadFilterParameter; 2],
        needs_init: [bool; 2],
        node_id: NodeId,
    ) {
        self.push(
            CommandType::MultiTapBiquadFilter,
            node_id,
            CommandPayload::MultiTapBiquadFilter {
                input,
                output,
                filters,
                needs_init,
            },
            true,
        );
    }

    pub fn generate_mix(&mut self, input: u16, output: u16, volume: f32, node_id: NodeId) {
        self.push(CommandType::Mix, node_id, CommandPayload::Mix { input, output, volume }, true);
    }

    pub fn generate_mix_ramp(&mut self, input: u16, output: u16, volume: f32, previous_volume: f32, node_id: NodeId) {
        self.push(
            CommandType::MixRamp,
            node_id,
            CommandPayload::MixRamp {
                input,
                output,
                volume,
                previous_volume,
            },
            true,
        );
    }

    pub fn generate_mix_ramp_grouped(&mut self, grouped: MixRampGroupedCommand, node_id: NodeId) {
        self.push(
            CommandType::MixRampGrouped,
            node_id,
            CommandPayload::MixRampGrouped(grouped),
            true,
        );
    }

    /// Delay, reverb, limiter and compressor; nothing is emitted for a channel
    /// count the DSP cannot run
    pub fn generate_effect(&mut self, command_type: CommandType, effect: EffectCommand, node_id: NodeId) -> bool {
        debug_assert!(CommandPayload::Effect(effect).matches(command_type));
        if !is_channel_count_valid(u32::from(effect.channel_count)) {
            trace!("{:?} skipped, {} channels", command_type, effect.channel_count);
            return false;
        }
        self.push(command_type, node_id, CommandPayload::Effect(effect), true);
        true
    }

    /// Auxiliary send/return or capture of one channel
    pub fn generate_auxiliary(&mut self, command_type: CommandType, aux: AuxiliaryCommand, node_id: NodeId) {
        debug_assert!(matches!(command_type, CommandType::AuxiliaryBuffer | CommandType::CaptureBuffer));
        self.push(command_type, node_id, CommandPayload::Auxiliary(aux), true);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate_biquad_filter_and_mix(
        &mut self,
        input: u16,
        output: u16,
        filter: BiquadFilterParameter,
        volume: f32,
        previous_volume: f32,
        needs_init: bool,
        node_id: NodeId,
    ) {
        self.push(
            CommandType::BiquadFilterAndMix,
            node_id,
            CommandPayload::BiquadFilterAndMix {
                input,
                output,
                filter,
                volume,
                previous_volume,
                needs_init,
            },
            true,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate_multi_tap_biquad_filter_and_mix(
        &mut self,
        input: u16,
        output: u16,
        filters: [BiquadFilterParameter; 2],
        volume: f32,
        previous_volume: f32,
        needs_init: [bool; 2],
        node_id: NodeId,
    ) {
        self.push(
            CommandType::MultiTapBiquadFilterAndMix,
            node_id,
            CommandPayload::MultiTapBiquadFilterAndMix {
                input,
                output,
                filters,
                volume,
                previous_volume,
                needs_init,
            },
            true,
        );
    }

    pub fn generate_performance(&mut self, state: PerformanceCommandState, entry_index: u32, node_id: NodeId) {
        self.push(
            CommandType::Performance,
            node_id,
            CommandPayload::Performance { state, entry_index },
            true,
        );
    }

    pub fn generate_device_sink(
        &mut self,
        session_id: u32,
        inputs: [u16; MAX_EFFECT_CHANNELS],
        input_count: u32,
        node_id: NodeId,
    ) {
        self.push(
            CommandType::DeviceSink,
            node_id,
            CommandPayload::DeviceSink {
                session_id,
                input_count,
                inputs,
            },
            true,
        );
    }

    pub fn generate_circular_buffer_sink(
        &mut self,
        inputs: [u16; MAX_EFFECT_CHANNELS],
        input_count: u32,
        address: u64,
        size: u32,
        write_offset: u32,
        node_id: NodeId,
    ) {
        self.push(
            CommandType::CircularBufferSink,
            node_id,
            CommandPayload::CircularBufferSink {
                input_count,
                inputs,
                address,
                size,
                write_offset,
            },
            true,
        );
    }

    pub fn generate_upsample(
        &mut self,
        inputs: [u16; MAX_EFFECT_CHANNELS],
        input_count: u32,
        upsampler_index: u32,
        node_id: NodeId,
    ) {
        let source_sample_rate = self.list.sample_rate;
        self.push(
            CommandType::Upsample,
            node_id,
            CommandPayload::Upsample {
                input_count,
                inputs,
                source_sample_rate,
                upsampler_index,
            },
            true,
        );
    }

    pub fn generate_downmix_surround_to_stereo(
        &mut self,
        inputs: [u16; MAX_EFFECT_CHANNELS],
        outputs: [u16; MAX_EFFECT_CHANNELS],
        coefficients: [f32; 4],
        node_id: NodeId,
    ) {
        self.push(
            CommandType::DownMixSurroundToStereo,
            node_id,
            CommandPayload::DownMixSurroundToStereo {
                inputs,
                outputs,
                coefficients,
            },
            true,
        );
    }
}
