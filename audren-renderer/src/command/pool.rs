//! Per-type free lists of commands
//!
//! Commands are boxed once and recycled across frames. Each type has its own
//! free list, prefilled at initialise from the session shape; running dry
//! allocates (with a warning) and the extra instance joins the pool when
//! released, so later frames settle back to zero allocations.

use tracing::{debug, warn};

use super::{Command, CommandList, CommandPayload, CommandType};
use crate::types::{RendererConfiguration, MIX_BUFFER_COUNT_MAX, VOICE_CHANNEL_COUNT_MAX};

#[derive(Debug)]
pub struct CommandPool {
    free: Vec<Vec<Box<Command>>>,
    /// Emptied list storage handed back by the consumer
    spare_lists: Vec<CommandList>,
    grown: usize,
}

/// Lists in flight at once: one generating, one with the mixer, one returning
const SPARE_LIST_LIMIT: usize = 3;

impl CommandPool {
    /// Empty pool; every acquire allocates until commands are released
    pub fn empty() -> Self {
        Self {
            free: CommandType::ALL.iter().map(|_| Vec::new()).collect(),
            spare_lists: Vec::with_capacity(SPARE_LIST_LIMIT),
            grown: 0,
        }
    }

    /// Pool sized for a typical frame of `config`
    pub fn for_configuration(config: &RendererConfiguration) -> Self {
        let mut pool = Self::empty();
        for command_type in CommandType::ALL {
            let capacity = Self::expected_per_frame(command_type, config);
            let list = &mut pool.free[command_type.index()];
            list.reserve(capacity);
            list.extend((0..capacity).map(|_| Box::new(Command::blank(command_type))));
        }
        debug!("Command pool prefilled with {} commands", pool.available());
        pool
    }

    /// Commands a prefilled pool holds for `config`
    pub fn expected_capacity(config: &RendererConfiguration) -> usize {
        CommandType::ALL
            .iter()
            .map(|&command_type| Self::expected_per_frame(command_type, config))
            .sum()
    }

    fn expected_per_frame(command_type: CommandType, config: &RendererConfiguration) -> usize {
        let voice_channels = config.voice_count as usize * 2;
        let mixes = config.mix_count() as usize;
        let buffers = (config.mix_buffer_count as usize).min(MIX_BUFFER_COUNT_MAX);
        let effects = config.effect_count as usize;
        let sinks = config.sink_count as usize;

        match command_type {
            CommandType::ClearMixBuffer => 1,
            CommandType::PcmInt16DataSourceVersion1
            | CommandType::PcmInt16DataSourceVersion2
            | CommandType::PcmFloatDataSourceVersion1
            | CommandType::PcmFloatDataSourceVersion2
            | CommandType::AdpcmDataSourceVersion1
            | CommandType::AdpcmDataSourceVersion2 => voice_channels / 2,
            CommandType::VolumeRamp | CommandType::DepopPrepare => voice_channels,
            CommandType::BiquadFilter | CommandType::MultiTapBiquadFilter => voice_channels / 2,
            CommandType::MixRamp => voice_channels * 2,
            CommandType::MixRampGrouped => voice_channels / 4,
            CommandType::Mix => mixes * buffers.min(VOICE_CHANNEL_COUNT_MAX),
            CommandType::Volume => buffers,
            CommandType::DepopForMixBuffers => mixes,
            CommandType::Delay
            | CommandType::Reverb
            | CommandType::Reverb3d
            | CommandType::Compressor
            | CommandType::LimiterVersion1
            | CommandType::LimiterVersion2 => effects,
            CommandType::AuxiliaryBuffer | CommandType::CaptureBuffer => effects * 2,
            CommandType::BiquadFilterAndMix | CommandType::MultiTapBiquadFilterAndMix => {
                config.splitter_destination_count as usize
            }
            CommandType::Performance => {
                if config.performance_frame_count > 0 {
                    2 * (voice_channels + mixes + sinks)
                } else {
                    0
                }
            }
            CommandType::DeviceSink
            | CommandType::CircularBufferSink
            | CommandType::Upsample
            | CommandType::DownMixSurroundToStereo => sinks,
        }
    }

    pub fn acquire(&mut self, command_type: CommandType) -> Box<Command> {
        match self.free[command_type.index()].pop() {
            Some(command) => command,
            None => {
                self.grown += 1;
                warn!("Command pool for {:?} exhausted, growing", command_type);
                Box::new(Command::blank(command_type))
            }
        }
    }

    /// Return a finished command to its type's free list
    pub fn release(&mut self, mut command: Box<Command>) {
        debug_assert!(
            command.payload.matches(command.command_type),
            "payload {:?} released as {:?}",
            command.payload,
            command.command_type
        );
        command.payload = CommandPayload::Empty;
        self.free[command.command_type.index()].push(command);
    }

    /// Release every command of a list the consumer has finished with
    pub fn release_list(&mut self, mut list: CommandList) {
        for command in list.drain() {
            self.release(command);
        }
        if self.spare_lists.len() < SPARE_LIST_LIMIT {
            self.spare_lists.push(list);
        }
    }

    /// An empty list for the next frame, reusing returned storage when there is some
    pub fn take_list(&mut self, sample_rate: u32, sample_count: u32, buffer_count: u32, capacity: usize) -> CommandList {
        match self.spare_lists.pop() {
            Some(mut list) => {
                list.reset(sample_rate, sample_count, buffer_count);
                list
            }
            None => CommandList::new(sample_rate, sample_count, buffer_count, capacity),
        }
    }

    pub fn available(&self) -> usize {
        self.free.iter().map(Vec::len).sum()
    }

    /// Commands allocated because a free list was empty
    pub fn grown(&self) -> usize {
        self.grown
    }
}
