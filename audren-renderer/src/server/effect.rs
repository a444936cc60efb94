//! Effect state: a closed tagged union keyed by effect type

use tracing::{debug, error};

use super::memory_pool::{AddressInfo, MemoryPoolState, PoolMapper};
use crate::behaviour::BehaviourInfo;
use crate::error::{Error, Result};
use crate::parameter::effect::{ChannelMapping, EffectParameter, EffectSpecific, EffectType, EffectUsageState};
use crate::types::{is_channel_count_valid, UNUSED_MIX_ID};

/// Buffers an effect reads or writes outside the mix buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectBuffers {
    #[default]
    None,
    /// DSP state of delay, reverb, limiter and compressor
    Work(AddressInfo),
    /// Auxiliary and capture ring buffers
    Auxiliary {
        send_info: AddressInfo,
        send: AddressInfo,
        return_info: AddressInfo,
        return_: AddressInfo,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectState {
    pub effect_type: EffectType,
    pub is_enabled: bool,
    pub mix_id: u32,
    pub processing_order: u32,
    pub mapping: ChannelMapping,
    pub specific: EffectSpecific,
    pub buffers: EffectBuffers,
    pub usage_state: EffectUsageState,
    /// DSP state must be reset on the next generated command
    pub needs_init: bool,
    /// A required buffer is not mapped; the effect renders nothing
    pub should_skip: bool,
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            effect_type: EffectType::Invalid,
            is_enabled: false,
            mix_id: UNUSED_MIX_ID,
            processing_order: 0,
            mapping: ChannelMapping::default(),
            specific: EffectSpecific::None,
            buffers: EffectBuffers::None,
            usage_state: EffectUsageState::Invalid,
            needs_init: true,
            should_skip: false,
        }
    }
}

impl EffectState {
    pub fn is_used(&self) -> bool {
        self.effect_type != EffectType::Invalid && self.mix_id != UNUSED_MIX_ID
    }

    pub fn is_channel_count_valid(&self) -> bool {
        is_channel_count_valid(u32::from(self.mapping.channel_count))
    }

    pub fn channel_count(&self) -> usize {
        usize::from(self.mapping.channel_count).min(self.mapping.input.len())
    }

    /// Apply one effect record
    ///
    /// A type tag outside the known set is a negotiation bug and fails the
    /// whole update.
    pub fn update(
        &mut self,
        param: &EffectParameter,
        mapper: &PoolMapper,
        behaviour: &mut BehaviourInfo,
        pools: &[MemoryPoolState],
    ) -> Result<()> {
        let effect_type = EffectType::from_raw(param.effect_type).ok_or_else(|| {
            error!("Unknown effect type tag {}", param.effect_type);
            Error::Config(format!("unknown effect type {}", param.effect_type))
        })?;

        if effect_type != self.effect_type || param.is_new {
            debug!("Effect reset to {:?} on mix {}", effect_type, param.mix_id);
            *self = EffectState {
                effect_type,
                ..Default::default()
            };
        }

        let (mapping, specific) = EffectSpecific::decode(effect_type, &param.specific)?;
        self.is_enabled = param.is_enabled;
        self.mix_id = param.mix_id;
        self.processing_order = param.processing_order;
        self.mapping = mapping;
        self.specific = specific;

        self.buffers = match (effect_type, specific) {
            (
                EffectType::AuxiliaryBuffer | EffectType::CaptureBuffer,
                EffectSpecific::Auxiliary {
                    send_buffer_info,
                    send_buffer,
                    return_buffer_info,
                    return_buffer,
                    count_max,
                    ..
                },
            ) => {
                let ring_size = u64::from(count_max) * 4;
                let mut attach = |address: u64, size: u64| mapper.attach_buffer(behaviour, pools, address, size);
                EffectBuffers::Auxiliary {
                    send_info: attach(send_buffer_info, 0x40),
                    send: attach(send_buffer, ring_size),
                    return_info: attach(return_buffer_info, 0x40),
                    return_: attach(return_buffer, ring_size),
                }
            }
            (EffectType::Delay | EffectType::Reverb | EffectType::Reverb3d | EffectType::Limiter | EffectType::Compressor, _)
                if param.buffer_size > 0 =>
            {
                EffectBuffers::Work(mapper.attach_buffer(behaviour, pools, param.buffer_base, param.buffer_size))
            }
            _ => EffectBuffers::None,
        };

        self.should_skip = match self.buffers {
            EffectBuffers::None => false,
            EffectBuffers::Work(work) => !work.is_mapped(),
            EffectBuffers::Auxiliary { send_info, send, .. } => !send_info.is_mapped() || !send.is_mapped(),
        };

        self.usage_state = if param.is_new {
            EffectUsageState::New
        } else if self.is_enabled {
            EffectUsageState::Enabled
        } else {
            EffectUsageState::Disabled
        };
        Ok(())
    }

    pub fn finish_generation(&mut self) {
        if self.is_enabled && !self.should_skip {
            self.needs_init = false;
        }
    }
}
