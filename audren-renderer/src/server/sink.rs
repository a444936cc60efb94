//! Sink state: device outputs and circular capture buffers

use tracing::{debug, error};

use super::memory_pool::{AddressInfo, MemoryPoolState, PoolMapper};
use super::upsampler::UpsamplerHandle;
use crate::behaviour::BehaviourInfo;
use crate::error::{Error, Result};
use crate::parameter::sink::{
    CircularBufferSinkParameter, DeviceSinkParameter, SinkOutStatus, SinkParameter, SinkSpecific, SinkType,
};
use crate::types::{NodeId, NodeIdType, VOICE_CHANNEL_COUNT_MAX};

/// Bytes per sample written by a circular buffer sink
const CIRCULAR_SAMPLE_SIZE: u32 = 2;

fn clamp_input_count(input_count: u32) -> u32 {
    input_count.min(VOICE_CHANNEL_COUNT_MAX as u32)
}

#[derive(Debug, Default)]
pub enum SinkKind {
    #[default]
    Invalid,
    Device {
        param: DeviceSinkParameter,
        upsampler: Option<UpsamplerHandle>,
    },
    CircularBuffer {
        param: CircularBufferSinkParameter,
        buffer: AddressInfo,
        write_offset: u32,
        last_written_offset: u32,
    },
}

#[derive(Debug)]
pub struct SinkState {
    pub index: u32,
    pub node_id: NodeId,
    pub is_used: bool,
    pub kind: SinkKind,
}

impl SinkState {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            node_id: NodeId::new(NodeIdType::Sink, index, 0),
            is_used: false,
            kind: SinkKind::Invalid,
        }
    }

    pub fn sink_type(&self) -> SinkType {
        match self.kind {
            SinkKind::Invalid => SinkType::Invalid,
            SinkKind::Device { .. } => SinkType::Device,
            SinkKind::CircularBuffer { .. } => SinkType::CircularBuffer,
        }
    }

    pub fn update(
        &mut self,
        param: &SinkParameter,
        mapper: &PoolMapper,
        behaviour: &mut BehaviourInfo,
        pools: &[MemoryPoolState],
    ) -> Result<()> {
        let sink_type = SinkType::from_raw(param.sink_type).ok_or_else(|| {
            error!("Unknown sink type tag {}", param.sink_type);
            Error::Config(format!("unknown sink type {}", param.sink_type))
        })?;

        // a type change drops the old state, releasing any upsampler slot
        if sink_type != self.sink_type() || !param.is_used {
            self.kind = SinkKind::Invalid;
        }
        self.is_used = param.is_used;
        if !param.is_used {
            return Ok(());
        }

        let specific = match SinkSpecific::decode(sink_type, &param.specific)? {
            SinkSpecific::Device(mut device) => {
                device.input_count = clamp_input_count(device.input_count);
                SinkSpecific::Device(device)
            }
            SinkSpecific::CircularBuffer(mut circular) => {
                circular.input_count = clamp_input_count(circular.input_count);
                SinkSpecific::CircularBuffer(circular)
            }
            SinkSpecific::None => SinkSpecific::None,
        };
        match (specific, &mut self.kind) {
            (SinkSpecific::Device(new_param), SinkKind::Device { param, .. }) => *param = new_param,
            (SinkSpecific::Device(param), kind) => {
                debug!("Sink {} is device '{}'", self.index, param.name());
                *kind = SinkKind::Device { param, upsampler: None };
            }
            (SinkSpecific::CircularBuffer(new_param), SinkKind::CircularBuffer { param, buffer, .. }) => {
                if new_param.address != param.address || new_param.size != param.size {
                    *buffer = mapper.attach_buffer(behaviour, pools, new_param.address, u64::from(new_param.size));
                }
                *param = new_param;
            }
            (SinkSpecific::CircularBuffer(param), kind) => {
                let buffer = mapper.attach_buffer(behaviour, pools, param.address, u64::from(param.size));
                *kind = SinkKind::CircularBuffer {
                    param,
                    buffer,
                    write_offset: 0,
                    last_written_offset: 0,
                };
            }
            (SinkSpecific::None, kind) => *kind = SinkKind::Invalid,
        }
        Ok(())
    }

    /// Move the circular buffer write position past one frame
    pub fn advance_write_offset(&mut self, sample_count: u32) {
        if let SinkKind::CircularBuffer {
            param,
            write_offset,
            last_written_offset,
            ..
        } = &mut self.kind
        {
            *last_written_offset = *write_offset;
            if param.size == 0 {
                return;
            }
            let frame_bytes =
                u64::from(sample_count) * u64::from(clamp_input_count(param.input_count)) * u64::from(CIRCULAR_SAMPLE_SIZE);
            // the remainder is below `size`, so it fits back into u32
            *write_offset = ((u64::from(*write_offset) + frame_bytes) % u64::from(param.size)) as u32;
        }
    }

    pub fn out_status(&self) -> SinkOutStatus {
        match self.kind {
            SinkKind::CircularBuffer {
                last_written_offset, ..
            } => SinkOutStatus { last_written_offset },
            _ => SinkOutStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::memory_pool::IdentityTranslator;
    use crate::server::upsampler::UpsamplerManager;
    use std::sync::Arc;

    fn circular_param(size: u32) -> SinkParameter {
        let specific = SinkSpecific::CircularBuffer(CircularBufferSinkParameter {
            address: 0x10000,
            size,
            input_count: 2,
            sample_count: 240,
            format: 2,
            input: [0, 1, 0, 0, 0, 0],
        });
        SinkParameter {
            sink_type: SinkType::CircularBuffer as u8,
            is_used: true,
            node_id: 0,
            specific: specific.encode(),
        }
    }

    #[test]
    fn test_circular_write_offset_wraps() {
        let mapper = PoolMapper::new(Arc::new(IdentityTranslator));
        let mut behaviour = BehaviourInfo::new(13);
        behaviour.update_flags(crate::behaviour::FLAG_MEMORY_POOL_FORCE_MAPPING);
        let mut sink = SinkState::new(0);
        sink.update(&circular_param(2000), &mapper, &mut behaviour, &[]).unwrap();
        assert_eq!(sink.sink_type(), SinkType::CircularBuffer);

        sink.advance_write_offset(240);
        assert_eq!(sink.out_status().last_written_offset, 0);
        sink.advance_write_offset(240);
        assert_eq!(sink.out_status().last_written_offset, 960);
        sink.advance_write_offset(240);
        // 1920 + 960 wraps past the 2000-byte buffer
        sink.advance_write_offset(240);
        assert_eq!(sink.out_status().last_written_offset, 880);
    }

    #[test]
    fn test_oversized_input_count_is_clamped() {
        let mapper = PoolMapper::new(Arc::new(IdentityTranslator));
        let mut behaviour = BehaviourInfo::new(13);
        behaviour.update_flags(crate::behaviour::FLAG_MEMORY_POOL_FORCE_MAPPING);
        let mut param = circular_param(u32::MAX);
        let specific = SinkSpecific::CircularBuffer(CircularBufferSinkParameter {
            address: 0x10000,
            size: u32::MAX,
            input_count: 0x0100_0000,
            sample_count: 240,
            format: 2,
            input: [0; 6],
        });
        param.specific = specific.encode();

        let mut sink = SinkState::new(0);
        sink.update(&param, &mapper, &mut behaviour, &[]).unwrap();
        match &sink.kind {
            SinkKind::CircularBuffer { param, .. } => assert_eq!(param.input_count, VOICE_CHANNEL_COUNT_MAX as u32),
            other => panic!("unexpected sink {:?}", other),
        }

        // large offsets near the end of the buffer must not overflow
        if let SinkKind::CircularBuffer { write_offset, .. } = &mut sink.kind {
            *write_offset = u32::MAX - 1;
        }
        sink.advance_write_offset(240);
        sink.advance_write_offset(240);
        let frame = 240 * VOICE_CHANNEL_COUNT_MAX as u64 * 2;
        let expected = ((u64::from(u32::MAX - 1) + frame) % u64::from(u32::MAX)) as u32;
        assert_eq!(sink.out_status().last_written_offset, expected);
    }

    #[test]
    fn test_type_change_releases_upsampler() {
        let mapper = PoolMapper::new(Arc::new(IdentityTranslator));
        let mut behaviour = BehaviourInfo::new(13);
        let upsamplers = UpsamplerManager::new(1);

        let mut sink = SinkState::new(0);
        let device = SinkParameter {
            sink_type: SinkType::Device as u8,
            is_used: true,
            node_id: 0,
            specific: SinkSpecific::Device(DeviceSinkParameter::default()).encode(),
        };
        sink.update(&device, &mapper, &mut behaviour, &[]).unwrap();
        if let SinkKind::Device { upsampler, .. } = &mut sink.kind {
            *upsampler = upsamplers.allocate();
        }
        assert_eq!(upsamplers.in_use(), 1);

        // same type keeps the slot
        sink.update(&device, &mapper, &mut behaviour, &[]).unwrap();
        assert_eq!(upsamplers.in_use(), 1);

        behaviour.update_flags(crate::behaviour::FLAG_MEMORY_POOL_FORCE_MAPPING);
        sink.update(&circular_param(4096), &mapper, &mut behaviour, &[]).unwrap();
        assert_eq!(upsamplers.in_use(), 0);
    }

    #[test]
    fn test_unknown_sink_type_is_fatal() {
        let mapper = PoolMapper::new(Arc::new(IdentityTranslator));
        let mut behaviour = BehaviourInfo::new(13);
        let param = SinkParameter {
            sink_type: 9,
            is_used: true,
            ..Default::default()
        };
        assert!(SinkState::new(0).update(&param, &mapper, &mut behaviour, &[]).is_err());
    }
}
