//! Sink wire records

use super::{SpanReader, SpanWriter, WireRecord, WireResult};
use crate::types::VOICE_CHANNEL_COUNT_MAX;

pub const SINK_SPECIFIC_SIZE: usize = 120;
pub const DEVICE_NAME_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkType {
    Invalid = 0,
    Device = 1,
    CircularBuffer = 2,
}

impl SinkType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(SinkType::Invalid),
            1 => Some(SinkType::Device),
            2 => Some(SinkType::CircularBuffer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceSinkParameter {
    pub name: [u8; DEVICE_NAME_SIZE],
    pub input_count: u32,
    pub input: [u8; VOICE_CHANNEL_COUNT_MAX],
    pub downmix_enabled: bool,
    pub downmix_coefficients: [f32; 4],
}

impl DeviceSinkParameter {
    /// Device name up to the first NUL
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CircularBufferSinkParameter {
    pub address: u64,
    pub size: u32,
    pub input_count: u32,
    pub sample_count: u32,
    pub format: u32,
    pub input: [u8; VOICE_CHANNEL_COUNT_MAX],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SinkSpecific {
    #[default]
    None,
    Device(DeviceSinkParameter),
    CircularBuffer(CircularBufferSinkParameter),
}

impl SinkSpecific {
    pub fn decode(sink_type: SinkType, bytes: &[u8; SINK_SPECIFIC_SIZE]) -> WireResult<Self> {
        let mut r = SpanReader::new(bytes);
        Ok(match sink_type {
            SinkType::Invalid => SinkSpecific::None,
            SinkType::Device => {
                let name = r.read_array()?;
                let input_count = r.read_u32()?;
                let input = r.read_array()?;
                let downmix_enabled = r.read_bool()?;
                r.skip(1)?;
                let mut downmix_coefficients = [0.0; 4];
                for c in downmix_coefficients.iter_mut() {
                    *c = r.read_f32()?;
                }
                SinkSpecific::Device(DeviceSinkParameter {
                    name,
                    input_count,
                    input,
                    downmix_enabled,
                    downmix_coefficients,
                })
            }
            SinkType::CircularBuffer => SinkSpecific::CircularBuffer(CircularBufferSinkParameter {
                address: r.read_u64()?,
                size: r.read_u32()?,
                input_count: r.read_u32()?,
                sample_count: r.read_u32()?,
                format: r.read_u32()?,
                input: r.read_array()?,
            }),
        })
    }

    pub fn encode(&self) -> [u8; SINK_SPECIFIC_SIZE] {
        let mut bytes = [0u8; SINK_SPECIFIC_SIZE];
        let encoded = self.encode_into(&mut SpanWriter::new(&mut bytes));
        debug_assert!(encoded.is_ok());
        bytes
    }

    fn encode_into(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        match self {
            SinkSpecific::None => Ok(()),
            SinkSpecific::Device(device) => {
                w.write_bytes(&device.name)?;
                w.write_u32(device.input_count)?;
                w.write_bytes(&device.input)?;
                w.write_bool(device.downmix_enabled)?;
                w.write_zeros(1)?;
                for c in &device.downmix_coefficients {
                    w.write_f32(*c)?;
                }
                Ok(())
            }
            SinkSpecific::CircularBuffer(circular) => {
                w.write_u64(circular.address)?;
                w.write_u32(circular.size)?;
                w.write_u32(circular.input_count)?;
                w.write_u32(circular.sample_count)?;
                w.write_u32(circular.format)?;
                w.write_bytes(&circular.input)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkParameter {
    /// Raw tag; validated by the updater
    pub sink_type: u8,
    pub is_used: bool,
    pub node_id: u32,
    pub specific: [u8; SINK_SPECIFIC_SIZE],
}

impl Default for SinkParameter {
    fn default() -> Self {
        Self {
            sink_type: 0,
            is_used: false,
            node_id: 0,
            specific: [0; SINK_SPECIFIC_SIZE],
        }
    }
}

impl WireRecord for SinkParameter {
    const SIZE: usize = 128;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let sink_type = r.read_u8()?;
        let is_used = r.read_bool()?;
        r.skip(2)?;
        Ok(Self {
            sink_type,
            is_used,
            node_id: r.read_u32()?,
            specific: r.read_array()?,
        })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u8(self.sink_type)?;
        w.write_bool(self.is_used)?;
        w.write_zeros(2)?;
        w.write_u32(self.node_id)?;
        w.write_bytes(&self.specific)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkOutStatus {
    pub last_written_offset: u32,
}

impl WireRecord for SinkOutStatus {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let last_written_offset = r.read_u32()?;
        r.skip(12)?;
        Ok(Self { last_written_offset })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.last_written_offset)?;
        w.write_zeros(12)
    }
}
