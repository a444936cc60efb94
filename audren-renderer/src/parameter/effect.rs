//! Effect wire records
//!
//! The V1 and V2 parameter layouts share a 192-byte prefix; V2 (revision 9+)
//! appends a reserved block, and its status record carries a result block.
//! The 160-byte type-specific area is decoded by `EffectSpecific`.

use super::{SpanReader, SpanWriter, WireRecord, WireResult};
use crate::types::{BiquadFilterParameter, MAX_EFFECT_CHANNELS};

pub const EFFECT_SPECIFIC_SIZE: usize = 160;
const MAPPING_SIZE: usize = 16;

/// Raw effect type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectType {
    Invalid = 0,
    BufferMix = 1,
    AuxiliaryBuffer = 2,
    Delay = 3,
    Reverb = 4,
    Reverb3d = 5,
    BiquadFilter = 6,
    Limiter = 7,
    CaptureBuffer = 8,
    Compressor = 9,
}

impl EffectType {
    /// `None` for tags outside the closed set
    pub fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => EffectType::Invalid,
            1 => EffectType::BufferMix,
            2 => EffectType::AuxiliaryBuffer,
            3 => EffectType::Delay,
            4 => EffectType::Reverb,
            5 => EffectType::Reverb3d,
            6 => EffectType::BiquadFilter,
            7 => EffectType::Limiter,
            8 => EffectType::CaptureBuffer,
            9 => EffectType::Compressor,
            _ => return None,
        })
    }
}

/// Input/output buffer indices shared by every effect type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelMapping {
    pub input: [u8; MAX_EFFECT_CHANNELS],
    pub output: [u8; MAX_EFFECT_CHANNELS],
    pub channel_count_max: u16,
    pub channel_count: u16,
}

/// Type-specific part of an effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EffectSpecific {
    #[default]
    None,
    BufferMix {
        volumes: [f32; MAX_EFFECT_CHANNELS],
    },
    /// Shared by auxiliary and capture buffers; capture ignores the return side
    Auxiliary {
        send_buffer_info: u64,
        send_buffer: u64,
        return_buffer_info: u64,
        return_buffer: u64,
        count_max: u32,
        sample_rate: u32,
    },
    BiquadFilter {
        filter: BiquadFilterParameter,
    },
    /// Delay, reverb and 3D reverb: the DSP state is opaque to the scheduler
    TimeBased {
        sample_rate: u32,
    },
    Limiter {
        statistics_enabled: bool,
        statistics_reset: bool,
    },
}

impl EffectSpecific {
    pub fn decode(effect_type: EffectType, bytes: &[u8; EFFECT_SPECIFIC_SIZE]) -> WireResult<(ChannelMapping, Self)> {
        let mut r = SpanReader::new(bytes);
        let mut mapping = ChannelMapping {
            input: r.read_array()?,
            output: r.read_array()?,
            ..Default::default()
        };
        mapping.channel_count_max = r.read_u16()?;
        mapping.channel_count = r.read_u16()?;

        let specific = match effect_type {
            EffectType::Invalid | EffectType::Compressor => EffectSpecific::None,
            EffectType::BufferMix => {
                let mut volumes = [0.0; MAX_EFFECT_CHANNELS];
                for v in volumes.iter_mut() {
                    *v = r.read_f32()?;
                }
                EffectSpecific::BufferMix { volumes }
            }
            EffectType::AuxiliaryBuffer | EffectType::CaptureBuffer => EffectSpecific::Auxiliary {
                send_buffer_info: r.read_u64()?,
                send_buffer: r.read_u64()?,
                return_buffer_info: r.read_u64()?,
                return_buffer: r.read_u64()?,
                count_max: r.read_u32()?,
                sample_rate: r.read_u32()?,
            },
            EffectType::BiquadFilter => {
                let mut filter = BiquadFilterParameter {
                    enable: true,
                    ..Default::default()
                };
                for n in filter.numerator.iter_mut() {
                    *n = r.read_f32()?;
                }
                for d in filter.denominator.iter_mut() {
                    *d = r.read_f32()?;
                }
                EffectSpecific::BiquadFilter { filter }
            }
            EffectType::Delay | EffectType::Reverb | EffectType::Reverb3d => EffectSpecific::TimeBased {
                sample_rate: r.read_u32()?,
            },
            EffectType::Limiter => EffectSpecific::Limiter {
                statistics_enabled: r.read_bool()?,
                statistics_reset: r.read_bool()?,
            },
        };
        Ok((mapping, specific))
    }

    pub fn encode(&self, mapping: &ChannelMapping) -> [u8; EFFECT_SPECIFIC_SIZE] {
        let mut bytes = [0u8; EFFECT_SPECIFIC_SIZE];
        let encoded = self.encode_into(mapping, &mut SpanWriter::new(&mut bytes));
        debug_assert!(encoded.is_ok());
        bytes
    }

    fn encode_into(&self, mapping: &ChannelMapping, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_bytes(&mapping.input)?;
        w.write_bytes(&mapping.output)?;
        w.write_u16(mapping.channel_count_max)?;
        w.write_u16(mapping.channel_count)?;
        debug_assert_eq!(w.position(), MAPPING_SIZE);

        match self {
            EffectSpecific::None => Ok(()),
            EffectSpecific::BufferMix { volumes } => {
                for v in volumes {
                    w.write_f32(*v)?;
                }
                Ok(())
            }
            EffectSpecific::Auxiliary {
                send_buffer_info,
                send_buffer,
                return_buffer_info,
                return_buffer,
                count_max,
                sample_rate,
            } => {
                w.write_u64(*send_buffer_info)?;
                w.write_u64(*send_buffer)?;
                w.write_u64(*return_buffer_info)?;
                w.write_u64(*return_buffer)?;
                w.write_u32(*count_max)?;
                w.write_u32(*sample_rate)
            }
            EffectSpecific::BiquadFilter { filter } => {
                for n in &filter.numerator {
                    w.write_f32(*n)?;
                }
                for d in &filter.denominator {
                    w.write_f32(*d)?;
                }
                Ok(())
            }
            EffectSpecific::TimeBased { sample_rate } => w.write_u32(*sample_rate),
            EffectSpecific::Limiter {
                statistics_enabled,
                statistics_reset,
            } => {
                w.write_bool(*statistics_enabled)?;
                w.write_bool(*statistics_reset)
            }
        }
    }
}

/// Decoded effect parameter, independent of the wire layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParameter {
    /// Raw tag; validated by the updater so unknown tags can be reported
    pub effect_type: u8,
    pub is_new: bool,
    pub is_enabled: bool,
    pub mix_id: u32,
    pub buffer_base: u64,
    pub buffer_size: u64,
    pub processing_order: u32,
    pub specific: [u8; EFFECT_SPECIFIC_SIZE],
}

impl Default for EffectParameter {
    fn default() -> Self {
        Self {
            effect_type: 0,
            is_new: false,
            is_enabled: false,
            mix_id: 0,
            buffer_base: 0,
            buffer_size: 0,
            processing_order: 0,
            specific: [0; EFFECT_SPECIFIC_SIZE],
        }
    }
}

impl EffectParameter {
    fn read_common(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let effect_type = r.read_u8()?;
        let is_new = r.read_bool()?;
        let is_enabled = r.read_bool()?;
        r.skip(1)?;
        let mix_id = r.read_u32()?;
        let buffer_base = r.read_u64()?;
        let buffer_size = r.read_u64()?;
        let processing_order = r.read_u32()?;
        r.skip(4)?;
        Ok(Self {
            effect_type,
            is_new,
            is_enabled,
            mix_id,
            buffer_base,
            buffer_size,
            processing_order,
            specific: r.read_array()?,
        })
    }

    fn write_common(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u8(self.effect_type)?;
        w.write_bool(self.is_new)?;
        w.write_bool(self.is_enabled)?;
        w.write_zeros(1)?;
        w.write_u32(self.mix_id)?;
        w.write_u64(self.buffer_base)?;
        w.write_u64(self.buffer_size)?;
        w.write_u32(self.processing_order)?;
        w.write_zeros(4)?;
        w.write_bytes(&self.specific)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectParameterV1(pub EffectParameter);

impl WireRecord for EffectParameterV1 {
    const SIZE: usize = 192;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        Ok(Self(EffectParameter::read_common(r)?))
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        self.0.write_common(w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectParameterV2(pub EffectParameter);

impl WireRecord for EffectParameterV2 {
    const SIZE: usize = 208;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let param = EffectParameter::read_common(r)?;
        r.skip(16)?;
        Ok(Self(param))
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        self.0.write_common(w)?;
        w.write_zeros(16)
    }
}

/// Usage state reported back for each effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectUsageState {
    #[default]
    Invalid = 0,
    New = 1,
    Enabled = 2,
    Disabled = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectOutStatusV1 {
    pub state: u8,
}

impl WireRecord for EffectOutStatusV1 {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let state = r.read_u8()?;
        r.skip(15)?;
        Ok(Self { state })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u8(self.state)?;
        w.write_zeros(15)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectOutStatusV2 {
    pub state: u8,
    pub result: [u8; 32],
}

impl WireRecord for EffectOutStatusV2 {
    const SIZE: usize = 48;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let state = r.read_u8()?;
        r.skip(15)?;
        Ok(Self {
            state,
            result: r.read_array()?,
        })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u8(self.state)?;
        w.write_zeros(15)?;
        w.write_bytes(&self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_is_not_a_type() {
        assert_eq!(EffectType::from_raw(6), Some(EffectType::BiquadFilter));
        assert_eq!(EffectType::from_raw(42), None);
    }

    #[test]
    fn test_specific_block_decodes_per_type() {
        let mapping = ChannelMapping {
            input: [0, 1, 0, 0, 0, 0],
            output: [2, 3, 0, 0, 0, 0],
            channel_count_max: 2,
            channel_count: 2,
        };
        let specific = EffectSpecific::Auxiliary {
            send_buffer_info: 0x1000,
            send_buffer: 0x2000,
            return_buffer_info: 0x3000,
            return_buffer: 0x4000,
            count_max: 480,
            sample_rate: 48_000,
        };
        let bytes = specific.encode(&mapping);
        let (decoded_mapping, decoded) = EffectSpecific::decode(EffectType::AuxiliaryBuffer, &bytes).unwrap();
        assert_eq!(decoded_mapping, mapping);
        assert_eq!(decoded, specific);

        // the same bytes read as a reverb only expose the leading word
        let (_, as_reverb) = EffectSpecific::decode(EffectType::Reverb, &bytes).unwrap();
        assert_eq!(as_reverb, EffectSpecific::TimeBased { sample_rate: 0x1000 });
    }

    #[test]
    fn test_v2_layout_is_larger() {
        let param = EffectParameter::default();
        assert_eq!(EffectParameterV1(param).to_bytes().len(), 192);
        assert_eq!(EffectParameterV2(param).to_bytes().len(), 208);
        assert_eq!(EffectOutStatusV2::default().to_bytes().len(), 48);
    }
}
