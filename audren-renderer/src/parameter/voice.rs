//! Voice wire records
//!
//! Two layouts exist: V1 carries biquad coefficients as Q14 fixed point,
//! V2 (revision 13+) as f32. Everything else is shared.

use super::{SpanReader, SpanWriter, WireRecord, WireResult};
use crate::types::{
    BiquadFilterParameter, MIX_BUFFER_COUNT_MAX, VOICE_BIQUAD_FILTER_COUNT,
    VOICE_CHANNEL_COUNT_MAX, VOICE_WAVE_BUFFER_COUNT,
};

const Q14_ONE: f32 = 16384.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaveBufferParameter {
    pub address: u64,
    pub size: u64,
    pub start_sample_offset: u32,
    pub end_sample_offset: u32,
    pub looping: bool,
    pub is_end_of_stream: bool,
    pub sent_to_server: bool,
}

impl WaveBufferParameter {
    const SIZE: usize = 32;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let wave_buffer = Self {
            address: r.read_u64()?,
            size: r.read_u64()?,
            start_sample_offset: r.read_u32()?,
            end_sample_offset: r.read_u32()?,
            looping: r.read_bool()?,
            is_end_of_stream: r.read_bool()?,
            sent_to_server: r.read_bool()?,
        };
        r.skip(5)?;
        Ok(wave_buffer)
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u64(self.address)?;
        w.write_u64(self.size)?;
        w.write_u32(self.start_sample_offset)?;
        w.write_u32(self.end_sample_offset)?;
        w.write_bool(self.looping)?;
        w.write_bool(self.is_end_of_stream)?;
        w.write_bool(self.sent_to_server)?;
        w.write_zeros(5)
    }
}

/// Decoded voice parameter, independent of the wire layout
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceParameter {
    pub id: u32,
    pub node_id: u32,
    pub is_new: bool,
    pub in_use: bool,
    pub play_state: u8,
    pub sample_format: u8,
    pub sample_rate: u32,
    pub priority: u32,
    pub sorting_order: u32,
    pub channel_count: u32,
    pub pitch: f32,
    pub volume: f32,
    pub biquad_filters: [BiquadFilterParameter; VOICE_BIQUAD_FILTER_COUNT],
    pub wave_buffer_count: u32,
    pub wave_buffer_index: u32,
    pub mix_id: u32,
    pub splitter_id: u32,
    pub channel_resource_ids: [u32; VOICE_CHANNEL_COUNT_MAX],
    pub flush_wave_buffer_count: u8,
    pub wave_buffers: [WaveBufferParameter; VOICE_WAVE_BUFFER_COUNT],
}

impl VoiceParameter {
    fn read_head(r: &mut SpanReader<'_>) -> WireResult<Self> {
        Ok(Self {
            id: r.read_u32()?,
            node_id: r.read_u32()?,
            is_new: r.read_bool()?,
            in_use: r.read_bool()?,
            play_state: r.read_u8()?,
            sample_format: r.read_u8()?,
            sample_rate: r.read_u32()?,
            priority: r.read_u32()?,
            sorting_order: r.read_u32()?,
            channel_count: r.read_u32()?,
            pitch: r.read_f32()?,
            volume: r.read_f32()?,
            ..Default::default()
        })
    }

    fn write_head(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.id)?;
        w.write_u32(self.node_id)?;
        w.write_bool(self.is_new)?;
        w.write_bool(self.in_use)?;
        w.write_u8(self.play_state)?;
        w.write_u8(self.sample_format)?;
        w.write_u32(self.sample_rate)?;
        w.write_u32(self.priority)?;
        w.write_u32(self.sorting_order)?;
        w.write_u32(self.channel_count)?;
        w.write_f32(self.pitch)?;
        w.write_f32(self.volume)
    }

    fn read_tail(&mut self, r: &mut SpanReader<'_>) -> WireResult<()> {
        self.wave_buffer_count = r.read_u32()?;
        self.wave_buffer_index = r.read_u32()?;
        self.mix_id = r.read_u32()?;
        self.splitter_id = r.read_u32()?;
        for id in self.channel_resource_ids.iter_mut() {
            *id = r.read_u32()?;
        }
        self.flush_wave_buffer_count = r.read_u8()?;
        r.skip(3)?;
        for wave_buffer in self.wave_buffers.iter_mut() {
            *wave_buffer = WaveBufferParameter::read(r)?;
        }
        Ok(())
    }

    fn write_tail(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.wave_buffer_count)?;
        w.write_u32(self.wave_buffer_index)?;
        w.write_u32(self.mix_id)?;
        w.write_u32(self.splitter_id)?;
        for id in &self.channel_resource_ids {
            w.write_u32(*id)?;
        }
        w.write_u8(self.flush_wave_buffer_count)?;
        w.write_zeros(3)?;
        for wave_buffer in &self.wave_buffers {
            wave_buffer.write(w)?;
        }
        Ok(())
    }
}

/// Legacy layout with Q14 biquad coefficients
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceParameterV1(pub VoiceParameter);

impl WireRecord for VoiceParameterV1 {
    const SIZE: usize = 232;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let mut param = VoiceParameter::read_head(r)?;
        for filter in param.biquad_filters.iter_mut() {
            filter.enable = r.read_bool()?;
            r.skip(1)?;
            for n in filter.numerator.iter_mut() {
                *n = r.read_i16()? as f32 / Q14_ONE;
            }
            for d in filter.denominator.iter_mut() {
                *d = r.read_i16()? as f32 / Q14_ONE;
            }
        }
        param.read_tail(r)?;
        Ok(Self(param))
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        self.0.write_head(w)?;
        for filter in &self.0.biquad_filters {
            w.write_bool(filter.enable)?;
            w.write_zeros(1)?;
            for n in &filter.numerator {
                w.write_i16((n * Q14_ONE) as i16)?;
            }
            for d in &filter.denominator {
                w.write_i16((d * Q14_ONE) as i16)?;
            }
        }
        self.0.write_tail(w)
    }
}

/// Current layout with f32 biquad coefficients
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceParameterV2(pub VoiceParameter);

impl WireRecord for VoiceParameterV2 {
    const SIZE: usize = 256;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let mut param = VoiceParameter::read_head(r)?;
        for filter in param.biquad_filters.iter_mut() {
            *filter = read_biquad_v2(r)?;
        }
        param.read_tail(r)?;
        Ok(Self(param))
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        self.0.write_head(w)?;
        for filter in &self.0.biquad_filters {
            write_biquad_v2(filter, w)?;
        }
        self.0.write_tail(w)
    }
}

/// 24-byte float biquad, shared with splitter destinations
pub(crate) fn read_biquad_v2(r: &mut SpanReader<'_>) -> WireResult<BiquadFilterParameter> {
    let mut filter = BiquadFilterParameter {
        enable: r.read_bool()?,
        ..Default::default()
    };
    r.skip(3)?;
    for n in filter.numerator.iter_mut() {
        *n = r.read_f32()?;
    }
    for d in filter.denominator.iter_mut() {
        *d = r.read_f32()?;
    }
    Ok(filter)
}

pub(crate) fn write_biquad_v2(filter: &BiquadFilterParameter, w: &mut SpanWriter<'_>) -> WireResult<()> {
    w.write_bool(filter.enable)?;
    w.write_zeros(3)?;
    for n in &filter.numerator {
        w.write_f32(*n)?;
    }
    for d in &filter.denominator {
        w.write_f32(*d)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceOutStatus {
    pub played_sample_count: u64,
    pub played_wave_buffers_count: u32,
    pub voice_drop_flag: bool,
}

impl WireRecord for VoiceOutStatus {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let status = Self {
            played_sample_count: r.read_u64()?,
            played_wave_buffers_count: r.read_u32()?,
            voice_drop_flag: r.read_bool()?,
        };
        r.skip(3)?;
        Ok(status)
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u64(self.played_sample_count)?;
        w.write_u32(self.played_wave_buffers_count)?;
        w.write_bool(self.voice_drop_flag)?;
        w.write_zeros(3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceChannelResourceParameter {
    pub id: u32,
    pub mix_volumes: [f32; MIX_BUFFER_COUNT_MAX],
    pub is_used: bool,
}

impl WireRecord for VoiceChannelResourceParameter {
    const SIZE: usize = 112;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let id = r.read_u32()?;
        let mut mix_volumes = [0.0; MIX_BUFFER_COUNT_MAX];
        for v in mix_volumes.iter_mut() {
            *v = r.read_f32()?;
        }
        let is_used = r.read_bool()?;
        r.skip(11)?;
        Ok(Self { id, mix_volumes, is_used })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.id)?;
        for v in &self.mix_volumes {
            w.write_f32(*v)?;
        }
        w.write_bool(self.is_used)?;
        w.write_zeros(11)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VoiceParameter {
        let mut param = VoiceParameter {
            id: 3,
            node_id: 0x1003_0000,
            in_use: true,
            sample_format: 2,
            sample_rate: 48_000,
            priority: 10,
            channel_count: 2,
            volume: 0.5,
            mix_id: 0,
            wave_buffer_count: 1,
            ..Default::default()
        };
        param.biquad_filters[1] = BiquadFilterParameter {
            enable: true,
            numerator: [0.5, -0.25, 0.125],
            denominator: [0.75, -0.5],
        };
        param.wave_buffers[0].address = 0x8000;
        param.wave_buffers[0].end_sample_offset = 480;
        param
    }

    #[test]
    fn test_layouts_have_distinct_sizes() {
        assert_eq!(VoiceParameterV1(sample()).to_bytes().len(), 232);
        assert_eq!(VoiceParameterV2(sample()).to_bytes().len(), 256);
    }

    #[test]
    fn test_q14_coefficients_survive_v1() {
        let bytes = VoiceParameterV1(sample()).to_bytes();
        let decoded = VoiceParameterV1::read(&mut SpanReader::new(&bytes)).unwrap().0;
        // all sample coefficients are exactly representable in Q14
        assert_eq!(decoded, sample());
    }
}
