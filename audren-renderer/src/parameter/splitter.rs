//! Splitter blob records
//!
//! The splitter section has no size in the update header. It starts with an
//! `SNDH` header giving the number of splitter (`SNDI`) and destination
//! (`SNDD`) records that follow, and each splitter record carries its own
//! destination id list, so the blob describes its own length.

use super::voice::{read_biquad_v2, write_biquad_v2};
use super::{SpanReader, SpanWriter, WireRecord, WireResult};
use crate::error::ResultCode;
use crate::types::{BiquadFilterParameter, MIX_BUFFER_COUNT_MAX, SPLITTER_BIQUAD_FILTER_COUNT};

pub const SPLITTER_HEADER_MAGIC: u32 = u32::from_le_bytes(*b"SNDH");
pub const SPLITTER_INFO_MAGIC: u32 = u32::from_le_bytes(*b"SNDI");
pub const SPLITTER_DESTINATION_MAGIC: u32 = u32::from_le_bytes(*b"SNDD");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterHeader {
    pub magic: u32,
    pub splitter_count: u32,
    pub destination_count: u32,
}

impl Default for SplitterHeader {
    fn default() -> Self {
        Self {
            magic: SPLITTER_HEADER_MAGIC,
            splitter_count: 0,
            destination_count: 0,
        }
    }
}

impl WireRecord for SplitterHeader {
    const SIZE: usize = 32;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let header = Self {
            magic: r.read_u32()?,
            splitter_count: r.read_u32()?,
            destination_count: r.read_u32()?,
        };
        r.skip(20)?;
        Ok(header)
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.magic)?;
        w.write_u32(self.splitter_count)?;
        w.write_u32(self.destination_count)?;
        w.write_zeros(20)
    }
}

/// `SNDI` record: fixed head followed by `destination_ids.len()` ids
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitterParameter {
    pub id: u32,
    pub sample_rate: u32,
    pub destination_ids: Vec<u32>,
}

impl SplitterParameter {
    pub const HEAD_SIZE: usize = 16;

    pub fn encoded_size(&self) -> usize {
        Self::HEAD_SIZE + self.destination_ids.len() * 4
    }

    /// Reads one record; `destination_limit` bounds the id list so a corrupt
    /// count cannot drive an unbounded allocation
    pub fn read(r: &mut SpanReader<'_>, destination_limit: usize) -> WireResult<Self> {
        if r.read_u32()? != SPLITTER_INFO_MAGIC {
            return Err(ResultCode::InvalidUpdateInfo);
        }
        let id = r.read_u32()?;
        let sample_rate = r.read_u32()?;
        let count = r.read_u32()? as usize;
        if count > destination_limit {
            return Err(ResultCode::InvalidUpdateInfo);
        }
        let mut destination_ids = Vec::with_capacity(count);
        for _ in 0..count {
            destination_ids.push(r.read_u32()?);
        }
        Ok(Self {
            id,
            sample_rate,
            destination_ids,
        })
    }

    pub fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(SPLITTER_INFO_MAGIC)?;
        w.write_u32(self.id)?;
        w.write_u32(self.sample_rate)?;
        w.write_u32(self.destination_ids.len() as u32)?;
        for id in &self.destination_ids {
            w.write_u32(*id)?;
        }
        Ok(())
    }
}

/// `SNDD` record, decoded independently of layout
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitterDestinationParameter {
    pub id: u32,
    pub destination_mix_id: u32,
    pub volumes: [f32; MIX_BUFFER_COUNT_MAX],
    pub is_used: bool,
    pub biquad_filters: [BiquadFilterParameter; SPLITTER_BIQUAD_FILTER_COUNT],
}

impl SplitterDestinationParameter {
    fn read_common(r: &mut SpanReader<'_>) -> WireResult<Self> {
        if r.read_u32()? != SPLITTER_DESTINATION_MAGIC {
            return Err(ResultCode::InvalidUpdateInfo);
        }
        let id = r.read_u32()?;
        let destination_mix_id = r.read_u32()?;
        let mut volumes = [0.0; MIX_BUFFER_COUNT_MAX];
        for v in volumes.iter_mut() {
            *v = r.read_f32()?;
        }
        let is_used = r.read_bool()?;
        r.skip(3)?;
        Ok(Self {
            id,
            destination_mix_id,
            volumes,
            is_used,
            biquad_filters: Default::default(),
        })
    }

    fn write_common(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(SPLITTER_DESTINATION_MAGIC)?;
        w.write_u32(self.id)?;
        w.write_u32(self.destination_mix_id)?;
        for v in &self.volumes {
            w.write_f32(*v)?;
        }
        w.write_bool(self.is_used)?;
        w.write_zeros(3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitterDestinationV1(pub SplitterDestinationParameter);

impl WireRecord for SplitterDestinationV1 {
    const SIZE: usize = 112;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        Ok(Self(SplitterDestinationParameter::read_common(r)?))
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        self.0.write_common(w)
    }
}

/// Destination with biquad taps (revision 12+)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitterDestinationV2(pub SplitterDestinationParameter);

impl WireRecord for SplitterDestinationV2 {
    const SIZE: usize = 160;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let mut param = SplitterDestinationParameter::read_common(r)?;
        for filter in param.biquad_filters.iter_mut() {
            *filter = read_biquad_v2(r)?;
        }
        Ok(Self(param))
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        self.0.write_common(w)?;
        for filter in &self.0.biquad_filters {
            write_biquad_v2(filter, w)?;
        }
        Ok(())
    }
}
