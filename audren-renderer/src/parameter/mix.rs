//! Mix wire records

use super::{SpanReader, SpanWriter, WireRecord, WireResult};
use crate::types::{MIX_BUFFER_COUNT_MAX, UNUSED_MIX_ID, UNUSED_SPLITTER_ID};

/// Matrix of per-buffer send volumes, `[input][output]`
pub type MixVolumes = [[f32; MIX_BUFFER_COUNT_MAX]; MIX_BUFFER_COUNT_MAX];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParameter {
    pub volume: f32,
    pub mix_id: u32,
    pub sample_rate: u32,
    pub buffer_count: u32,
    pub is_used: bool,
    pub is_dirty: bool,
    pub node_id: u32,
    pub destination_mix_id: u32,
    pub destination_splitter_id: u32,
    pub volumes: MixVolumes,
}

impl Default for MixParameter {
    fn default() -> Self {
        Self {
            volume: 1.0,
            mix_id: 0,
            sample_rate: 0,
            buffer_count: 0,
            is_used: false,
            is_dirty: false,
            node_id: 0,
            destination_mix_id: UNUSED_MIX_ID,
            destination_splitter_id: UNUSED_SPLITTER_ID,
            volumes: [[0.0; MIX_BUFFER_COUNT_MAX]; MIX_BUFFER_COUNT_MAX],
        }
    }
}

impl WireRecord for MixParameter {
    const SIZE: usize = 2336;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let volume = r.read_f32()?;
        let mix_id = r.read_u32()?;
        let sample_rate = r.read_u32()?;
        let buffer_count = r.read_u32()?;
        let is_used = r.read_bool()?;
        let is_dirty = r.read_bool()?;
        r.skip(2)?;
        let node_id = r.read_u32()?;
        let destination_mix_id = r.read_u32()?;
        let destination_splitter_id = r.read_u32()?;

        let mut volumes = [[0.0; MIX_BUFFER_COUNT_MAX]; MIX_BUFFER_COUNT_MAX];
        for row in volumes.iter_mut() {
            for v in row.iter_mut() {
                *v = r.read_f32()?;
            }
        }

        Ok(Self {
            volume,
            mix_id,
            sample_rate,
            buffer_count,
            is_used,
            is_dirty,
            node_id,
            destination_mix_id,
            destination_splitter_id,
            volumes,
        })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_f32(self.volume)?;
        w.write_u32(self.mix_id)?;
        w.write_u32(self.sample_rate)?;
        w.write_u32(self.buffer_count)?;
        w.write_bool(self.is_used)?;
        w.write_bool(self.is_dirty)?;
        w.write_zeros(2)?;
        w.write_u32(self.node_id)?;
        w.write_u32(self.destination_mix_id)?;
        w.write_u32(self.destination_splitter_id)?;
        for row in &self.volumes {
            for v in row {
                w.write_f32(*v)?;
            }
        }
        Ok(())
    }
}

/// Prefix of the mix section when only dirty mixes are sent (revision 7+)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MixDirtyOnlyHeader {
    pub magic: u32,
    pub mix_count: u32,
}

impl WireRecord for MixDirtyOnlyHeader {
    const SIZE: usize = 32;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let magic = r.read_u32()?;
        let mix_count = r.read_u32()?;
        r.skip(24)?;
        Ok(Self { magic, mix_count })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.magic)?;
        w.write_u32(self.mix_count)?;
        w.write_zeros(24)
    }
}
