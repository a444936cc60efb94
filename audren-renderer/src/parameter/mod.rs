//! Fixed-layout wire records of the update protocol
//!
//! All records are little-endian with a fixed `SIZE` per negotiated revision.
//! Input records are decoded by the `StateUpdater`; output records are encoded
//! into the reply. Both directions are implemented for every record so that
//! clients (and tests) can build update blobs with the same code.

pub mod cursor;
pub mod effect;
pub mod mix;
pub mod sink;
pub mod splitter;
pub mod voice;

pub use cursor::{SpanReader, SpanWriter};

use crate::behaviour::{ErrorInfo, MAX_ERROR_INFOS};
use crate::error::ResultCode;

pub type WireResult<T> = std::result::Result<T, ResultCode>;

/// A record with a fixed on-wire size
pub trait WireRecord: Sized {
    const SIZE: usize;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self>;

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()>;

    /// Encode into a freshly allocated buffer of exactly `SIZE` bytes
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        let written = self.write(&mut SpanWriter::new(&mut buf));
        debug_assert!(written.is_ok());
        buf
    }
}

/// Header of both the update request and the reply
///
/// In the reply, `behaviour_size` carries the error-info section size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateDataHeader {
    pub revision: u32,
    pub behaviour_size: u32,
    pub memory_pools_size: u32,
    pub voices_size: u32,
    pub voice_resources_size: u32,
    pub effects_size: u32,
    pub mixes_size: u32,
    pub sinks_size: u32,
    pub performance_buffer_size: u32,
    pub render_info_size: u32,
    pub total_size: u32,
}

impl WireRecord for UpdateDataHeader {
    const SIZE: usize = 64;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let header = UpdateDataHeader {
            revision: r.read_u32()?,
            behaviour_size: r.read_u32()?,
            memory_pools_size: r.read_u32()?,
            voices_size: r.read_u32()?,
            voice_resources_size: r.read_u32()?,
            effects_size: r.read_u32()?,
            mixes_size: r.read_u32()?,
            sinks_size: r.read_u32()?,
            performance_buffer_size: r.read_u32()?,
            render_info_size: r.read_u32()?,
            total_size: {
                r.skip(20)?;
                r.read_u32()?
            },
        };
        Ok(header)
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.revision)?;
        w.write_u32(self.behaviour_size)?;
        w.write_u32(self.memory_pools_size)?;
        w.write_u32(self.voices_size)?;
        w.write_u32(self.voice_resources_size)?;
        w.write_u32(self.effects_size)?;
        w.write_u32(self.mixes_size)?;
        w.write_u32(self.sinks_size)?;
        w.write_u32(self.performance_buffer_size)?;
        w.write_u32(self.render_info_size)?;
        w.write_zeros(20)?;
        w.write_u32(self.total_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviourParameter {
    pub user_revision: u32,
    pub flags: u64,
}

impl WireRecord for BehaviourParameter {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let user_revision = r.read_u32()?;
        r.skip(4)?;
        let flags = r.read_u64()?;
        Ok(Self { user_revision, flags })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.user_revision)?;
        w.write_zeros(4)?;
        w.write_u64(self.flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviourErrorInfoOutStatus {
    pub errors: [ErrorInfo; MAX_ERROR_INFOS],
    pub error_count: u32,
}

impl WireRecord for BehaviourErrorInfoOutStatus {
    const SIZE: usize = 176;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let mut errors = [ErrorInfo::default(); MAX_ERROR_INFOS];
        for error in errors.iter_mut() {
            error.code = r.read_u32()?;
            r.skip(4)?;
            error.extra_info = r.read_u64()?;
        }
        let error_count = r.read_u32()?;
        r.skip(12)?;
        Ok(Self { errors, error_count })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        for error in &self.errors {
            w.write_u32(error.code)?;
            w.write_zeros(4)?;
            w.write_u64(error.extra_info)?;
        }
        w.write_u32(self.error_count)?;
        w.write_zeros(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPoolParameter {
    pub cpu_address: u64,
    pub size: u64,
    pub state: u32,
}

impl WireRecord for MemoryPoolParameter {
    const SIZE: usize = 32;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let param = Self {
            cpu_address: r.read_u64()?,
            size: r.read_u64()?,
            state: r.read_u32()?,
        };
        r.skip(12)?;
        Ok(param)
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u64(self.cpu_address)?;
        w.write_u64(self.size)?;
        w.write_u32(self.state)?;
        w.write_zeros(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPoolOutStatus {
    pub state: u32,
}

impl WireRecord for MemoryPoolOutStatus {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let state = r.read_u32()?;
        r.skip(12)?;
        Ok(Self { state })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.state)?;
        w.write_zeros(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceParameter {
    pub target_node_id: u32,
}

impl WireRecord for PerformanceParameter {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let target_node_id = r.read_u32()?;
        r.skip(12)?;
        Ok(Self { target_node_id })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.target_node_id)?;
        w.write_zeros(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceOutStatus {
    pub history_size: u32,
}

impl WireRecord for PerformanceOutStatus {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let history_size = r.read_u32()?;
        r.skip(12)?;
        Ok(Self { history_size })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u32(self.history_size)?;
        w.write_zeros(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererInfoOutStatus {
    pub elapsed_frame_count: u64,
}

impl WireRecord for RendererInfoOutStatus {
    const SIZE: usize = 16;

    fn read(r: &mut SpanReader<'_>) -> WireResult<Self> {
        let elapsed_frame_count = r.read_u64()?;
        r.skip(8)?;
        Ok(Self { elapsed_frame_count })
    }

    fn write(&self, w: &mut SpanWriter<'_>) -> WireResult<()> {
        w.write_u64(self.elapsed_frame_count)?;
        w.write_zeros(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_and_layout() {
        let header = UpdateDataHeader {
            revision: 13,
            voices_size: 256,
            total_size: 1234,
            ..Default::default()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), UpdateDataHeader::SIZE);
        // total size lives in the last word
        assert_eq!(&bytes[60..64], &1234u32.to_le_bytes());
        let decoded = UpdateDataHeader::read(&mut SpanReader::new(&bytes)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_short_header_is_rejected() {
        let bytes = [0u8; 32];
        assert_eq!(
            UpdateDataHeader::read(&mut SpanReader::new(&bytes)),
            Err(ResultCode::InvalidUpdateInfo)
        );
    }
}
