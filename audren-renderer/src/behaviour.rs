//! Negotiated behaviour revision and feature capabilities
//!
//! The user revision is fixed at initialise. Every wire-layout or algorithm
//! variant in the renderer is selected by asking this record, never by
//! looking at the revision number directly.

use crate::error::ResultCode;
use tracing::warn;

pub const MIN_REVISION: u32 = 1;
pub const CURRENT_REVISION: u32 = 13;

const REVISION_SPLITTER: u32 = 2;
const REVISION_SPLITTER_BUG_FIXED: u32 = 3;
const REVISION_ELAPSED_FRAME_COUNT: u32 = 4;
const REVISION_VOICE_DROP: u32 = 5;
const REVISION_MIX_DIRTY_ONLY_UPDATE: u32 = 7;
const REVISION_WAVE_BUFFER_V2: u32 = 8;
const REVISION_EFFECT_INFO_V2: u32 = 9;
const REVISION_BIQUAD_GROUPED_OPTIMIZATION: u32 = 10;
const REVISION_ESTIMATOR_V5: u32 = 11;
const REVISION_SPLITTER_BIQUAD: u32 = 12;
const REVISION_VOICE_PARAMETER_V2: u32 = 13;

/// Capacity of the per-update error log
pub const MAX_ERROR_INFOS: usize = 10;

/// Behaviour flag: map wave buffers outside registered pools on demand
pub const FLAG_MEMORY_POOL_FORCE_MAPPING: u64 = 1;

/// One entry of the error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorInfo {
    pub code: u32,
    pub extra_info: u64,
}

#[derive(Debug, Clone)]
pub struct BehaviourInfo {
    user_revision: u32,
    flags: u64,
    errors: [ErrorInfo; MAX_ERROR_INFOS],
    error_count: usize,
}

impl BehaviourInfo {
    pub fn new(user_revision: u32) -> Self {
        Self {
            user_revision,
            flags: 0,
            errors: [ErrorInfo::default(); MAX_ERROR_INFOS],
            error_count: 0,
        }
    }

    pub fn check_valid_revision(revision: u32) -> bool {
        (MIN_REVISION..=CURRENT_REVISION).contains(&revision)
    }

    pub fn user_revision(&self) -> u32 {
        self.user_revision
    }

    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn update_flags(&mut self, flags: u64) {
        self.flags = flags;
    }

    fn supports(&self, revision: u32) -> bool {
        self.user_revision >= revision
    }

    pub fn is_splitter_supported(&self) -> bool {
        self.supports(REVISION_SPLITTER)
    }

    pub fn is_splitter_bug_fixed(&self) -> bool {
        self.supports(REVISION_SPLITTER_BUG_FIXED)
    }

    pub fn is_elapsed_frame_count_supported(&self) -> bool {
        self.supports(REVISION_ELAPSED_FRAME_COUNT)
    }

    pub fn is_voice_drop_supported(&self) -> bool {
        self.supports(REVISION_VOICE_DROP)
    }

    pub fn is_mix_dirty_only_update_supported(&self) -> bool {
        self.supports(REVISION_MIX_DIRTY_ONLY_UPDATE)
    }

    pub fn is_wave_buffer_v2_supported(&self) -> bool {
        self.supports(REVISION_WAVE_BUFFER_V2)
    }

    pub fn is_effect_info_v2_supported(&self) -> bool {
        self.supports(REVISION_EFFECT_INFO_V2)
    }

    pub fn is_biquad_grouped_optimization_supported(&self) -> bool {
        self.supports(REVISION_BIQUAD_GROUPED_OPTIMIZATION)
    }

    pub fn is_splitter_biquad_supported(&self) -> bool {
        self.supports(REVISION_SPLITTER_BIQUAD)
    }

    pub fn is_voice_parameter_v2_supported(&self) -> bool {
        self.supports(REVISION_VOICE_PARAMETER_V2)
    }

    /// Limiter with statistics arrived together with effect info v2
    pub fn is_limiter_v2_supported(&self) -> bool {
        self.supports(REVISION_EFFECT_INFO_V2)
    }

    pub fn is_memory_pool_force_mapping_enabled(&self) -> bool {
        self.flags & FLAG_MEMORY_POOL_FORCE_MAPPING != 0
    }

    /// Which cost estimator this revision expects
    pub fn command_estimator_version(&self) -> u32 {
        match self.user_revision {
            r if r >= REVISION_ESTIMATOR_V5 => 5,
            r if r >= REVISION_BIQUAD_GROUPED_OPTIMIZATION => 4,
            r if r >= REVISION_WAVE_BUFFER_V2 => 3,
            r if r >= REVISION_VOICE_DROP => 2,
            _ => 1,
        }
    }

    /// Share of the per-session time slice the DSP may use
    pub fn processing_time_limit(&self) -> f32 {
        if self.supports(REVISION_VOICE_DROP) {
            0.80
        } else if self.supports(REVISION_ELAPSED_FRAME_COUNT) {
            0.75
        } else {
            0.70
        }
    }

    /// Record a recoverable per-record failure
    ///
    /// The log is bounded; once full, further errors are only traced.
    pub fn append_error(&mut self, code: ResultCode, extra_info: u64) {
        if self.error_count < MAX_ERROR_INFOS {
            self.errors[self.error_count] = ErrorInfo {
                code: code.code(),
                extra_info,
            };
            self.error_count += 1;
        } else {
            warn!("Error log full, dropping {:?} (extra {:#x})", code, extra_info);
        }
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors[..self.error_count]
    }

    pub fn clear_errors(&mut self) {
        self.errors = [ErrorInfo::default(); MAX_ERROR_INFOS];
        self.error_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_range() {
        assert!(!BehaviourInfo::check_valid_revision(0));
        assert!(BehaviourInfo::check_valid_revision(1));
        assert!(BehaviourInfo::check_valid_revision(CURRENT_REVISION));
        assert!(!BehaviourInfo::check_valid_revision(CURRENT_REVISION + 1));
    }

    #[test]
    fn test_feature_gates_follow_revision() {
        let old = BehaviourInfo::new(1);
        assert!(!old.is_splitter_supported());
        assert!(!old.is_effect_info_v2_supported());
        assert_eq!(old.command_estimator_version(), 1);
        assert_eq!(old.processing_time_limit(), 0.70);

        let current = BehaviourInfo::new(CURRENT_REVISION);
        assert!(current.is_splitter_supported());
        assert!(current.is_effect_info_v2_supported());
        assert!(current.is_voice_parameter_v2_supported());
        assert_eq!(current.command_estimator_version(), 5);
        assert_eq!(current.processing_time_limit(), 0.80);
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut info = BehaviourInfo::new(CURRENT_REVISION);
        for i in 0..(MAX_ERROR_INFOS as u64 + 5) {
            info.append_error(ResultCode::InvalidAddressInfo, i);
        }
        assert_eq!(info.errors().len(), MAX_ERROR_INFOS);
        assert_eq!(info.errors()[0].extra_info, 0);

        info.clear_errors();
        assert!(info.errors().is_empty());
    }

    #[test]
    fn test_force_mapping_flag() {
        let mut info = BehaviourInfo::new(CURRENT_REVISION);
        assert!(!info.is_memory_pool_force_mapping_enabled());
        info.update_flags(FLAG_MEMORY_POOL_FORCE_MAPPING);
        assert!(info.is_memory_pool_force_mapping_enabled());
    }
}
