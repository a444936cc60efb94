//! Update protocol: applies one request blob to the session state
//!
//! The request is a header followed by fixed-layout sections in a fixed
//! order. Each `update_*` call consumes one section, applies it record by
//! record, and appends the matching status records to the reply. A section
//! whose declared size disagrees with the session's element count is
//! rejected before any of its records are read.

use tracing::{debug, trace, warn};

use crate::behaviour::BehaviourInfo;
use crate::error::{Result, ResultCode};
use crate::parameter::effect::{EffectOutStatusV1, EffectOutStatusV2, EffectParameterV1, EffectParameterV2};
use crate::parameter::mix::{MixDirtyOnlyHeader, MixParameter};
use crate::parameter::sink::SinkParameter;
use crate::parameter::voice::{VoiceChannelResourceParameter, VoiceParameterV1, VoiceParameterV2};
use crate::parameter::{
    BehaviourErrorInfoOutStatus, BehaviourParameter, MemoryPoolOutStatus, MemoryPoolParameter,
    PerformanceOutStatus, PerformanceParameter, RendererInfoOutStatus, SpanReader, SpanWriter,
    UpdateDataHeader, WireRecord,
};
use crate::server::memory_pool::{PoolMapper, PoolUpdateResult};
use crate::server::RendererState;

pub struct StateUpdater<'a> {
    input: SpanReader<'a>,
    output: SpanWriter<'a>,
    header: UpdateDataHeader,
    out_header: UpdateDataHeader,
    state: &'a mut RendererState,
    behaviour: &'a mut BehaviourInfo,
    mapper: &'a PoolMapper,
}

/// `declared` must cover exactly `count` records of `record_size` bytes
fn check_section_size(section: &str, declared: u32, count: usize, record_size: usize) -> Result<()> {
    let expected = count * record_size;
    if declared as usize != expected {
        warn!(
            "{} section is {} bytes, expected {} ({} x {})",
            section, declared, expected, count, record_size
        );
        return Err(ResultCode::InvalidUpdateInfo.into());
    }
    Ok(())
}

impl<'a> StateUpdater<'a> {
    /// Read the request header and reserve room for the reply header
    pub fn new(
        input: &'a [u8],
        output: &'a mut [u8],
        state: &'a mut RendererState,
        behaviour: &'a mut BehaviourInfo,
        mapper: &'a PoolMapper,
    ) -> Result<Self> {
        let mut input = SpanReader::new(input);
        let header = UpdateDataHeader::read(&mut input)?;
        if header.revision != behaviour.user_revision() {
            warn!(
                "Update revision {} does not match session revision {}",
                header.revision,
                behaviour.user_revision()
            );
            return Err(ResultCode::InvalidUpdateInfo.into());
        }
        if header.total_size as usize > input.position() + input.remaining() {
            warn!("Update declares {} bytes, request holds fewer", header.total_size);
            return Err(ResultCode::InvalidUpdateInfo.into());
        }

        let mut output = SpanWriter::new(output);
        output.write_zeros(UpdateDataHeader::SIZE)?;

        Ok(Self {
            input,
            output,
            header,
            out_header: UpdateDataHeader {
                revision: header.revision,
                ..Default::default()
            },
            state,
            behaviour,
            mapper,
        })
    }

    pub fn update_behaviour(&mut self) -> Result<()> {
        check_section_size("Behaviour", self.header.behaviour_size, 1, BehaviourParameter::SIZE)?;
        let param = BehaviourParameter::read(&mut self.input)?;
        if param.user_revision != self.behaviour.user_revision() {
            warn!(
                "Behaviour revision {} does not match session revision {}",
                param.user_revision,
                self.behaviour.user_revision()
            );
            return Err(ResultCode::InvalidUpdateInfo.into());
        }
        self.behaviour.update_flags(param.flags);
        Ok(())
    }

    pub fn update_memory_pools(&mut self) -> Result<()> {
        let count = self.state.memory_pools.len();
        check_section_size("Memory pool", self.header.memory_pools_size, count, MemoryPoolParameter::SIZE)?;

        for pool in self.state.memory_pools.iter_mut() {
            let param = MemoryPoolParameter::read(&mut self.input)?;
            let mut out = MemoryPoolOutStatus::default();
            match self.mapper.update(pool, &param, &mut out) {
                PoolUpdateResult::Success => {}
                PoolUpdateResult::InvalidParameter => {
                    warn!("Invalid memory pool request at {:#x}", param.cpu_address);
                    return Err(ResultCode::InvalidUpdateInfo.into());
                }
                PoolUpdateResult::MapError | PoolUpdateResult::UnmapError => {
                    warn!("Memory pool at {:#x} could not be (un)mapped", param.cpu_address);
                    self.behaviour
                        .append_error(ResultCode::InvalidAddressInfo, param.cpu_address);
                }
            }
            out.write(&mut self.output)?;
        }
        self.out_header.memory_pools_size = (count * MemoryPoolOutStatus::SIZE) as u32;
        Ok(())
    }

    pub fn update_voice_channel_resources(&mut self) -> Result<()> {
        let resources = &mut self.state.voices.resources;
        check_section_size(
            "Voice resource",
            self.header.voice_resources_size,
            resources.len(),
            VoiceChannelResourceParameter::SIZE,
        )?;
        for resource in resources.iter_mut() {
            let param = VoiceChannelResourceParameter::read(&mut self.input)?;
            resource.update(&param);
        }
        Ok(())
    }

    pub fn update_voices(&mut self) -> Result<()> {
        let version2 = self.behaviour.is_voice_parameter_v2_supported();
        let record_size = if version2 {
            VoiceParameterV2::SIZE
        } else {
            VoiceParameterV1::SIZE
        };
        let count = self.state.voices.voices.len();
        check_section_size("Voice", self.header.voices_size, count, record_size)?;

        self.state.voices.clear_in_use();
        for index in 0..count {
            let param = if version2 {
                VoiceParameterV2::read(&mut self.input)?.0
            } else {
                VoiceParameterV1::read(&mut self.input)?.0
            };
            let voice = &mut self.state.voices.voices[index];
            if param.in_use {
                voice.update(&param, self.mapper, self.behaviour, &self.state.memory_pools);
            }
            voice.out_status().write(&mut self.output)?;
        }
        self.state.voices.sort();
        trace!("{} voices in use", self.state.voices.sorted().len());

        self.out_header.voices_size = (count * crate::parameter::voice::VoiceOutStatus::SIZE) as u32;
        Ok(())
    }

    pub fn update_effects(&mut self) -> Result<()> {
        let version2 = self.behaviour.is_effect_info_v2_supported();
        let (record_size, status_size) = if version2 {
            (EffectParameterV2::SIZE, EffectOutStatusV2::SIZE)
        } else {
            (EffectParameterV1::SIZE, EffectOutStatusV1::SIZE)
        };
        let count = self.state.effects.len();
        check_section_size("Effect", self.header.effects_size, count, record_size)?;

        for index in 0..count {
            let param = if version2 {
                EffectParameterV2::read(&mut self.input)?.0
            } else {
                EffectParameterV1::read(&mut self.input)?.0
            };
            let effect = &mut self.state.effects[index];
            effect.update(&param, self.mapper, self.behaviour, &self.state.memory_pools)?;

            let state = effect.usage_state as u8;
            if version2 {
                EffectOutStatusV2 {
                    state,
                    ..Default::default()
                }
                .write(&mut self.output)?;
            } else {
                EffectOutStatusV1 { state }.write(&mut self.output)?;
            }
        }
        self.out_header.effects_size = (count * status_size) as u32;
        Ok(())
    }

    /// The splitter blob is self-sized and present only for splitter sessions
    pub fn update_splitter(&mut self) -> Result<()> {
        if !self.state.splitters.is_in_use() {
            return Ok(());
        }
        self.state.splitters.update(&mut self.input)?;
        Ok(())
    }

    pub fn update_mixes(&mut self) -> Result<()> {
        let mix_count = self.state.mixes.mixes.len();
        let mut changed = self.state.splitters.is_in_use();

        if self.behaviour.is_mix_dirty_only_update_supported() {
            let declared = self.header.mixes_size as usize;
            let body = match declared.checked_sub(MixDirtyOnlyHeader::SIZE) {
                Some(body) if body % MixParameter::SIZE == 0 && body / MixParameter::SIZE <= mix_count => body,
                _ => {
                    warn!("Dirty mix section of {} bytes is malformed", declared);
                    return Err(ResultCode::InvalidUpdateInfo.into());
                }
            };
            let dirty = MixDirtyOnlyHeader::read(&mut self.input)?;
            let records = dirty.mix_count as usize;
            if records * MixParameter::SIZE != body {
                warn!(
                    "Dirty mix section of {} bytes does not hold {} mixes",
                    self.header.mixes_size, dirty.mix_count
                );
                return Err(ResultCode::InvalidUpdateInfo.into());
            }
            for _ in 0..records {
                let param = MixParameter::read(&mut self.input)?;
                let mix = self
                    .state
                    .mixes
                    .mixes
                    .get_mut(param.mix_id as usize)
                    .ok_or(ResultCode::InvalidUpdateInfo)?;
                changed |= mix.update(&param);
            }
        } else {
            check_section_size("Mix", self.header.mixes_size, mix_count, MixParameter::SIZE)?;
            for index in 0..mix_count {
                let param = MixParameter::read(&mut self.input)?;
                changed |= self.state.mixes.mixes[index].update(&param);
            }
        }

        if changed {
            self.state.mixes.sort(&self.state.splitters)?;
            self.state.mixes.assign_buffer_offsets()?;
            debug!("Mix graph re-sorted: {:?}", self.state.mixes.sorted());
        }
        self.state.mixes.rebuild_effect_order(&self.state.effects);
        Ok(())
    }

    pub fn update_sinks(&mut self) -> Result<()> {
        let count = self.state.sinks.len();
        check_section_size("Sink", self.header.sinks_size, count, SinkParameter::SIZE)?;

        for index in 0..count {
            let param = SinkParameter::read(&mut self.input)?;
            let sink = &mut self.state.sinks[index];
            sink.update(&param, self.mapper, self.behaviour, &self.state.memory_pools)?;
            sink.out_status().write(&mut self.output)?;
        }
        self.out_header.sinks_size = (count * crate::parameter::sink::SinkOutStatus::SIZE) as u32;
        Ok(())
    }

    pub fn update_performance_buffer(&mut self) -> Result<()> {
        check_section_size(
            "Performance",
            self.header.performance_buffer_size,
            1,
            PerformanceParameter::SIZE,
        )?;
        let param = PerformanceParameter::read(&mut self.input)?;
        let history_size = match self.state.performance.as_mut() {
            Some(performance) => {
                performance.set_target_node_id(param.target_node_id);
                performance.history_len() as u32
            }
            None => 0,
        };
        PerformanceOutStatus { history_size }.write(&mut self.output)?;
        self.out_header.performance_buffer_size = PerformanceOutStatus::SIZE as u32;
        Ok(())
    }

    /// Report and then clear the errors collected during this update
    pub fn update_error_info(&mut self) -> Result<()> {
        let mut status = BehaviourErrorInfoOutStatus::default();
        let errors = self.behaviour.errors();
        status.errors[..errors.len()].copy_from_slice(errors);
        status.error_count = errors.len() as u32;
        if status.error_count > 0 {
            debug!("Reporting {} update errors", status.error_count);
        }
        status.write(&mut self.output)?;
        self.behaviour.clear_errors();
        self.out_header.behaviour_size = BehaviourErrorInfoOutStatus::SIZE as u32;
        Ok(())
    }

    pub fn update_renderer_info(&mut self, elapsed_frame_count: u64) -> Result<()> {
        if !self.behaviour.is_elapsed_frame_count_supported() {
            return Ok(());
        }
        RendererInfoOutStatus { elapsed_frame_count }.write(&mut self.output)?;
        self.out_header.render_info_size = RendererInfoOutStatus::SIZE as u32;
        Ok(())
    }

    fn output_total(&self) -> usize {
        let h = &self.out_header;
        UpdateDataHeader::SIZE
            + [
                h.behaviour_size,
                h.memory_pools_size,
                h.voices_size,
                h.voice_resources_size,
                h.effects_size,
                h.mixes_size,
                h.sinks_size,
                h.performance_buffer_size,
                h.render_info_size,
            ]
            .iter()
            .map(|&size| size as usize)
            .sum::<usize>()
    }

    /// Both cursors must have moved exactly as far as the headers declare
    pub fn check_consumed_size(&self) -> Result<()> {
        let consumed = self.input.position();
        if consumed != self.header.total_size as usize {
            warn!(
                "Update consumed {} bytes, header declares {}",
                consumed, self.header.total_size
            );
            return Err(ResultCode::InvalidUpdateInfo.into());
        }
        let written = self.output.position();
        if written != self.output_total() {
            warn!("Reply holds {} bytes, sections declare {}", written, self.output_total());
            return Err(ResultCode::InvalidUpdateInfo.into());
        }
        Ok(())
    }

    /// Patch the reply header now that every section size is known
    pub fn finish(mut self) -> Result<usize> {
        let total = self.output.position();
        self.out_header.total_size = total as u32;
        let header = self.out_header.to_bytes();
        self.output.patch(0, &header)?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::CURRENT_REVISION;
    use crate::server::memory_pool::IdentityTranslator;
    use crate::types::RendererConfiguration;
    use std::sync::Arc;

    fn session() -> (RendererState, BehaviourInfo, PoolMapper) {
        let config = RendererConfiguration::default();
        let behaviour = BehaviourInfo::new(CURRENT_REVISION);
        let state = RendererState::new(&config, &behaviour);
        let mapper = PoolMapper::new(Arc::new(IdentityTranslator));
        (state, behaviour, mapper)
    }

    fn request(header: UpdateDataHeader, body: &[u8]) -> Vec<u8> {
        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_revision_mismatch_is_rejected() {
        let (mut state, mut behaviour, mapper) = session();
        let input = request(
            UpdateDataHeader {
                revision: CURRENT_REVISION - 1,
                total_size: UpdateDataHeader::SIZE as u32,
                ..Default::default()
            },
            &[],
        );
        let mut output = vec![0u8; 1024];
        let result = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper);
        assert_eq!(result.err().and_then(|e| e.result_code()), Some(ResultCode::InvalidUpdateInfo));
    }

    #[test]
    fn test_total_larger_than_request_is_rejected() {
        let (mut state, mut behaviour, mapper) = session();
        let input = request(
            UpdateDataHeader {
                revision: CURRENT_REVISION,
                total_size: 4096,
                ..Default::default()
            },
            &[],
        );
        let mut output = vec![0u8; 1024];
        let result = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper);
        assert!(result.is_err());
    }

    #[test]
    fn test_behaviour_section_applies_flags() {
        let (mut state, mut behaviour, mapper) = session();
        let body = BehaviourParameter {
            user_revision: CURRENT_REVISION,
            flags: crate::behaviour::FLAG_MEMORY_POOL_FORCE_MAPPING,
        }
        .to_bytes();
        let input = request(
            UpdateDataHeader {
                revision: CURRENT_REVISION,
                behaviour_size: BehaviourParameter::SIZE as u32,
                total_size: (UpdateDataHeader::SIZE + BehaviourParameter::SIZE) as u32,
                ..Default::default()
            },
            &body,
        );
        let mut output = vec![0u8; 1024];
        let mut updater = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper).unwrap();
        updater.update_behaviour().unwrap();
        drop(updater);
        assert!(behaviour.is_memory_pool_force_mapping_enabled());
    }

    #[test]
    fn test_short_section_reads_nothing() {
        let (mut state, mut behaviour, mapper) = session();
        let short = (state.voices.voices.len() - 1) * VoiceParameterV2::SIZE;
        let input = request(
            UpdateDataHeader {
                revision: CURRENT_REVISION,
                voices_size: short as u32,
                total_size: (UpdateDataHeader::SIZE + short) as u32,
                ..Default::default()
            },
            &vec![0u8; short],
        );
        let mut output = vec![0u8; 4096];
        let mut updater = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper).unwrap();
        let result = updater.update_voices();
        assert_eq!(result.err().and_then(|e| e.result_code()), Some(ResultCode::InvalidUpdateInfo));
        assert_eq!(updater.input.position(), UpdateDataHeader::SIZE);
    }

    #[test]
    fn test_malformed_dirty_mix_section_reads_nothing() {
        for declared in [16, MixDirtyOnlyHeader::SIZE + MixParameter::SIZE + 1] {
            let (mut state, mut behaviour, mapper) = session();
            let body = vec![0u8; MixDirtyOnlyHeader::SIZE + MixParameter::SIZE + 1];
            let input = request(
                UpdateDataHeader {
                    revision: CURRENT_REVISION,
                    mixes_size: declared as u32,
                    total_size: (UpdateDataHeader::SIZE + body.len()) as u32,
                    ..Default::default()
                },
                &body,
            );
            let mut output = vec![0u8; 1024];
            let mut updater = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper).unwrap();
            let result = updater.update_mixes();
            assert_eq!(result.err().and_then(|e| e.result_code()), Some(ResultCode::InvalidUpdateInfo));
            assert_eq!(updater.input.position(), UpdateDataHeader::SIZE, "declared {}", declared);
        }
    }

    #[test]
    fn test_reply_header_is_patched() {
        let (mut state, mut behaviour, mapper) = session();
        behaviour.append_error(ResultCode::InvalidAddressInfo, 0x1000);
        let input = request(
            UpdateDataHeader {
                revision: CURRENT_REVISION,
                total_size: UpdateDataHeader::SIZE as u32,
                ..Default::default()
            },
            &[],
        );
        let mut output = vec![0u8; 1024];
        let mut updater = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper).unwrap();
        updater.update_error_info().unwrap();
        updater.update_renderer_info(7).unwrap();
        updater.check_consumed_size().unwrap();
        let written = updater.finish().unwrap();

        let expected = UpdateDataHeader::SIZE + BehaviourErrorInfoOutStatus::SIZE + RendererInfoOutStatus::SIZE;
        assert_eq!(written, expected);
        let header = UpdateDataHeader::read(&mut SpanReader::new(&output)).unwrap();
        assert_eq!(header.total_size as usize, expected);
        assert_eq!(header.behaviour_size as usize, BehaviourErrorInfoOutStatus::SIZE);

        let mut reader = SpanReader::new(&output[UpdateDataHeader::SIZE..]);
        let errors = BehaviourErrorInfoOutStatus::read(&mut reader).unwrap();
        assert_eq!(errors.error_count, 1);
        assert_eq!(errors.errors[0].code, ResultCode::InvalidAddressInfo.code());
        assert!(behaviour.errors().is_empty());
    }

    #[test]
    fn test_unconsumed_input_fails_check() {
        let (mut state, mut behaviour, mapper) = session();
        let input = request(
            UpdateDataHeader {
                revision: CURRENT_REVISION,
                total_size: (UpdateDataHeader::SIZE + 16) as u32,
                ..Default::default()
            },
            &[0u8; 16],
        );
        let mut output = vec![0u8; 1024];
        let updater = StateUpdater::new(&input, &mut output, &mut state, &mut behaviour, &mapper).unwrap();
        assert!(updater.check_consumed_size().is_err());
    }
}
