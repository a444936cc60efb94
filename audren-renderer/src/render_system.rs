//! Session controller
//!
//! One `AudioRenderSystem` per renderer session. It owns the session's
//! graph state and command pool behind a single lock and drives each frame:
//! `update` applies a client request, `send_commands` compiles the graph into
//! a command list, trims it to the DSP budget and hands it to the mixer.
//!
//! All long-lived state is sized once at initialise. The caller's work
//! buffer is carved into aligned regions by `WorkBufferAllocator`; the same
//! carve computes `get_work_buffer_size`, so the two always agree.

use std::mem::{align_of, size_of};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, trace, warn};

use crate::behaviour::BehaviourInfo;
use crate::command::{
    create_estimator, Command, CommandBuffer, CommandEstimator, CommandGenerator, CommandList, CommandPool,
    CommandType,
};
use crate::consumer::MixingConsumer;
use crate::error::{Result, ResultCode};
use crate::parameter::mix::MixVolumes;
use crate::server::effect::EffectState;
use crate::server::memory_pool::{clear_usage, AddressTranslator, MemoryPoolState, PoolMapper, PAGE_SIZE};
use crate::server::mix::MixState;
use crate::server::performance::{PerformanceEntry, PerformanceFrame, MAX_ENTRIES_PER_FRAME};
use crate::server::sink::SinkState;
use crate::server::splitter::{SplitterDestination, SplitterState};
use crate::server::upsampler::UpsamplerManager;
use crate::server::voice::{VoiceChannelResource, VoiceContext, VoiceState};
use crate::server::RendererState;
use crate::state_updater::StateUpdater;
use crate::types::{
    ExecutionMode, NodeId, RendererConfiguration, RenderingDevice,
    AUDIO_PROCESSOR_MAX_UPDATE_TIME_PER_SESSION, MAX_EFFECTS_PER_MIX,
};

/// Alignment of sample buffers inside the work buffer
const BUFFER_ALIGNMENT: usize = 0x40;

/// Upper bound of the voice-drop estimate scale
pub const VOICE_DROP_PARAMETER_MAX: f32 = 4.0;

/// Bump allocator over a work buffer of fixed capacity
#[derive(Debug, Clone)]
pub struct WorkBufferAllocator {
    capacity: usize,
    offset: usize,
}

impl WorkBufferAllocator {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, offset: 0 }
    }

    /// Next `size` bytes at `align`, or `None` once the buffer is exhausted
    pub fn allocate(&mut self, size: usize, align: usize) -> Option<Range<usize>> {
        let align = align.max(1);
        let start = self.offset.checked_add(align - 1)? / align * align;
        let end = start.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.offset = end;
        Some(start..end)
    }

    pub fn allocate_array<T>(&mut self, count: usize) -> Option<Range<usize>> {
        self.allocate(size_of::<T>().checked_mul(count)?, align_of::<T>())
    }

    pub fn used(&self) -> usize {
        self.offset
    }
}

/// Named regions carved out of a session's work buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkBufferLayout {
    pub regions: Vec<(&'static str, Range<usize>)>,
}

impl WorkBufferLayout {
    pub fn used(&self) -> usize {
        self.regions.iter().map(|(_, r)| r.end).max().unwrap_or(0)
    }

    fn carve(
        allocator: &mut WorkBufferAllocator,
        config: &RendererConfiguration,
        behaviour: &BehaviourInfo,
    ) -> Option<Self> {
        let voices = config.voice_count as usize;
        let mixes = config.mix_count() as usize;
        let buffers = config.total_buffer_count() as usize;
        let mut layout = Self::default();
        let mut region = |name: &'static str, range: Option<Range<usize>>| -> Option<()> {
            layout.regions.push((name, range?));
            Some(())
        };

        let samples = buffers * config.sample_count as usize;
        region("mix_buffers", allocator.allocate(samples * size_of::<i32>(), BUFFER_ALIGNMENT))?;
        region("depop", allocator.allocate(buffers * size_of::<i32>(), BUFFER_ALIGNMENT))?;
        region("voices", allocator.allocate_array::<VoiceState>(voices))?;
        region("voice_resources", allocator.allocate_array::<VoiceChannelResource>(voices))?;
        region("voice_order", allocator.allocate_array::<u32>(voices))?;
        region("mixes", allocator.allocate_array::<MixState>(mixes))?;
        region("mix_volumes", allocator.allocate_array::<MixVolumes>(mixes))?;
        region("mix_order", allocator.allocate_array::<u32>(mixes))?;
        region("effect_order", allocator.allocate_array::<u32>(mixes * MAX_EFFECTS_PER_MIX))?;
        region("effects", allocator.allocate_array::<EffectState>(config.effect_count as usize))?;
        region("sinks", allocator.allocate_array::<SinkState>(config.sink_count as usize))?;
        region(
            "memory_pools",
            allocator.allocate_array::<MemoryPoolState>(config.memory_pool_count() as usize),
        )?;

        if behaviour.is_splitter_supported() && config.splitter_count > 0 {
            let splitters = config.splitter_count as usize;
            let destinations = config.splitter_destination_count as usize;
            region("splitters", allocator.allocate_array::<SplitterState>(splitters))?;
            region("splitter_links", allocator.allocate_array::<u32>(splitters * destinations))?;
            region(
                "splitter_destinations",
                allocator.allocate_array::<SplitterDestination>(destinations),
            )?;
        }

        if config.performance_frame_count > 0 {
            let frames = config.performance_frame_count as usize + 1;
            region("performance_frames", allocator.allocate_array::<PerformanceFrame>(frames))?;
            region(
                "performance_entries",
                allocator.allocate_array::<PerformanceEntry>(frames * MAX_ENTRIES_PER_FRAME),
            )?;
        }

        region(
            "commands",
            allocator.allocate_array::<Command>(CommandPool::expected_capacity(config)),
        )?;
        Some(layout)
    }
}

/// Bytes of work buffer a session with `config` needs
pub fn get_work_buffer_size(config: &RendererConfiguration) -> Result<usize> {
    if !BehaviourInfo::check_valid_revision(config.revision) {
        return Err(ResultCode::UnsupportedRevision.into());
    }
    config.validate()?;
    let behaviour = BehaviourInfo::new(config.revision);
    let mut allocator = WorkBufferAllocator::new(usize::MAX);
    let layout = WorkBufferLayout::carve(&mut allocator, config, &behaviour).ok_or(ResultCode::OperationFailed)?;
    let page = PAGE_SIZE as usize;
    Ok(layout.used().div_ceil(page) * page)
}

/// Trim the voice phase of `list` until its cost fits `delta_time`
///
/// Scans from the first data source. Each voice in turn, with all of its
/// channels, is dropped while the remaining voice cost exceeds the budget;
/// scanning stops at the first non-voice node or at a voice of the highest
/// priority. A dropped
/// voice keeps its depop preparation enabled so it fades instead of cutting
/// out. Returns the number of voices dropped.
pub fn compute_voice_drop(
    list: &mut CommandList,
    voices: &mut VoiceContext,
    voices_estimated_time: u64,
    delta_time: u64,
    scale: f32,
) -> u32 {
    let commands = list.commands_mut();
    let Some(first_source) = commands.iter().position(|c| c.command_type.is_data_source()) else {
        return 0;
    };
    // include the voice's own commands that precede its data source
    let first_voice = commands[first_source].node_id;
    let mut index = first_source;
    while index > 0 && same_voice(commands[index - 1].node_id, first_voice) {
        index -= 1;
    }

    let mut remaining = voices_estimated_time as f64;
    let budget = delta_time as f64;
    let mut dropped = 0;

    while index < commands.len() {
        let node_id = commands[index].node_id;
        if remaining <= budget || !node_id.is_voice() {
            break;
        }
        let Some(voice) = voices.voice_for_node_mut(node_id) else {
            break;
        };
        if voice.is_highest_priority() {
            break;
        }
        if !voice.voice_drop_flag {
            voice.voice_drop_flag = true;
            dropped += 1;
            warn!("Dropping voice {} (priority {})", voice.id, voice.priority);
        }

        // all channels of the voice
        while index < commands.len() && same_voice(commands[index].node_id, node_id) {
            let command = &mut commands[index];
            index += 1;
            match command.command_type {
                CommandType::DepopPrepare => command.enabled = true,
                CommandType::Performance => {}
                _ if !command.enabled => {}
                _ => {
                    command.enabled = false;
                    remaining -= f64::from(scale) * f64::from(command.estimated_processing_time);
                }
            }
        }
    }
    dropped
}

fn same_voice(a: NodeId, b: NodeId) -> bool {
    a.is_voice() && b.is_voice() && a.base() == b.base()
}

/// Shared collaborators a session is opened with
#[derive(Clone)]
pub struct SessionResources {
    pub consumer: Arc<dyn MixingConsumer>,
    pub upsamplers: Arc<UpsamplerManager>,
    pub translator: Arc<dyn AddressTranslator>,
}

struct SessionInner {
    config: RendererConfiguration,
    behaviour: BehaviourInfo,
    state: RendererState,
    mapper: PoolMapper,
    pool: CommandPool,
    estimator: Box<dyn CommandEstimator>,
    command_capacity: usize,
    _work_buffer: Vec<u8>,
    layout: WorkBufferLayout,
    active: bool,
    elapsed_frame_count: u64,
    rendering_time_limit_percent: u32,
    voice_drop_parameter: f32,
    voice_drop_count: u32,
    dsp_running_behind: bool,
}

impl SessionInner {
    /// DSP ticks this session may use per frame
    fn max_allocated_time_for_dsp(&self) -> u64 {
        let limit = f64::from(self.behaviour.processing_time_limit());
        let percent = f64::from(self.rendering_time_limit_percent) / 100.0;
        (AUDIO_PROCESSOR_MAX_UPDATE_TIME_PER_SESSION as f64 * limit * percent) as u64
    }

    fn generate_command_list(&mut self, session_id: u32, upsamplers: &Arc<UpsamplerManager>) -> CommandList {
        clear_usage(&mut self.state.memory_pools);

        let list = self.pool.take_list(
            self.config.sample_rate,
            self.config.sample_count,
            self.config.total_buffer_count(),
            self.command_capacity,
        );
        let mut buffer = CommandBuffer::new(list, &mut self.pool, self.estimator.as_ref());
        buffer.generate_clear_mix_buffer(NodeId::default());

        let (voices_time, total_time) = {
            let mut generator = CommandGenerator::new(
                &mut buffer,
                &mut self.state,
                &self.behaviour,
                &self.config,
                upsamplers,
                session_id,
            );
            generator.generate_voices();
            let voices_time = generator.estimated_processing_time();
            generator.generate_sub_mixes();
            generator.generate_final_mix();
            generator.generate_sinks();
            let total_time = generator.estimated_processing_time();
            generator.finish();
            (voices_time, total_time)
        };
        let mut list = buffer.into_list();

        self.voice_drop_count = 0;
        if self.config.voice_drop_enabled && self.behaviour.is_voice_drop_supported() {
            let scale = f64::from(self.voice_drop_parameter);
            let voices = (voices_time as f64 * scale) as u64;
            let total = (total_time as f64 * scale) as u64;
            let delta = self.max_allocated_time_for_dsp().saturating_sub(total.saturating_sub(voices));
            self.voice_drop_count =
                compute_voice_drop(&mut list, &mut self.state.voices, voices, delta, self.voice_drop_parameter);
            if self.voice_drop_count > 0 {
                debug!(
                    "Session {} dropped {} voices (voices {} ticks, budget {})",
                    session_id, self.voice_drop_count, voices, delta
                );
            }
        }
        trace!(
            "Session {} frame: {} commands, {} ticks",
            session_id,
            list.len(),
            list.enabled_estimated_time()
        );
        list
    }
}

/// One renderer session
pub struct AudioRenderSystem {
    session_id: u32,
    inner: Mutex<SessionInner>,
    consumer: Arc<dyn MixingConsumer>,
    upsamplers: Arc<UpsamplerManager>,
}

impl AudioRenderSystem {
    /// Validate `config`, carve `work_buffer` and build the session state
    pub fn initialize(
        config: RendererConfiguration,
        work_buffer: Vec<u8>,
        session_id: u32,
        resources: SessionResources,
    ) -> Result<Self> {
        let required = get_work_buffer_size(&config)?;
        if work_buffer.len() < required {
            warn!(
                "Session {} work buffer holds {} bytes, {} required",
                session_id,
                work_buffer.len(),
                required
            );
            return Err(ResultCode::WorkBufferTooSmall.into());
        }

        let behaviour = BehaviourInfo::new(config.revision);
        let mut allocator = WorkBufferAllocator::new(work_buffer.len());
        let layout =
            WorkBufferLayout::carve(&mut allocator, &config, &behaviour).ok_or(ResultCode::WorkBufferTooSmall)?;
        let estimator = create_estimator(behaviour.command_estimator_version(), config.sample_count)?;

        let state = RendererState::new(&config, &behaviour);
        let pool = CommandPool::for_configuration(&config);
        let command_capacity = CommandPool::expected_capacity(&config);

        info!(
            "Session {} initialised: revision {}, {} voices, {} mixes, estimator v{}",
            session_id,
            config.revision,
            config.voice_count,
            config.mix_count(),
            estimator.version()
        );

        Ok(Self {
            session_id,
            inner: Mutex::new(SessionInner {
                config,
                behaviour,
                state,
                mapper: PoolMapper::new(resources.translator),
                pool,
                estimator,
                command_capacity,
                _work_buffer: work_buffer,
                layout,
                active: false,
                elapsed_frame_count: 0,
                rendering_time_limit_percent: 100,
                voice_drop_parameter: 1.0,
                voice_drop_count: 0,
                dsp_running_behind: false,
            }),
            consumer: resources.consumer,
            upsamplers: resources.upsamplers,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn configuration(&self) -> RendererConfiguration {
        self.lock().config.clone()
    }

    pub fn work_buffer_layout(&self) -> WorkBufferLayout {
        self.lock().layout.clone()
    }

    pub fn start(&self) {
        let mut inner = self.lock();
        inner.active = true;
        info!("Session {} started", self.session_id);
    }

    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.active = false;
        inner.elapsed_frame_count = 0;
        info!("Session {} stopped", self.session_id);
    }

    pub fn disable(&self) {
        self.lock().active = false;
        debug!("Session {} disabled", self.session_id);
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Apply one update request, writing the reply into `output`
    ///
    /// Sections run in wire order and the first failure aborts the rest;
    /// sections applied before it stay applied. Returns the reply size.
    pub fn update(&self, input: &[u8], output: &mut [u8]) -> Result<usize> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Some(performance) = inner.state.performance.as_mut() {
            performance.tap_frame(inner.dsp_running_behind, inner.voice_drop_count);
        }
        inner.dsp_running_behind = false;
        let elapsed_frame_count = inner.elapsed_frame_count;

        let mut updater = StateUpdater::new(input, output, &mut inner.state, &mut inner.behaviour, &inner.mapper)?;
        updater.update_behaviour()?;
        updater.update_memory_pools()?;
        updater.update_voice_channel_resources()?;
        updater.update_voices()?;
        updater.update_effects()?;
        updater.update_splitter()?;
        updater.update_mixes()?;
        updater.update_sinks()?;
        updater.update_performance_buffer()?;
        updater.update_error_info()?;
        updater.update_renderer_info(elapsed_frame_count)?;
        updater.check_consumed_size()?;
        let written = updater.finish()?;

        trace!("Session {} update: {} bytes in, {} out", self.session_id, input.len(), written);
        Ok(written)
    }

    /// Compile and hand off one frame
    ///
    /// While the mixer still holds this session's previous frame nothing is
    /// generated and the session is flagged as running behind.
    pub fn send_commands(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.active {
            return;
        }

        let pool = &mut inner.pool;
        self.consumer
            .take_finished(self.session_id, &mut |list| pool.release_list(list));

        if self.consumer.has_remaining_commands(self.session_id) {
            if !inner.dsp_running_behind {
                warn!("Session {} DSP running behind, frame skipped", self.session_id);
            }
            inner.dsp_running_behind = true;
            return;
        }

        let list = inner.generate_command_list(self.session_id, &self.upsamplers);
        inner.elapsed_frame_count += 1;

        let deadline = inner.max_allocated_time_for_dsp();
        if let Err(list) = self
            .consumer
            .send(self.session_id, list, deadline, u64::from(self.session_id))
        {
            warn!("Mixer refused session {} frame", self.session_id);
            inner.pool.release_list(list);
        }
    }

    /// Build a frame without handing it off
    ///
    /// Admission control still runs. Give the list back with `release_list`.
    pub fn generate_command_list(&self) -> CommandList {
        self.lock().generate_command_list(self.session_id, &self.upsamplers)
    }

    pub fn release_list(&self, list: CommandList) {
        self.lock().pool.release_list(list);
    }

    /// Rendering on the caller's thread; only meaningful for manual sessions
    pub fn execute_audio_renderer_rendering(&self) -> Result<()> {
        let inner = self.lock();
        if inner.config.execution_mode == ExecutionMode::Manual && inner.config.rendering_device == RenderingDevice::Cpu
        {
            return Err(ResultCode::UnsupportedOperation.into());
        }
        Err(ResultCode::InvalidExecutionContextOperation.into())
    }

    pub fn set_rendering_time_limit_percent(&self, percent: u32) {
        let percent = percent.min(100);
        self.lock().rendering_time_limit_percent = percent;
        debug!("Session {} rendering limit {}%", self.session_id, percent);
    }

    pub fn rendering_time_limit_percent(&self) -> u32 {
        self.lock().rendering_time_limit_percent
    }

    /// Scale applied to estimates when deciding voice drops
    pub fn set_voice_drop_parameter(&self, parameter: f32) {
        let parameter = if parameter.is_nan() {
            1.0
        } else {
            parameter.clamp(0.0, VOICE_DROP_PARAMETER_MAX)
        };
        self.lock().voice_drop_parameter = parameter;
    }

    pub fn voice_drop_parameter(&self) -> f32 {
        self.lock().voice_drop_parameter
    }

    /// Voices dropped while generating the latest frame
    pub fn voice_drop_count(&self) -> u32 {
        self.lock().voice_drop_count
    }

    pub fn elapsed_frame_count(&self) -> u64 {
        self.lock().elapsed_frame_count
    }

    pub fn is_dsp_running_behind(&self) -> bool {
        self.lock().dsp_running_behind
    }

    /// Ticks the DSP may spend on one frame of this session
    pub fn max_allocated_time_for_dsp(&self) -> u64 {
        self.lock().max_allocated_time_for_dsp()
    }

    /// Swap the cost estimator; used by tools and tests to model load
    pub fn replace_estimator(&self, estimator: Box<dyn CommandEstimator>) {
        let mut inner = self.lock();
        debug!(
            "Session {} estimator v{} replaced by v{}",
            self.session_id,
            inner.estimator.version(),
            estimator.version()
        );
        inner.estimator = estimator;
    }

    /// Frames recorded by the performance manager since the last drain
    pub fn drain_performance_history(&self) -> Vec<PerformanceFrame> {
        self.lock()
            .state
            .performance
            .as_mut()
            .map(|p| p.drain_history())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::DataSourceCommand;
    use crate::types::NodeIdType;

    #[test]
    fn test_allocator_aligns_and_bounds() {
        let mut allocator = WorkBufferAllocator::new(128);
        assert_eq!(allocator.allocate(3, 1), Some(0..3));
        assert_eq!(allocator.allocate(8, 8), Some(8..16));
        assert_eq!(allocator.allocate(64, 64), Some(64..128));
        assert_eq!(allocator.allocate(1, 1), None);
        assert_eq!(allocator.used(), 128);
    }

    #[test]
    fn test_work_buffer_size_is_page_rounded_and_grows() {
        let config = RendererConfiguration::default();
        let size = get_work_buffer_size(&config).unwrap();
        assert_eq!(size % PAGE_SIZE as usize, 0);

        let bigger = RendererConfiguration {
            voice_count: 96,
            ..config
        };
        assert!(get_work_buffer_size(&bigger).unwrap() > size);
    }

    #[test]
    fn test_work_buffer_size_rejects_bad_revision() {
        let config = RendererConfiguration {
            revision: 99,
            ..Default::default()
        };
        let err = get_work_buffer_size(&config).unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::UnsupportedRevision));
    }

    fn voice_frame(voices: &mut VoiceContext, ids: &[u32], channels: u32) -> CommandList {
        let estimator = create_estimator(5, 240).unwrap();
        let mut pool = CommandPool::empty();
        let mut buffer = CommandBuffer::new(CommandList::new(48_000, 240, 30, 32), &mut pool, estimator.as_ref());
        buffer.generate_clear_mix_buffer(NodeId::default());
        for &id in ids {
            voices.voices[id as usize].in_use = true;
            voices.voices[id as usize].priority = 10;
            for channel in 0..channels {
                let node = NodeId::new(NodeIdType::Voice, id, channel);
                buffer.generate_depop_prepare(0, 2, node, false);
                buffer.generate_data_source(
                    CommandType::PcmInt16DataSourceVersion2,
                    DataSourceCommand {
                        voice_id: id,
                        ..Default::default()
                    },
                    node,
                );
                buffer.generate_volume_ramp(24, 24, 1.0, 1.0, node);
                buffer.generate_mix_ramp(24, channel as u16, 1.0, 1.0, node);
            }
        }
        buffer.generate_depop_for_mix_buffers(0, 2, NodeId::new(NodeIdType::Mix, 0, 0));
        buffer.into_list()
    }

    #[test]
    fn test_voice_drop_stops_once_budget_fits() {
        let mut voices = VoiceContext::new(4);
        let mut list = voice_frame(&mut voices, &[0, 1, 2], 1);
        let voice_cost: u64 = list
            .iter()
            .filter(|c| c.node_id.is_voice() && c.enabled)
            .map(|c| u64::from(c.estimated_processing_time))
            .sum();

        // room for two of the three voices
        let per_voice = voice_cost / 3;
        let dropped = compute_voice_drop(&mut list, &mut voices, voice_cost, voice_cost - per_voice, 1.0);

        assert_eq!(dropped, 1);
        assert!(voices.voices[0].voice_drop_flag);
        assert!(!voices.voices[1].voice_drop_flag);
        let first: Vec<_> = list.iter().filter(|c| c.node_id.base() == 0 && c.node_id.is_voice()).collect();
        assert!(first.iter().all(|c| c.enabled == (c.command_type == CommandType::DepopPrepare)));
    }

    #[test]
    fn test_voice_drop_takes_every_channel() {
        let mut voices = VoiceContext::new(4);
        let mut list = voice_frame(&mut voices, &[0, 1], 2);
        let voice_cost: u64 = list
            .iter()
            .filter(|c| c.node_id.is_voice() && c.enabled)
            .map(|c| u64::from(c.estimated_processing_time))
            .sum();

        // a single channel of voice 0 would already cover the overrun
        let dropped = compute_voice_drop(&mut list, &mut voices, voice_cost, voice_cost - 1, 1.0);

        assert_eq!(dropped, 1);
        assert!(voices.voices[0].voice_drop_flag);
        let first: Vec<_> = list.iter().filter(|c| c.node_id.base() == 0 && c.node_id.is_voice()).collect();
        assert_eq!(first.iter().filter(|c| c.command_type.is_data_source()).count(), 2);
        assert!(first.iter().all(|c| c.enabled == (c.command_type == CommandType::DepopPrepare)));
        assert!(list
            .iter()
            .filter(|c| c.node_id.base() == 1 && c.node_id.is_voice() && c.command_type != CommandType::DepopPrepare)
            .all(|c| c.enabled));
    }

    #[test]
    fn test_highest_priority_voice_is_never_dropped() {
        let mut voices = VoiceContext::new(4);
        let mut list = voice_frame(&mut voices, &[0, 1], 1);
        voices.voices[0].priority = 0;

        let dropped = compute_voice_drop(&mut list, &mut voices, u64::MAX / 2, 0, 1.0);
        assert_eq!(dropped, 0);
        assert!(list.iter().filter(|c| c.node_id.is_voice()).any(|c| c.enabled));
        assert!(!voices.voices[0].voice_drop_flag);
    }

    #[test]
    fn test_no_data_source_means_no_drop() {
        let mut voices = VoiceContext::new(1);
        let mut list = voice_frame(&mut voices, &[], 1);
        assert_eq!(compute_voice_drop(&mut list, &mut voices, 1_000, 0, 1.0), 0);
    }
}
