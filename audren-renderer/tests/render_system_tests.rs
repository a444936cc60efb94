//! Session lifecycle, work buffer sizing and command hand-off

mod helpers;

use std::sync::Arc;

use audren_renderer::command::CommandType;
use audren_renderer::server::performance::PerformanceEntryType;
use audren_renderer::types::{ExecutionMode, RendererConfiguration, RenderingDevice, SampleFormat, FINAL_MIX_ID};
use audren_renderer::{get_work_buffer_size, AudioRenderSystem, ResultCode};
use helpers::{resources, HoldingConsumer, TestSession};

fn playing_session(config: RendererConfiguration) -> TestSession {
    let mut session = TestSession::new(config);
    session.builder.use_final_mix(2);
    session.builder.device_sink(0, &[0, 1]);
    session.builder.play_voice(0, SampleFormat::PcmInt16, 8, FINAL_MIX_ID);
    session.update().unwrap();
    session
}

fn initialize(config: RendererConfiguration, work_buffer_len: usize) -> audren_renderer::Result<AudioRenderSystem> {
    AudioRenderSystem::initialize(config, vec![0u8; work_buffer_len], 0, resources(HoldingConsumer::new()))
}

#[test]
fn test_work_buffer_of_exact_size_is_accepted() {
    let config = RendererConfiguration::default();
    let size = get_work_buffer_size(&config).unwrap();
    assert!(initialize(config.clone(), size).is_ok());

    let err = initialize(config, size - 1).err().unwrap();
    assert_eq!(err.result_code(), Some(ResultCode::WorkBufferTooSmall));
}

#[test]
fn test_work_buffer_layout_fits_the_buffer() {
    let config = RendererConfiguration {
        splitter_count: 2,
        splitter_destination_count: 4,
        performance_frame_count: 3,
        ..Default::default()
    };
    let size = get_work_buffer_size(&config).unwrap();
    let system = initialize(config, size).unwrap();
    assert!(system.work_buffer_layout().used() <= size);
}

#[test]
fn test_unsupported_revision_is_rejected() {
    let config = RendererConfiguration {
        revision: 99,
        ..Default::default()
    };
    let err = get_work_buffer_size(&config).unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::UnsupportedRevision));
}

#[test]
fn test_manual_dsp_session_is_unsupported() {
    let config = RendererConfiguration {
        execution_mode: ExecutionMode::Manual,
        rendering_device: RenderingDevice::Dsp,
        ..Default::default()
    };
    let err = initialize(config, 1 << 24).err().unwrap();
    assert_eq!(err.result_code(), Some(ResultCode::UnsupportedOperation));
}

#[test]
fn test_manual_rendering_entry_point() {
    let manual = RendererConfiguration {
        execution_mode: ExecutionMode::Manual,
        rendering_device: RenderingDevice::Cpu,
        ..Default::default()
    };
    let size = get_work_buffer_size(&manual).unwrap();
    let system = initialize(manual, size).unwrap();
    let err = system.execute_audio_renderer_rendering().unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::UnsupportedOperation));

    let auto = RendererConfiguration::default();
    let size = get_work_buffer_size(&auto).unwrap();
    let system = initialize(auto, size).unwrap();
    let err = system.execute_audio_renderer_rendering().unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::InvalidExecutionContextOperation));
}

#[test]
fn test_send_commands_waits_for_the_mixer() {
    let session = playing_session(RendererConfiguration::default());

    session.system.send_commands();
    assert_eq!(session.system.elapsed_frame_count(), 1);
    assert!(session.consumer.outstanding(0).is_some());

    // previous frame still outstanding: nothing generated, nothing sent
    session.system.send_commands();
    session.system.send_commands();
    assert_eq!(session.system.elapsed_frame_count(), 1);
    assert_eq!(session.consumer.submissions().len(), 1);
    assert!(session.system.is_dsp_running_behind());

    session.consumer.complete(0);
    session.system.send_commands();
    assert_eq!(session.system.elapsed_frame_count(), 2);
    assert_eq!(session.consumer.submissions().len(), 2);
}

#[test]
fn test_update_clears_running_behind() {
    let mut session = playing_session(RendererConfiguration::default());
    session.system.send_commands();
    session.system.send_commands();
    assert!(session.system.is_dsp_running_behind());

    session.update().unwrap();
    assert!(!session.system.is_dsp_running_behind());
}

#[test]
fn test_submitted_list_and_deadline() {
    let session = playing_session(RendererConfiguration::default());
    session.system.set_rendering_time_limit_percent(50);
    session.system.send_commands();

    let submissions = session.consumer.submissions();
    assert_eq!(submissions, vec![(0, session.system.max_allocated_time_for_dsp())]);

    let full = (1_688_888f64 * 0.8) as u64;
    assert!(submissions[0].1 <= full / 2 + 1);

    let list = session.consumer.outstanding(0).unwrap();
    assert_eq!(list[0].command_type, CommandType::ClearMixBuffer);
    assert!(list.iter().any(|c| c.command_type == CommandType::DeviceSink));
}

#[test]
fn test_stopped_session_sends_nothing() {
    let session = playing_session(RendererConfiguration::default());
    session.system.send_commands();
    session.consumer.complete(0);
    assert_eq!(session.system.elapsed_frame_count(), 1);

    session.system.stop();
    assert!(!session.system.is_active());
    assert_eq!(session.system.elapsed_frame_count(), 0);
    session.system.send_commands();
    assert_eq!(session.consumer.submissions().len(), 1);

    session.system.start();
    session.system.send_commands();
    assert_eq!(session.system.elapsed_frame_count(), 1);
}

#[test]
fn test_sessions_share_a_consumer_independently() {
    let consumer = HoldingConsumer::new();
    let mut first = TestSession::with_id(RendererConfiguration::default(), 0, Arc::clone(&consumer));
    let mut second = TestSession::with_id(RendererConfiguration::default(), 1, Arc::clone(&consumer));
    for session in [&mut first, &mut second] {
        session.builder.use_final_mix(2);
        session.update().unwrap();
    }

    first.system.send_commands();
    second.system.send_commands();
    first.system.send_commands();
    assert_eq!(consumer.submissions().len(), 2);
    assert!(first.system.is_dsp_running_behind());
    assert!(!second.system.is_dsp_running_behind());
}

#[test]
fn test_voice_drop_parameter_is_clamped() {
    let session = TestSession::new(RendererConfiguration::default());
    session.system.set_voice_drop_parameter(9.0);
    assert_eq!(session.system.voice_drop_parameter(), 4.0);
    session.system.set_voice_drop_parameter(-1.0);
    assert_eq!(session.system.voice_drop_parameter(), 0.0);
    session.system.set_voice_drop_parameter(f32::NAN);
    assert_eq!(session.system.voice_drop_parameter(), 1.0);
}

#[test]
fn test_rendering_time_limit_caps_at_full_budget() {
    let session = TestSession::new(RendererConfiguration::default());
    let full = session.system.max_allocated_time_for_dsp();
    session.system.set_rendering_time_limit_percent(250);
    assert_eq!(session.system.rendering_time_limit_percent(), 100);
    assert_eq!(session.system.max_allocated_time_for_dsp(), full);

    session.system.set_rendering_time_limit_percent(25);
    assert!(session.system.max_allocated_time_for_dsp() < full / 3);
}

#[test]
fn test_voice_drop_disabled_by_configuration() {
    let config = RendererConfiguration {
        voice_drop_enabled: false,
        ..Default::default()
    };
    let session = playing_session(config);
    session
        .system
        .replace_estimator(Box::new(helpers::FixedEstimator(50_000)));
    session.system.set_rendering_time_limit_percent(1);

    let frame = session.frame();
    assert_eq!(session.system.voice_drop_count(), 0);
    assert!(frame.iter().all(|c| !c.command_type.is_data_source() || c.enabled));
}

#[test]
fn test_performance_history_keeps_the_latest_frames() {
    let config = RendererConfiguration {
        performance_frame_count: 2,
        ..Default::default()
    };
    let mut session = playing_session(config);
    for _ in 0..2 {
        session.frame();
        session.update().unwrap();
    }

    let history = session.system.drain_performance_history();
    let indices: Vec<u64> = history.iter().map(|f| f.frame_index).collect();
    assert_eq!(indices, vec![1, 2]);
    assert!(history[0]
        .entries
        .iter()
        .any(|e| e.entry_type == PerformanceEntryType::Voice && e.node_id.is_voice()));
    assert!(history.iter().all(|f| !f.dsp_running_behind));

    assert!(session.system.drain_performance_history().is_empty());
}
