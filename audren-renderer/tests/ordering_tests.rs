//! Mix graph ordering and routing through sub-mixes and splitters

mod helpers;

use audren_renderer::command::CommandType;
use audren_renderer::parameter::effect::{ChannelMapping, EffectSpecific, EffectType};
use audren_renderer::types::{
    NodeId, NodeIdType, RendererConfiguration, SampleFormat, FINAL_MIX_ID, MAX_EFFECT_CHANNELS, UNUSED_MIX_ID,
};
use audren_renderer::ResultCode;
use helpers::{CommandSummary, TestSession};

fn mix_node(mix_id: u32) -> NodeId {
    NodeId::new(NodeIdType::Mix, mix_id, 0)
}

fn first_index(frame: &[CommandSummary], node_id: NodeId) -> usize {
    frame
        .iter()
        .position(|c| c.node_id == node_id)
        .unwrap_or_else(|| panic!("no command for {:?}", node_id))
}

fn last_index_of_kind(frame: &[CommandSummary], kind: NodeIdType) -> usize {
    frame.iter().rposition(|c| c.node_id.kind() == kind).unwrap()
}

fn first_index_of_kind(frame: &[CommandSummary], kind: NodeIdType) -> usize {
    frame.iter().position(|c| c.node_id.kind() == kind).unwrap()
}

#[test]
fn test_voices_then_sub_mixes_then_final_then_sinks() {
    let mut session = TestSession::new(RendererConfiguration::default());
    session.builder.use_final_mix(2);
    session.builder.use_mix(1, 2, FINAL_MIX_ID);
    session.builder.use_mix(2, 2, 1);
    session.builder.device_sink(0, &[0, 1]);
    session.builder.play_voice(0, SampleFormat::PcmInt16, 4, 2);
    session.builder.play_voice(1, SampleFormat::PcmInt16, 4, 1);
    session.update().unwrap();

    let frame = session.frame();
    let voices_end = last_index_of_kind(&frame, NodeIdType::Voice);
    let mix2 = first_index(&frame, mix_node(2));
    let mix1 = first_index(&frame, mix_node(1));
    let final_mix = first_index(&frame, mix_node(FINAL_MIX_ID));
    let sinks = first_index_of_kind(&frame, NodeIdType::Sink);

    assert!(voices_end < mix2, "voices must precede sub-mixes");
    assert!(mix2 < mix1, "mix 2 feeds mix 1");
    assert!(mix1 < final_mix);
    assert!(final_mix < sinks);

    // sub-mix routing is a plain Mix per non-zero volume
    let mix1_mixes = frame
        .iter()
        .filter(|c| c.node_id == mix_node(1) && c.command_type == CommandType::Mix)
        .count();
    assert_eq!(mix1_mixes, 2);
}

#[test]
fn test_mix_cycle_is_rejected() {
    let mut session = TestSession::new(RendererConfiguration::default());
    session.builder.use_final_mix(2);
    session.builder.use_mix(1, 2, 2);
    session.builder.use_mix(2, 2, 1);
    let err = session.update().unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::InvalidMixSorting));
}

#[test]
fn test_mix_without_path_to_final_is_rejected() {
    let mut session = TestSession::new(RendererConfiguration::default());
    session.builder.use_final_mix(2);
    session.builder.use_mix(1, 2, UNUSED_MIX_ID);
    let err = session.update().unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::InvalidMixSorting));
}

#[test]
fn test_splitter_fans_out_to_mixes() {
    let config = RendererConfiguration {
        splitter_count: 1,
        splitter_destination_count: 2,
        ..Default::default()
    };
    let mut session = TestSession::new(config);
    session.builder.use_final_mix(2);
    session.builder.use_mix(2, 2, FINAL_MIX_ID);
    session.builder.use_mix(1, 2, UNUSED_MIX_ID).destination_splitter_id = 0;
    session.builder.set_splitter(0, &[0, 1]);
    session.builder.set_splitter_destination(0, FINAL_MIX_ID, &[1.0, 1.0]);
    session.builder.set_splitter_destination(1, 2, &[0.5, 0.0]);
    session.builder.device_sink(0, &[0, 1]);
    session.builder.play_voice(0, SampleFormat::PcmInt16, 4, 1);
    session.update().unwrap();

    let frame = session.frame();
    let mix1 = first_index(&frame, mix_node(1));
    let mix2 = first_index(&frame, mix_node(2));
    let final_mix = first_index(&frame, mix_node(FINAL_MIX_ID));
    assert!(mix1 < mix2, "splitter source must run before its destinations");
    assert!(mix2 < final_mix);

    // two channels to the final mix, one non-zero channel to mix 2
    let ramps = frame
        .iter()
        .filter(|c| c.node_id == mix_node(1) && c.command_type == CommandType::MixRamp)
        .count();
    assert_eq!(ramps, 3);
}

#[test]
fn test_final_mix_effect_runs_after_depop() {
    let mut session = TestSession::new(RendererConfiguration::default());
    session.builder.use_final_mix(2);
    session.builder.device_sink(0, &[0, 1]);
    let mut volumes = [0.0; MAX_EFFECT_CHANNELS];
    volumes[..2].copy_from_slice(&[0.5, 0.5]);
    let mapping = ChannelMapping {
        input: [0, 1, 0, 0, 0, 0],
        output: [1, 0, 0, 0, 0, 0],
        channel_count_max: 2,
        channel_count: 2,
    };
    session
        .builder
        .set_effect(0, EffectType::BufferMix, FINAL_MIX_ID, mapping, EffectSpecific::BufferMix { volumes });
    session.update().unwrap();

    let frame = session.frame();
    let final_types: Vec<CommandType> = frame
        .iter()
        .filter(|c| c.node_id == mix_node(FINAL_MIX_ID) && c.enabled)
        .map(|c| c.command_type)
        .collect();
    assert_eq!(
        final_types,
        vec![CommandType::DepopForMixBuffers, CommandType::Mix, CommandType::Mix]
    );
}

#[test]
fn test_final_mix_volume_emits_volume_commands() {
    let mut session = TestSession::new(RendererConfiguration::default());
    session.builder.use_final_mix(2).volume = 0.5;
    session.update().unwrap();

    let frame = session.frame();
    let volumes = frame
        .iter()
        .filter(|c| c.node_id == mix_node(FINAL_MIX_ID) && c.command_type == CommandType::Volume)
        .count();
    assert_eq!(volumes, 2);
}
