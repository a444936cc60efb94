//! Shared fixtures for audren-renderer integration tests
//!
//! - `HoldingConsumer`: a mixing consumer that keeps every submitted list
//!   until the test completes it, so backpressure can be driven by hand
//! - `TestSession`: a started session plus the request builder feeding it
//! - `FixedEstimator`: flat per-command cost for admission-control tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use audren_renderer::command::{Command, CommandEstimator, CommandList, CommandType};
use audren_renderer::parameter::{SpanReader, UpdateDataHeader, WireRecord};
use audren_renderer::server::memory_pool::IdentityTranslator;
use audren_renderer::server::upsampler::UpsamplerManager;
use audren_renderer::types::{NodeId, RendererConfiguration};
use audren_renderer::{
    get_work_buffer_size, AudioRenderSystem, MixingConsumer, Result, SessionResources, UpdateBuilder,
};

/// One generated command, reduced to what ordering assertions need
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSummary {
    pub command_type: CommandType,
    pub node_id: NodeId,
    pub enabled: bool,
}

pub fn summarize(list: &CommandList) -> Vec<CommandSummary> {
    list.iter()
        .map(|c| CommandSummary {
            command_type: c.command_type,
            node_id: c.node_id,
            enabled: c.enabled,
        })
        .collect()
}

pub fn enabled_types(summary: &[CommandSummary]) -> Vec<CommandType> {
    summary.iter().filter(|c| c.enabled).map(|c| c.command_type).collect()
}

#[derive(Default)]
struct Held {
    outstanding: HashMap<u32, CommandList>,
    finished: HashMap<u32, Vec<CommandList>>,
    deadlines: Vec<(u32, u64)>,
}

/// Keeps submitted lists outstanding until `complete` is called
#[derive(Default)]
pub struct HoldingConsumer {
    held: Mutex<Held>,
}

impl HoldingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark the session's outstanding list executed
    pub fn complete(&self, session_id: u32) -> bool {
        let mut held = self.held.lock().unwrap();
        match held.outstanding.remove(&session_id) {
            Some(list) => {
                held.finished.entry(session_id).or_default().push(list);
                true
            }
            None => false,
        }
    }

    pub fn outstanding(&self, session_id: u32) -> Option<Vec<CommandSummary>> {
        self.held.lock().unwrap().outstanding.get(&session_id).map(summarize)
    }

    pub fn submissions(&self) -> Vec<(u32, u64)> {
        self.held.lock().unwrap().deadlines.clone()
    }
}

impl MixingConsumer for HoldingConsumer {
    fn has_remaining_commands(&self, session_id: u32) -> bool {
        self.held.lock().unwrap().outstanding.contains_key(&session_id)
    }

    fn send(&self, session_id: u32, list: CommandList, deadline: u64, _resource_id: u64) -> std::result::Result<(), CommandList> {
        let mut held = self.held.lock().unwrap();
        if held.outstanding.contains_key(&session_id) {
            return Err(list);
        }
        held.deadlines.push((session_id, deadline));
        held.outstanding.insert(session_id, list);
        Ok(())
    }

    fn take_finished(&self, session_id: u32, reclaim: &mut dyn FnMut(CommandList)) {
        let lists = self.held.lock().unwrap().finished.remove(&session_id).unwrap_or_default();
        for list in lists {
            reclaim(list);
        }
    }
}

/// Charges the same cost for every command
#[derive(Debug)]
pub struct FixedEstimator(pub u32);

impl CommandEstimator for FixedEstimator {
    fn version(&self) -> u32 {
        0
    }

    fn estimate(&self, _command: &Command) -> u32 {
        self.0
    }
}

pub fn resources(consumer: Arc<HoldingConsumer>) -> SessionResources {
    SessionResources {
        consumer,
        upsamplers: UpsamplerManager::new(4),
        translator: Arc::new(IdentityTranslator),
    }
}

/// A started session with its request builder
pub struct TestSession {
    pub system: AudioRenderSystem,
    pub builder: UpdateBuilder,
    pub consumer: Arc<HoldingConsumer>,
}

impl TestSession {
    pub fn new(config: RendererConfiguration) -> Self {
        Self::with_id(config, 0, HoldingConsumer::new())
    }

    pub fn with_id(config: RendererConfiguration, session_id: u32, consumer: Arc<HoldingConsumer>) -> Self {
        let size = get_work_buffer_size(&config).unwrap();
        let builder = UpdateBuilder::new(&config);
        let system =
            AudioRenderSystem::initialize(config, vec![0u8; size], session_id, resources(Arc::clone(&consumer)))
                .unwrap();
        system.start();
        Self {
            system,
            builder,
            consumer,
        }
    }

    /// Encode the builder's current state, apply it and clear one-shot flags
    pub fn update(&mut self) -> Result<Vec<u8>> {
        let request = self.builder.build()?;
        let mut reply = vec![0u8; self.builder.reply_size()];
        let written = self.system.update(&request, &mut reply)?;
        reply.truncate(written);
        self.builder.acknowledge();
        Ok(reply)
    }

    /// Generate one frame without submitting it
    pub fn frame(&self) -> Vec<CommandSummary> {
        let list = self.system.generate_command_list();
        let summary = summarize(&list);
        self.system.release_list(list);
        summary
    }
}

pub fn reply_header(reply: &[u8]) -> UpdateDataHeader {
    UpdateDataHeader::read(&mut SpanReader::new(reply)).unwrap()
}
