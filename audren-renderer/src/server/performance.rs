//! Per-frame performance telemetry
//!
//! A fixed ring of frames, each holding a bounded number of entries. The
//! generator asks for an entry per node it wraps in Start/End commands;
//! when the frame is full the request fails and the node simply goes
//! unmeasured.

use std::collections::VecDeque;

use tracing::trace;

use crate::types::NodeId;

/// Upper bound on entries recorded per frame
pub const MAX_ENTRIES_PER_FRAME: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceEntryType {
    Voice,
    SubMix,
    FinalMix,
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceEntry {
    pub entry_type: PerformanceEntryType,
    pub node_id: NodeId,
    /// Filled in by the consumer once the command pair has executed
    pub processing_time: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformanceFrame {
    pub entries: Vec<PerformanceEntry>,
    pub voice_drop_count: u32,
    pub dsp_running_behind: bool,
    pub frame_index: u64,
}

#[derive(Debug)]
pub struct PerformanceManager {
    history: VecDeque<PerformanceFrame>,
    history_capacity: usize,
    current: PerformanceFrame,
    target_node_id: Option<NodeId>,
    frame_index: u64,
}

impl PerformanceManager {
    /// `None` when the session was configured without performance frames
    pub fn new(frame_count: u32) -> Option<Self> {
        if frame_count == 0 {
            return None;
        }
        Some(Self {
            history: VecDeque::with_capacity(frame_count as usize),
            history_capacity: frame_count as usize,
            current: PerformanceFrame {
                entries: Vec::with_capacity(MAX_ENTRIES_PER_FRAME),
                ..Default::default()
            },
            target_node_id: None,
            frame_index: 0,
        })
    }

    /// Restrict detailed measurement to one node; 0 measures every node
    pub fn set_target_node_id(&mut self, raw: u32) {
        self.target_node_id = (raw != 0).then_some(NodeId(raw));
    }

    /// Reserve an entry slot for `node_id` in the current frame
    pub fn next_entry(&mut self, entry_type: PerformanceEntryType, node_id: NodeId) -> Option<u32> {
        if let Some(target) = self.target_node_id {
            if target != node_id {
                return None;
            }
        }
        if self.current.entries.len() >= MAX_ENTRIES_PER_FRAME {
            trace!("Performance frame full, {:?} unmeasured", node_id);
            return None;
        }
        self.current.entries.push(PerformanceEntry {
            entry_type,
            node_id,
            processing_time: 0,
        });
        Some((self.current.entries.len() - 1) as u32)
    }

    /// Close the current frame and push it into the history ring
    pub fn tap_frame(&mut self, dsp_running_behind: bool, voice_drop_count: u32) {
        let mut frame = std::mem::take(&mut self.current);
        frame.dsp_running_behind = dsp_running_behind;
        frame.voice_drop_count = voice_drop_count;
        frame.frame_index = self.frame_index;
        self.frame_index += 1;

        let mut recycled = if self.history.len() == self.history_capacity {
            self.history.pop_front().map(|f| f.entries).unwrap_or_default()
        } else {
            Vec::with_capacity(MAX_ENTRIES_PER_FRAME)
        };
        recycled.clear();
        self.current.entries = recycled;
        self.history.push_back(frame);
    }

    /// Hand the recorded history to the client, emptying the ring
    pub fn drain_history(&mut self) -> Vec<PerformanceFrame> {
        self.history.drain(..).collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
