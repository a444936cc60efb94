//! Mixes and the dependency sort of the mix graph
//!
//! Mixes form a DAG through their destination mix or splitter. Generation
//! needs producers before consumers, so every change to the graph re-runs a
//! Kahn sort. The final mix must be reachable from every used mix.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::effect::EffectState;
use super::splitter::SplitterContext;
use crate::error::ResultCode;
use crate::parameter::mix::{MixParameter, MixVolumes};
use crate::types::{
    NodeId, NodeIdType, FINAL_MIX_ID, MAX_EFFECTS_PER_MIX, MIX_BUFFER_COUNT_MAX, UNUSED_MIX_ID,
    UNUSED_SPLITTER_ID,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MixState {
    pub mix_id: u32,
    pub node_id: NodeId,
    pub volume: f32,
    pub sample_rate: u32,
    pub buffer_count: u32,
    /// First mix buffer owned by this mix, assigned when the graph changes
    pub buffer_offset: u32,
    pub is_used: bool,
    pub destination_mix_id: u32,
    pub destination_splitter_id: u32,
    pub volumes: Box<MixVolumes>,
    /// Effect indices in processing order
    pub effect_processing_order: Vec<u32>,
}

impl MixState {
    pub fn new(mix_id: u32) -> Self {
        Self {
            mix_id,
            node_id: NodeId::new(NodeIdType::Mix, mix_id, 0),
            volume: 1.0,
            sample_rate: 0,
            buffer_count: 0,
            buffer_offset: 0,
            is_used: false,
            destination_mix_id: UNUSED_MIX_ID,
            destination_splitter_id: UNUSED_SPLITTER_ID,
            volumes: Box::new([[0.0; MIX_BUFFER_COUNT_MAX]; MIX_BUFFER_COUNT_MAX]),
            effect_processing_order: Vec::with_capacity(MAX_EFFECTS_PER_MIX),
        }
    }

    pub fn is_final(&self) -> bool {
        self.mix_id == FINAL_MIX_ID
    }

    pub fn routes_to_mix(&self) -> bool {
        !self.is_final() && self.destination_mix_id != UNUSED_MIX_ID
    }

    pub fn routes_to_splitter(&self) -> bool {
        !self.is_final() && self.destination_splitter_id != UNUSED_SPLITTER_ID
    }

    /// Apply a mix record; returns whether the graph shape changed
    pub fn update(&mut self, param: &MixParameter) -> bool {
        let changed = self.is_used != param.is_used
            || self.destination_mix_id != param.destination_mix_id
            || self.destination_splitter_id != param.destination_splitter_id
            || self.buffer_count != param.buffer_count;

        if !self.is_used && param.is_used {
            self.effect_processing_order.clear();
        }
        self.volume = param.volume;
        self.sample_rate = param.sample_rate;
        self.buffer_count = param.buffer_count.min(MIX_BUFFER_COUNT_MAX as u32);
        self.is_used = param.is_used;
        self.destination_mix_id = param.destination_mix_id;
        self.destination_splitter_id = param.destination_splitter_id;
        *self.volumes = param.volumes;
        changed
    }
}

#[derive(Debug)]
pub struct MixContext {
    pub mixes: Vec<MixState>,
    sorted: Vec<u32>,
    mix_buffer_count: u32,
    /// Sort scratch, sized once and reused on every update
    edges: Vec<Vec<u32>>,
    in_degree: Vec<usize>,
    queue: VecDeque<usize>,
    reaches_final: Vec<bool>,
    effect_order: Vec<(u32, u32)>,
}

impl MixContext {
    pub fn new(mix_count: u32, mix_buffer_count: u32) -> Self {
        let count = mix_count as usize;
        Self {
            mixes: (0..mix_count).map(MixState::new).collect(),
            sorted: Vec::with_capacity(count),
            mix_buffer_count,
            edges: (0..count).map(|_| Vec::with_capacity(1)).collect(),
            in_degree: vec![0; count],
            queue: VecDeque::with_capacity(count),
            reaches_final: vec![false; count],
            effect_order: Vec::new(),
        }
    }

    pub fn final_mix(&self) -> &MixState {
        &self.mixes[FINAL_MIX_ID as usize]
    }

    /// A used mix by id
    pub fn used_mix(&self, mix_id: u32) -> Option<&MixState> {
        self.mixes.get(mix_id as usize).filter(|m| m.is_used)
    }

    /// Used mixes in dependency order; the final mix, when used, is last
    pub fn sorted(&self) -> &[u32] {
        &self.sorted
    }

    /// Used mixes this mix feeds, written into `next`
    fn successors_into(&self, mix: &MixState, splitters: &SplitterContext, next: &mut Vec<u32>) {
        next.clear();
        if !mix.is_used {
            return;
        }
        if mix.routes_to_mix() {
            next.push(mix.destination_mix_id);
        } else if mix.routes_to_splitter() {
            next.extend(splitters.destination_mix_ids(mix.destination_splitter_id));
        }
        next.retain(|&id| self.used_mix(id).is_some());
    }

    pub fn sort(&mut self, splitters: &SplitterContext) -> Result<(), ResultCode> {
        let count = self.mixes.len();
        let mut edges = std::mem::take(&mut self.edges);
        edges.resize_with(count, Vec::new);
        for (mix, next) in self.mixes.iter().zip(edges.iter_mut()) {
            self.successors_into(mix, splitters, next);
        }
        let result = self.sort_edges(&edges);
        self.edges = edges;
        result
    }

    fn sort_edges(&mut self, edges: &[Vec<u32>]) -> Result<(), ResultCode> {
        let count = self.mixes.len();
        self.in_degree.clear();
        self.in_degree.resize(count, 0);
        for &to in edges.iter().flatten() {
            self.in_degree[to as usize] += 1;
        }

        let used = self.mixes.iter().filter(|m| m.is_used).count();
        self.queue.clear();
        for index in 0..count {
            if self.mixes[index].is_used && self.in_degree[index] == 0 {
                self.queue.push_back(index);
            }
        }

        self.sorted.clear();
        while let Some(index) = self.queue.pop_front() {
            self.sorted.push(index as u32);
            for &to in &edges[index] {
                self.in_degree[to as usize] -= 1;
                if self.in_degree[to as usize] == 0 {
                    self.queue.push_back(to as usize);
                }
            }
        }

        if self.sorted.len() != used {
            warn!("Mix graph has a cycle ({} of {} mixes sorted)", self.sorted.len(), used);
            self.sorted.clear();
            return Err(ResultCode::InvalidMixSorting);
        }

        // every used mix must eventually land in the final mix
        self.reaches_final.clear();
        self.reaches_final.resize(count, false);
        for position in (0..self.sorted.len()).rev() {
            let index = self.sorted[position] as usize;
            let reaches = self.mixes[index].is_final() || edges[index].iter().any(|&to| self.reaches_final[to as usize]);
            self.reaches_final[index] = reaches;
            if !reaches {
                warn!("Mix {} cannot reach the final mix", index);
                self.sorted.clear();
                return Err(ResultCode::InvalidMixSorting);
            }
        }

        debug!("Mix order: {:?}", self.sorted);
        Ok(())
    }

    /// Pack the used mixes' buffers into the shared mix buffer area
    pub fn assign_buffer_offsets(&mut self) -> Result<(), ResultCode> {
        let mut offset = 0u32;
        for mix in self.mixes.iter_mut().filter(|m| m.is_used) {
            mix.buffer_offset = offset;
            offset += mix.buffer_count;
        }
        if offset > self.mix_buffer_count {
            warn!("Mixes need {} buffers, session has {}", offset, self.mix_buffer_count);
            return Err(ResultCode::InvalidUpdateInfo);
        }
        Ok(())
    }

    /// Attach each used effect to its mix, ordered by processing order
    pub fn rebuild_effect_order(&mut self, effects: &[EffectState]) {
        for mix in &mut self.mixes {
            mix.effect_processing_order.clear();
        }
        self.effect_order.clear();
        self.effect_order.extend(
            effects
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_used())
                .map(|(index, e)| (e.processing_order, index as u32)),
        );
        self.effect_order.sort_unstable();

        for &(_, index) in &self.effect_order {
            let mix_id = effects[index as usize].mix_id;
            let Some(mix) = self.mixes.get_mut(mix_id as usize).filter(|m| m.is_used) else {
                continue;
            };
            if mix.effect_processing_order.len() < MAX_EFFECTS_PER_MIX {
                mix.effect_processing_order.push(index);
            }
        }
    }
}
