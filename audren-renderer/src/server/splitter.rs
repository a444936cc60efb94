//! Splitters: fan-out of one source into several weighted destinations

use tracing::{debug, trace};

use crate::behaviour::BehaviourInfo;
use crate::error::ResultCode;
use crate::parameter::splitter::{
    SplitterDestinationParameter, SplitterDestinationV1, SplitterDestinationV2, SplitterHeader,
    SplitterParameter, SPLITTER_HEADER_MAGIC,
};
use crate::parameter::{SpanReader, WireRecord, WireResult};
use crate::types::{BiquadFilterParameter, MIX_BUFFER_COUNT_MAX, SPLITTER_BIQUAD_FILTER_COUNT, UNUSED_MIX_ID};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitterDestination {
    pub id: u32,
    pub destination_mix_id: u32,
    pub volumes: [f32; MIX_BUFFER_COUNT_MAX],
    pub previous_volumes: [f32; MIX_BUFFER_COUNT_MAX],
    pub is_used: bool,
    pub biquad_filters: [BiquadFilterParameter; SPLITTER_BIQUAD_FILTER_COUNT],
    pub biquad_previously_enabled: [bool; SPLITTER_BIQUAD_FILTER_COUNT],
    /// Volumes or filters changed since the last generated frame
    pub needs_internal_update: bool,
}

impl SplitterDestination {
    fn new(id: u32) -> Self {
        Self {
            id,
            destination_mix_id: UNUSED_MIX_ID,
            volumes: [0.0; MIX_BUFFER_COUNT_MAX],
            previous_volumes: [0.0; MIX_BUFFER_COUNT_MAX],
            is_used: false,
            biquad_filters: Default::default(),
            biquad_previously_enabled: [false; SPLITTER_BIQUAD_FILTER_COUNT],
            needs_internal_update: false,
        }
    }

    fn update(&mut self, param: &SplitterDestinationParameter, bug_fixed: bool) {
        let newly_used = !self.is_used && param.is_used;
        self.destination_mix_id = param.destination_mix_id;
        self.volumes = param.volumes;
        self.is_used = param.is_used;
        self.biquad_filters = param.biquad_filters;

        // before the fix, ramps restarted from the new volume on every update
        if newly_used || !bug_fixed {
            self.previous_volumes = self.volumes;
        }
        self.needs_internal_update = true;
    }

    pub fn is_routed(&self) -> bool {
        self.is_used && self.destination_mix_id != UNUSED_MIX_ID
    }

    pub fn has_enabled_filter(&self) -> bool {
        self.biquad_filters.iter().any(|f| f.enable)
    }

    /// Commit volumes and filter states after a frame has been generated
    pub fn update_internal_state(&mut self) {
        if !self.needs_internal_update {
            return;
        }
        self.previous_volumes = self.volumes;
        for (previous, filter) in self.biquad_previously_enabled.iter_mut().zip(&self.biquad_filters) {
            *previous = filter.enable;
        }
        self.needs_internal_update = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterState {
    pub id: u32,
    pub sample_rate: u32,
    pub destination_ids: Vec<u32>,
}

#[derive(Debug)]
pub struct SplitterContext {
    pub splitters: Vec<SplitterState>,
    pub destinations: Vec<SplitterDestination>,
    in_use: bool,
    bug_fixed: bool,
    biquad_supported: bool,
}

impl SplitterContext {
    pub fn new(behaviour: &BehaviourInfo, splitter_count: u32, destination_count: u32) -> Self {
        let in_use = behaviour.is_splitter_supported() && splitter_count > 0 && destination_count > 0;
        let splitters = if in_use {
            (0..splitter_count)
                .map(|id| SplitterState {
                    id,
                    sample_rate: 0,
                    destination_ids: Vec::with_capacity(destination_count as usize),
                })
                .collect()
        } else {
            Vec::new()
        };
        let destinations = if in_use {
            (0..destination_count).map(SplitterDestination::new).collect()
        } else {
            Vec::new()
        };
        Self {
            splitters,
            destinations,
            in_use,
            bug_fixed: behaviour.is_splitter_bug_fixed(),
            biquad_supported: behaviour.is_splitter_biquad_supported(),
        }
    }

    /// Whether update requests carry a splitter blob
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn is_biquad_supported(&self) -> bool {
        self.biquad_supported
    }

    /// Apply the self-describing splitter blob at the reader's position
    pub fn update(&mut self, r: &mut SpanReader<'_>) -> WireResult<()> {
        let header = SplitterHeader::read(r)?;
        if header.magic != SPLITTER_HEADER_MAGIC {
            return Err(ResultCode::InvalidUpdateInfo);
        }
        debug!(
            "Splitter update: {} splitters, {} destinations",
            header.splitter_count, header.destination_count
        );

        let destination_limit = self.destinations.len();
        for _ in 0..header.splitter_count {
            let param = SplitterParameter::read(r, destination_limit)?;
            if let Some(splitter) = self.splitters.get_mut(param.id as usize) {
                splitter.sample_rate = param.sample_rate;
                splitter.destination_ids.clear();
                splitter.destination_ids.extend_from_slice(&param.destination_ids);
            }
        }

        for _ in 0..header.destination_count {
            let param = if self.biquad_supported {
                SplitterDestinationV2::read(r)?.0
            } else {
                SplitterDestinationV1::read(r)?.0
            };
            if let Some(destination) = self.destinations.get_mut(param.id as usize) {
                destination.update(&param, self.bug_fixed);
                trace!("Splitter destination {} -> mix {}", param.id, param.destination_mix_id);
            }
        }
        Ok(())
    }

    pub fn destination_count(&self, splitter_id: u32) -> usize {
        self.splitters
            .get(splitter_id as usize)
            .map_or(0, |s| s.destination_ids.len())
    }

    /// The `index`th destination of a splitter
    pub fn destination(&self, splitter_id: u32, index: usize) -> Option<&SplitterDestination> {
        let splitter = self.splitters.get(splitter_id as usize)?;
        let id = *splitter.destination_ids.get(index)?;
        self.destinations.get(id as usize)
    }

    /// Mix ids a splitter routes into
    pub fn destination_mix_ids(&self, splitter_id: u32) -> impl Iterator<Item = u32> + '_ {
        let count = self.destination_count(splitter_id);
        (0..count)
            .filter_map(move |i| self.destination(splitter_id, i))
            .filter(|d| d.is_routed())
            .map(|d| d.destination_mix_id)
    }

    pub fn update_internal_state(&mut self) {
        for destination in &mut self.destinations {
            destination.update_internal_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::SpanWriter;

    fn blob(destination_v2: bool) -> Vec<u8> {
        let header = SplitterHeader {
            splitter_count: 1,
            destination_count: 2,
            ..Default::default()
        };
        let splitter = SplitterParameter {
            id: 0,
            sample_rate: 48_000,
            destination_ids: vec![1, 0],
        };
        let mut first = SplitterDestinationParameter {
            id: 0,
            destination_mix_id: 1,
            is_used: true,
            ..Default::default()
        };
        first.volumes[0] = 0.5;
        let second = SplitterDestinationParameter {
            id: 1,
            destination_mix_id: 2,
            is_used: true,
            ..Default::default()
        };

        let mut bytes = header.to_bytes();
        let mut record = vec![0u8; splitter.encoded_size()];
        splitter.write(&mut SpanWriter::new(&mut record)).unwrap();
        bytes.extend(record);
        for destination in [first, second] {
            if destination_v2 {
                bytes.extend(SplitterDestinationV2(destination).to_bytes());
            } else {
                bytes.extend(SplitterDestinationV1(destination).to_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_blob_update_routes_destinations() {
        let behaviour = BehaviourInfo::new(11);
        let mut context = SplitterContext::new(&behaviour, 1, 2);
        assert!(context.is_in_use());

        let bytes = blob(false);
        let mut r = SpanReader::new(&bytes);
        context.update(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);

        assert_eq!(context.destination_count(0), 2);
        assert_eq!(context.destination(0, 0).unwrap().destination_mix_id, 2);
        assert_eq!(context.destination(0, 1).unwrap().destination_mix_id, 1);
        assert_eq!(context.destination_mix_ids(0).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_destination_layout_follows_revision() {
        let behaviour = BehaviourInfo::new(12);
        let mut context = SplitterContext::new(&behaviour, 1, 2);
        let bytes = blob(true);
        let mut r = SpanReader::new(&bytes);
        context.update(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);

        // a V1 blob is too short for a V2 session
        let short = blob(false);
        assert_eq!(
            context.update(&mut SpanReader::new(&short)),
            Err(ResultCode::InvalidUpdateInfo)
        );
    }

    #[test]
    fn test_internal_state_commits_volumes() {
        let behaviour = BehaviourInfo::new(13);
        let mut context = SplitterContext::new(&behaviour, 1, 1);
        let mut param = SplitterDestinationParameter {
            id: 0,
            destination_mix_id: 1,
            is_used: true,
            ..Default::default()
        };
        param.volumes[0] = 1.0;
        context.destinations[0].update(&param, true);
        assert_eq!(context.destinations[0].previous_volumes[0], 1.0);

        param.volumes[0] = 0.25;
        param.biquad_filters[0].enable = true;
        context.destinations[0].update(&param, true);
        assert_eq!(context.destinations[0].previous_volumes[0], 1.0);

        context.update_internal_state();
        let destination = &context.destinations[0];
        assert_eq!(destination.previous_volumes[0], 0.25);
        assert_eq!(destination.biquad_previously_enabled, [true, false]);
        assert!(!destination.needs_internal_update);
    }

    #[test]
    fn test_unsupported_revision_has_no_splitters() {
        let behaviour = BehaviourInfo::new(1);
        assert!(!SplitterContext::new(&behaviour, 4, 4).is_in_use());
    }
}
