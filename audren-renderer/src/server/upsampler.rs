//! Fixed pool of upsampler slots shared by every session
//!
//! Device sinks running below the target rate need an upsampler. Slots are
//! handed out as RAII handles so a sink that is re-created or dropped gives
//! its slot back without bookkeeping at the call site.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

#[derive(Debug)]
pub struct UpsamplerManager {
    slots: Mutex<Vec<bool>>,
}

impl UpsamplerManager {
    pub fn new(slot_count: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(vec![false; slot_count]),
        })
    }

    /// Claim a free slot, or `None` when every slot is taken
    pub fn allocate(self: &Arc<Self>) -> Option<UpsamplerHandle> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.iter().position(|used| !used) {
            Some(index) => {
                slots[index] = true;
                debug!("Upsampler slot {} allocated", index);
                Some(UpsamplerHandle {
                    manager: Arc::clone(self),
                    index,
                })
            }
            None => {
                warn!("No free upsampler slot");
                None
            }
        }
    }

    pub fn in_use(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().filter(|used| **used).count()
    }

    fn free(&self, index: usize) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(index) {
            *slot = false;
        }
    }
}

/// A claimed upsampler slot, released on drop
#[derive(Debug)]
pub struct UpsamplerHandle {
    manager: Arc<UpsamplerManager>,
    index: usize,
}

impl UpsamplerHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for UpsamplerHandle {
    fn drop(&mut self) {
        self.manager.free(self.index);
        debug!("Upsampler slot {} released", self.index);
    }
}
