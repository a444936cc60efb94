//! Guest memory pools and the mapper that attaches buffers to them
//!
//! Every buffer a voice, effect or sink references must live inside an
//! attached pool. The actual guest-to-DSP translation is delegated to an
//! `AddressTranslator`; the renderer only tracks which pools exist, their
//! attach state, and which of them the current frame's commands touch.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::behaviour::BehaviourInfo;
use crate::error::ResultCode;
use crate::parameter::{MemoryPoolOutStatus, MemoryPoolParameter};

pub const PAGE_SIZE: u64 = 0x1000;

/// Client-visible pool states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryPoolUserState {
    #[default]
    Invalid = 0,
    Unknown = 1,
    RequestDetach = 2,
    Detached = 3,
    RequestAttach = 4,
    Attached = 5,
    Released = 6,
}

impl MemoryPoolUserState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => MemoryPoolUserState::Unknown,
            2 => MemoryPoolUserState::RequestDetach,
            3 => MemoryPoolUserState::Detached,
            4 => MemoryPoolUserState::RequestAttach,
            5 => MemoryPoolUserState::Attached,
            6 => MemoryPoolUserState::Released,
            _ => MemoryPoolUserState::Invalid,
        }
    }
}

/// Guest-to-DSP address translation
pub trait AddressTranslator: Send + Sync {
    /// Map `size` bytes at `cpu_address`, returning the DSP-side address
    fn map(&self, cpu_address: u64, size: u64) -> Option<u64>;

    fn unmap(&self, dsp_address: u64, size: u64) -> bool;
}

/// Translator for a shared address space: DSP addresses equal guest addresses
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

impl AddressTranslator for IdentityTranslator {
    fn map(&self, cpu_address: u64, _size: u64) -> Option<u64> {
        Some(cpu_address)
    }

    fn unmap(&self, _dsp_address: u64, _size: u64) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryPoolState {
    pub cpu_address: u64,
    pub dsp_address: u64,
    pub size: u64,
    pub attached: bool,
    /// Referenced by a command of the frame being generated
    pub is_used: bool,
}

impl MemoryPoolState {
    pub fn contains(&self, address: u64, size: u64) -> bool {
        self.attached
            && address >= self.cpu_address
            && address.saturating_add(size) <= self.cpu_address.saturating_add(self.size)
    }

    /// DSP address of `address`, which must lie inside the pool
    pub fn translate(&self, address: u64) -> u64 {
        self.dsp_address + (address - self.cpu_address)
    }
}

/// A buffer reference resolved against the pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressInfo {
    pub cpu_address: u64,
    pub size: u64,
    /// Index of the owning pool; `None` for force-mapped or unmapped buffers
    pub pool: Option<usize>,
    pub dsp_address: u64,
}

impl AddressInfo {
    pub fn is_mapped(&self) -> bool {
        self.dsp_address != 0
    }

    /// DSP address for a command, marking the owning pool as used this frame
    pub fn reference(&self, pools: &mut [MemoryPoolState]) -> u64 {
        if let Some(pool) = self.pool.and_then(|index| pools.get_mut(index)) {
            pool.is_used = true;
        }
        self.dsp_address
    }
}

/// Outcome of applying one pool record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolUpdateResult {
    Success,
    /// Bad address or size in the record; aborts the update
    InvalidParameter,
    /// Translation failed; logged and tolerated
    MapError,
    UnmapError,
}

#[derive(Clone)]
pub struct PoolMapper {
    translator: Arc<dyn AddressTranslator>,
}

impl PoolMapper {
    pub fn new(translator: Arc<dyn AddressTranslator>) -> Self {
        Self { translator }
    }

    pub fn update(
        &self,
        pool: &mut MemoryPoolState,
        param: &MemoryPoolParameter,
        out: &mut MemoryPoolOutStatus,
    ) -> PoolUpdateResult {
        match MemoryPoolUserState::from_raw(param.state) {
            MemoryPoolUserState::RequestAttach => {
                if param.cpu_address == 0
                    || param.cpu_address % PAGE_SIZE != 0
                    || param.size == 0
                    || param.size % PAGE_SIZE != 0
                {
                    return PoolUpdateResult::InvalidParameter;
                }
                pool.cpu_address = param.cpu_address;
                pool.size = param.size;
                match self.translator.map(param.cpu_address, param.size) {
                    Some(dsp_address) => {
                        pool.dsp_address = dsp_address;
                        pool.attached = true;
                        out.state = MemoryPoolUserState::Attached as u32;
                        debug!("Attached pool {:#x}+{:#x}", param.cpu_address, param.size);
                        PoolUpdateResult::Success
                    }
                    None => PoolUpdateResult::MapError,
                }
            }
            MemoryPoolUserState::RequestDetach => {
                if pool.cpu_address != param.cpu_address || pool.size != param.size {
                    return PoolUpdateResult::InvalidParameter;
                }
                if pool.attached && !self.translator.unmap(pool.dsp_address, pool.size) {
                    return PoolUpdateResult::UnmapError;
                }
                *pool = MemoryPoolState::default();
                out.state = MemoryPoolUserState::Detached as u32;
                PoolUpdateResult::Success
            }
            _ => PoolUpdateResult::Success,
        }
    }

    /// Resolve `address` against the attached pools
    ///
    /// A buffer outside every pool is logged as `InvalidAddressInfo`. With
    /// force mapping enabled it is translated directly instead.
    pub fn attach_buffer(
        &self,
        behaviour: &mut BehaviourInfo,
        pools: &[MemoryPoolState],
        address: u64,
        size: u64,
    ) -> AddressInfo {
        let mut info = AddressInfo {
            cpu_address: address,
            size,
            ..Default::default()
        };
        if address == 0 {
            return info;
        }

        if let Some(index) = pools.iter().position(|p| p.contains(address, size)) {
            info.pool = Some(index);
            info.dsp_address = pools[index].translate(address);
            return info;
        }

        if behaviour.is_memory_pool_force_mapping_enabled() {
            info.dsp_address = self.translator.map(address, size).unwrap_or(0);
        }
        if !info.is_mapped() {
            warn!("Buffer {:#x}+{:#x} is not inside an attached pool", address, size);
            behaviour.append_error(ResultCode::InvalidAddressInfo, address);
        }
        info
    }
}

impl std::fmt::Debug for PoolMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMapper").finish_non_exhaustive()
    }
}

pub fn clear_usage(pools: &mut [MemoryPoolState]) {
    for pool in pools {
        pool.is_used = false;
    }
}
