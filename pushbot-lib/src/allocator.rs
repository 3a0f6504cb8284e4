use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crate::constants::INSTANCE_ID_BITS;
use crate::key::instance_key;

/// Hands out protocol instance ids so that devices sharing one physical link
/// never emit the same keys.
///
/// Clones share the same counter. Use [`InstanceKeyAllocator::new`] for an
/// independent id space (tests, separate robots) and
/// [`InstanceKeyAllocator::global`] for the process-wide one.
#[derive(Debug, Clone, Default)]
pub struct InstanceKeyAllocator {
    next: Arc<AtomicU32>,
}

impl InstanceKeyAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Self {
        static GLOBAL: OnceLock<InstanceKeyAllocator> = OnceLock::new();
        GLOBAL.get_or_init(InstanceKeyAllocator::new).clone()
    }

    /// Allocate the next instance id, starting at 0.
    ///
    /// # Panics
    ///
    /// Panics once the 21-bit instance field is exhausted, which would make
    /// keys alias.
    pub fn allocate(&self) -> u32 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(id < 1 << INSTANCE_ID_BITS, "instance id space exhausted");
        id
    }

    /// Allocate an id and return it already shifted into key position.
    pub fn allocate_key(&self) -> u32 {
        instance_key(self.allocate())
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}
