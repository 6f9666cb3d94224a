//! Voice slot allocator
//!
//! Two disjoint-purpose bitmasks over the 32-slot pool: `available` (bit
//! set = slot free) and `started` (bit set = the slot's hardware source
//! has been told to play). A slot with both bits clear is allocated but
//! not yet started - primed by the next update tick's start phase.
//!
//! Single-writer by design: the engine's owning thread is the only
//! mutator, so there is no interior locking.

use crate::VOICE_COUNT;

/// Allocator over the fixed pool of voice slots.
#[derive(Debug, Clone, Copy)]
pub struct VoiceManager {
    /// Bit set = slot is free
    available: u32,
    /// Bit set = slot's source has been started
    started: u32,
}

impl Default for VoiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceManager {
    /// New manager with every slot free.
    pub fn new() -> Self {
        Self {
            available: !0,
            started: 0,
        }
    }

    /// Claim the lowest-numbered free slot.
    ///
    /// Returns `None` when the pool is exhausted - a normal condition the
    /// caller handles by dropping the sound request.
    pub fn allocate(&mut self) -> Option<usize> {
        if self.available == 0 {
            return None;
        }

        let id = self.available.trailing_zeros() as usize;
        self.available &= !(1 << id);
        Some(id)
    }

    /// Return a slot to the pool and clear its started bit.
    ///
    /// Freeing an already-free slot is a caller bug.
    pub fn free(&mut self, id: usize) {
        debug_assert!(id < VOICE_COUNT);
        debug_assert_eq!(self.available & (1 << id), 0, "free of free voice {id}");

        self.available |= 1 << id;
        self.started &= !(1 << id);
    }

    /// Mark an allocated slot's source as started.
    pub fn start(&mut self, id: usize) {
        debug_assert!(id < VOICE_COUNT);
        debug_assert_eq!(self.available & (1 << id), 0, "start of free voice {id}");

        self.started |= 1 << id;
    }

    /// Slots currently playing and owed streaming service.
    pub fn started_mask(&self) -> u32 {
        !self.available & self.started
    }

    /// Slots allocated but not yet started (primed-but-silent set).
    ///
    /// A free slot can never be started, so XOR selects exactly the
    /// allocated-and-unstarted bits.
    pub fn unstarted_mask(&self) -> u32 {
        !self.available ^ self.started
    }

    /// Whether the given slot is currently allocated.
    pub fn is_allocated(&self, id: usize) -> bool {
        debug_assert!(id < VOICE_COUNT);
        self.available & (1 << id) == 0
    }
}
