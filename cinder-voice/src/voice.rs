//! Per-slot playback state
//!
//! A [`Voice`] is one recycled pool slot: which waveform it plays, the
//! decode cursor, the caller's opaque decoder state, and double-buffer
//! bookkeeping. Slots are reinitialized on allocation and cleared on
//! free; nothing is heap-allocated per play beyond what the caller hands
//! in.

use std::sync::Arc;

use crate::waveform::{DecoderState, Waveform, voice_flags};
use crate::{BUFFER_COUNT, VOICE_COUNT};

/// Mutable per-slot playback cursor.
#[derive(Default)]
pub struct Voice {
    waveform: Option<Arc<dyn Waveform>>,
    decoder: Option<DecoderState>,
    frame_offset: u64,
    flags: u8,
    /// Next buffer slot to fill and queue
    queued_index: usize,
    /// Next buffer slot the backend will finish with
    dequeued_index: usize,
    /// Buffers currently in the backend's queue
    inuse_count: usize,
}

impl Voice {
    /// Reinitialize the slot for a fresh play.
    pub(crate) fn reset(
        &mut self,
        waveform: Arc<dyn Waveform>,
        decoder: Option<DecoderState>,
        flags: u8,
    ) {
        self.waveform = Some(waveform);
        self.decoder = decoder;
        self.frame_offset = 0;
        self.flags = flags;
        self.queued_index = 0;
        self.dequeued_index = 0;
        self.inuse_count = 0;
    }

    /// Clear the slot on free, dropping the waveform reference and the
    /// caller's decoder state.
    pub(crate) fn clear(&mut self) {
        *self = Voice::default();
    }

    /// Decode the next chunk into `dest`.
    ///
    /// Handles the loop boundary: an exhausted looping voice restarts
    /// from frame 0 before rendering. Returns frames produced, or `None`
    /// once a non-looping waveform is spent.
    pub(crate) fn render(&mut self, dest: &mut [i16]) -> Option<usize> {
        let waveform = self.waveform.as_ref()?;

        if self.frame_offset >= waveform.frame_count() {
            if self.flags & voice_flags::LOOPING == 0 {
                return None;
            }
            self.frame_offset = 0;
        }

        let frames = waveform.render(&mut self.frame_offset, self.decoder.as_deref_mut(), dest);
        (frames > 0).then_some(frames)
    }

    pub(crate) fn waveform(&self) -> Option<&Arc<dyn Waveform>> {
        self.waveform.as_ref()
    }

    pub(crate) fn set_release_on_stop(&mut self) {
        self.flags |= voice_flags::RELEASE_ON_STOP;
    }

    pub(crate) fn advance_queued(&mut self) {
        self.queued_index = (self.queued_index + 1) % BUFFER_COUNT;
        self.inuse_count += 1;
        assert!(self.inuse_count <= BUFFER_COUNT, "buffer queue overrun");
    }

    pub(crate) fn advance_dequeued(&mut self) {
        assert!(self.inuse_count > 0, "dequeue with no buffers in flight");
        self.dequeued_index = (self.dequeued_index + 1) % BUFFER_COUNT;
        self.inuse_count -= 1;
    }

    /// Whether the slot should be freed once the backend reports stopped.
    pub fn release_on_stop(&self) -> bool {
        self.flags & voice_flags::RELEASE_ON_STOP != 0
    }

    /// Whether the voice restarts at the waveform end.
    pub fn is_looping(&self) -> bool {
        self.flags & voice_flags::LOOPING != 0
    }

    /// Current decode cursor in frames.
    pub fn frame_offset(&self) -> u64 {
        self.frame_offset
    }

    /// Index of the next buffer slot to fill.
    pub fn queued_index(&self) -> usize {
        self.queued_index
    }

    /// Buffers currently queued on the hardware source.
    pub fn inuse_count(&self) -> usize {
        self.inuse_count
    }
}

/// Fixed array of recycled voice slots.
pub(crate) fn voice_pool() -> [Voice; VOICE_COUNT] {
    std::array::from_fn(|_| Voice::default())
}
