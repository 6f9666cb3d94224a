//! Backend seam
//!
//! The native audio subsystem - source and buffer object lifetime, queue
//! submission, playback-state polling - sits behind this trait. The
//! engine drives it synchronously from the update thread and expects
//! every call to be non-blocking; the backend buffers asynchronously on
//! its own audio thread.
//!
//! Source and buffer handles are allocated once at engine construction
//! and released by the backend's `Drop`.

use crate::waveform::BufferFormat;

/// Handle to one hardware playback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Handle to one hardware buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Coarse source playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Source is consuming queued buffers
    Playing,
    /// Source drained its queue (or was stopped) and went idle
    Stopped,
    /// Initial, paused, or any other backend-specific state
    Other,
}

/// Source parameters reset on every play.
///
/// The engine always uses the defaults: looping is emulated in software
/// (compressed formats need custom loop points), never delegated to the
/// backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceParams {
    pub pitch: f32,
    pub gain: f32,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    /// Position is relative to the listener
    pub relative: bool,
    /// Backend-level looping (always off; see above)
    pub hw_looping: bool,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            pitch: 1.0,
            gain: 1.0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            relative: true,
            hw_looping: false,
        }
    }
}

/// Operations the streaming engine requires of a native audio subsystem.
///
/// Queue operations are infallible by contract: a failure inside them is
/// a programming error or a wedged device, neither of which the engine
/// can recover from mid-tick. Fallibility is confined to construction
/// and handle allocation, where startup aborts cleanly.
pub trait Backend {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Allocate `count` playback sources. Called once.
    fn allocate_sources(&mut self, count: usize) -> Result<Vec<SourceId>, Self::Error>;

    /// Allocate `count` buffer objects. Called once.
    fn allocate_buffers(&mut self, count: usize) -> Result<Vec<BufferId>, Self::Error>;

    /// Fill a buffer object with PCM. The slice is only valid for the
    /// duration of the call; the backend must not retain it.
    fn submit(&mut self, buffer: BufferId, format: BufferFormat, pcm: &[i16], sample_rate: u32);

    /// Append a filled buffer to a source's playback queue.
    fn enqueue(&mut self, source: SourceId, buffer: BufferId);

    /// How many queued buffers the source has finished playing.
    fn buffers_processed(&mut self, source: SourceId) -> usize;

    /// Reclaim the oldest processed buffer, FIFO.
    fn dequeue_processed(&mut self, source: SourceId) -> Option<BufferId>;

    /// Poll the source's coarse playback state.
    fn playback_state(&mut self, source: SourceId) -> PlaybackState;

    /// Reset per-source parameters ahead of a fresh play.
    fn reset_source(&mut self, source: SourceId, params: &SourceParams);

    /// Begin consuming the source's queued buffers.
    fn play(&mut self, source: SourceId);

    /// Stop the source. All queued buffers become processed.
    fn stop(&mut self, source: SourceId);
}
