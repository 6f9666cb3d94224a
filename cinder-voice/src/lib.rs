//! Cinder-Voice: fixed-capacity voice pool and double-buffered streaming
//!
//! This crate manages a bounded pool of concurrently playing sounds
//! ("voices"), streams decoded PCM into per-voice double-buffered hardware
//! queues, and reclaims voices when playback finishes.
//!
//! # Architecture
//!
//! - [`VoiceManager`]: bitmask allocator over the fixed 32-slot pool
//! - [`Voice`]: per-slot playback cursor and buffer bookkeeping
//! - [`Waveform`]: uniform render capability implemented by each format
//! - [`AudioEngine`]: per-frame two-phase update (service, then start)
//! - [`Backend`]: the native audio subsystem behind a small trait;
//!   [`CpalBackend`] is the shipped implementation
//!
//! # Update protocol
//!
//! `play()` only allocates and primes nothing; the next `update()` call
//! services already-playing voices first (dequeue consumed buffers, decode
//! the next chunk, requeue), then starts freshly allocated voices by
//! priming both of their buffers and issuing the backend play command.
//! Splitting the two keeps priming and servicing from racing on the same
//! slot within one tick.
//!
//! # Threading
//!
//! Single owning thread for `play`/`stop`/`update`. No locks anywhere in
//! the core; the cpal backend hands samples to the audio thread through
//! lock-free rings.

mod backend;
mod cpal_backend;
mod engine;
pub mod formats;
mod manager;
mod voice;
mod waveform;

pub use backend::{Backend, BufferId, PlaybackState, SourceId, SourceParams};
pub use cpal_backend::{BackendError, CpalBackend};
pub use engine::AudioEngine;
pub use manager::VoiceManager;
pub use voice::Voice;
pub use waveform::{BufferFormat, DecoderState, Waveform, voice_flags};

// ============================================================================
// Constants
// ============================================================================

/// Size of the voice pool (bitmasks are u32, so at most 32)
pub const VOICE_COUNT: usize = 32;

/// Hardware buffers per voice (one plays while the other fills)
pub const BUFFER_COUNT: usize = 2;

/// Bytes per hardware buffer chunk
pub const BUFFER_SIZE: usize = 16384;

/// 16-bit samples per hardware buffer chunk
pub const BUFFER_SAMPLES: usize = BUFFER_SIZE / 2;
