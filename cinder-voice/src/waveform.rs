//! Waveform render capability
//!
//! A [`Waveform`] is an immutable description of a decodable sound asset.
//! Every format - compressed or raw - participates in streaming through
//! the single [`Waveform::render`] method; the engine is generic over the
//! capability and never over concrete formats.

use std::any::Any;

use crate::BUFFER_SIZE;

/// Voice behavior flags, passed to `AudioEngine::play`.
pub mod voice_flags {
    /// Restart from frame 0 when the waveform is exhausted
    pub const LOOPING: u8 = 1 << 0;
    /// Free the slot once the backend reports the source stopped
    pub const RELEASE_ON_STOP: u8 = 1 << 1;
}

/// Backend-facing sample layout of rendered chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFormat {
    /// One 16-bit sample per frame
    Mono16,
    /// Two interleaved 16-bit samples per frame
    Stereo16,
}

impl BufferFormat {
    /// Interleaved samples per frame.
    pub fn channel_count(self) -> u16 {
        match self {
            BufferFormat::Mono16 => 1,
            BufferFormat::Stereo16 => 2,
        }
    }
}

/// Opaque per-voice decode state, supplied by the caller at play time and
/// handed to every render call. The engine never looks inside; it is
/// dropped when the voice slot is freed.
pub type DecoderState = Box<dyn Any + Send>;

/// Uniform render capability over a decodable sound asset.
///
/// Implementations are immutable and shared (`Arc<dyn Waveform>`); any
/// mutable decode state lives in the per-voice [`DecoderState`].
pub trait Waveform: Send + Sync {
    /// Total decodable frames.
    fn frame_count(&self) -> u64;

    /// Interleaved channels (validated to 1 or 2 at preparation time).
    fn channel_count(&self) -> u16;

    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Backend submission format.
    fn format(&self) -> BufferFormat;

    /// Decode up to [`bufferable_frames`](Waveform::bufferable_frames)
    /// frames starting at `*frame_offset` into `dest`, advancing the
    /// offset by the frames consumed. Returns frames produced; 0 is the
    /// end marker.
    fn render(
        &self,
        frame_offset: &mut u64,
        decoder: Option<&mut (dyn Any + Send)>,
        dest: &mut [i16],
    ) -> usize;

    /// Frames eligible for one render call at `offset`: a full hardware
    /// chunk, or whatever remains of the waveform if that is shorter.
    fn bufferable_frames(&self, offset: u64) -> usize {
        let chunk = BUFFER_SIZE / (self.channel_count() as usize * 2);
        let left = self.frame_count().saturating_sub(offset);
        chunk.min(left as usize)
    }
}
