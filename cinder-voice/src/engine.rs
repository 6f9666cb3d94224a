//! Streaming engine
//!
//! Orchestrates the per-tick double-buffered streaming protocol over a
//! [`Backend`]: dequeue consumed hardware buffers, decode the next chunk
//! through the voice's waveform, queue it back, and run the one-time
//! prime-and-start sequence for voices allocated since the last tick.

use std::sync::Arc;

use tracing::{info, trace};

use crate::backend::{Backend, BufferId, PlaybackState, SourceId, SourceParams};
use crate::manager::VoiceManager;
use crate::voice::{Voice, voice_pool};
use crate::waveform::{DecoderState, Waveform};
use crate::{BUFFER_COUNT, BUFFER_SAMPLES, VOICE_COUNT};

/// Fixed-capacity voice pool streaming into double-buffered backend
/// queues.
///
/// Owned and driven by a single thread: `play`, `stop` and `update` must
/// all come from the same caller (one audio update per host frame).
pub struct AudioEngine<B: Backend> {
    backend: B,
    manager: VoiceManager,
    voices: [Voice; VOICE_COUNT],
    sources: Vec<SourceId>,
    buffers: Vec<BufferId>,
    /// One pre-allocated chunk per (voice, buffer slot); no allocation on
    /// the streaming path
    arena: Vec<i16>,
}

impl<B: Backend> AudioEngine<B> {
    /// Build the engine over a backend, allocating every source, buffer
    /// object and the sample arena up front.
    ///
    /// Failure here is fatal to audio: the caller aborts startup rather
    /// than limping on without a backend.
    pub fn new(mut backend: B) -> Result<Self, B::Error> {
        let sources = backend.allocate_sources(VOICE_COUNT)?;
        let buffers = backend.allocate_buffers(VOICE_COUNT * BUFFER_COUNT)?;
        let arena = vec![0i16; VOICE_COUNT * BUFFER_COUNT * BUFFER_SAMPLES];

        info!(
            voices = VOICE_COUNT,
            buffers = buffers.len(),
            arena_bytes = arena.len() * 2,
            "audio engine initialized"
        );

        Ok(Self {
            backend,
            manager: VoiceManager::new(),
            voices: voice_pool(),
            sources,
            buffers,
            arena,
        })
    }

    /// Allocate a voice for `waveform`.
    ///
    /// The slot is primed and started by the next `update()`; nothing is
    /// audible before that. Returns `None` when the pool is exhausted -
    /// the caller decides whether the sound request just drops.
    ///
    /// Backend source parameters are reset to defaults: looping is always
    /// emulated in software (see [`crate::voice_flags::LOOPING`]), never
    /// delegated to the backend.
    pub fn play(
        &mut self,
        waveform: Arc<dyn Waveform>,
        decoder: Option<DecoderState>,
        flags: u8,
    ) -> Option<usize> {
        let id = self.manager.allocate()?;

        self.backend
            .reset_source(self.sources[id], &SourceParams::default());
        self.voices[id].reset(waveform, decoder, flags);

        trace!(voice = id, "voice allocated");
        Some(id)
    }

    /// Request release of a playing voice.
    ///
    /// Deferred contract: the slot is freed by a later `update()` once
    /// the backend confirms the source stopped, so queued buffers finish
    /// draining before the slot (and the caller's decoder state) is
    /// reused. A voice that was allocated but never started has nothing
    /// in flight and is reclaimed immediately.
    pub fn stop(&mut self, id: usize) {
        if !self.manager.is_allocated(id) {
            return;
        }

        if self.manager.unstarted_mask() & (1 << id) != 0 {
            self.free_voice(id);
            return;
        }

        self.voices[id].set_release_on_stop();
        self.backend.stop(self.sources[id]);
    }

    /// Run one streaming tick: service every started voice, then prime
    /// and start every voice allocated since the last tick.
    ///
    /// The order matters: starting requires freshly primed buffers, while
    /// servicing must never re-prime. The two bitmask phases keep those
    /// from racing on the same slot.
    pub fn update(&mut self) {
        self.service_started();
        self.start_unstarted();
    }

    /// Phase A: for each playing voice, reclaim consumed buffers and
    /// refill each one in FIFO order, then release the slot if the
    /// backend drained it and the voice asked for that.
    fn service_started(&mut self) {
        let mask = self.manager.started_mask();
        if mask == 0 {
            return;
        }

        for id in 0..VOICE_COUNT {
            if mask & (1 << id) == 0 {
                continue;
            }
            let source = self.sources[id];

            let mut processed = self.backend.buffers_processed(source);
            while processed > 0 {
                processed -= 1;
                let Some(buffer) = self.backend.dequeue_processed(source) else {
                    debug_assert!(false, "processed count exceeded dequeued buffers");
                    break;
                };

                self.voices[id].advance_dequeued();
                self.render_and_queue(id, buffer);
            }

            if self.backend.playback_state(source) == PlaybackState::Stopped
                && self.voices[id].release_on_stop()
            {
                self.free_voice(id);
            }
        }
    }

    /// Phase B: prime and start voices allocated since the last tick.
    fn start_unstarted(&mut self) {
        let mask = self.manager.unstarted_mask();
        if mask == 0 {
            return;
        }

        for id in 0..VOICE_COUNT {
            if mask & (1 << id) == 0 {
                continue;
            }

            self.manager.start(id);
            debug_assert_eq!(
                self.voices[id].inuse_count(),
                0,
                "fresh voice has buffers in flight"
            );

            // Prime the full double buffer so the source never starves
            // waiting for the first service tick
            for _ in 0..BUFFER_COUNT {
                let buffer = self.buffers[id * BUFFER_COUNT + self.voices[id].queued_index()];
                self.render_and_queue(id, buffer);
            }

            self.backend.play(self.sources[id]);
            trace!(voice = id, "voice started");
        }
    }

    /// Decode the voice's next chunk into its arena slot and queue it on
    /// the backend. Queues nothing once a non-looping waveform is spent.
    fn render_and_queue(&mut self, id: usize, buffer: BufferId) {
        let (format, sample_rate) = {
            let Some(waveform) = self.voices[id].waveform() else {
                return;
            };
            (waveform.format(), waveform.sample_rate())
        };

        let chunk_at = (id * BUFFER_COUNT + self.voices[id].queued_index()) * BUFFER_SAMPLES;
        let chunk = &mut self.arena[chunk_at..chunk_at + BUFFER_SAMPLES];

        let Some(frames) = self.voices[id].render(chunk) else {
            return;
        };
        let samples = frames * format.channel_count() as usize;

        self.voices[id].advance_queued();
        self.backend.submit(
            buffer,
            format,
            &self.arena[chunk_at..chunk_at + samples],
            sample_rate,
        );
        self.backend.enqueue(self.sources[id], buffer);
    }

    /// Return a slot to the pool: drain any leftover processed handles so
    /// the next allocation re-primes from a clean queue, then clear the
    /// slot (dropping the waveform reference and decoder state).
    fn free_voice(&mut self, id: usize) {
        let source = self.sources[id];
        self.backend.stop(source);
        while self.backend.dequeue_processed(source).is_some() {}

        self.voices[id].clear();
        self.manager.free(id);
        trace!(voice = id, "voice freed");
    }

    /// Mask of voices currently playing and owed streaming service.
    pub fn started_mask(&self) -> u32 {
        self.manager.started_mask()
    }

    /// Mask of voices allocated but not yet started.
    pub fn unstarted_mask(&self) -> u32 {
        self.manager.unstarted_mask()
    }

    /// Whether `id` currently holds an allocated voice.
    pub fn is_active(&self, id: usize) -> bool {
        self.manager.is_allocated(id)
    }

    /// Inspect a voice slot.
    pub fn voice(&self, id: usize) -> &Voice {
        &self.voices[id]
    }
}
