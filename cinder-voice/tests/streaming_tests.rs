//! Streaming engine tests against a scriptable mock backend.
//!
//! The mock models native queue semantics: buffers become processed when
//! the test says playback consumed them, a stopped source marks its whole
//! queue processed, and a playing source whose queue empties drains to
//! stopped on its own.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;

use cinder_voice::{
    AudioEngine, BUFFER_COUNT, BUFFER_SAMPLES, Backend, BufferFormat, BufferId, PlaybackState,
    SourceId, SourceParams, VOICE_COUNT, Waveform, formats, voice_flags,
};

// ============================================================================
// Mock backend
// ============================================================================

#[derive(Default)]
struct MockSource {
    queued: VecDeque<BufferId>,
    processed: VecDeque<BufferId>,
    playing: bool,
    stopped: bool,
    play_calls: usize,
    reset_calls: usize,
}

#[derive(Default)]
struct MockState {
    sources: Vec<MockSource>,
    /// (buffer, samples, sample_rate) per submit call
    submissions: Vec<(BufferId, usize, u32)>,
}

#[derive(Clone, Default)]
struct MockBackend {
    inner: Rc<RefCell<MockState>>,
}

impl MockBackend {
    fn new() -> (Self, Self) {
        let backend = Self::default();
        let handle = backend.clone();
        (backend, handle)
    }

    /// Script playback progress: the source finished `count` queued
    /// buffers.
    fn complete_buffers(&self, source: usize, count: usize) {
        let mut state = self.inner.borrow_mut();
        let src = &mut state.sources[source];
        for _ in 0..count {
            let buffer = src.queued.pop_front().expect("no queued buffer to complete");
            src.processed.push_back(buffer);
        }
    }

    fn submissions(&self) -> Vec<(BufferId, usize, u32)> {
        self.inner.borrow().submissions.clone()
    }

    fn queued_len(&self, source: usize) -> usize {
        self.inner.borrow().sources[source].queued.len()
    }

    fn play_calls(&self, source: usize) -> usize {
        self.inner.borrow().sources[source].play_calls
    }

    fn reset_calls(&self, source: usize) -> usize {
        self.inner.borrow().sources[source].reset_calls
    }
}

impl Backend for MockBackend {
    type Error = std::convert::Infallible;

    fn allocate_sources(&mut self, count: usize) -> Result<Vec<SourceId>, Self::Error> {
        let mut state = self.inner.borrow_mut();
        state.sources = (0..count).map(|_| MockSource::default()).collect();
        Ok((0..count as u32).map(SourceId).collect())
    }

    fn allocate_buffers(&mut self, count: usize) -> Result<Vec<BufferId>, Self::Error> {
        Ok((0..count as u32).map(BufferId).collect())
    }

    fn submit(&mut self, buffer: BufferId, _format: BufferFormat, pcm: &[i16], sample_rate: u32) {
        self.inner
            .borrow_mut()
            .submissions
            .push((buffer, pcm.len(), sample_rate));
    }

    fn enqueue(&mut self, source: SourceId, buffer: BufferId) {
        self.inner.borrow_mut().sources[source.0 as usize]
            .queued
            .push_back(buffer);
    }

    fn buffers_processed(&mut self, source: SourceId) -> usize {
        self.inner.borrow().sources[source.0 as usize].processed.len()
    }

    fn dequeue_processed(&mut self, source: SourceId) -> Option<BufferId> {
        self.inner.borrow_mut().sources[source.0 as usize]
            .processed
            .pop_front()
    }

    fn playback_state(&mut self, source: SourceId) -> PlaybackState {
        let mut state = self.inner.borrow_mut();
        let src = &mut state.sources[source.0 as usize];
        if src.stopped {
            PlaybackState::Stopped
        } else if src.playing {
            // A playing source with nothing left queued drains to stopped
            if src.queued.is_empty() {
                src.playing = false;
                src.stopped = true;
                PlaybackState::Stopped
            } else {
                PlaybackState::Playing
            }
        } else {
            PlaybackState::Other
        }
    }

    fn reset_source(&mut self, source: SourceId, _params: &SourceParams) {
        let mut state = self.inner.borrow_mut();
        let src = &mut state.sources[source.0 as usize];
        src.reset_calls += 1;
        src.playing = false;
        src.stopped = false;
    }

    fn play(&mut self, source: SourceId) {
        let mut state = self.inner.borrow_mut();
        let src = &mut state.sources[source.0 as usize];
        src.play_calls += 1;
        src.playing = true;
        src.stopped = false;
    }

    fn stop(&mut self, source: SourceId) {
        let mut state = self.inner.borrow_mut();
        let src = &mut state.sources[source.0 as usize];
        while let Some(buffer) = src.queued.pop_front() {
            src.processed.push_back(buffer);
        }
        src.playing = false;
        src.stopped = true;
    }
}

// ============================================================================
// Test waveform
// ============================================================================

/// Mono tone of a fixed length; every rendered sample is 1.
struct Tone {
    frames: u64,
}

impl Tone {
    fn new(frames: u64) -> Arc<Self> {
        Arc::new(Self { frames })
    }
}

impl Waveform for Tone {
    fn frame_count(&self) -> u64 {
        self.frames
    }
    fn channel_count(&self) -> u16 {
        1
    }
    fn sample_rate(&self) -> u32 {
        22050
    }
    fn format(&self) -> BufferFormat {
        BufferFormat::Mono16
    }
    fn render(
        &self,
        frame_offset: &mut u64,
        _decoder: Option<&mut (dyn Any + Send)>,
        dest: &mut [i16],
    ) -> usize {
        let frames = self.bufferable_frames(*frame_offset);
        for sample in dest.iter_mut().take(frames) {
            *sample = 1;
        }
        *frame_offset += frames as u64;
        frames
    }
}

fn engine() -> (AudioEngine<MockBackend>, MockBackend) {
    let (backend, handle) = MockBackend::new();
    let engine = AudioEngine::new(backend).unwrap();
    (engine, handle)
}

const CHUNK: u64 = BUFFER_SAMPLES as u64;

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_pool_exhaustion_returns_none() {
    let (mut engine, _) = engine();
    let long = Tone::new(CHUNK * 100);

    for expected in 0..VOICE_COUNT {
        assert_eq!(engine.play(long.clone(), None, 0), Some(expected));
    }
    assert_eq!(engine.play(long.clone(), None, 0), None);
}

#[test]
fn test_play_resets_source_params() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK), None, 0).unwrap();
    assert_eq!(handle.reset_calls(id), 1);
}

#[test]
fn test_freed_voice_is_reused_lowest_first() {
    let (mut engine, handle) = engine();
    let long = Tone::new(CHUNK * 100);

    for _ in 0..VOICE_COUNT {
        engine.play(long.clone(), None, 0);
    }
    engine.update();

    engine.stop(5);
    assert!(engine.is_active(5), "release is deferred, not immediate");

    engine.update();
    assert!(!engine.is_active(5));
    assert_eq!(engine.play(long.clone(), None, 0), Some(5));
}

// ============================================================================
// Two-phase start/service protocol
// ============================================================================

#[test]
fn test_start_and_service_masks_swap_across_one_tick() {
    let (mut engine, _) = engine();
    let id = engine.play(Tone::new(CHUNK * 10), None, 0).unwrap();
    let bit = 1u32 << id;

    assert_eq!(engine.unstarted_mask() & bit, bit);
    assert_eq!(engine.started_mask() & bit, 0);

    engine.update();

    assert_eq!(engine.unstarted_mask() & bit, 0);
    assert_eq!(engine.started_mask() & bit, bit);
}

#[test]
fn test_start_primes_full_double_buffer_then_plays() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK * 10), None, 0).unwrap();

    // Nothing audible before the tick
    assert!(handle.submissions().is_empty());
    assert_eq!(handle.play_calls(id), 0);

    engine.update();

    let submissions = handle.submissions();
    assert_eq!(submissions.len(), BUFFER_COUNT);
    for (_, samples, rate) in &submissions {
        assert_eq!(*samples, BUFFER_SAMPLES);
        assert_eq!(*rate, 22050);
    }
    assert_eq!(handle.play_calls(id), 1);
    assert_eq!(handle.queued_len(id), BUFFER_COUNT);
    assert_eq!(engine.voice(id).inuse_count(), BUFFER_COUNT);
}

#[test]
fn test_short_sound_primes_single_buffer() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(100), None, 0).unwrap();

    engine.update();

    let submissions = handle.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].1, 100);
    assert_eq!(engine.voice(id).inuse_count(), 1);
    assert_eq!(handle.play_calls(id), 1);
}

// ============================================================================
// Buffer accounting
// ============================================================================

#[test]
fn test_service_refills_consumed_buffers() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK * 10), None, 0).unwrap();
    engine.update();

    handle.complete_buffers(id, 1);
    engine.update();

    // One dequeued, one refilled; the pipeline stays full
    assert_eq!(engine.voice(id).inuse_count(), BUFFER_COUNT);
    assert_eq!(handle.submissions().len(), BUFFER_COUNT + 1);
    assert_eq!(engine.voice(id).frame_offset(), CHUNK * 3);

    handle.complete_buffers(id, 2);
    engine.update();
    assert_eq!(engine.voice(id).inuse_count(), BUFFER_COUNT);
    assert_eq!(handle.submissions().len(), BUFFER_COUNT + 3);
}

#[test]
fn test_inuse_count_never_exceeds_buffer_count() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK * 100), None, 0).unwrap();

    engine.update();
    for _ in 0..10 {
        handle.complete_buffers(id, 1);
        engine.update();
        let inuse = engine.voice(id).inuse_count();
        assert!(inuse <= BUFFER_COUNT, "inuse {} out of bounds", inuse);
    }
}

// ============================================================================
// Looping and exhaustion
// ============================================================================

#[test]
fn test_looping_voice_wraps_and_keeps_streaming() {
    let (mut engine, handle) = engine();
    let frames = CHUNK + CHUNK / 2;
    let id = engine
        .play(Tone::new(frames), None, voice_flags::LOOPING)
        .unwrap();

    // Prime consumes the whole waveform (one full + one half chunk)
    engine.update();
    assert_eq!(engine.voice(id).frame_offset(), frames);

    // Next service wraps to 0 and keeps the queue full forever
    for _ in 0..6 {
        handle.complete_buffers(id, 1);
        engine.update();
        assert!(engine.is_active(id));
        assert_eq!(engine.voice(id).inuse_count(), BUFFER_COUNT);
        assert!(engine.voice(id).frame_offset() <= frames);
    }
}

#[test]
fn test_non_looping_voice_released_after_drain() {
    let (mut engine, handle) = engine();
    let id = engine
        .play(Tone::new(CHUNK * 2), None, voice_flags::RELEASE_ON_STOP)
        .unwrap();

    engine.update();
    assert_eq!(engine.voice(id).inuse_count(), 2);
    assert_eq!(engine.voice(id).frame_offset(), CHUNK * 2);

    // First buffer consumed: nothing left to refill, but the second is
    // still playing
    handle.complete_buffers(id, 1);
    engine.update();
    assert!(engine.is_active(id));
    assert_eq!(engine.voice(id).inuse_count(), 1);

    // Queue fully drained: the backend reports stopped and the slot is
    // reclaimed
    handle.complete_buffers(id, 1);
    engine.update();
    assert!(!engine.is_active(id));
    assert_eq!(engine.play(Tone::new(10), None, 0), Some(id));
}

#[test]
fn test_voice_without_release_flag_stays_allocated() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK), None, 0).unwrap();

    engine.update();
    handle.complete_buffers(id, 1);
    engine.update();
    engine.update();

    // Drained and stopped, but the caller kept responsibility for it
    assert!(engine.is_active(id));

    engine.stop(id);
    engine.update();
    assert!(!engine.is_active(id));
}

// ============================================================================
// Stop semantics
// ============================================================================

#[test]
fn test_stop_before_first_tick_reclaims_immediately() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK * 10), None, 0).unwrap();

    engine.stop(id);
    assert!(!engine.is_active(id));

    // Nothing was ever primed or started
    engine.update();
    assert!(handle.submissions().is_empty());
    assert_eq!(handle.play_calls(id), 0);
}

#[test]
fn test_stop_of_playing_voice_defers_to_next_tick() {
    let (mut engine, handle) = engine();
    let id = engine.play(Tone::new(CHUNK * 10), None, 0).unwrap();
    engine.update();

    engine.stop(id);
    assert!(engine.is_active(id));

    engine.update();
    assert!(!engine.is_active(id));
    assert_eq!(handle.queued_len(id), 0, "freed slot leaves a clean queue");
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_exhaust_stop_reuse_scenario() {
    let (mut engine, _) = engine();
    let long = Tone::new(CHUNK * 100);

    let mut ids = Vec::new();
    for _ in 0..VOICE_COUNT {
        ids.push(engine.play(long.clone(), None, 0).unwrap());
    }
    assert_eq!(engine.play(long.clone(), None, 0), None);

    engine.update();

    engine.stop(ids[0]);
    engine.update();

    assert_eq!(engine.play(long.clone(), None, 0), Some(ids[0]));
}

#[test]
fn test_wav_pipeline_end_to_end() {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..BUFFER_SAMPLES + 10 {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    let waveform = formats::prepare_wav(cursor.into_inner().into()).unwrap();

    let (mut engine, handle) = engine();
    let id = engine
        .play(waveform, None, voice_flags::RELEASE_ON_STOP)
        .unwrap();

    engine.update();
    let submissions = handle.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].1, BUFFER_SAMPLES);
    assert_eq!(submissions[1].1, 10);

    handle.complete_buffers(id, 2);
    engine.update();
    assert!(!engine.is_active(id));
}
