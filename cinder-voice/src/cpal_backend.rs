//! Reference backend over cpal
//!
//! cpal exposes a pull-model callback, not the queue-submission model the
//! engine speaks, so this adapter rebuilds queue semantics on top of
//! per-source lock-free rings: `submit` converts PCM to interleaved
//! stereo f32, `enqueue` pushes it into the source's ring, and the single
//! output stream callback drains and mixes every audible ring. A buffer
//! counts as processed once all of its samples have left the ring.
//!
//! No sample-rate conversion happens here: data submitted at a rate other
//! than the stream's plays pitch-shifted (conversion is an asset-pipeline
//! job). The mismatch is logged once.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{Backend, BufferId, PlaybackState, SourceId, SourceParams};
use crate::waveform::BufferFormat;
use crate::{BUFFER_COUNT, BUFFER_SAMPLES};

/// Stereo f32 ring capacity per source: the full double buffer, worst
/// case (mono chunks expand to two output samples per frame)
const RING_CAPACITY: usize = BUFFER_COUNT * BUFFER_SAMPLES * 2;

/// Mix scratch size in samples
const SCRATCH_SAMPLES: usize = 4096;

/// Backend initialization failures. Fatal: the engine cannot operate
/// without a device.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no audio output device found")]
    NoDevice,
    #[error("failed to query stream configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("sources already allocated")]
    SourcesAlreadyAllocated,
}

// Cross-thread source state, shared with the audio callback
const STATE_IDLE: u8 = 0;
const STATE_PLAYING: u8 = 1;
const STATE_FLUSHING: u8 = 2;

struct SourceShared {
    state: AtomicU8,
    /// f32 gain bits
    gain: AtomicU32,
}

impl SourceShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_IDLE),
            gain: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

/// A buffer enqueued but not yet fully pushed into the ring
struct Pending {
    id: BufferId,
    cursor: usize,
}

/// A buffer fully pushed, waiting for the callback to consume it
struct Inflight {
    id: BufferId,
    /// `pushed` watermark at which this buffer is fully consumed
    end: u64,
}

enum LaneState {
    Initial,
    Playing,
    Stopped,
}

/// Engine-thread side of one source
struct Lane {
    producer: HeapProd<f32>,
    shared: Arc<SourceShared>,
    pending: VecDeque<Pending>,
    inflight: VecDeque<Inflight>,
    ready: VecDeque<BufferId>,
    /// Stereo samples pushed into the ring since the last stop
    pushed: u64,
    state: LaneState,
}

impl Lane {
    /// Stereo samples the callback has consumed since the last stop.
    fn consumed(&self) -> u64 {
        self.pushed.saturating_sub(self.producer.occupied_len() as u64)
    }
}

/// [`Backend`] implementation over a single cpal output stream.
pub struct CpalBackend {
    device: cpal::Device,
    _stream: Option<Stream>,
    lanes: Vec<Lane>,
    buffers: Vec<Option<Vec<f32>>>,
    sample_rate: u32,
    warned_rate: bool,
}

impl CpalBackend {
    /// Open the default output device. The stream itself is built when
    /// the engine allocates its sources.
    pub fn new() -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(BackendError::NoDevice)?;
        let sample_rate = Self::find_sample_rate(&device)?;

        Ok(Self {
            device,
            _stream: None,
            lanes: Vec::new(),
            buffers: Vec::new(),
            sample_rate,
            warned_rate: false,
        })
    }

    /// Pick a stereo f32 output rate, preferring the device default.
    fn find_sample_rate(device: &cpal::Device) -> Result<u32, BackendError> {
        let default = device.default_output_config()?;
        if default.channels() == 2 && default.sample_format() == SampleFormat::F32 {
            return Ok(default.sample_rate().0);
        }

        for config in device.supported_output_configs()? {
            if config.channels() == 2 && config.sample_format() == SampleFormat::F32 {
                return Ok(config.max_sample_rate().0);
            }
        }

        // Fall back to the default rate; stream build will surface any
        // real incompatibility
        Ok(default.sample_rate().0)
    }

    /// The output stream rate submissions are expected to match.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Move pending buffer data into the ring as space allows and promote
    /// fully consumed buffers to the processed queue.
    fn pump(&mut self, source: SourceId) {
        let lane = &mut self.lanes[source.0 as usize];

        // A flush is still draining stale samples; pushing now would lose
        // data and skew the consumed watermark
        if lane.shared.state.load(Ordering::Acquire) != STATE_FLUSHING {
            while let Some(front) = lane.pending.front_mut() {
                let Some(data) = self.buffers.get(front.id.0 as usize).and_then(Option::as_ref)
                else {
                    lane.pending.pop_front();
                    continue;
                };

                let wrote = lane.producer.push_slice(&data[front.cursor..]);
                front.cursor += wrote;
                lane.pushed += wrote as u64;

                if front.cursor < data.len() {
                    break;
                }
                let done = lane.pending.pop_front().map(|p| p.id);
                if let Some(id) = done {
                    lane.inflight.push_back(Inflight {
                        id,
                        end: lane.pushed,
                    });
                }
            }
        }

        let consumed = lane.consumed();
        while lane
            .inflight
            .front()
            .is_some_and(|buffer| buffer.end <= consumed)
        {
            if let Some(buffer) = lane.inflight.pop_front() {
                lane.ready.push_back(buffer.id);
            }
        }
    }
}

impl Backend for CpalBackend {
    type Error = BackendError;

    /// Build the mixing stream and one ring per source. Supports a single
    /// allocation round, which is all the engine ever performs.
    fn allocate_sources(&mut self, count: usize) -> Result<Vec<SourceId>, Self::Error> {
        if self._stream.is_some() {
            return Err(BackendError::SourcesAlreadyAllocated);
        }

        let mut consumers: Vec<(HeapCons<f32>, Arc<SourceShared>)> = Vec::with_capacity(count);
        for _ in 0..count {
            let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
            let shared = Arc::new(SourceShared::new());
            consumers.push((consumer, shared.clone()));
            self.lanes.push(Lane {
                producer,
                shared,
                pending: VecDeque::new(),
                inflight: VecDeque::new(),
                ready: VecDeque::new(),
                pushed: 0,
                state: LaneState::Initial,
            });
        }

        let config = StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut scratch = vec![0f32; SCRATCH_SAMPLES];
        let stream = self.device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                data.fill(0.0);

                for (consumer, shared) in consumers.iter_mut() {
                    match shared.state.load(Ordering::Acquire) {
                        STATE_PLAYING => {
                            let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));
                            let mut at = 0;
                            while at < data.len() {
                                let want = (data.len() - at).min(scratch.len());
                                let got = consumer.pop_slice(&mut scratch[..want]);
                                if got == 0 {
                                    break;
                                }
                                for (out, sample) in
                                    data[at..at + got].iter_mut().zip(&scratch[..got])
                                {
                                    *out += sample * gain;
                                }
                                at += got;
                            }
                        }
                        STATE_FLUSHING => {
                            consumer.clear();
                            shared.state.store(STATE_IDLE, Ordering::Release);
                        }
                        _ => {}
                    }
                }

                for sample in data.iter_mut() {
                    *sample = sample.clamp(-1.0, 1.0);
                }
            },
            |err| {
                tracing::error!("audio stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        info!(
            sources = count,
            sample_rate = self.sample_rate,
            ring_capacity = RING_CAPACITY,
            "cpal backend stream started"
        );
        self._stream = Some(stream);

        Ok((0..count as u32).map(SourceId).collect())
    }

    fn allocate_buffers(&mut self, count: usize) -> Result<Vec<BufferId>, Self::Error> {
        let first = self.buffers.len() as u32;
        self.buffers.extend((0..count).map(|_| None));
        Ok((first..first + count as u32).map(BufferId).collect())
    }

    fn submit(&mut self, buffer: BufferId, format: BufferFormat, pcm: &[i16], sample_rate: u32) {
        if sample_rate != self.sample_rate && !self.warned_rate {
            warn!(
                submitted = sample_rate,
                stream = self.sample_rate,
                "sample rate mismatch; playing without conversion"
            );
            self.warned_rate = true;
        }

        // Interleaved stereo f32 for the mix callback
        let stereo = match format {
            BufferFormat::Mono16 => {
                let mut out = Vec::with_capacity(pcm.len() * 2);
                for &sample in pcm {
                    let value = sample as f32 / 32768.0;
                    out.push(value);
                    out.push(value);
                }
                out
            }
            BufferFormat::Stereo16 => pcm.iter().map(|&s| s as f32 / 32768.0).collect(),
        };

        self.buffers[buffer.0 as usize] = Some(stereo);
    }

    fn enqueue(&mut self, source: SourceId, buffer: BufferId) {
        self.lanes[source.0 as usize]
            .pending
            .push_back(Pending { id: buffer, cursor: 0 });
        self.pump(source);
    }

    fn buffers_processed(&mut self, source: SourceId) -> usize {
        self.pump(source);
        self.lanes[source.0 as usize].ready.len()
    }

    fn dequeue_processed(&mut self, source: SourceId) -> Option<BufferId> {
        self.pump(source);
        self.lanes[source.0 as usize].ready.pop_front()
    }

    fn playback_state(&mut self, source: SourceId) -> PlaybackState {
        self.pump(source);
        let lane = &mut self.lanes[source.0 as usize];

        match lane.state {
            LaneState::Initial => PlaybackState::Other,
            LaneState::Stopped => PlaybackState::Stopped,
            LaneState::Playing => {
                let drained = lane.pending.is_empty()
                    && lane.inflight.is_empty()
                    && lane.producer.is_empty();
                if drained {
                    lane.state = LaneState::Stopped;
                    lane.shared.state.store(STATE_IDLE, Ordering::Release);
                    PlaybackState::Stopped
                } else {
                    PlaybackState::Playing
                }
            }
        }
    }

    fn reset_source(&mut self, source: SourceId, params: &SourceParams) {
        let lane = &mut self.lanes[source.0 as usize];
        lane.shared
            .gain
            .store(params.gain.to_bits(), Ordering::Relaxed);
        lane.state = LaneState::Initial;
        // pitch, position, velocity and hw_looping are accepted but have
        // no effect in this backend; the engine only ever passes defaults
    }

    fn play(&mut self, source: SourceId) {
        let lane = &mut self.lanes[source.0 as usize];
        lane.state = LaneState::Playing;
        lane.shared.state.store(STATE_PLAYING, Ordering::Release);
    }

    /// Stop consuming; every queued buffer immediately counts as
    /// processed, as with native queue APIs.
    fn stop(&mut self, source: SourceId) {
        let lane = &mut self.lanes[source.0 as usize];

        for pending in lane.pending.drain(..) {
            lane.ready.push_back(pending.id);
        }
        for inflight in lane.inflight.drain(..) {
            lane.ready.push_back(inflight.id);
        }
        lane.pushed = 0;
        lane.state = LaneState::Stopped;
        lane.shared.state.store(STATE_FLUSHING, Ordering::Release);
    }
}
