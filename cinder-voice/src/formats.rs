//! Waveform preparation
//!
//! Bridges the format collaborators (`cinder-wav`, `cinder-ima`) into the
//! engine's [`Waveform`] contract. Container parsing and bit-unpacking
//! stay in the codec crates; this module validates stream parameters and
//! implements the per-chunk render over the shared backing bytes.

use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

use crate::waveform::{BufferFormat, Waveform};

/// A container failed to yield a playable waveform. The engine never
/// recovers from these; it simply declines the asset.
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("wav: {0}")]
    Wav(#[from] cinder_wav::WavError),
    #[error("caf: {0}")]
    Caf(#[from] cinder_ima::CafError),
    #[error("unsupported channel count {0} (must be 1 or 2)")]
    ChannelCount(u32),
}

fn format_for(channel_count: u16) -> BufferFormat {
    if channel_count == 2 {
        BufferFormat::Stereo16
    } else {
        BufferFormat::Mono16
    }
}

// ============================================================================
// Linear PCM (WAV)
// ============================================================================

/// Raw 16-bit PCM read straight out of a RIFF container.
struct WavWaveform {
    bytes: Arc<[u8]>,
    data: Range<usize>,
    frame_count: u64,
    channel_count: u16,
    sample_rate: u32,
}

impl Waveform for WavWaveform {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> BufferFormat {
        format_for(self.channel_count)
    }

    fn render(
        &self,
        frame_offset: &mut u64,
        _decoder: Option<&mut (dyn Any + Send)>,
        dest: &mut [i16],
    ) -> usize {
        let frames = self.bufferable_frames(*frame_offset);
        let channels = self.channel_count as usize;
        let pcm = &self.bytes[self.data.clone()];
        let base = *frame_offset as usize * channels * 2;

        for (i, out) in dest.iter_mut().take(frames * channels).enumerate() {
            let at = base + i * 2;
            *out = i16::from_le_bytes([pcm[at], pcm[at + 1]]);
        }

        *frame_offset += frames as u64;
        frames
    }
}

/// Prepare a 16-bit PCM WAV container for playback.
pub fn prepare_wav(bytes: Arc<[u8]>) -> Result<Arc<dyn Waveform>, PrepareError> {
    let info = cinder_wav::parse_wav(&bytes)?;

    if !(1..=2).contains(&info.channel_count) {
        return Err(PrepareError::ChannelCount(info.channel_count as u32));
    }

    Ok(Arc::new(WavWaveform {
        bytes,
        data: info.data,
        frame_count: info.frame_count,
        channel_count: info.channel_count,
        sample_rate: info.sample_rate,
    }))
}

// ============================================================================
// IMA4 ADPCM (CAF)
// ============================================================================

/// Block-compressed IMA4 packets decoded chunk by chunk.
struct ImaWaveform {
    bytes: Arc<[u8]>,
    data: Range<usize>,
    frame_count: u64,
    channel_count: u16,
    sample_rate: u32,
}

impl Waveform for ImaWaveform {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn channel_count(&self) -> u16 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn format(&self) -> BufferFormat {
        format_for(self.channel_count)
    }

    fn render(
        &self,
        frame_offset: &mut u64,
        _decoder: Option<&mut (dyn Any + Send)>,
        dest: &mut [i16],
    ) -> usize {
        let frames = self.bufferable_frames(*frame_offset);
        let channels = self.channel_count as usize;

        let produced = cinder_ima::decode(
            &mut dest[..frames * channels],
            &self.bytes[self.data.clone()],
            channels,
            *frame_offset,
            frames,
        );

        *frame_offset += produced as u64;
        produced
    }
}

/// Prepare an IMA4-compressed CAF container for playback.
pub fn prepare_caf(bytes: Arc<[u8]>) -> Result<Arc<dyn Waveform>, PrepareError> {
    let info = cinder_ima::parse_caf(&bytes)?;

    if !(1..=2).contains(&info.channel_count) {
        return Err(PrepareError::ChannelCount(info.channel_count));
    }

    Ok(Arc::new(ImaWaveform {
        bytes,
        data: info.data,
        frame_count: info.frame_count,
        channel_count: info.channel_count as u16,
        sample_rate: info.sample_rate.round() as u32,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BUFFER_SAMPLES;
    use std::io::Cursor;

    fn wav_bytes(channels: u16, frames: usize) -> Arc<[u8]> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames * channels as usize {
                writer.write_sample(i as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner().into()
    }

    #[test]
    fn test_prepare_wav_mono() {
        let wf = prepare_wav(wav_bytes(1, 100)).unwrap();
        assert_eq!(wf.frame_count(), 100);
        assert_eq!(wf.channel_count(), 1);
        assert_eq!(wf.sample_rate(), 22050);
        assert_eq!(wf.format(), BufferFormat::Mono16);
    }

    #[test]
    fn test_wav_render_advances_cursor_and_copies_samples() {
        let wf = prepare_wav(wav_bytes(2, 50)).unwrap();
        let mut dest = vec![0i16; BUFFER_SAMPLES];
        let mut offset = 0;

        let frames = wf.render(&mut offset, None, &mut dest);
        assert_eq!(frames, 50);
        assert_eq!(offset, 50);
        assert_eq!(&dest[..4], &[0, 1, 2, 3]);

        // Spent
        assert_eq!(wf.render(&mut offset, None, &mut dest), 0);
    }

    #[test]
    fn test_wav_render_chunks_long_asset() {
        let frames = BUFFER_SAMPLES + 100; // mono: one full chunk plus a tail
        let wf = prepare_wav(wav_bytes(1, frames)).unwrap();
        let mut dest = vec![0i16; BUFFER_SAMPLES];
        let mut offset = 0;

        assert_eq!(wf.render(&mut offset, None, &mut dest), BUFFER_SAMPLES);
        assert_eq!(wf.render(&mut offset, None, &mut dest), 100);
        assert_eq!(offset, frames as u64);
    }

    #[test]
    fn test_prepare_wav_rejects_three_channels() {
        match prepare_wav(wav_bytes(3, 10)) {
            Err(PrepareError::ChannelCount(3)) => {}
            other => panic!("expected channel count error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_prepare_caf_roundtrip_render() {
        let samples: Vec<i16> = (0..500).map(|i| (i * 40) as i16).collect();
        let packets = cinder_ima::encode(&samples, 1);
        let caf: Arc<[u8]> = cinder_ima::write_caf(&packets, 1, 22050.0, 500).into();

        let wf = prepare_caf(caf).unwrap();
        assert_eq!(wf.frame_count(), 500);
        assert_eq!(wf.sample_rate(), 22050);

        let mut dest = vec![0i16; BUFFER_SAMPLES];
        let mut offset = 0;
        let frames = wf.render(&mut offset, None, &mut dest);
        assert_eq!(frames, 500);
        assert_eq!(offset, 500);

        // Lossy codec; decoded output tracks the ramp
        for (i, &sample) in dest[..500].iter().enumerate().skip(1) {
            assert!(
                (sample as i32 - i as i32 * 40).abs() < 2000,
                "sample {} too far off: {}",
                i,
                sample
            );
        }
    }

    #[test]
    fn test_prepare_caf_rejects_three_channels() {
        let caf: Arc<[u8]> = cinder_ima::write_caf(&[0u8; 102], 3, 22050.0, 64).into();
        match prepare_caf(caf) {
            Err(PrepareError::ChannelCount(3)) => {}
            other => panic!("expected channel count error, got {:?}", other.map(|_| ())),
        }
    }
}
