//! Cinder-WAV: minimal RIFF/WAVE linear-PCM reader
//!
//! Locates the `fmt ` and `data` chunks of a WAV file and validates that
//! the payload is 16-bit integer PCM - the only encoding the streaming
//! engine plays natively. No decoding happens here; the waveform glue in
//! `cinder-voice` reads sample frames straight out of the reported data
//! range.
//!
//! Compressed or float WAV variants are rejected rather than converted
//! (sample conversion is an asset-pipeline job, not a playback-time one).

use core::ops::Range;

/// WAVE format tag for integer PCM
const WAVE_FORMAT_PCM: u16 = 1;

/// Errors that can occur while reading a WAV container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavError {
    /// File is too small for the RIFF header
    FileTooSmall,
    /// Missing RIFF/WAVE magic
    BadMagic,
    /// A chunk extends past the end of the file
    TruncatedChunk,
    /// No `fmt ` chunk before the audio data
    MissingFormat,
    /// No `data` chunk
    MissingData,
    /// Format tag is not integer PCM
    NotPcm(u16),
    /// Sample width is not 16 bits
    NotSixteenBit(u16),
}

impl core::fmt::Display for WavError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WavError::FileTooSmall => write!(f, "file too small for RIFF header"),
            WavError::BadMagic => write!(f, "missing RIFF/WAVE magic"),
            WavError::TruncatedChunk => write!(f, "truncated WAV chunk"),
            WavError::MissingFormat => write!(f, "missing fmt chunk"),
            WavError::MissingData => write!(f, "missing data chunk"),
            WavError::NotPcm(tag) => write!(f, "not integer PCM (format tag {})", tag),
            WavError::NotSixteenBit(bits) => write!(f, "not 16-bit samples (got {})", bits),
        }
    }
}

impl std::error::Error for WavError {}

/// Stream parameters extracted from a WAV container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavInfo {
    /// Interleaved channels
    pub channel_count: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Total sample frames in the data chunk
    pub frame_count: u64,
    /// Byte range of the interleaved 16-bit PCM within the input
    pub data: Range<usize>,
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Parse a WAV container holding 16-bit integer PCM.
pub fn parse_wav(bytes: &[u8]) -> Result<WavInfo, WavError> {
    if bytes.len() < 12 {
        return Err(WavError::FileTooSmall);
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::BadMagic);
    }

    let mut at = 12;
    let mut format: Option<(u16, u16, u32)> = None;
    let mut data: Option<Range<usize>> = None;

    while at + 8 <= bytes.len() {
        let chunk_id = &bytes[at..at + 4];
        let chunk_size = le_u32(&bytes[at + 4..at + 8]) as usize;
        at += 8;

        if at + chunk_size > bytes.len() {
            return Err(WavError::TruncatedChunk);
        }

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 {
                    return Err(WavError::TruncatedChunk);
                }
                let tag = le_u16(&bytes[at..]);
                let channels = le_u16(&bytes[at + 2..]);
                let sample_rate = le_u32(&bytes[at + 4..]);
                let bits = le_u16(&bytes[at + 14..]);
                if tag != WAVE_FORMAT_PCM {
                    return Err(WavError::NotPcm(tag));
                }
                if bits != 16 {
                    return Err(WavError::NotSixteenBit(bits));
                }
                format = Some((channels, bits, sample_rate));
            }
            b"data" => {
                data = Some(at..at + chunk_size);
            }
            _ => {}
        }

        // Chunks are word-aligned; odd sizes carry a pad byte
        at += chunk_size + (chunk_size & 1);
    }

    let (channel_count, _, sample_rate) = format.ok_or(WavError::MissingFormat)?;
    let data = data.ok_or(WavError::MissingData)?;
    let frame_count = data.len() as u64 / (channel_count.max(1) as u64 * 2);

    Ok(WavInfo {
        channel_count,
        sample_rate,
        frame_count,
        data,
    })
}
