//! Minimal Core Audio Format (.caf) container support
//!
//! Only what the IMA4 path needs: the `desc` chunk for stream parameters,
//! the optional `pakt` chunk for the valid frame count, and the location of
//! the `data` chunk payload. All multi-byte fields are big-endian.
//!
//! # Layout
//! ```text
//! 0x00: "caff" magic
//! 0x04: file version (u16 BE, = 1)
//! 0x06: file flags (u16 BE)
//! then chunks: type [u8; 4] + size (i64 BE, -1 = to EOF for data) + payload
//! ```

use core::ops::Range;

use crate::{IMA_FRAMES_PER_PACKET, IMA_PACKET_SIZE};

const CAF_MAGIC: &[u8; 4] = b"caff";
const FORMAT_IMA4: &[u8; 4] = b"ima4";

/// Errors that can occur while reading a CAF container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CafError {
    /// File is too small for the CAF file header
    FileTooSmall,
    /// Missing "caff" magic
    BadMagic,
    /// A chunk header or payload extends past the end of the file
    TruncatedChunk,
    /// No `desc` chunk before the audio data
    MissingDescription,
    /// No `data` chunk
    MissingData,
    /// The `desc` chunk names a codec other than ima4
    NotIma4([u8; 4]),
}

impl core::fmt::Display for CafError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CafError::FileTooSmall => write!(f, "file too small for CAF header"),
            CafError::BadMagic => write!(f, "missing caff magic"),
            CafError::TruncatedChunk => write!(f, "truncated CAF chunk"),
            CafError::MissingDescription => write!(f, "missing desc chunk"),
            CafError::MissingData => write!(f, "missing data chunk"),
            CafError::NotIma4(id) => {
                write!(f, "not ima4 data (format {:?})", core::str::from_utf8(id))
            }
        }
    }
}

impl std::error::Error for CafError {}

/// Stream parameters extracted from a CAF container
#[derive(Debug, Clone, PartialEq)]
pub struct CafInfo {
    /// Decoded sample rate in Hz
    pub sample_rate: f64,
    /// Interleaved channels (1 or 2 for the formats we ship)
    pub channel_count: u32,
    /// Valid decodable frames (`pakt` chunk when present, otherwise
    /// derived from the packet count)
    pub frame_count: u64,
    /// Byte range of the IMA4 packet stream within the input
    pub data: Range<usize>,
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u64(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Parse a CAF container holding IMA4 packets.
pub fn parse_caf(bytes: &[u8]) -> Result<CafInfo, CafError> {
    if bytes.len() < 8 {
        return Err(CafError::FileTooSmall);
    }
    if &bytes[0..4] != CAF_MAGIC {
        return Err(CafError::BadMagic);
    }

    let mut at = 8;
    let mut desc: Option<(f64, u32)> = None;
    let mut pakt_frames: Option<u64> = None;
    let mut data: Option<Range<usize>> = None;

    while at + 12 <= bytes.len() {
        let chunk_type: [u8; 4] = bytes[at..at + 4].try_into().unwrap();
        let chunk_size = be_u64(&bytes[at + 4..at + 12]) as i64;
        at += 12;

        // A data chunk of size -1 runs to the end of the file
        let payload_len = if chunk_size < 0 {
            if &chunk_type != b"data" {
                return Err(CafError::TruncatedChunk);
            }
            bytes.len() - at
        } else {
            chunk_size as usize
        };

        if at + payload_len > bytes.len() {
            return Err(CafError::TruncatedChunk);
        }
        let payload = &bytes[at..at + payload_len];

        match &chunk_type {
            b"desc" => {
                if payload_len < 32 {
                    return Err(CafError::TruncatedChunk);
                }
                let sample_rate = f64::from_bits(be_u64(&payload[0..8]));
                let format_id: [u8; 4] = payload[8..12].try_into().unwrap();
                if &format_id != FORMAT_IMA4 {
                    return Err(CafError::NotIma4(format_id));
                }
                let channel_count = be_u32(&payload[24..28]);
                desc = Some((sample_rate, channel_count));
            }
            b"pakt" => {
                if payload_len < 24 {
                    return Err(CafError::TruncatedChunk);
                }
                pakt_frames = Some(be_u64(&payload[8..16]));
            }
            b"data" => {
                // Skip the u32 edit count
                if payload_len < 4 {
                    return Err(CafError::TruncatedChunk);
                }
                data = Some(at + 4..at + payload_len);
            }
            _ => {}
        }

        at += payload_len;
    }

    let (sample_rate, channel_count) = desc.ok_or(CafError::MissingDescription)?;
    let data = data.ok_or(CafError::MissingData)?;

    let frame_count = match pakt_frames {
        Some(frames) => frames,
        None => {
            let group = IMA_PACKET_SIZE * channel_count.max(1) as usize;
            (data.len() / group) as u64 * IMA_FRAMES_PER_PACKET as u64
        }
    };

    Ok(CafInfo {
        sample_rate,
        channel_count,
        frame_count,
        data,
    })
}

/// Write a CAF container around an encoded IMA4 packet stream.
///
/// `frame_count` is the true (unpadded) frame count and lands in the
/// `pakt` chunk. Used by asset pipelines and test fixtures.
pub fn write_caf(ima_data: &[u8], channel_count: u32, sample_rate: f64, frame_count: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(ima_data.len() + 128);

    out.extend_from_slice(CAF_MAGIC);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());

    // desc
    out.extend_from_slice(b"desc");
    out.extend_from_slice(&32i64.to_be_bytes());
    out.extend_from_slice(&sample_rate.to_bits().to_be_bytes());
    out.extend_from_slice(FORMAT_IMA4);
    out.extend_from_slice(&0u32.to_be_bytes()); // format flags
    out.extend_from_slice(&(IMA_PACKET_SIZE as u32 * channel_count).to_be_bytes());
    out.extend_from_slice(&(IMA_FRAMES_PER_PACKET as u32).to_be_bytes());
    out.extend_from_slice(&channel_count.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // bits per channel (compressed)

    // pakt
    let packets = ima_data.len() as u64 / (IMA_PACKET_SIZE as u64 * channel_count as u64);
    out.extend_from_slice(b"pakt");
    out.extend_from_slice(&24i64.to_be_bytes());
    out.extend_from_slice(&(packets as i64).to_be_bytes());
    out.extend_from_slice(&(frame_count as i64).to_be_bytes());
    out.extend_from_slice(&0i32.to_be_bytes()); // priming frames
    out.extend_from_slice(&0i32.to_be_bytes()); // remainder frames

    // data
    out.extend_from_slice(b"data");
    out.extend_from_slice(&((ima_data.len() + 4) as i64).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // edit count
    out.extend_from_slice(ima_data);

    out
}
