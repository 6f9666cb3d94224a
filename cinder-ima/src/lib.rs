//! Cinder-IMA: IMA4 ADPCM codec and CAF container reader
//!
//! This crate is a **pure codec** for the IMA4 flavour of ADPCM as stored in
//! Core Audio Format (.caf) files, plus the minimal CAF chunk parsing needed
//! to locate the packet data. It knows nothing about voices, buffers or the
//! audio backend - the streaming engine reaches it only through the waveform
//! preparation glue in `cinder-voice`.
//!
//! # Packet Format
//!
//! ```text
//! One packet = 34 bytes = 64 frames for one channel:
//!   0x00: state header (u16 BE)
//!         bits 15..7: initial predictor (top 9 bits of an i16)
//!         bits  6..0: initial step table index (0..=88)
//!   0x02: 32 data bytes, two 4-bit codes per byte, low nibble first
//! ```
//!
//! For multi-channel audio, packets are interleaved per 64-frame group:
//! the group's channel-0 packet is immediately followed by the channel-1
//! packet covering the same 64 frames.
//!
//! Every packet carries its own predictor state, so decoding may start at
//! any packet boundary without history. [`decode`] accepts an arbitrary
//! frame offset and handles mid-packet starts by decoding the containing
//! packet and discarding the leading frames.
//!
//! # Compression
//!
//! 4 bits per sample, fixed 4:1 ratio against 16-bit PCM (plus 2 header
//! bytes per 64-frame packet).

mod caf;
mod decode;
mod encode;

pub use caf::{CafError, CafInfo, parse_caf, write_caf};
pub use decode::{decode, decode_packet};
pub use encode::{ImaEncoder, encode};

// =============================================================================
// Constants
// =============================================================================

/// Frames encoded by one packet (per channel)
pub const IMA_FRAMES_PER_PACKET: usize = 64;

/// Encoded packet size in bytes (2-byte header + 32 nibble bytes)
pub const IMA_PACKET_SIZE: usize = 34;

/// Step table (89 entries, standard IMA ADPCM)
pub const IMA_STEP_TAB: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Step index adjustment per 3-bit code magnitude
pub const IMA_INDEX_TAB: [i32; 8] = [-1, -1, -1, -1, 2, 4, 6, 8];

// =============================================================================
// Helper Functions
// =============================================================================

/// One IMA decode step: apply a 4-bit code to (predictor, step index)
#[inline]
pub(crate) fn step(code: u8, predictor: &mut i32, index: &mut i32) -> i16 {
    let s = IMA_STEP_TAB[*index as usize];

    let mut diff = s >> 3;
    if code & 1 != 0 {
        diff += s >> 2;
    }
    if code & 2 != 0 {
        diff += s >> 1;
    }
    if code & 4 != 0 {
        diff += s;
    }

    if code & 8 != 0 {
        *predictor -= diff;
    } else {
        *predictor += diff;
    }
    *predictor = (*predictor).clamp(-32768, 32767);

    *index = (*index + IMA_INDEX_TAB[(code & 7) as usize]).clamp(0, 88);

    *predictor as i16
}

// =============================================================================
// Tests
// =============================================================================
