//! IMA4 encoder
//!
//! Produces the packet stream consumed by [`crate::decode`]. Predictor
//! state carries across packets for quality, but every packet header stores
//! the state it starts from, keeping packets independently decodable.

use crate::{IMA_FRAMES_PER_PACKET, IMA_PACKET_SIZE, IMA_STEP_TAB, step};

/// Per-channel encoder state
#[derive(Debug, Clone, Copy, Default)]
pub struct ImaEncoder {
    predictor: i32,
    index: i32,
}

impl ImaEncoder {
    /// Encode one 4-bit code and update state through the decoder's own
    /// reconstruction, so encoder and decoder predictors never drift.
    fn encode_sample(&mut self, sample: i16) -> u8 {
        let s = IMA_STEP_TAB[self.index as usize];
        let mut diff = sample as i32 - self.predictor;

        let mut code: u8 = 0;
        if diff < 0 {
            code |= 8;
            diff = -diff;
        }
        if diff >= s {
            code |= 4;
            diff -= s;
        }
        if diff >= s >> 1 {
            code |= 2;
            diff -= s >> 1;
        }
        if diff >= s >> 2 {
            code |= 1;
        }

        step(code, &mut self.predictor, &mut self.index);
        code
    }

    /// Encode 64 frames of one channel into a 34-byte packet.
    /// Short tail groups are zero-padded.
    fn encode_packet(&mut self, frames: &[i16], out: &mut [u8]) {
        let header = (self.predictor as i16 as u16 & 0xFF80) | (self.index as u16 & 0x7F);
        out[0..2].copy_from_slice(&header.to_be_bytes());

        for i in 0..IMA_FRAMES_PER_PACKET {
            let sample = frames.get(i).copied().unwrap_or(0);
            let code = self.encode_sample(sample);
            if i % 2 == 0 {
                out[2 + i / 2] = code;
            } else {
                out[2 + i / 2] |= code << 4;
            }
        }
    }
}

/// Encode interleaved PCM into an IMA4 packet stream.
///
/// `samples.len()` must be a multiple of `channel_count`. The final packet
/// group is zero-padded; callers track the true frame count separately
/// (the CAF `pakt` chunk carries it).
pub fn encode(samples: &[i16], channel_count: usize) -> Vec<u8> {
    assert!(channel_count == 1 || channel_count == 2);
    assert_eq!(samples.len() % channel_count, 0);

    let frames = samples.len() / channel_count;
    let groups = frames.div_ceil(IMA_FRAMES_PER_PACKET);
    let mut out = vec![0u8; groups * channel_count * IMA_PACKET_SIZE];
    let mut states = [ImaEncoder::default(); 2];

    let mut deinterleaved = [0i16; IMA_FRAMES_PER_PACKET];
    for g in 0..groups {
        let group_base = g * channel_count * IMA_PACKET_SIZE;
        let frame_base = g * IMA_FRAMES_PER_PACKET;
        let in_group = (frames - frame_base).min(IMA_FRAMES_PER_PACKET);

        for ch in 0..channel_count {
            for (f, slot) in deinterleaved.iter_mut().enumerate().take(in_group) {
                *slot = samples[(frame_base + f) * channel_count + ch];
            }

            let at = group_base + ch * IMA_PACKET_SIZE;
            states[ch].encode_packet(&deinterleaved[..in_group], &mut out[at..at + IMA_PACKET_SIZE]);
        }
    }

    out
}
