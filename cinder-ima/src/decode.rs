//! IMA4 decoder
//!
//! Packets self-initialize (the 2-byte header carries predictor and step
//! index), so any packet can be decoded without history. The range decoder
//! below exploits this for random access at arbitrary frame offsets.

use crate::{IMA_FRAMES_PER_PACKET, IMA_PACKET_SIZE, step};

/// Decode one 34-byte packet into 64 mono frames.
///
/// `packet` must be at least [`IMA_PACKET_SIZE`] bytes; `out` must hold
/// [`IMA_FRAMES_PER_PACKET`] samples.
pub fn decode_packet(packet: &[u8], out: &mut [i16]) {
    let header = u16::from_be_bytes([packet[0], packet[1]]);
    let mut predictor = (header & 0xFF80) as i16 as i32;
    let mut index = ((header & 0x7F) as i32).min(88);

    for i in 0..IMA_FRAMES_PER_PACKET {
        let byte = packet[2 + i / 2];
        // Low nibble first
        let code = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
        out[i] = step(code, &mut predictor, &mut index);
    }
}

/// Decode `frames` interleaved frames starting at `frame_offset`.
///
/// `data` is the raw packet stream (channel packets interleaved per
/// 64-frame group). `dst` receives `frames * channel_count` interleaved
/// samples. Returns the number of frames actually produced, which is less
/// than `frames` when the packet data runs out first.
pub fn decode(
    dst: &mut [i16],
    data: &[u8],
    channel_count: usize,
    frame_offset: u64,
    frames: usize,
) -> usize {
    debug_assert!(channel_count == 1 || channel_count == 2);
    debug_assert!(dst.len() >= frames * channel_count);

    let group_size = IMA_PACKET_SIZE * channel_count;
    let mut group = (frame_offset as usize) / IMA_FRAMES_PER_PACKET;
    let mut skip = (frame_offset as usize) % IMA_FRAMES_PER_PACKET;

    let mut pcm = [[0i16; IMA_FRAMES_PER_PACKET]; 2];
    let mut produced = 0;

    while produced < frames {
        let base = group * group_size;
        if base + group_size > data.len() {
            break;
        }

        for (ch, buf) in pcm.iter_mut().enumerate().take(channel_count) {
            let at = base + ch * IMA_PACKET_SIZE;
            decode_packet(&data[at..at + IMA_PACKET_SIZE], buf);
        }

        let take = (IMA_FRAMES_PER_PACKET - skip).min(frames - produced);
        for f in 0..take {
            for (ch, buf) in pcm.iter().enumerate().take(channel_count) {
                dst[(produced + f) * channel_count + ch] = buf[skip + f];
            }
        }

        produced += take;
        skip = 0;
        group += 1;
    }

    produced
}
