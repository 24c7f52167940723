//! Byte payload to QR symbol

use log::debug;

use super::matrix::{Grid, NUM_MASKS};
use super::reed_solomon::{generator, remainder};
use super::tables::{
    byte_capacity, byte_count_bits, num_data_codewords, BlockLayout, MAX_VERSION, MIN_VERSION,
};
use super::{EccLevel, QrCode};
use crate::error::{Error, Result};

const MODE_BYTE: u32 = 0b0100;
const PAD_BYTES: [u8; 2] = [0xEC, 0x11];

#[derive(Default)]
struct BitBuffer {
    bits: Vec<bool>,
}

impl BitBuffer {
    fn append(&mut self, value: u32, len: usize) {
        for i in (0..len).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &bit)| acc | ((bit as u8) << (7 - i)))
            })
            .collect()
    }
}

/// Smallest version holding `len` bytes at `level`
pub fn min_version(len: usize, level: EccLevel) -> Result<u8> {
    (MIN_VERSION..=MAX_VERSION)
        .find(|&v| byte_capacity(v, level) >= len)
        .ok_or(Error::PayloadTooLarge {
            size: len,
            max: byte_capacity(MAX_VERSION, level),
            level,
        })
}

/// Single byte-mode segment, terminator and padding
fn data_codewords(payload: &[u8], version: u8, level: EccLevel) -> Vec<u8> {
    let capacity_bits = num_data_codewords(version, level) * 8;
    let mut buffer = BitBuffer::default();
    buffer.append(MODE_BYTE, 4);
    buffer.append(payload.len() as u32, byte_count_bits(version));
    for &b in payload {
        buffer.append(b as u32, 8);
    }

    let terminator = (capacity_bits - buffer.bits.len()).min(4);
    buffer.append(0, terminator);
    let align = (8 - buffer.bits.len() % 8) % 8;
    buffer.append(0, align);

    let mut bytes = buffer.into_bytes();
    let mut pad = PAD_BYTES.iter().cycle();
    while bytes.len() < capacity_bits / 8 {
        if let Some(&b) = pad.next() {
            bytes.push(b);
        }
    }
    bytes
}

/// Split into blocks, append check bytes, interleave
fn add_ecc_and_interleave(data: &[u8], version: u8, level: EccLevel) -> Vec<u8> {
    let layout = BlockLayout::new(version, level);
    let divisor = generator(layout.ecc_len);

    let mut blocks = Vec::with_capacity(layout.num_blocks);
    let mut offset = 0;
    for i in 0..layout.num_blocks {
        let len = layout.data_len(i);
        let mut block = data[offset..offset + len].to_vec();
        offset += len;
        let ecc = remainder(&block, &divisor);
        if i < layout.num_short {
            // Placeholder keeps columns aligned; skipped when interleaving
            block.push(0);
        }
        block.extend(ecc);
        blocks.push(block);
    }

    let short_data_len = layout.short_len - layout.ecc_len;
    let mut result = Vec::with_capacity(layout.short_len * layout.num_blocks + layout.num_blocks);
    for i in 0..=layout.short_len {
        for (j, block) in blocks.iter().enumerate() {
            if i != short_data_len || j >= layout.num_short {
                result.push(block[i]);
            }
        }
    }
    result
}

/// Encode `payload` at `level` into the smallest symbol that holds it
pub fn encode(payload: &[u8], level: EccLevel) -> Result<QrCode> {
    let version = min_version(payload.len(), level)?;
    let data = data_codewords(payload, version, level);
    let codewords = add_ecc_and_interleave(&data, version, level);

    let mut grid = Grid::new(version);
    let positions = grid.data_positions();
    for (i, &(x, y)) in positions.iter().enumerate() {
        let dark = codewords
            .get(i / 8)
            .map(|byte| (byte >> (7 - i % 8)) & 1 != 0)
            .unwrap_or(false);
        grid.set(x, y, dark);
    }

    let mut best = (usize::MAX, 0);
    for mask in 0..NUM_MASKS {
        let mut candidate = grid.clone();
        candidate.apply_mask(mask);
        candidate.draw_format(level, mask);
        let penalty = candidate.penalty();
        if penalty < best.0 {
            best = (penalty, mask);
        }
    }
    let mask = best.1;
    grid.apply_mask(mask);
    grid.draw_format(level, mask);

    debug!(
        "Encoded {} bytes as version {} ({}x{}), level {}, mask {}",
        payload.len(),
        version,
        grid.size,
        grid.size,
        level,
        mask
    );

    Ok(QrCode {
        version,
        level,
        mask,
        size: grid.size,
        modules: grid.modules,
    })
}
