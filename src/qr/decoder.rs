//! QR symbol (flat pixel array) back to bytes

use log::debug;

use super::matrix::{
    format_bits, format_positions, mask_bit, version_bits, version_positions, Grid, NUM_MASKS,
};
use super::reed_solomon::correct;
use super::tables::{version_for_size, BlockLayout};
use super::EccLevel;
use crate::error::{Error, Result};

/// Largest Hamming distance accepted when matching format or version bits
const MAX_INFO_DISTANCE: u32 = 3;

const ALPHANUMERIC: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

fn corrupt(message: impl Into<String>) -> Error {
    Error::CorruptSymbol(message.into())
}

fn read_bits(pixels: &[bool], size: usize, positions: &[(usize, usize)]) -> u32 {
    positions
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &(x, y))| acc | ((pixels[y * size + x] as u32) << i))
}

/// Level and mask whose format word is nearest either copy
fn read_format(pixels: &[bool], size: usize) -> Result<(EccLevel, u8)> {
    let copies = format_positions(size).map(|copy| read_bits(pixels, size, &copy));
    let mut best: Option<(u32, EccLevel, u8)> = None;
    for level in EccLevel::ALL {
        for mask in 0..NUM_MASKS {
            let expected = format_bits(level, mask);
            let distance = copies
                .iter()
                .map(|&c| (c ^ expected).count_ones())
                .min()
                .unwrap_or(u32::MAX);
            if best.map_or(true, |(d, _, _)| distance < d) {
                best = Some((distance, level, mask));
            }
        }
    }
    match best {
        Some((distance, level, mask)) if distance <= MAX_INFO_DISTANCE => Ok((level, mask)),
        _ => Err(corrupt("format information is unreadable")),
    }
}

fn check_version_info(pixels: &[bool], size: usize, version: u8) -> Result<()> {
    if version < 7 {
        return Ok(());
    }
    let expected = version_bits(version);
    let matches = version_positions(size)
        .iter()
        .any(|copy| (read_bits(pixels, size, copy) ^ expected).count_ones() <= MAX_INFO_DISTANCE);
    if matches {
        Ok(())
    } else {
        Err(corrupt(format!(
            "version information does not match a {}x{} symbol",
            size, size
        )))
    }
}

/// Undo interleaving, correct every block and join the data codewords
fn correct_codewords(raw: &[u8], version: u8, level: EccLevel) -> Result<Vec<u8>> {
    let layout = BlockLayout::new(version, level);
    let short_data_len = layout.short_len - layout.ecc_len;
    let mut blocks = vec![vec![0u8; layout.short_len + 1]; layout.num_blocks];

    let mut next = raw.iter();
    for i in 0..=layout.short_len {
        for (j, block) in blocks.iter_mut().enumerate() {
            if i != short_data_len || j >= layout.num_short {
                block[i] = *next
                    .next()
                    .ok_or_else(|| corrupt("symbol holds too few codewords"))?;
            }
        }
    }

    let mut data = Vec::new();
    for (j, mut block) in blocks.into_iter().enumerate() {
        if j < layout.num_short {
            block.remove(short_data_len);
        }
        let fixed = correct(&mut block, layout.ecc_len)
            .map_err(|e| corrupt(format!("block {}: {}", j, e)))?;
        if fixed > 0 {
            debug!("Corrected {} codewords in block {}", fixed, j);
        }
        data.extend_from_slice(&block[..layout.data_len(j)]);
    }
    Ok(data)
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn read(&mut self, len: usize) -> Result<u32> {
        if len > self.remaining() {
            return Err(corrupt("segment runs past the end of the data"));
        }
        let mut value = 0u32;
        for _ in 0..len {
            let bit = (self.data[self.pos / 8] >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(value)
    }
}

fn count_bits(mode: u32, version: u8) -> usize {
    let group = match version {
        1..=9 => 0,
        10..=26 => 1,
        _ => 2,
    };
    match mode {
        0b0001 => [10, 12, 14][group],
        0b0010 => [9, 11, 13][group],
        _ => [8, 16, 16][group],
    }
}

/// Parse numeric, alphanumeric, byte and ECI segments
fn parse_segments(data: &[u8], version: u8) -> Result<Vec<u8>> {
    let mut reader = BitReader { data, pos: 0 };
    let mut out = Vec::new();

    while reader.remaining() >= 4 {
        let mode = reader.read(4)?;
        match mode {
            0b0000 => break,
            0b0100 => {
                let count = reader.read(count_bits(mode, version))?;
                for _ in 0..count {
                    out.push(reader.read(8)? as u8);
                }
            }
            0b0001 => {
                let mut count = reader.read(count_bits(mode, version))? as usize;
                while count > 0 {
                    let (digits, bits) = match count {
                        1 => (1, 4),
                        2 => (2, 7),
                        _ => (3, 10),
                    };
                    let value = reader.read(bits)?;
                    let text = format!("{:0width$}", value, width = digits);
                    if text.len() != digits {
                        return Err(corrupt("numeric segment value out of range"));
                    }
                    out.extend_from_slice(text.as_bytes());
                    count -= digits;
                }
            }
            0b0010 => {
                let mut count = reader.read(count_bits(mode, version))? as usize;
                while count > 0 {
                    if count >= 2 {
                        let value = reader.read(11)? as usize;
                        let (a, b) = (value / 45, value % 45);
                        let first = ALPHANUMERIC
                            .get(a)
                            .ok_or_else(|| corrupt("alphanumeric value out of range"))?;
                        out.push(*first);
                        out.push(ALPHANUMERIC[b]);
                        count -= 2;
                    } else {
                        let value = reader.read(6)? as usize;
                        let c = ALPHANUMERIC
                            .get(value)
                            .ok_or_else(|| corrupt("alphanumeric value out of range"))?;
                        out.push(*c);
                        count -= 1;
                    }
                }
            }
            0b0111 => {
                // ECI designator: 1, 2 or 3 bytes; the payload is kept as raw bytes
                let first = reader.read(8)?;
                if first & 0x80 != 0 {
                    let extra = if first & 0x40 == 0 { 8 } else { 16 };
                    reader.read(extra)?;
                }
            }
            other => {
                return Err(corrupt(format!("unsupported segment mode {:04b}", other)));
            }
        }
    }
    Ok(out)
}

/// Decode a row-major pixel array (`true` = dark) of side `size`
pub fn decode(size: usize, pixels: &[bool]) -> Result<Vec<u8>> {
    let version = version_for_size(size)
        .ok_or_else(|| corrupt(format!("{} is not a valid symbol size", size)))?;
    if pixels.len() != size * size {
        return Err(corrupt(format!(
            "expected {} pixels for a {}x{} symbol, got {}",
            size * size,
            size,
            size,
            pixels.len()
        )));
    }

    let (level, mask) = read_format(pixels, size)?;
    check_version_info(pixels, size, version)?;

    let grid = Grid::new(version);
    let positions = grid.data_positions();
    let mut raw = vec![0u8; positions.len() / 8];
    for (i, &(x, y)) in positions.iter().enumerate().take(raw.len() * 8) {
        let dark = pixels[y * size + x] ^ mask_bit(mask, x, y);
        if dark {
            raw[i / 8] |= 1 << (7 - i % 8);
        }
    }

    let data = correct_codewords(&raw, version, level)?;
    let payload = parse_segments(&data, version)?;
    debug!(
        "Decoded version {} level {} mask {}: {} bytes",
        version,
        level,
        mask,
        payload.len()
    );
    Ok(payload)
}
