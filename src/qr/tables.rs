//! Symbol capacity tables (ISO/IEC 18004 table 9)
//!
//! Rows are indexed by [`EccLevel::ordinal`](super::EccLevel::ordinal),
//! columns by version; column 0 is unused.

use super::EccLevel;

pub const MIN_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 40;

const ECC_CODEWORDS_PER_BLOCK: [[u8; 41]; 4] = [
    [
        0, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26,
        30, 22, 24, 28, 30, 28, 28, 28, 28, 30, 30, 26, 28, 30,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
    [
        0, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22,
        24, 24, 28, 28, 26, 26, 26, 26, 28, 28, 28, 28, 28, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ],
    [
        0, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24,
        20, 30, 24, 28, 28, 26, 30, 28, 30, 30, 30, 30, 28, 30,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
    [
        0, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22,
        24, 24, 30, 28, 28, 26, 28, 30, 24, 30, 30, 30, 30, 30,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ],
];

const NUM_ERROR_CORRECTION_BLOCKS: [[u8; 41]; 4] = [
    [
        0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4,
        4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12,
        13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ],
    [
        0, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9,
        9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21, 23, 25,
        26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ],
    [
        0, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12,
        16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29, 34, 34,
        35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ],
    [
        0, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16,
        16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32, 35, 37, 40,
        42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ],
];

/// Side length in modules
pub fn size_for_version(version: u8) -> usize {
    version as usize * 4 + 17
}

/// Version whose symbols have this side length
pub fn version_for_size(size: usize) -> Option<u8> {
    if size < 21 || (size - 17) % 4 != 0 {
        return None;
    }
    let version = (size - 17) / 4;
    (version <= MAX_VERSION as usize).then_some(version as u8)
}

pub fn ecc_codewords_per_block(version: u8, level: EccLevel) -> usize {
    ECC_CODEWORDS_PER_BLOCK[level.ordinal()][version as usize] as usize
}

pub fn num_blocks(version: u8, level: EccLevel) -> usize {
    NUM_ERROR_CORRECTION_BLOCKS[level.ordinal()][version as usize] as usize
}

/// Modules left for data and check codewords once function patterns are drawn,
/// including remainder bits
pub fn num_raw_data_modules(version: u8) -> usize {
    let v = version as usize;
    let mut result = (16 * v + 128) * v + 64;
    if v >= 2 {
        let num_align = v / 7 + 2;
        result -= (25 * num_align - 10) * num_align - 55;
        if v >= 7 {
            result -= 36;
        }
    }
    result
}

pub fn num_data_codewords(version: u8, level: EccLevel) -> usize {
    num_raw_data_modules(version) / 8
        - ecc_codewords_per_block(version, level) * num_blocks(version, level)
}

/// How the codewords of a symbol split into Reed-Solomon blocks
///
/// The first `num_short` blocks are one data byte shorter than the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub num_blocks: usize,
    pub num_short: usize,
    /// Total codewords (data + check) in a short block
    pub short_len: usize,
    pub ecc_len: usize,
}

impl BlockLayout {
    pub fn new(version: u8, level: EccLevel) -> Self {
        let num_blocks = num_blocks(version, level);
        let raw_codewords = num_raw_data_modules(version) / 8;
        BlockLayout {
            num_blocks,
            num_short: num_blocks - raw_codewords % num_blocks,
            short_len: raw_codewords / num_blocks,
            ecc_len: ecc_codewords_per_block(version, level),
        }
    }

    /// Data codewords in block `i`
    pub fn data_len(&self, i: usize) -> usize {
        self.short_len - self.ecc_len + usize::from(i >= self.num_short)
    }
}

/// Width of the character count field of a byte-mode segment
pub fn byte_count_bits(version: u8) -> usize {
    if version < 10 {
        8
    } else {
        16
    }
}

/// Largest byte-mode payload a version holds at a level
pub fn byte_capacity(version: u8, level: EccLevel) -> usize {
    let bits = num_data_codewords(version, level) * 8;
    (bits - 4 - byte_count_bits(version)) / 8
}
