//! Module grid, function patterns, masking and placement order
//!
//! Coordinates are `(x, y)` with `x` the column; modules are stored row-major
//! so the flat pixel index of `(x, y)` is `y * size + x`.

use super::tables::size_for_version;
use super::EccLevel;

/// Generator of the (15,5) BCH code protecting format information
const FORMAT_GENERATOR: u32 = 0x537;
const FORMAT_MASK: u32 = 0x5412;
/// Generator of the (18,6) Golay code protecting version information
const VERSION_GENERATOR: u32 = 0x1F25;

pub const NUM_MASKS: u8 = 8;

/// 15 format bits for a level and mask, already XORed with the fixed mask
pub fn format_bits(level: EccLevel, mask: u8) -> u32 {
    let data = (level.format_bits() << 3) | mask as u32;
    let mut rem = data;
    for _ in 0..10 {
        rem = (rem << 1) ^ ((rem >> 9) * FORMAT_GENERATOR);
    }
    ((data << 10) | rem) ^ FORMAT_MASK
}

/// 18 version bits (only present from version 7 up)
pub fn version_bits(version: u8) -> u32 {
    let mut rem = version as u32;
    for _ in 0..12 {
        rem = (rem << 1) ^ ((rem >> 11) * VERSION_GENERATOR);
    }
    ((version as u32) << 12) | rem
}

/// Module positions of format bit `i` in each of the two copies
pub fn format_positions(size: usize) -> [[(usize, usize); 15]; 2] {
    let mut first = [(0, 0); 15];
    let mut second = [(0, 0); 15];
    for (i, pos) in first.iter_mut().enumerate() {
        *pos = match i {
            0..=5 => (8, i),
            6 => (8, 7),
            7 => (8, 8),
            8 => (7, 8),
            _ => (14 - i, 8),
        };
    }
    for (i, pos) in second.iter_mut().enumerate() {
        *pos = if i < 8 {
            (size - 1 - i, 8)
        } else {
            (8, size - 15 + i)
        };
    }
    [first, second]
}

/// Module positions of version bit `i` in each of the two copies
pub fn version_positions(size: usize) -> [[(usize, usize); 18]; 2] {
    let mut first = [(0, 0); 18];
    let mut second = [(0, 0); 18];
    for i in 0..18 {
        let a = size - 11 + i % 3;
        let b = i / 3;
        first[i] = (a, b);
        second[i] = (b, a);
    }
    [first, second]
}

/// Whether mask pattern `mask` inverts module `(x, y)`
pub fn mask_bit(mask: u8, x: usize, y: usize) -> bool {
    match mask {
        0 => (x + y) % 2 == 0,
        1 => y % 2 == 0,
        2 => x % 3 == 0,
        3 => (x + y) % 3 == 0,
        4 => (x / 3 + y / 2) % 2 == 0,
        5 => x * y % 2 + x * y % 3 == 0,
        6 => (x * y % 2 + x * y % 3) % 2 == 0,
        _ => ((x + y) % 2 + x * y % 3) % 2 == 0,
    }
}

fn alignment_positions(version: u8) -> Vec<usize> {
    if version == 1 {
        return Vec::new();
    }
    let v = version as usize;
    let num_align = v / 7 + 2;
    let step = (v * 8 + num_align * 3 + 5) / (num_align * 4 - 4) * 2;
    let mut result = vec![6];
    let mut pos = size_for_version(version) - 7;
    for _ in 0..num_align - 1 {
        result.insert(1, pos);
        pos -= step;
    }
    result
}

/// A symbol under construction or being read back
#[derive(Debug, Clone)]
pub struct Grid {
    pub version: u8,
    pub size: usize,
    pub modules: Vec<bool>,
    function: Vec<bool>,
}

impl Grid {
    /// Empty grid with every function pattern drawn and format bits reserved
    pub fn new(version: u8) -> Self {
        let size = size_for_version(version);
        let mut grid = Grid {
            version,
            size,
            modules: vec![false; size * size],
            function: vec![false; size * size],
        };
        grid.draw_function_patterns();
        grid
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.modules[y * self.size + x]
    }

    pub fn set(&mut self, x: usize, y: usize, dark: bool) {
        self.modules[y * self.size + x] = dark;
    }

    pub fn is_function(&self, x: usize, y: usize) -> bool {
        self.function[y * self.size + x]
    }

    fn set_function(&mut self, x: usize, y: usize, dark: bool) {
        self.set(x, y, dark);
        self.function[y * self.size + x] = true;
    }

    fn draw_function_patterns(&mut self) {
        let size = self.size;
        for i in 0..size {
            self.set_function(6, i, i % 2 == 0);
            self.set_function(i, 6, i % 2 == 0);
        }

        self.draw_finder(3, 3);
        self.draw_finder(size - 4, 3);
        self.draw_finder(3, size - 4);

        let positions = alignment_positions(self.version);
        let last = positions.len().saturating_sub(1);
        for (i, &x) in positions.iter().enumerate() {
            for (j, &y) in positions.iter().enumerate() {
                let corner = (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0);
                if !corner {
                    self.draw_alignment(x, y);
                }
            }
        }

        // Reserve the format area; real bits are drawn once the mask is known
        self.draw_format(EccLevel::Low, 0);
        self.draw_version();
    }

    fn draw_finder(&mut self, cx: usize, cy: usize) {
        for dy in -4i32..=4 {
            for dx in -4i32..=4 {
                let dist = dx.abs().max(dy.abs());
                let x = cx as i32 + dx;
                let y = cy as i32 + dy;
                if (0..self.size as i32).contains(&x) && (0..self.size as i32).contains(&y) {
                    self.set_function(x as usize, y as usize, dist != 2 && dist != 4);
                }
            }
        }
    }

    fn draw_alignment(&mut self, cx: usize, cy: usize) {
        for dy in -2i32..=2 {
            for dx in -2i32..=2 {
                let x = (cx as i32 + dx) as usize;
                let y = (cy as i32 + dy) as usize;
                self.set_function(x, y, dx.abs().max(dy.abs()) != 1);
            }
        }
    }

    /// Draw both copies of the format information and the dark module
    pub fn draw_format(&mut self, level: EccLevel, mask: u8) {
        let bits = format_bits(level, mask);
        for copy in format_positions(self.size) {
            for (i, (x, y)) in copy.into_iter().enumerate() {
                self.set_function(x, y, (bits >> i) & 1 != 0);
            }
        }
        self.set_function(8, self.size - 8, true);
    }

    fn draw_version(&mut self) {
        if self.version < 7 {
            return;
        }
        let bits = version_bits(self.version);
        for copy in version_positions(self.size) {
            for (i, (x, y)) in copy.into_iter().enumerate() {
                self.set_function(x, y, (bits >> i) & 1 != 0);
            }
        }
    }

    /// Data module positions in codeword placement order
    ///
    /// Two-column strips from the right edge, alternating upward and
    /// downward, skipping the vertical timing column.
    pub fn data_positions(&self) -> Vec<(usize, usize)> {
        let size = self.size as isize;
        let mut positions = Vec::with_capacity(self.size * self.size);
        let mut right = size - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            for vert in 0..size {
                for j in 0..2 {
                    let x = (right - j) as usize;
                    let upward = (right + 1) & 2 == 0;
                    let y = (if upward { size - 1 - vert } else { vert }) as usize;
                    if !self.is_function(x, y) {
                        positions.push((x, y));
                    }
                }
            }
            right -= 2;
        }
        positions
    }

    /// XOR every data module with mask pattern `mask`; applying twice undoes it
    pub fn apply_mask(&mut self, mask: u8) {
        for y in 0..self.size {
            for x in 0..self.size {
                if !self.is_function(x, y) && mask_bit(mask, x, y) {
                    let i = y * self.size + x;
                    self.modules[i] = !self.modules[i];
                }
            }
        }
    }

    /// Mask selection penalty (rules N1 to N4)
    pub fn penalty(&self) -> usize {
        let size = self.size;
        let mut score = 0;

        // N1 runs and N3 finder-like patterns, on rows and columns
        for transpose in [false, true] {
            for a in 0..size {
                let line: Vec<bool> = (0..size)
                    .map(|b| if transpose { self.get(a, b) } else { self.get(b, a) })
                    .collect();
                score += run_penalty(&line) + finder_penalty(&line);
            }
        }

        // N2 2x2 blocks
        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let c = self.get(x, y);
                if c == self.get(x + 1, y) && c == self.get(x, y + 1) && c == self.get(x + 1, y + 1)
                {
                    score += 3;
                }
            }
        }

        // N4 dark balance
        let total = (size * size) as i64;
        let dark = self.modules.iter().filter(|&&m| m).count() as i64;
        let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        score += k.max(0) as usize * 10;

        score
    }
}

fn run_penalty(line: &[bool]) -> usize {
    let mut score = 0;
    let mut run = 1;
    for i in 1..=line.len() {
        if i < line.len() && line[i] == line[i - 1] {
            run += 1;
            continue;
        }
        if run >= 5 {
            score += 3 + (run - 5);
        }
        run = 1;
    }
    score
}

fn finder_penalty(line: &[bool]) -> usize {
    const PATTERN: [bool; 7] = [true, false, true, true, true, false, true];
    let light = |range: std::ops::Range<isize>| {
        range
            .into_iter()
            .all(|i| i < 0 || i as usize >= line.len() || !line[i as usize])
    };
    let mut score = 0;
    for start in 0..line.len().saturating_sub(6) {
        if line[start..start + 7] != PATTERN {
            continue;
        }
        let s = start as isize;
        if light(s - 4..s) || light(s + 7..s + 11) {
            score += 40;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::tables::{num_raw_data_modules, MAX_VERSION, MIN_VERSION};

    #[test]
    fn test_known_format_bits() {
        // Level M, mask 0
        assert_eq!(format_bits(EccLevel::Medium, 0), 0b101010000010010);
        // Level L, mask 4
        assert_eq!(format_bits(EccLevel::Low, 4), 0b110011000101111);
    }

    #[test]
    fn test_known_version_bits() {
        assert_eq!(version_bits(7), 0x07C94);
        assert_eq!(version_bits(40), 0x28C69);
    }

    #[test]
    fn test_data_module_count_matches_table() {
        for version in MIN_VERSION..=MAX_VERSION {
            let grid = Grid::new(version);
            assert_eq!(grid.data_positions().len(), num_raw_data_modules(version));
        }
    }

    #[test]
    fn test_alignment_positions() {
        assert_eq!(alignment_positions(2), vec![6, 18]);
        assert_eq!(alignment_positions(7), vec![6, 22, 38]);
        assert_eq!(alignment_positions(32), vec![6, 34, 60, 86, 112, 138]);
        assert_eq!(alignment_positions(40), vec![6, 30, 58, 86, 114, 142, 170]);
    }

    #[test]
    fn test_mask_is_involution() {
        let mut grid = Grid::new(3);
        let before = grid.modules.clone();
        grid.apply_mask(5);
        assert_ne!(grid.modules, before);
        grid.apply_mask(5);
        assert_eq!(grid.modules, before);
    }

    #[test]
    fn test_run_penalty() {
        assert_eq!(run_penalty(&[true; 5]), 3);
        assert_eq!(run_penalty(&[false; 7]), 5);
        assert_eq!(run_penalty(&[true, false, true, false]), 0);
    }
}
