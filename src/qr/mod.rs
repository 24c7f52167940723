//! QR transport codec
//!
//! This module provides:
//! - ISO/IEC 18004 model 2 symbols, versions 1 to 40
//! - Byte-mode encoding at the smallest version that fits
//! - Decoding of a scanned flat pixel array with Reed-Solomon correction

pub mod decoder;
pub mod encoder;
pub mod matrix;
pub mod reed_solomon;
pub mod tables;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use decoder::decode;
pub use encoder::encode;
pub use tables::byte_capacity;

/// Error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EccLevel {
    /// ~7% recovery
    #[serde(rename = "L")]
    Low,
    /// ~15% recovery
    #[default]
    #[serde(rename = "M")]
    Medium,
    /// ~25% recovery
    #[serde(rename = "Q")]
    Quartile,
    /// ~30% recovery
    #[serde(rename = "H")]
    High,
}

impl EccLevel {
    pub const ALL: [EccLevel; 4] = [
        EccLevel::Low,
        EccLevel::Medium,
        EccLevel::Quartile,
        EccLevel::High,
    ];

    /// Row in the capacity tables
    pub fn ordinal(&self) -> usize {
        match self {
            EccLevel::Low => 0,
            EccLevel::Medium => 1,
            EccLevel::Quartile => 2,
            EccLevel::High => 3,
        }
    }

    /// Two-bit indicator in the format information
    pub fn format_bits(&self) -> u32 {
        match self {
            EccLevel::Low => 0b01,
            EccLevel::Medium => 0b00,
            EccLevel::Quartile => 0b11,
            EccLevel::High => 0b10,
        }
    }

    /// Largest payload at this level
    pub fn max_payload(&self) -> usize {
        byte_capacity(tables::MAX_VERSION, *self)
    }
}

impl fmt::Display for EccLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            EccLevel::Low => "L",
            EccLevel::Medium => "M",
            EccLevel::Quartile => "Q",
            EccLevel::High => "H",
        };
        write!(f, "{}", c)
    }
}

impl FromStr for EccLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L" | "LOW" => Ok(EccLevel::Low),
            "M" | "MEDIUM" => Ok(EccLevel::Medium),
            "Q" | "QUARTILE" => Ok(EccLevel::Quartile),
            "H" | "HIGH" => Ok(EccLevel::High),
            other => Err(Error::Config(format!("unknown ECC level: {}", other))),
        }
    }
}

/// An encoded symbol: side length plus row-major modules, `true` = dark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub version: u8,
    pub level: EccLevel,
    pub mask: u8,
    pub size: usize,
    pub modules: Vec<bool>,
}

impl QrCode {
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size && self.modules[y * self.size + x]
    }

    /// Render for a terminal with half-block characters and a 4-module quiet zone
    ///
    /// Dark modules print as spaces on a light background, so the symbol
    /// scans from a dark-themed terminal.
    pub fn render_terminal(&self) -> String {
        const QUIET: isize = 4;
        let size = self.size as isize;
        let dark = |x: isize, y: isize| {
            x >= 0 && y >= 0 && self.get(x as usize, y as usize)
        };

        let mut out = String::new();
        let mut y = -QUIET;
        while y < size + QUIET {
            for x in -QUIET..size + QUIET {
                let top = dark(x, y);
                let bottom = dark(x, y + 1);
                out.push(match (top, bottom) {
                    (false, false) => '\u{2588}',
                    (true, false) => '\u{2584}',
                    (false, true) => '\u{2580}',
                    (true, true) => ' ',
                });
            }
            out.push('\n');
            y += 2;
        }
        out
    }
}
