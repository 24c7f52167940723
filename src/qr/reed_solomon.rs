//! Reed-Solomon over GF(2^8) with the QR primitive polynomial 0x11D
//!
//! Codewords are written highest-degree coefficient first and the generator
//! has roots α^0 .. α^(n-1). Decoding runs Berlekamp-Massey, a Chien search
//! and Forney's formula, then re-checks the syndromes.

use crate::error::{Error, Result};

const PRIMITIVE: u16 = 0x11D;

struct Field {
    exp: [u8; 512],
    log: [u8; 256],
}

const fn build_field() -> Field {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE;
        }
        i += 1;
    }
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }
    Field { exp, log }
}

static FIELD: Field = build_field();

pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    FIELD.exp[FIELD.log[a as usize] as usize + FIELD.log[b as usize] as usize]
}

/// `a / b`; `b` must be non-zero
pub fn div(a: u8, b: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    FIELD.exp[FIELD.log[a as usize] as usize + 255 - FIELD.log[b as usize] as usize]
}

/// α^e
pub fn alpha_pow(e: usize) -> u8 {
    FIELD.exp[e % 255]
}

/// Evaluate a polynomial with ascending coefficients at `x`
fn eval_ascending(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0, |acc, &c| mul(acc, x) ^ c)
}

/// Generator polynomial of the given degree, leading 1 omitted, highest first
pub fn generator(degree: usize) -> Vec<u8> {
    let mut result = vec![0u8; degree];
    if degree == 0 {
        return result;
    }
    result[degree - 1] = 1;
    let mut root = 1u8;
    for _ in 0..degree {
        for j in 0..degree {
            result[j] = mul(result[j], root);
            if j + 1 < degree {
                result[j] ^= result[j + 1];
            }
        }
        root = mul(root, 0x02);
    }
    result
}

/// Error correction codewords for `data` under `generator`
pub fn remainder(data: &[u8], generator: &[u8]) -> Vec<u8> {
    let mut result = vec![0u8; generator.len()];
    for &b in data {
        let factor = b ^ result.first().copied().unwrap_or(0);
        result.rotate_left(1);
        if let Some(last) = result.last_mut() {
            *last = 0;
        }
        for (x, &y) in result.iter_mut().zip(generator) {
            *x ^= mul(y, factor);
        }
    }
    result
}

fn syndromes(codeword: &[u8], ecc_len: usize) -> Vec<u8> {
    (0..ecc_len)
        .map(|j| {
            let x = alpha_pow(j);
            codeword.iter().fold(0, |acc, &c| mul(acc, x) ^ c)
        })
        .collect()
}

/// Berlekamp-Massey: error locator Λ(x), ascending coefficients
fn error_locator(syndromes: &[u8]) -> Vec<u8> {
    let mut c = vec![1u8];
    let mut b = vec![1u8];
    let mut l = 0usize;
    let mut m = 1usize;
    let mut last_d = 1u8;

    for k in 0..syndromes.len() {
        let mut d = syndromes[k];
        for i in 1..=l.min(c.len() - 1) {
            d ^= mul(c[i], syndromes[k - i]);
        }
        if d == 0 {
            m += 1;
            continue;
        }

        let coef = div(d, last_d);
        let mut next = c.clone();
        if next.len() < b.len() + m {
            next.resize(b.len() + m, 0);
        }
        for (i, &bi) in b.iter().enumerate() {
            next[i + m] ^= mul(coef, bi);
        }

        if 2 * l <= k {
            b = c;
            l = k + 1 - l;
            last_d = d;
            m = 1;
        } else {
            m += 1;
        }
        c = next;
    }

    c.resize(l + 1, 0);
    c
}

/// Correct `codeword` in place (data followed by `ecc_len` check bytes)
///
/// Returns the number of corrected bytes.
pub fn correct(codeword: &mut [u8], ecc_len: usize) -> Result<usize> {
    let n = codeword.len();
    if n > 255 || ecc_len > n {
        return Err(Error::CorruptSymbol(format!(
            "block of {} bytes with {} check bytes is not a valid RS block",
            n, ecc_len
        )));
    }

    let s = syndromes(codeword, ecc_len);
    if s.iter().all(|&v| v == 0) {
        return Ok(0);
    }

    let locator = error_locator(&s);
    let errors = locator.len() - 1;
    if errors == 0 || 2 * errors > ecc_len {
        return Err(Error::CorruptSymbol(
            "too many errors in block to correct".into(),
        ));
    }

    // Ω(x) = S(x)Λ(x) mod x^ecc_len
    let mut omega = vec![0u8; ecc_len];
    for (i, &li) in locator.iter().enumerate() {
        for (j, &sj) in s.iter().enumerate() {
            if i + j < ecc_len {
                omega[i + j] ^= mul(li, sj);
            }
        }
    }

    // Formal derivative keeps odd-degree terms only
    let derivative: Vec<u8> = locator
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, &c)| if i % 2 == 1 { c } else { 0 })
        .collect();

    let mut fixed = 0;
    for i in 0..n {
        let power = n - 1 - i;
        let x = alpha_pow(power);
        let x_inv = alpha_pow(255 - power % 255);
        if eval_ascending(&locator, x_inv) != 0 {
            continue;
        }
        let denominator = eval_ascending(&derivative, x_inv);
        if denominator == 0 {
            return Err(Error::CorruptSymbol("degenerate error locator".into()));
        }
        let magnitude = mul(x, div(eval_ascending(&omega, x_inv), denominator));
        codeword[i] ^= magnitude;
        fixed += 1;
    }

    if fixed != errors || syndromes(codeword, ecc_len).iter().any(|&v| v != 0) {
        return Err(Error::CorruptSymbol(
            "error correction could not reconstruct the block".into(),
        ));
    }
    Ok(fixed)
}
