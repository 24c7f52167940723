//! Canonical M-of-N witness scripts
//!
//! `OP_M <key_1> ... <key_N> OP_N OP_CHECKMULTISIG`, with the keys in the
//! order the caller supplies. Callers sort the keys first with
//! [`sort_public_keys`]; the resulting script hash depends on that order.

use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::secp256k1::PublicKey;

use crate::error::{Error, Result};

/// Participant ceiling for a vault policy.
///
/// A bare CHECKMULTISIG accepts at most 20 keys, and a P2WSH witness script
/// must stay within the 3600-byte standardness limit. Fifteen compressed keys
/// (a 513-byte script) keeps every policy well inside both and matches the
/// largest quorum common wallet software will cosign.
pub const MAX_PARTICIPANTS: usize = 15;

/// Check that an M-of-N policy can be expressed as a standard multisig script
pub fn validate_threshold(threshold: usize, participants: usize) -> Result<()> {
    let reason = if participants < 1 {
        Some("at least one participant is required")
    } else if participants > MAX_PARTICIPANTS {
        Some("too many participants for a standard multisig script")
    } else if threshold < 1 {
        Some("threshold must be at least 1")
    } else if threshold > participants {
        Some("threshold exceeds participant count")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::ThresholdInvalid {
            threshold,
            participants,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Sort keys lexicographically by their 33-byte compressed encoding (BIP-67)
pub fn sort_public_keys(keys: &mut [PublicKey]) {
    keys.sort_by_key(|key| key.serialize());
}

/// Build `OP_M <keys...> OP_N OP_CHECKMULTISIG` over keys in the given order
pub fn build_multisig_script(threshold: usize, ordered_keys: &[PublicKey]) -> Result<ScriptBuf> {
    validate_threshold(threshold, ordered_keys.len())?;

    let builder = ordered_keys
        .iter()
        .fold(Builder::new().push_int(threshold as i64), |builder, key| {
            builder.push_key(&bitcoin::PublicKey::new(*key))
        });
    Ok(builder
        .push_int(ordered_keys.len() as i64)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

fn small_int(instruction: &Instruction<'_>) -> Option<usize> {
    match instruction {
        Instruction::Op(op) => {
            let byte = op.to_u8();
            (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8())
                .contains(&byte)
                .then(|| (byte - OP_PUSHNUM_1.to_u8()) as usize + 1)
        }
        _ => None,
    }
}

/// Parse a script produced by [`build_multisig_script`] back into (M, keys)
pub fn parse_multisig_script(script: &Script) -> Option<(usize, Vec<PublicKey>)> {
    let instructions = script
        .instructions()
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()?;
    let (first, rest) = instructions.split_first()?;
    let (last, rest) = rest.split_last()?;
    let (count, pushes) = rest.split_last()?;
    if !matches!(last, Instruction::Op(op) if *op == OP_CHECKMULTISIG) {
        return None;
    }
    let threshold = small_int(first)?;
    let participants = small_int(count)?;

    let keys = pushes
        .iter()
        .map(|instruction| match instruction {
            Instruction::PushBytes(bytes) => PublicKey::from_slice(bytes.as_bytes()).ok(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if keys.len() != participants {
        return None;
    }

    // Only the exact canonical encoding parses
    let rebuilt = build_multisig_script(threshold, &keys).ok()?;
    (rebuilt.as_script() == script).then_some((threshold, keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::Secp256k1;
    use rand::rngs::OsRng;

    fn keys(n: usize) -> Vec<PublicKey> {
        let secp = Secp256k1::new();
        (0..n).map(|_| secp.generate_keypair(&mut OsRng).1).collect()
    }

    #[test]
    fn test_script_layout() {
        let keys = keys(3);
        let script = build_multisig_script(2, &keys).unwrap();
        let bytes = script.as_bytes();
        assert_eq!(bytes.len(), 3 + 3 * 34);
        assert_eq!(bytes[0], 0x52);
        assert_eq!(bytes[1], 0x21);
        assert_eq!(bytes[bytes.len() - 2], 0x53);
        assert_eq!(bytes[bytes.len() - 1], OP_CHECKMULTISIG.to_u8());
        assert_eq!(&bytes[2..35], &keys[0].serialize());

        let (threshold, parsed) = parse_multisig_script(&script).unwrap();
        assert_eq!(threshold, 2);
        assert_eq!(parsed, keys);
    }

    #[test]
    fn test_parse_rejects_foreign_scripts() {
        let keys = keys(2);
        let script = build_multisig_script(1, &keys).unwrap();

        // Participant count disagrees with the pushed keys
        let mut bytes = script.to_bytes();
        let n = bytes.len() - 2;
        bytes[n] = 0x53;
        assert!(parse_multisig_script(&ScriptBuf::from_bytes(bytes)).is_none());

        // Trailing opcode after CHECKMULTISIG
        let mut bytes = script.to_bytes();
        bytes.push(OP_CHECKMULTISIG.to_u8());
        assert!(parse_multisig_script(&ScriptBuf::from_bytes(bytes)).is_none());

        assert!(parse_multisig_script(&ScriptBuf::new()).is_none());
    }

    #[test]
    fn test_threshold_bounds() {
        let three = keys(3);
        assert!(matches!(
            build_multisig_script(0, &three),
            Err(Error::ThresholdInvalid { threshold: 0, .. })
        ));
        assert!(matches!(
            build_multisig_script(4, &three),
            Err(Error::ThresholdInvalid { threshold: 4, participants: 3, .. })
        ));
        assert!(build_multisig_script(1, &[]).is_err());
        assert!(build_multisig_script(2, &keys(16)).is_err());

        let largest = build_multisig_script(15, &keys(15)).unwrap();
        assert_eq!(largest.len(), 3 + 15 * 34);
        assert!(largest.len() <= 3600);
    }

    #[test]
    fn test_canonical_order_is_permutation_independent() {
        let original = keys(3);
        let mut sorted = original.clone();
        sort_public_keys(&mut sorted);

        let mut reversed = original.clone();
        reversed.reverse();
        sort_public_keys(&mut reversed);
        assert_eq!(
            build_multisig_script(2, &sorted).unwrap(),
            build_multisig_script(2, &reversed).unwrap()
        );

        // Bypassing the sort changes the script
        let mut unsorted = sorted.clone();
        unsorted.swap(0, 2);
        assert_ne!(
            build_multisig_script(2, &sorted).unwrap(),
            build_multisig_script(2, &unsorted).unwrap()
        );
    }
}
