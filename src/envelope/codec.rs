//! Envelope wire format
//!
//! `magic(2) | version(1) | tag(1) | body`, where the body is the bincode
//! (standard configuration) encoding of `(wallet_id, token, stage fields)`.
//! Encoding is deterministic: equal envelopes give identical bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::message::{
    Body, Envelope, FinalizeWalletRequest, FinalizeWalletResponse, InitWalletRequest,
    InitWalletResponse, SignTxRequest, SignTxResponse,
};
use crate::error::{Error, Result};

pub const MAGIC: [u8; 2] = *b"CV";
pub const WIRE_VERSION: u8 = 1;
const HEADER_LEN: usize = 4;

/// Upper bound on decoded allocations; larger envelopes cannot fit in a QR symbol
const DECODE_LIMIT: usize = 64 * 1024;

fn encode_body<T: Serialize>(envelope: &Envelope, fields: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(
        (envelope.wallet_id, &envelope.token, fields),
        bincode::config::standard(),
    )
    .map_err(|e| Error::MalformedEnvelope(format!("encoding failed: {}", e)))
}

fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<(u32, Option<String>, T)> {
    let config = bincode::config::standard().with_limit::<DECODE_LIMIT>();
    let (value, read): ((u32, Option<String>, T), usize) =
        bincode::serde::decode_from_slice(bytes, config)
            .map_err(|e| Error::MalformedEnvelope(format!("invalid body: {}", e)))?;
    if read != bytes.len() {
        return Err(Error::MalformedEnvelope(format!(
            "{} trailing bytes after body",
            bytes.len() - read
        )));
    }
    Ok(value)
}

/// Serialize an envelope
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let body = match &envelope.body {
        Body::InitWalletRequest(m) => encode_body(envelope, m)?,
        Body::InitWalletResponse(m) => encode_body(envelope, m)?,
        Body::FinalizeWalletRequest(m) => encode_body(envelope, m)?,
        Body::FinalizeWalletResponse(m) => encode_body(envelope, m)?,
        Body::SignTxRequest(m) => encode_body(envelope, m)?,
        Body::SignTxResponse(m) => encode_body(envelope, m)?,
    };

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&MAGIC);
    out.push(WIRE_VERSION);
    out.push(envelope.body.tag());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Parse and validate an envelope
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::MalformedEnvelope(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    if bytes[..2] != MAGIC {
        return Err(Error::MalformedEnvelope("bad magic".into()));
    }
    if bytes[2] != WIRE_VERSION {
        return Err(Error::MalformedEnvelope(format!(
            "unsupported wire version {}",
            bytes[2]
        )));
    }

    let payload = &bytes[HEADER_LEN..];
    macro_rules! decode_as {
        ($variant:ident, $ty:ty) => {{
            let (wallet_id, token, fields) = decode_body::<$ty>(payload)?;
            Envelope {
                wallet_id,
                token,
                body: Body::$variant(fields),
            }
        }};
    }

    let envelope = match bytes[3] {
        0x01 => decode_as!(InitWalletRequest, InitWalletRequest),
        0x02 => decode_as!(InitWalletResponse, InitWalletResponse),
        0x03 => decode_as!(FinalizeWalletRequest, FinalizeWalletRequest),
        0x04 => decode_as!(FinalizeWalletResponse, FinalizeWalletResponse),
        0x05 => decode_as!(SignTxRequest, SignTxRequest),
        0x06 => decode_as!(SignTxResponse, SignTxResponse),
        tag => {
            return Err(Error::MalformedEnvelope(format!(
                "unknown tag 0x{:02x}",
                tag
            )))
        }
    };

    envelope.validate().map_err(|e| match e {
        Error::MalformedEnvelope(_) => e,
        other => Error::MalformedEnvelope(other.to_string()),
    })?;
    Ok(envelope)
}
