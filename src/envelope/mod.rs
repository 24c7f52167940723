//! Envelope codec
//!
//! This module provides:
//! - Typed stage messages, one variant per request/response
//! - A compact, deterministic binary encoding for optical transport
//! - Gateway signatures over sign requests
//! - Human-readable transcripts

pub mod auth;
pub mod codec;
pub mod message;
pub mod transcript;

pub use auth::{request_digest, verify_request, RequestSigner};
pub use codec::{decode, encode};
pub use message::{
    Body, Envelope, FinalizeWalletRequest, FinalizeWalletResponse, InitWalletRequest,
    InitWalletResponse, InputSignature, SignTxRequest, SignTxResponse,
};
pub use transcript::{render_sign_request, transcript};
