//! REST API module
//!
//! Stateless HTTP front end of the ceremony gateway. Each request carries
//! the artifacts of earlier stages; the server holds only its configuration.
//!
//! # Endpoints
//!
//! ## Service
//! - `GET /health` - Liveness
//! - `GET /api/constants` - M, N, network, gateway key and request key
//! - `POST /api/pretty-print` - Transcript of a base64 envelope
//!
//! ## QR stages
//! - `POST /api/qr/init-wallet-request` - Init requests for every slot
//! - `POST /api/qr/finalize-wallet-request` - Descriptor and attestation requests
//! - `POST /api/qr/sign-tx-request` - Sign requests for a quorum
//! - `POST /api/qr/decode` - Scanned modules to envelope
//!
//! ## Derived data
//! - `POST /api/reveal-xpubs` - Verified xpubs and an address
//! - `POST /api/compute/address` - Vault address at a path
//! - `POST /api/final-transaction` - Merge sign responses

pub mod handlers;
pub mod routes;

pub use handlers::{qr_payload, ApiState, QrPayload};
pub use routes::create_router;
