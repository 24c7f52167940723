//! REST API handlers for the ceremony gateway

use axum::{extract::State, http::StatusCode, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ceremony::{
    derive_address, finalize_wallet, init_wallet, reveal_wallet, sign_tx, RevealedWallet,
};
use crate::config::GatewayConfig;
use crate::envelope::{self, Envelope};
use crate::error::Error;
use crate::merge::{merge, FinalTransaction};
use crate::qr;
use crate::transaction::UnsignedTransaction;
use crate::wallet::{CosignerKey, Path, WalletDescriptor};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<GatewayConfig>,
}

impl ApiState {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub kind: &'static str,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn bad_request(err: Error) -> (StatusCode, Json<ApiError>) {
    log::debug!("Rejecting request: {}", err);
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            kind: err.kind(),
            error: err.to_string(),
        }),
    )
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ConstantsResponse {
    pub m: usize,
    pub n: usize,
    pub network: String,
    pub gateway: Option<String>,
    /// Compressed key devices must trust for sign requests, hex
    pub request_public_key: Option<String>,
    pub ecc_level: String,
    pub max_payload: usize,
}

/// One envelope rendered as a scannable symbol
#[derive(Debug, Serialize, Deserialize)]
pub struct QrPayload {
    /// Envelope bytes, base64
    pub data: String,
    pub size: usize,
    /// Row-major modules, `true` = dark
    pub pixels: Vec<bool>,
    pub transcript: String,
}

#[derive(Serialize)]
pub struct PrettyPrintResponse {
    pub tag: &'static str,
    pub wallet_id: u32,
    pub transcript: String,
}

#[derive(Serialize)]
pub struct FinalizeQrResponse {
    pub descriptor: WalletDescriptor,
    pub descriptor_digest: String,
    pub qr: Vec<QrPayload>,
}

#[derive(Serialize)]
pub struct DecodeResponse {
    pub data: String,
    pub tag: &'static str,
    pub transcript: String,
}

#[derive(Serialize)]
pub struct AddressResponse {
    pub address: String,
    pub witness_script: String,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct PrettyPrintRequest {
    pub data: String,
}

#[derive(Deserialize)]
pub struct InitWalletQrRequest {
    pub wallet_id: u32,
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct ResponsesRequest {
    pub wallet_id: u32,
    /// Base64 envelopes scanned from the devices
    pub responses: Vec<String>,
    pub path: Option<Path>,
}

#[derive(Deserialize)]
pub struct SignTxQrRequest {
    pub wallet_id: u32,
    pub descriptor: WalletDescriptor,
    pub tx: UnsignedTransaction,
    pub quorum: Vec<CosignerKey>,
}

#[derive(Deserialize)]
pub struct DecodeRequest {
    pub size: usize,
    pub pixels: Vec<bool>,
}

#[derive(Deserialize)]
pub struct ComputeAddressRequest {
    pub descriptor: WalletDescriptor,
    pub path: Path,
}

#[derive(Deserialize)]
pub struct FinalTransactionRequest {
    pub wallet_id: u32,
    pub descriptor: WalletDescriptor,
    pub tx: UnsignedTransaction,
    pub responses: Vec<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn decode_base64_envelope(data: &str) -> Result<Envelope, Error> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| Error::MalformedEnvelope(format!("invalid base64: {}", e)))?;
    envelope::decode(&bytes)
}

fn decode_all(data: &[String]) -> Result<Vec<Envelope>, Error> {
    data.iter().map(|d| decode_base64_envelope(d)).collect()
}

/// Encode an envelope into a QR payload at the configured level
pub fn qr_payload(envelope: &Envelope, level: qr::EccLevel) -> Result<QrPayload, Error> {
    let bytes = envelope::encode(envelope)?;
    let code = qr::encode(&bytes, level)?;
    Ok(QrPayload {
        data: STANDARD.encode(&bytes),
        size: code.size,
        pixels: code.modules,
        transcript: envelope::transcript(envelope),
    })
}

fn qr_payloads(envelopes: &[Envelope], level: qr::EccLevel) -> Result<Vec<QrPayload>, Error> {
    envelopes.iter().map(|e| qr_payload(e, level)).collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/constants - Wallet policy this gateway runs
pub async fn get_constants(State(state): State<ApiState>) -> Json<ConstantsResponse> {
    let config = &state.config;
    Json(ConstantsResponse {
        m: config.threshold,
        n: config.participants,
        network: config.network.to_string(),
        gateway: config.gateway_xpub.clone(),
        request_public_key: config
            .request_signer()
            .ok()
            .flatten()
            .map(|signer| hex::encode(signer.public_key().serialize())),
        ecc_level: config.ecc_level.to_string(),
        max_payload: config.ecc_level.max_payload(),
    })
}

/// POST /api/pretty-print - Transcript of a base64 envelope
pub async fn pretty_print(Json(req): Json<PrettyPrintRequest>) -> ApiResult<PrettyPrintResponse> {
    let envelope = decode_base64_envelope(&req.data).map_err(bad_request)?;
    Ok(Json(PrettyPrintResponse {
        tag: envelope.body.name(),
        wallet_id: envelope.wallet_id,
        transcript: envelope::transcript(&envelope),
    }))
}

/// POST /api/qr/init-wallet-request - One symbol per device slot
pub async fn init_wallet_request(
    State(state): State<ApiState>,
    Json(req): Json<InitWalletQrRequest>,
) -> ApiResult<Vec<QrPayload>> {
    let policy = state.config.policy().map_err(bad_request)?;
    let mut requests = init_wallet(&policy, req.wallet_id).map_err(bad_request)?;
    for request in &mut requests {
        request.token = req.token.clone();
    }
    qr_payloads(&requests, state.config.ecc_level)
        .map(Json)
        .map_err(bad_request)
}

/// POST /api/qr/finalize-wallet-request - Descriptor plus attestation requests
pub async fn finalize_wallet_request(
    State(state): State<ApiState>,
    Json(req): Json<ResponsesRequest>,
) -> ApiResult<FinalizeQrResponse> {
    let policy = state.config.policy().map_err(bad_request)?;
    let responses = decode_all(&req.responses).map_err(bad_request)?;
    let (descriptor, requests) =
        finalize_wallet(&policy, req.wallet_id, &responses).map_err(bad_request)?;
    let qr = qr_payloads(&requests, state.config.ecc_level).map_err(bad_request)?;
    Ok(Json(FinalizeQrResponse {
        descriptor_digest: hex::encode(descriptor.digest()),
        descriptor,
        qr,
    }))
}

/// POST /api/reveal-xpubs - Verify attestations, list xpubs and an address
pub async fn reveal_xpubs(
    State(state): State<ApiState>,
    Json(req): Json<ResponsesRequest>,
) -> ApiResult<RevealedWallet> {
    let policy = state.config.policy().map_err(bad_request)?;
    let responses = decode_all(&req.responses).map_err(bad_request)?;
    reveal_wallet(&policy, req.wallet_id, &responses, req.path)
        .map(Json)
        .map_err(bad_request)
}

/// POST /api/compute/address - Vault address at a path
pub async fn compute_address(
    Json(req): Json<ComputeAddressRequest>,
) -> ApiResult<AddressResponse> {
    let address = derive_address(&req.descriptor, &req.path).map_err(bad_request)?;
    let witness_script = req.descriptor.witness_script(&req.path).map_err(bad_request)?;
    Ok(Json(AddressResponse {
        address,
        witness_script: hex::encode(witness_script.as_bytes()),
    }))
}

/// POST /api/qr/sign-tx-request - One symbol per quorum member
pub async fn sign_tx_request(
    State(state): State<ApiState>,
    Json(req): Json<SignTxQrRequest>,
) -> ApiResult<Vec<QrPayload>> {
    let gateway = state.config.require_gateway().map_err(bad_request)?;
    let signer = state.config.require_request_signer().map_err(bad_request)?;
    let requests = sign_tx(
        &req.descriptor,
        &gateway,
        &signer,
        req.wallet_id,
        &req.tx,
        &req.quorum,
    )
    .map_err(bad_request)?;
    qr_payloads(&requests, state.config.ecc_level)
        .map(Json)
        .map_err(bad_request)
}

/// POST /api/qr/decode - Scanned modules back to an envelope
pub async fn decode_qr(Json(req): Json<DecodeRequest>) -> ApiResult<DecodeResponse> {
    let bytes = qr::decode(req.size, &req.pixels).map_err(bad_request)?;
    let envelope = envelope::decode(&bytes).map_err(bad_request)?;
    Ok(Json(DecodeResponse {
        data: STANDARD.encode(&bytes),
        tag: envelope.body.name(),
        transcript: envelope::transcript(&envelope),
    }))
}

/// POST /api/final-transaction - Merge sign responses
pub async fn final_transaction(
    State(state): State<ApiState>,
    Json(req): Json<FinalTransactionRequest>,
) -> ApiResult<FinalTransaction> {
    let gateway = state.config.require_gateway().map_err(bad_request)?;
    let responses = decode_all(&req.responses).map_err(bad_request)?;
    merge(&req.descriptor, &gateway, req.wallet_id, &req.tx, &responses)
        .map(Json)
        .map_err(bad_request)
}
