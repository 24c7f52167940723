//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/constants", get(handlers::get_constants))
        .route("/api/pretty-print", post(handlers::pretty_print))
        // Stage requests as QR symbols
        .route(
            "/api/qr/init-wallet-request",
            post(handlers::init_wallet_request),
        )
        .route(
            "/api/qr/finalize-wallet-request",
            post(handlers::finalize_wallet_request),
        )
        .route("/api/qr/sign-tx-request", post(handlers::sign_tx_request))
        .route("/api/qr/decode", post(handlers::decode_qr))
        // Derived data
        .route("/api/reveal-xpubs", post(handlers::reveal_xpubs))
        .route("/api/compute/address", post(handlers::compute_address))
        .route("/api/final-transaction", post(handlers::final_transaction))
        .with_state(state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::fixture::{gateway, request_signer, sample_tx, setup, WALLET_ID};
    use crate::config::GatewayConfig;
    use crate::envelope;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router() -> Router {
        let config = GatewayConfig {
            gateway_xpub: Some(gateway().to_string()),
            request_key: Some(hex::encode([0x24; 32])),
            ..Default::default()
        };
        create_router(ApiState::new(config))
    }

    async fn call(method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn base64_all(envelopes: &[envelope::Envelope]) -> Vec<String> {
        envelopes
            .iter()
            .map(|e| STANDARD.encode(envelope::encode(e).unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn test_health_and_constants() {
        let (status, body) = call("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = call("GET", "/api/constants", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["m"], 2);
        assert_eq!(body["n"], 3);
        assert_eq!(body["network"], "testnet");
        assert_eq!(body["ecc_level"], "M");
        assert_eq!(
            body["request_public_key"],
            hex::encode(request_signer().public_key().serialize())
        );
    }

    #[tokio::test]
    async fn test_init_symbols_decode_back() {
        let (status, body) = call(
            "POST",
            "/api/qr/init-wallet-request",
            Some(json!({"wallet_id": 11, "token": "batch-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let symbols = body.as_array().unwrap();
        assert_eq!(symbols.len(), 3);

        let first = &symbols[0];
        let (status, decoded) = call(
            "POST",
            "/api/qr/decode",
            Some(json!({"size": first["size"], "pixels": first["pixels"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decoded["data"], first["data"]);
        assert_eq!(decoded["tag"], "InitWalletRequest");

        let (status, printed) = call(
            "POST",
            "/api/pretty-print",
            Some(json!({"data": first["data"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(printed["wallet_id"], 11);
    }

    #[tokio::test]
    async fn test_errors_are_bad_requests_with_kind() {
        let (status, body) = call(
            "POST",
            "/api/pretty-print",
            Some(json!({"data": "Q1YBAQ=="})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "MalformedEnvelope");

        let (status, body) = call(
            "POST",
            "/api/qr/decode",
            Some(json!({"size": 21, "pixels": vec![false; 21 * 21]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "CorruptSymbol");
    }

    #[tokio::test]
    async fn test_wallet_flow_over_http() {
        let mut fx = setup(2, 3);

        let (status, body) = call(
            "POST",
            "/api/qr/finalize-wallet-request",
            Some(json!({"wallet_id": WALLET_ID, "responses": base64_all(&fx.init_responses)})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["descriptor_digest"],
            hex::encode(fx.descriptor.digest())
        );

        let (status, body) = call(
            "POST",
            "/api/reveal-xpubs",
            Some(json!({
                "wallet_id": WALLET_ID,
                "responses": base64_all(&fx.finalize_responses),
                "path": {"change": false, "index": 0},
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let revealed_address = body["address"].clone();

        let (status, body) = call(
            "POST",
            "/api/compute/address",
            Some(json!({"descriptor": fx.descriptor, "path": {"change": false, "index": 0}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], revealed_address);

        let tx = sample_tx();
        let (status, body) = call(
            "POST",
            "/api/qr/sign-tx-request",
            Some(json!({
                "wallet_id": WALLET_ID,
                "descriptor": fx.descriptor,
                "tx": tx,
                "quorum": &fx.keys[..2],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let symbols = body.as_array().unwrap();
        assert_eq!(symbols.len(), 2);

        // A device trusting the gateway's request key accepts the symbol
        let bytes = STANDARD.decode(symbols[0]["data"].as_str().unwrap()).unwrap();
        let request = envelope::decode(&bytes).unwrap();
        assert!(fx.devices[0].handle(&request).is_ok());

        let responses = fx.sign(&tx, &[1, 3]);
        let (status, body) = call(
            "POST",
            "/api/final-transaction",
            Some(json!({
                "wallet_id": WALLET_ID,
                "descriptor": fx.descriptor,
                "tx": tx,
                "responses": base64_all(&responses),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["txid"].as_str().unwrap().len(), 64);

        let (status, body) = call(
            "POST",
            "/api/final-transaction",
            Some(json!({
                "wallet_id": WALLET_ID,
                "descriptor": fx.descriptor,
                "tx": tx,
                "responses": base64_all(&responses[..1]),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "InsufficientSignatures");
    }
}
