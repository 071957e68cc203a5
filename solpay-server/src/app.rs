//! Wiring of configuration, ledger, gate and responder into a router.

use std::sync::Arc;

use axum::{Json, Router};
use solpay::responder::ResponderError;
use solpay_http::server::{ResponderState, responder_router};
use solpay_svm::gate::{AllowAll, CollectionGate, GatePredicate};
use solpay_svm::{AddressExt, Ledger, ResponderConfig, SolanaResponder};

use crate::config::{ConfigError, HEALTH_PATH, ServerConfig};

/// Failure assembling the server.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The responder rejected its configuration.
    #[error(transparent)]
    Responder(#[from] ResponderError),
}

/// Builds the gate selected by `[gate]`.
pub fn gate(config: &ServerConfig, ledger: &Arc<dyn Ledger>) -> Arc<dyn GatePredicate> {
    match config.gate {
        Some(gate) => Arc::new(CollectionGate::new(
            gate.collection.to_pubkey(),
            Arc::clone(ledger),
        )),
        None => Arc::new(AllowAll),
    }
}

/// Builds the responder serving the configured transfer.
///
/// # Errors
///
/// Returns [`AppError`] if the metadata or signer is invalid.
pub fn responder(config: &ServerConfig, ledger: Arc<dyn Ledger>) -> Result<ResponderState, AppError> {
    let mut responder_config = ResponderConfig::new(config.metadata()?, config.action());
    responder_config.message.clone_from(&config.message);
    responder_config.signer = config.signer()?;
    let gate = gate(config, &ledger);
    let responder = SolanaResponder::new(responder_config, gate, ledger)?;
    Ok(Arc::new(responder))
}

/// Builds the full router: the endpoint at `path` plus `/health`.
///
/// # Errors
///
/// Returns [`AppError`] if `path` cannot be routed or the responder cannot
/// be built.
pub fn router(config: &ServerConfig, ledger: Arc<dyn Ledger>) -> Result<Router, AppError> {
    config.check_path()?;
    let responder = responder(config, ledger)?;
    Ok(Router::new()
        .route(HEALTH_PATH, axum::routing::get(health))
        .merge(responder_router(&config.path, responder)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use solana_keypair::Keypair;
    use solana_signer::Signer;
    use solpay::proto::TransactionResponse;
    use solpay_svm::PartialTransaction;
    use solpay_svm::ledger::InMemoryLedger;
    use solpay_svm::metadata::{Collection, TokenMetadata};
    use solpay_svm::token::TokenProgram;
    use tower::ServiceExt;

    use super::*;

    const CONFIG: &str = r#"
path = "/api/pay"
label = "Coffee Shop"
icon = "https://shop.example/icon.svg"
message = "Thanks!"

[transfer]
recipient = "mvines9iiHiQTysrwkJjGf2gb9Ex9jXJX8ns3qwf2kN"
amount = "0.5"
"#;

    fn setup(text: &str) -> (Router, Arc<InMemoryLedger>) {
        let config = ServerConfig::from_toml(text).unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.fund(config.transfer.recipient.to_pubkey(), 1_000_000);
        let app = router(&config, Arc::clone(&ledger) as Arc<dyn Ledger>).unwrap();
        (app, ledger)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = setup(CONFIG);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_serves_metadata_at_configured_path() {
        let (app, _) = setup(CONFIG);
        let response = app
            .oneshot(Request::get("/api/pay").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"label": "Coffee Shop", "icon": "https://shop.example/icon.svg"})
        );
    }

    #[tokio::test]
    async fn test_post_returns_unsigned_transaction_for_payer() {
        let (app, ledger) = setup(CONFIG);
        let payer = Keypair::new();
        ledger.fund(payer.pubkey(), 2_000_000_000);

        let request = Request::post("/api/pay")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "account": payer.pubkey().to_string() }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: TransactionResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.message.as_deref(), Some("Thanks!"));
        let tx = PartialTransaction::from_response(&body, &payer.pubkey()).unwrap();
        assert!(!tx.is_signed_by(&payer.pubkey()));
    }

    #[tokio::test]
    async fn test_collection_gate_rejects_non_holder() {
        let text = format!(
            "{CONFIG}\n[gate]\ncollection = \"{}\"\n",
            Keypair::new().pubkey()
        );
        let (app, ledger) = setup(&text);
        let payer = Keypair::new();
        ledger.fund(payer.pubkey(), 2_000_000_000);

        let request = Request::post("/api/pay")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "account": payer.pubkey().to_string() }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_collection_gate_admits_verified_holder() {
        let collection = Keypair::new().pubkey();
        let text = format!("{CONFIG}\n[gate]\ncollection = \"{collection}\"\n");
        let (app, ledger) = setup(&text);
        let payer = Keypair::new();
        ledger.fund(payer.pubkey(), 2_000_000_000);

        let nft = Keypair::new().pubkey();
        let program = TokenProgram::Token.id();
        ledger.add_mint(nft, 0, &program);
        ledger.add_token_account(payer.pubkey(), nft, 1, &program);
        ledger
            .set_metadata(&TokenMetadata {
                update_authority: Keypair::new().pubkey(),
                mint: nft,
                name: "Member #1".into(),
                symbol: "MBR".into(),
                uri: "https://shop.example/1.json".into(),
                collection: Some(Collection {
                    verified: true,
                    key: collection,
                }),
            })
            .unwrap();

        let request = Request::post("/api/pay")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "account": payer.pubkey().to_string() }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: TransactionResponse = serde_json::from_value(body_json(response).await).unwrap();
        let tx = PartialTransaction::from_response(&body, &payer.pubkey()).unwrap();
        assert_eq!(tx.fee_payer(), Some(&payer.pubkey()));
        assert!(!tx.is_fully_signed());
    }

    #[test]
    fn test_unroutable_path_fails_startup() {
        let mut config = ServerConfig::from_toml(CONFIG).unwrap();
        config.path = "/health".to_owned();
        let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
        assert!(matches!(
            router(&config, ledger),
            Err(AppError::Config(ConfigError::Path { .. }))
        ));
    }

    #[test]
    fn test_invalid_icon_fails_startup() {
        let config = ServerConfig::from_toml(&CONFIG.replace("icon.svg", "icon.txt")).unwrap();
        let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
        assert!(matches!(
            router(&config, ledger),
            Err(AppError::Config(ConfigError::Metadata(_)))
        ));
    }
}
