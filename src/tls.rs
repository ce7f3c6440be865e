use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

use crate::config::Config;

/// Hostnames a generated certificate is valid for
const SELF_SIGNED_NAMES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// TLS settings for the listener, or `None` to serve plain HTTP.
///
/// `validate` has already checked that `--cert` and `--key` come as a pair
/// and that both files exist.
pub async fn server_tls(config: &Config) -> Result<Option<RustlsConfig>> {
    if config.self_signed_certs_on_the_fly {
        return generate_self_signed_config().await.map(Some);
    }

    match (&config.cert, &config.key) {
        (Some(cert), Some(key)) => load_tls_config(cert, key).await.map(Some),
        _ => Ok(None),
    }
}

/// Load a certificate chain and private key from PEM files
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig> {
    install_crypto_provider();
    tracing::info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "Loading TLS certificates"
    );

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .with_context(|| format!("Failed to load TLS certificate {:?} / key {:?}", cert_path, key_path))
}

/// Certificate generated at startup, for local testing only
pub async fn generate_self_signed_config() -> Result<RustlsConfig> {
    install_crypto_provider();

    let names = SELF_SIGNED_NAMES.iter().map(|name| name.to_string()).collect::<Vec<_>>();
    let generated = rcgen::generate_simple_self_signed(names)
        .context("Failed to generate self-signed certificate")?;

    let config = RustlsConfig::from_pem(
        generated.cert.pem().into_bytes(),
        generated.key_pair.serialize_pem().into_bytes(),
    )
    .await
    .context("Failed to build TLS configuration from generated certificate")?;

    tracing::warn!("Serving a self-signed certificate; browsers will not trust it");
    Ok(config)
}

/// Pin the process-wide rustls provider. A second call is a no-op.
fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}
