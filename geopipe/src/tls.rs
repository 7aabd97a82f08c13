//! Support for setting up RusTLS in a consistent fashion.

use rustls::{ClientConfig, RootCertStore};
use rustls_native_certs::load_native_certs;
use std::sync::Once;

use crate::common::*;

/// Install `aws-lc-rs` as the process-wide crypto provider.
///
/// We build `reqwest` without a bundled provider, so this must run before we
/// create any HTTP client. Safe to call repeatedly.
pub(crate) fn install_crypto_provider() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // Fails only if somebody else already installed a provider, which is
        // fine by us.
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            trace!("a rustls crypto provider was already installed");
        }
    });
}

/// Standard RusTLS `ClientConfig` setup, trusting the system's native roots.
///
/// Used for PostgreSQL connections.
pub(crate) fn rustls_client_config() -> Result<ClientConfig> {
    install_crypto_provider();

    let mut root_store = RootCertStore::empty();
    let cert_result = load_native_certs();
    for cert in cert_result.certs {
        root_store
            .add(cert)
            .context("could not add certificate to cert store")?;
    }
    if let Some(err) = cert_result.errors.into_iter().next() {
        return Err(err).context("error loading native certs");
    }
    debug!("loaded {} native root certificates", root_store.len());

    Ok(ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth())
}
