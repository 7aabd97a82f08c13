//! Authentication support for Google Cloud.

use gcp_auth::{CustomServiceAccount, Token, TokenProvider};
use std::{fmt, path::Path};

use crate::common::*;

/// Supplies OAuth2 bearer tokens for Google Cloud requests.
#[derive(Clone)]
pub enum Authenticator {
    /// Send requests without a token. Only useful against a storage emulator.
    Anonymous,
    /// Get tokens from a `gcp_auth` provider.
    Provider(Arc<dyn TokenProvider>),
}

impl Authenticator {
    /// Build an authenticator.
    ///
    /// If `credentials` names a service account key file, we use it. Otherwise
    /// we fall back to application default credentials, which means
    /// `$GOOGLE_APPLICATION_CREDENTIALS`, the `gcloud` CLI's stored login, or
    /// the GCE metadata server, in whatever order `gcp_auth` prefers.
    #[instrument(level = "trace")]
    pub async fn new(credentials: Option<&Path>) -> Result<Authenticator> {
        match credentials {
            Some(path) => {
                debug!("using service account key {}", path.display());
                let account = CustomServiceAccount::from_file(path).with_context(|| {
                    format!("could not load service account key {}", path.display())
                })?;
                Ok(Authenticator::Provider(Arc::new(account)))
            }
            None => {
                debug!("using application default credentials");
                let provider = gcp_auth::provider()
                    .await
                    .context("could not find Google Cloud credentials")?;
                Ok(Authenticator::Provider(provider))
            }
        }
    }

    /// Get a token for `scopes`, or `None` if we're anonymous.
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn token(&self, scopes: &[&str]) -> Result<Option<Arc<Token>>> {
        match self {
            Authenticator::Anonymous => Ok(None),
            Authenticator::Provider(provider) => {
                let token = provider
                    .token(scopes)
                    .await
                    .context("could not get Google Cloud OAuth2 token")?;
                Ok(Some(token))
            }
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::Anonymous => write!(f, "Authenticator::Anonymous"),
            Authenticator::Provider(_) => write!(f, "Authenticator::Provider(..)"),
        }
    }
}
