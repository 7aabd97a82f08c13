//! A minimal Google Cloud REST client.

use mime::{self, Mime};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_derive::Deserialize;
use std::{error, fmt, time::Duration};

use super::auth::Authenticator;
use crate::common::*;
use crate::tls::install_crypto_provider;

/// The real Google Cloud Storage API endpoint.
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com/";

/// The OAuth2 scopes that we'll need.
static SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

/// Characters we escape in URL path components. Everything except RFC 3986
/// "unreserved" characters, so `/` inside object names gets escaped.
const PATH_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// An HTTP client error. We break out "not found", because our callers care
/// about it.
#[derive(Debug)]
pub enum ClientError {
    /// The resource at URL was not found.
    NotFound { method: String, url: Url },
    /// Another error occured.
    Other(Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NotFound { method, url } => {
                write!(f, "cannot {} {}: Not Found", method, url)
            }
            ClientError::Other(err) => write!(f, "{:#}", err),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ClientError::NotFound { .. } => None,
            ClientError::Other(err) => err.source(),
        }
    }
}

impl From<Error> for ClientError {
    fn from(err: Error) -> Self {
        ClientError::Other(err)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Other(err.into())
    }
}

/// A Google Cloud REST client.
#[derive(Clone, Debug)]
pub struct Client {
    /// The API endpoint, normally [`DEFAULT_STORAGE_ENDPOINT`].
    endpoint: Url,
    /// Provides OAuth2 tokens.
    authenticator: Authenticator,
    /// Our HTTP client.
    client: reqwest::Client,
}

impl Client {
    /// Create a new client for `endpoint`.
    pub fn new(
        endpoint: Url,
        authenticator: Authenticator,
        timeout: Option<Duration>,
    ) -> Result<Client> {
        install_crypto_provider();
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("could not build Google Cloud HTTP client")?;
        Ok(Client {
            endpoint,
            authenticator,
            client,
        })
    }

    /// Build an API URL from a path relative to our endpoint, and something we
    /// can serialize as a query string. Path components must already be
    /// escaped using [`percent_encode`].
    pub(crate) fn url<Query>(&self, path: &str, query: Query) -> Result<Url>
    where
        Query: fmt::Debug + Serialize,
    {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let mut url = format!("{}/{}", base, path.trim_start_matches('/'))
            .parse::<Url>()
            .with_context(|| format!("could not build URL for {:?}", path))?;
        let query_str = serde_urlencoded::to_string(&query)
            .with_context(|| format!("could not serialize query {:?}", query))?;
        if !query_str.is_empty() {
            url.set_query(Some(&query_str));
        }
        Ok(url)
    }

    /// Make an HTTP GET request and return the raw response body.
    #[instrument(level = "trace", skip(self), fields(url = %url))]
    pub(crate) async fn get_bytes(&self, url: &Url) -> Result<Bytes, ClientError> {
        trace!("GET {}", url);
        let mut req = self.client.get(url.as_str());
        if let Some(token) = self.authenticator.token(SCOPES).await? {
            req = req.bearer_auth(token.as_str());
        }
        let http_resp = req
            .send()
            .await
            .with_context(|| format!("could not GET {}", url))?;
        if http_resp.status().is_success() {
            let body = http_resp
                .bytes()
                .await
                .with_context(|| format!("error reading body of {}", url))?;
            Ok(body)
        } else {
            Err(handle_error("GET", url, http_resp).await)
        }
    }

    /// POST `body` to `url` with `content_type`, and deserialize the JSON
    /// response.
    ///
    /// We never retry this.
    #[instrument(level = "trace", skip(self, body), fields(url = %url, len = body.len()))]
    pub(crate) async fn post_bytes<Output>(
        &self,
        url: &Url,
        content_type: &Mime,
        body: Bytes,
    ) -> Result<Output, ClientError>
    where
        Output: fmt::Debug + DeserializeOwned,
    {
        trace!("POST {} with {} bytes", url, body.len());
        let content_type = HeaderValue::from_str(content_type.as_ref())
            .context("invalid content type")?;
        let mut req = self
            .client
            .post(url.as_str())
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = self.authenticator.token(SCOPES).await? {
            req = req.bearer_auth(token.as_str());
        }
        let http_resp = req
            .send()
            .await
            .with_context(|| format!("could not POST {}", url))?;
        if http_resp.status().is_success() {
            let resp = http_resp.json::<Output>().await.with_context(|| {
                format!("error fetching JSON response from {}", url)
            })?;
            trace!("POST returned {:?}", resp);
            Ok(resp)
        } else {
            Err(handle_error("POST", url, http_resp).await)
        }
    }
}

/// Turn an HTTP error response into a `ClientError`.
async fn handle_error(
    method: &str,
    url: &Url,
    http_resp: reqwest::Response,
) -> ClientError {
    if http_resp.status() == StatusCode::NOT_FOUND {
        return ClientError::NotFound {
            method: method.to_owned(),
            url: url.to_owned(),
        };
    }

    // Check this before we consume `http_resp`.
    let should_parse_as_json = response_claims_to_be_json(&http_resp);
    let status = http_resp.status();
    let err_body = match http_resp.bytes().await {
        Ok(err_body) => err_body,
        Err(err) => {
            return Error::new(err)
                .context(format!("error fetching error response from {}", url))
                .into()
        }
    };

    if should_parse_as_json {
        if let Ok(resp) = serde_json::from_slice::<ErrorResponse>(&err_body) {
            trace!("{} error {:?}", method, resp);
            return Error::new(resp.error)
                .context(format!("{} error {}", method, url))
                .into();
        }
    }

    let raw_err = String::from_utf8_lossy(&err_body);
    format_err!("{} returned {}: {:?}", url, status, raw_err)
        .context(format!("{} error {}", method, url))
        .into()
}

/// A Google Cloud error response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: GCloudError,
}

/// Information about a Google Cloud error.
#[derive(Debug, Deserialize)]
pub(crate) struct GCloudError {
    pub(crate) code: i32,
    pub(crate) message: String,
}

impl fmt::Display for GCloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Google Cloud error: {} {}", self.code, self.message)
    }
}

impl error::Error for GCloudError {}

/// Percent-encode a string for use as a URL path component.
pub(crate) fn percent_encode(s: &str) -> impl fmt::Display + '_ {
    utf8_percent_encode(s, PATH_COMPONENT)
}

/// Returns `true` if `http_resp` claims to be a JSON response.
fn response_claims_to_be_json(http_resp: &reqwest::Response) -> bool {
    http_resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Mime>().ok())
        .map(|mime| mime.type_() == mime::APPLICATION && mime.subtype() == mime::JSON)
        .unwrap_or(false)
}

#[test]
fn percent_encode_escapes_slashes_but_not_unreserved() {
    assert_eq!(
        percent_encode("daily/addresses_2021-10-22.csv").to_string(),
        "daily%2Faddresses_2021-10-22.csv"
    );
    assert_eq!(percent_encode("a b~c").to_string(), "a%20b~c");
}

#[test]
fn urls_are_built_relative_to_the_endpoint() {
    #[derive(Debug, serde_derive::Serialize)]
    struct Query {
        alt: &'static str,
    }

    let client = Client::new(
        "http://localhost:4443/".parse().unwrap(),
        Authenticator::Anonymous,
        None,
    )
    .unwrap();
    let url = client
        .url("storage/v1/b/bucket/o/file.csv", Query { alt: "media" })
        .unwrap();
    assert_eq!(
        url.as_str(),
        "http://localhost:4443/storage/v1/b/bucket/o/file.csv?alt=media"
    );
}
