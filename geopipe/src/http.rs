//! Outbound HTTP requests whose response bodies we want to keep.

use reqwest::{
    multipart::{Form, Part},
    Method, StatusCode,
};
use std::{fmt, str::FromStr, time::Duration};

use crate::common::*;
use crate::tls::install_crypto_provider;

/// How much of an error body to include in error messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// The HTTP methods we know how to send.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchMethod {
    Get,
    Post,
}

impl FetchMethod {
    fn to_reqwest(self) -> Method {
        match self {
            FetchMethod::Get => Method::GET,
            FetchMethod::Post => Method::POST,
        }
    }
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMethod::Get => "GET".fmt(f),
            FetchMethod::Post => "POST".fmt(f),
        }
    }
}

impl FromStr for FetchMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(FetchMethod::Get),
            "post" => Ok(FetchMethod::Post),
            _ => Err(format_err!("unsupported HTTP method {:?}", s)),
        }
    }
}

/// A file attached to a `multipart/form-data` request.
#[derive(Clone, Debug)]
pub struct FileField {
    /// The form field name, for example `addressFile`.
    pub field: String,
    /// The file name reported to the server.
    pub filename: String,
    /// The file contents.
    pub data: Bytes,
}

/// A request to fetch, described independently of any HTTP client.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    method: FetchMethod,
    url: Url,
    form: Vec<(String, String)>,
    files: Vec<FileField>,
}

impl FetchRequest {
    /// Create a request with no form data and no attachments.
    ///
    /// `url` must be an absolute `http` or `https` URL.
    pub fn new(method: FetchMethod, url: Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(format_err!(
                    "cannot fetch {}: unsupported URL scheme {:?}",
                    url,
                    other
                ))
            }
        }
        Ok(FetchRequest {
            method,
            url,
            form: vec![],
            files: vec![],
        })
    }

    /// A `GET` request.
    pub fn get(url: Url) -> Result<Self> {
        Self::new(FetchMethod::Get, url)
    }

    /// A `POST` request.
    pub fn post(url: Url) -> Result<Self> {
        Self::new(FetchMethod::Post, url)
    }

    /// Add a form field.
    pub fn form_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form.push((key.into(), value.into()));
        self
    }

    /// Attach a file. Any request with attachments is sent as
    /// `multipart/form-data`.
    pub fn file<F, N>(mut self, field: F, filename: N, data: Bytes) -> Self
    where
        F: Into<String>,
        N: Into<String>,
    {
        self.files.push(FileField {
            field: field.into(),
            filename: filename.into(),
            data,
        });
        self
    }

    /// Our method.
    pub fn method(&self) -> FetchMethod {
        self.method
    }

    /// Our URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Build the multipart form for our fields and attachments.
    fn multipart_form(&self) -> Form {
        let mut form = Form::new();
        for (key, value) in &self.form {
            form = form.text(key.clone(), value.clone());
        }
        for file in &self.files {
            let part = Part::bytes(file.data.to_vec()).file_name(file.filename.clone());
            form = form.part(file.field.clone(), part);
        }
        form
    }
}

/// What to do with a response whose status is not 2xx.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StatusPolicy {
    /// Treat non-2xx statuses as errors.
    #[default]
    RequireSuccess,
    /// Keep the body of any response, whatever its status. This matches how
    /// the pipeline behaved before statuses were checked, and may store
    /// error pages as if they were data.
    StoreAnyResponse,
}

/// A response body, plus the status it arrived with.
#[derive(Clone, Debug)]
pub struct FetchedBody {
    pub status: StatusCode,
    pub body: Bytes,
}

/// A thin wrapper around `reqwest::Client` which applies our
/// [`StatusPolicy`].
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    status_policy: StatusPolicy,
}

impl Fetcher {
    /// Create a new fetcher. `timeout` applies to each whole request; `None`
    /// leaves the client library's default.
    pub fn new(status_policy: StatusPolicy, timeout: Option<Duration>) -> Result<Self> {
        install_crypto_provider();
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("geopipe/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("could not build HTTP client")?;
        Ok(Fetcher {
            client,
            status_policy,
        })
    }

    /// Perform `request` and buffer the entire response body.
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchedBody> {
        info!("requesting {} {}", request.method, request.url);
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url.clone());
        if !request.files.is_empty() {
            builder = builder.multipart(request.multipart_form());
        } else if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("could not {} {}", request.method, request.url))?;
        let status = response.status();
        let body = response.bytes().await.with_context(|| {
            format!(
                "error reading response body from {} {}",
                request.method, request.url
            )
        })?;
        debug!("{} returned {} with {} bytes", request.url, status, body.len());
        metrics::counter!("geopipe.http.bytes_fetched").increment(body.len() as u64);

        if !status.is_success() {
            match self.status_policy {
                StatusPolicy::RequireSuccess => {
                    return Err(format_err!(
                        "{} {} failed with {}: {}",
                        request.method,
                        request.url,
                        status,
                        truncated_body(&body),
                    ));
                }
                StatusPolicy::StoreAnyResponse => {
                    warn!(
                        "{} {} returned {}, keeping the response body anyway",
                        request.method, request.url, status,
                    );
                }
            }
        }
        Ok(FetchedBody { status, body })
    }
}

/// A printable prefix of an error body.
fn truncated_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out = text.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    if text.chars().count() > MAX_ERROR_BODY_CHARS {
        out.push_str("...");
    }
    out
}

#[test]
fn methods_parse_case_insensitively() {
    assert_eq!("get".parse::<FetchMethod>().unwrap(), FetchMethod::Get);
    assert_eq!("POST".parse::<FetchMethod>().unwrap(), FetchMethod::Post);
    assert!("delete".parse::<FetchMethod>().is_err());
}

#[test]
fn requests_need_http_urls() {
    let url = "ftp://example.com/addresses.csv".parse::<Url>().unwrap();
    assert!(FetchRequest::get(url).is_err());
    let url = "https://example.com/addresses.csv".parse::<Url>().unwrap();
    assert_eq!(FetchRequest::get(url).unwrap().method(), FetchMethod::Get);
}

#[test]
fn long_error_bodies_are_truncated() {
    let body = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
    let truncated = truncated_body(body.as_bytes());
    assert_eq!(truncated.len(), MAX_ERROR_BODY_CHARS + 3);
    assert!(truncated.ends_with("..."));
    assert_eq!(truncated_body(b"short"), "short");
}
