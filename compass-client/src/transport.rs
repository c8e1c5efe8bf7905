//! HTTP transport seam.
//!
//! The dispatcher only ever needs "POST these bytes, give me status + body",
//! so that is the whole trait. Tests substitute a scripted transport; real
//! callers get [`HttpTransport`] on reqwest.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::TransportError;

/// Boxed future used by the dyn-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status and body of one HTTP exchange.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body:   Vec<u8>,
}

/// One binary POST per RPC attempt. No streaming, no other verbs.
pub trait Transport: Send + Sync {
    fn post<'a>(
        &'a self,
        url:  &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;
}

// ─── HttpTransport ───────────────────────────────────────────────────────────

/// Production transport: reqwest with the protocol's fixed headers.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given User-Agent, per-request timeout and
    /// optional proxy URL.
    pub fn new(
        user_agent: &str,
        timeout:    Duration,
        proxy:      Option<&str>,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout);
        if let Some(addr) = proxy {
            let proxy = reqwest::Proxy::all(addr)
                .map_err(|e| TransportError::Network(format!("invalid proxy {addr}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn post<'a>(
        &'a self,
        url:  &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let response = self
                .http
                .post(url)
                .header("Accept", "*/*")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body)
                .send()
                .await
                .map_err(classify_reqwest)?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(classify_reqwest)?
                .to_vec();
            Ok(HttpResponse { status, body })
        })
    }
}

fn classify_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}
