//! External collaborators: signature provider and identity providers.
//!
//! Both are dyn-safe traits held as `Arc<dyn …>` in the client config, so a
//! deployment can swap the built-in HMAC signer for a remote hashing service,
//! or a test can observe every call.

use compass_wire::{GeoPosition, Serializable};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::{AuthError, SignatureError};
use crate::transport::{BoxFuture, Transport};

// ─── SignatureProvider ───────────────────────────────────────────────────────

/// Produces the opaque encrypted signature blob attached to signed envelopes.
///
/// Signing covers the plaintext sub-request payloads, the current position
/// and the auth ticket. A provider backed by a remote service reports
/// [`SignatureError::RateLimited`] when the service pushes back; the
/// dispatcher retries that case with its own inner backoff.
pub trait SignatureProvider: Send + Sync {
    fn sign<'a>(
        &'a self,
        payloads: &'a [Vec<u8>],
        position: Option<&'a GeoPosition>,
        ticket:   &'a [u8],
    ) -> BoxFuture<'a, Result<Vec<u8>, SignatureError>>;
}

// ─── HmacSigner ──────────────────────────────────────────────────────────────

/// Built-in in-process signer: HMAC-SHA256 over payloads + position + ticket.
///
/// The backend treats the blob as opaque, so any keyed MAC with a stable
/// input layout satisfies the envelope contract.
pub struct HmacSigner {
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

type HmacSha256 = Hmac<Sha256>;

impl SignatureProvider for HmacSigner {
    fn sign<'a>(
        &'a self,
        payloads: &'a [Vec<u8>],
        position: Option<&'a GeoPosition>,
        ticket:   &'a [u8],
    ) -> BoxFuture<'a, Result<Vec<u8>, SignatureError>> {
        Box::pin(async move {
            let mut mac = HmacSha256::new_from_slice(&self.key)
                .map_err(|e| SignatureError::Failed(e.to_string()))?;
            mac.update(ticket);
            if let Some(pos) = position {
                mac.update(&pos.latitude.to_le_bytes());
                mac.update(&pos.longitude.to_le_bytes());
                mac.update(&pos.altitude.to_le_bytes());
            }
            for payload in payloads {
                mac.update(&(payload.len() as u32).to_le_bytes());
                mac.update(payload);
            }
            Ok(mac.finalize().into_bytes().to_vec())
        })
    }
}

// ─── RemoteHashSigner ────────────────────────────────────────────────────────

/// Signature provider that round-trips through a remote hashing service.
///
/// The service accepts the same inputs serialized as a single binary body and
/// answers with a base64 blob. HTTP 429 maps to
/// [`SignatureError::RateLimited`].
pub struct RemoteHashSigner {
    transport: std::sync::Arc<dyn Transport>,
    endpoint:  String,
}

impl RemoteHashSigner {
    pub fn new(transport: std::sync::Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self { transport, endpoint: endpoint.into() }
    }
}

impl SignatureProvider for RemoteHashSigner {
    fn sign<'a>(
        &'a self,
        payloads: &'a [Vec<u8>],
        position: Option<&'a GeoPosition>,
        ticket:   &'a [u8],
    ) -> BoxFuture<'a, Result<Vec<u8>, SignatureError>> {
        Box::pin(async move {
            let mut body = Vec::new();
            ticket.serialize(&mut body);
            position.copied().serialize(&mut body);
            payloads.to_vec().serialize(&mut body);

            let response = self
                .transport
                .post(&self.endpoint, body)
                .await
                .map_err(|e| SignatureError::Failed(e.to_string()))?;

            match response.status {
                200 => {
                    use base64::Engine as _;
                    base64::engine::general_purpose::STANDARD
                        .decode(&response.body)
                        .map_err(|e| SignatureError::Failed(format!("bad blob encoding: {e}")))
                }
                429 => Err(SignatureError::RateLimited),
                s => Err(SignatureError::Failed(format!("hashing service returned HTTP {s}"))),
            }
        })
    }
}

// ─── AuthProvider ────────────────────────────────────────────────────────────

/// Exchanges username/password for an opaque bearer token.
///
/// Multiple independent identity providers exist; all present this interface.
/// `name()` is the provider identifier stamped into the envelope's auth
/// fields alongside the token.
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &str;

    fn authenticate<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<String, AuthError>>;
}

/// Provider that hands back a fixed token. For tests and offline demos.
pub struct StaticTokenProvider {
    name:  String,
    token: String,
}

impl StaticTokenProvider {
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self { name: name.into(), token: token.into() }
    }
}

impl AuthProvider for StaticTokenProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate<'a>(
        &'a self,
        _username: &'a str,
        _password: &'a str,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}
