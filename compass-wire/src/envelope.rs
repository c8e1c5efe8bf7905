//! Request/response envelope structures and their codec.
//!
//! One envelope wraps one HTTP round trip: an ordered list of sub-requests
//! plus the session metadata the backend requires (auth credential, player
//! position, signature). Responses mirror the shape with an ordered list of
//! raw payloads plus session metadata pushed back by the server (new endpoint,
//! refreshed auth ticket).

use std::fmt;

use crate::deserialize::{self, Buffer, Cursor, Deserializable};
use crate::serialize::Serializable;

// ─── Envelope tags / constants ───────────────────────────────────────────────

const TAG_REQUEST:  u32 = 0x4350_5251; // "CPRQ"
const TAG_RESPONSE: u32 = 0x4350_5253; // "CPRS"

/// Status code stamped on every outbound envelope ("normal request").
pub const ENVELOPE_STATUS_REQUEST: i32 = 2;

/// Reserved platform opcode carrying the encrypted signature blob.
pub const OP_ATTACHED_SIGNATURE: u32 = 6;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors produced by the envelope codec.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvelopeError {
    /// Neither an auth ticket nor a provider/token pair was available.
    AuthMissing,
    /// The bytes could not be parsed as an envelope at all.
    Malformed(deserialize::Error),
    /// The response payload count doesn't match the requests that expected one.
    CountMismatch { expected: usize, actual: usize },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthMissing => write!(f, "no auth credential available to build an envelope"),
            Self::Malformed(e) => write!(f, "malformed envelope: {e}"),
            Self::CountMismatch { expected, actual } => {
                write!(f, "response count mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<deserialize::Error> for EnvelopeError {
    fn from(e: deserialize::Error) -> Self { Self::Malformed(e) }
}

// ─── GeoPosition ─────────────────────────────────────────────────────────────

/// Player position attached to envelopes and signatures.
///
/// `(0.0, 0.0)` is a real coordinate; "no position" is expressed by the
/// envelope's presence flag, never by zeroed fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPosition {
    pub latitude:  f64,
    pub longitude: f64,
    pub accuracy:  f64,
    pub altitude:  f64,
}

impl GeoPosition {
    /// Position with default accuracy/altitude.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, accuracy: 0.0, altitude: 0.0 }
    }
}

impl Serializable for GeoPosition {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.latitude.serialize(buf);
        self.longitude.serialize(buf);
        self.accuracy.serialize(buf);
        self.altitude.serialize(buf);
    }
}

impl Deserializable for GeoPosition {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            latitude:  f64::deserialize(buf)?,
            longitude: f64::deserialize(buf)?,
            accuracy:  f64::deserialize(buf)?,
            altitude:  f64::deserialize(buf)?,
        })
    }
}

// ─── AuthCredential ──────────────────────────────────────────────────────────

/// The auth fields of an outbound envelope.
///
/// A server-issued ticket supersedes the provider/token pair once obtained;
/// the two are mutually exclusive on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthCredential {
    /// Opaque server-issued credential bytes.
    Ticket(Vec<u8>),
    /// Identity-provider bearer token, sent until the server issues a ticket.
    Token { provider: String, token: String },
}

const AUTH_TAG_TICKET: u8 = 1;
const AUTH_TAG_TOKEN:  u8 = 2;

impl Serializable for AuthCredential {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        match self {
            Self::Ticket(bytes) => {
                buf.extend([AUTH_TAG_TICKET]);
                bytes.serialize(buf);
            }
            Self::Token { provider, token } => {
                buf.extend([AUTH_TAG_TOKEN]);
                provider.serialize(buf);
                token.serialize(buf);
            }
        }
    }
}

impl Deserializable for AuthCredential {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        match buf.read_byte()? {
            AUTH_TAG_TICKET => Ok(Self::Ticket(Vec::<u8>::deserialize(buf)?)),
            AUTH_TAG_TOKEN => Ok(Self::Token {
                provider: String::deserialize(buf)?,
                token:    String::deserialize(buf)?,
            }),
            tag => Err(deserialize::Error::UnexpectedTag { tag: tag as u32 }),
        }
    }
}

// ─── WireRequest ─────────────────────────────────────────────────────────────

/// One multiplexed sub-request: opcode plus optional pre-encoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRequest {
    pub opcode:  u32,
    pub payload: Option<Vec<u8>>,
}

impl Serializable for WireRequest {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.opcode.serialize(buf);
        self.payload.serialize(buf);
    }
}

impl Deserializable for WireRequest {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            opcode:  u32::deserialize(buf)?,
            payload: Option::<Vec<u8>>::deserialize(buf)?,
        })
    }
}

// ─── RequestEnvelope ─────────────────────────────────────────────────────────

/// Outbound envelope: one per HTTP round trip.
///
/// Built fresh per call; on an endpoint redirect the same envelope is
/// resubmitted with the platform list cleared and the signature recomputed.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestEnvelope {
    pub status_code: i32,
    pub request_id:  u64,
    pub position:    Option<GeoPosition>,
    pub auth:        AuthCredential,
    pub requests:    Vec<WireRequest>,
    pub platform:    Vec<WireRequest>,
}

impl RequestEnvelope {
    /// Build an envelope from session state and an ordered request list.
    ///
    /// Fails with [`EnvelopeError::AuthMissing`] when the session has neither
    /// a ticket nor a provider/token pair. Position fields are populated only
    /// when the caller has set a location.
    pub fn build(
        auth:     Option<AuthCredential>,
        position: Option<GeoPosition>,
        requests: Vec<WireRequest>,
    ) -> Result<Self, EnvelopeError> {
        let auth = auth.ok_or(EnvelopeError::AuthMissing)?;
        Ok(Self {
            status_code: ENVELOPE_STATUS_REQUEST,
            request_id:  random_request_id(),
            position,
            auth,
            requests,
            platform: Vec::new(),
        })
    }

    /// Append the encrypted signature blob as a platform sub-request.
    pub fn attach_signature(&mut self, blob: Vec<u8>) {
        self.platform.push(WireRequest {
            opcode:  OP_ATTACHED_SIGNATURE,
            payload: Some(blob),
        });
    }

    /// Drop all platform sub-requests (signature included).
    pub fn clear_platform(&mut self) {
        self.platform.clear();
    }

    /// The attached signature blob, if one is present.
    pub fn signature(&self) -> Option<&[u8]> {
        self.platform
            .iter()
            .find(|r| r.opcode == OP_ATTACHED_SIGNATURE)
            .and_then(|r| r.payload.as_deref())
    }
}

impl Serializable for RequestEnvelope {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        TAG_REQUEST.serialize(buf);
        self.status_code.serialize(buf);
        self.request_id.serialize(buf);
        self.position.serialize(buf);
        self.auth.serialize(buf);
        self.requests.serialize(buf);
        self.platform.serialize(buf);
    }
}

impl Deserializable for RequestEnvelope {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        let tag = u32::deserialize(buf)?;
        if tag != TAG_REQUEST {
            return Err(deserialize::Error::UnexpectedTag { tag });
        }
        Ok(Self {
            status_code: i32::deserialize(buf)?,
            request_id:  u64::deserialize(buf)?,
            position:    Option::<GeoPosition>::deserialize(buf)?,
            auth:        AuthCredential::deserialize(buf)?,
            requests:    Vec::<WireRequest>::deserialize(buf)?,
            platform:    Vec::<WireRequest>::deserialize(buf)?,
        })
    }
}

// ─── ResponseEnvelope ────────────────────────────────────────────────────────

/// Inbound envelope: status code, session metadata, ordered raw payloads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseEnvelope {
    pub status_code: i32,
    pub request_id:  u64,
    /// New RPC endpoint advertised by the server (redirect).
    pub api_url:     Option<String>,
    /// Refreshed auth ticket, captured regardless of status code.
    pub auth_ticket: Option<Vec<u8>>,
    /// Raw response payloads, one per sub-request that produces output.
    pub returns:     Vec<Vec<u8>>,
}

impl ResponseEnvelope {
    /// Decode a response envelope from raw bytes.
    ///
    /// Fails with [`EnvelopeError::Malformed`] when the header cannot be
    /// parsed. A truncated `returns` list yields the payloads that did parse —
    /// a partial result is preferred over total failure.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut cur = Cursor::from_slice(bytes);
        Ok(Self::deserialize(&mut cur)?)
    }

    /// Validate the payload count against the number of sub-requests that
    /// declared a decoder, then hand back the payloads for pairing.
    pub fn pair(&self, expected: usize) -> Result<&[Vec<u8>], EnvelopeError> {
        if self.returns.len() != expected {
            return Err(EnvelopeError::CountMismatch {
                expected,
                actual: self.returns.len(),
            });
        }
        Ok(&self.returns)
    }
}

impl Serializable for ResponseEnvelope {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        TAG_RESPONSE.serialize(buf);
        self.status_code.serialize(buf);
        self.request_id.serialize(buf);
        self.api_url.serialize(buf);
        self.auth_ticket.serialize(buf);
        self.returns.serialize(buf);
    }
}

impl Deserializable for ResponseEnvelope {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        let tag = u32::deserialize(buf)?;
        if tag != TAG_RESPONSE {
            return Err(deserialize::Error::UnexpectedTag { tag });
        }
        let status_code = i32::deserialize(buf)?;
        let request_id  = u64::deserialize(buf)?;
        let api_url     = Option::<String>::deserialize(buf)?;
        let auth_ticket = Option::<Vec<u8>>::deserialize(buf)?;

        let count = u32::deserialize(buf)? as usize;
        let mut returns = Vec::with_capacity(count.min(64));
        for i in 0..count {
            match Vec::<u8>::deserialize(buf) {
                Ok(payload) => returns.push(payload),
                Err(deserialize::Error::UnexpectedEof) => {
                    log::warn!("response truncated after {i} of {count} payloads, keeping prefix");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Self { status_code, request_id, api_url, auth_ticket, returns })
    }
}

// ─── Request IDs ─────────────────────────────────────────────────────────────

/// Fresh 64-bit request ID; collision within one session is what matters,
/// not unpredictability.
fn random_request_id() -> u64 {
    let mut b = [0u8; 8];
    getrandom::getrandom(&mut b).expect("getrandom");
    u64::from_le_bytes(b)
}
