//! Error types for compass-client.
//!
//! Every failure carries an explicit [`ErrorKind`] so the retry loop branches
//! on data, not on error-type downcasting.

use std::fmt;

use compass_wire::{EnvelopeError, deserialize};

// ─── Protocol status codes ───────────────────────────────────────────────────

/// Protocol status codes carried by response envelopes.
pub mod status {
    /// Success.
    pub const OK: i32 = 1;
    /// Success (alternate value used by some server revisions).
    pub const OK_ALT: i32 = 2;
    /// The request was rejected as invalid. Never retried.
    pub const INVALID_REQUEST: i32 = 3;
    /// Server-side throttling: pause and resend the identical envelope.
    pub const SERVER_BUSY: i32 = 52;
    /// Endpoint redirect: adopt the advertised URL and resubmit.
    pub const REDIRECT: i32 = 53;
    /// The auth ticket has expired or was invalidated.
    pub const AUTH_EXPIRED: i32 = 102;
}

// ─── ErrorKind ───────────────────────────────────────────────────────────────

/// How the retry loop should react to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Propagate immediately; retrying cannot help.
    Fatal,
    /// Worth another attempt if the retry budget allows.
    Transient,
}

// ─── TransportError ──────────────────────────────────────────────────────────

/// Network-level failure from the HTTP transport. Always transient.
#[derive(Debug)]
pub enum TransportError {
    /// Connection-level failure (DNS, refused, reset, TLS…).
    Network(String),
    /// The configured per-request timeout expired.
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Timeout    => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

// ─── AuthError ───────────────────────────────────────────────────────────────

/// Failure from an identity provider.
#[derive(Debug)]
pub enum AuthError {
    /// The provider rejected the credentials.
    Rejected(String),
    /// The provider could not be reached.
    Network(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(m) => write!(f, "authentication rejected: {m}"),
            Self::Network(m)  => write!(f, "auth provider unreachable: {m}"),
        }
    }
}

impl std::error::Error for AuthError {}

// ─── SignatureError ──────────────────────────────────────────────────────────

/// Failure from the signature provider.
#[derive(Debug)]
pub enum SignatureError {
    /// The provider (typically a remote hashing service) is rate limiting us.
    RateLimited,
    /// The provider could not produce a signature.
    Failed(String),
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "signature provider rate limited"),
            Self::Failed(m)   => write!(f, "signing failed: {m}"),
        }
    }
}

impl std::error::Error for SignatureError {}

// ─── InvocationError ─────────────────────────────────────────────────────────

/// The error type returned from any `Client` method that talks to the backend.
#[derive(Debug)]
pub enum InvocationError {
    /// The server answered with a non-recoverable protocol status code.
    Status { code: i32 },
    /// HTTP-level rejection (status outside 200).
    Http { code: u16 },
    /// Network / transport failure.
    Transport(TransportError),
    /// Envelope build or decode failure.
    Envelope(EnvelopeError),
    /// An individual response payload failed to decode.
    Decode(String),
    /// Identity-provider failure during login or auto-relogin.
    Auth(AuthError),
    /// Signature provider failure.
    Signature(SignatureError),
    /// The retry budget was exhausted; `last` is the final underlying cause.
    AttemptsExhausted { tries: u32, last: Box<InvocationError> },
    /// The caller-supplied deadline for the whole call expired.
    DeadlineExceeded,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { code }  => write!(f, "protocol status {code}"),
            Self::Http { code }    => write!(f, "HTTP {code}"),
            Self::Transport(e)     => write!(f, "{e}"),
            Self::Envelope(e)      => write!(f, "{e}"),
            Self::Decode(m)        => write!(f, "decode error: {m}"),
            Self::Auth(e)          => write!(f, "{e}"),
            Self::Signature(e)     => write!(f, "{e}"),
            Self::AttemptsExhausted { tries, last } => {
                write!(f, "giving up after {tries} attempts: {last}")
            }
            Self::DeadlineExceeded => write!(f, "call deadline exceeded"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<TransportError> for InvocationError {
    fn from(e: TransportError) -> Self { Self::Transport(e) }
}

impl From<EnvelopeError> for InvocationError {
    fn from(e: EnvelopeError) -> Self { Self::Envelope(e) }
}

impl From<deserialize::Error> for InvocationError {
    fn from(e: deserialize::Error) -> Self { Self::Decode(e.to_string()) }
}

impl From<AuthError> for InvocationError {
    fn from(e: AuthError) -> Self { Self::Auth(e) }
}

impl From<SignatureError> for InvocationError {
    fn from(e: SignatureError) -> Self { Self::Signature(e) }
}

impl InvocationError {
    /// Classify this error for the retry loop.
    ///
    /// Unrecognized protocol status codes are transient: server revisions
    /// introduce codes faster than clients learn them, and a retry is cheap.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Status { code } => match *code {
                status::INVALID_REQUEST | status::AUTH_EXPIRED => ErrorKind::Fatal,
                _ => ErrorKind::Transient,
            },
            Self::Http { code } => match *code {
                400..=499 => ErrorKind::Fatal,
                _ => ErrorKind::Transient,
            },
            Self::Transport(_) => ErrorKind::Transient,
            Self::Envelope(_) | Self::Decode(_) => ErrorKind::Fatal,
            Self::Auth(AuthError::Network(_)) => ErrorKind::Transient,
            Self::Auth(AuthError::Rejected(_)) => ErrorKind::Fatal,
            Self::Signature(SignatureError::RateLimited) => ErrorKind::Transient,
            Self::Signature(SignatureError::Failed(_)) => ErrorKind::Fatal,
            Self::AttemptsExhausted { .. } | Self::DeadlineExceeded => ErrorKind::Fatal,
        }
    }

    /// Shorthand for `kind() == ErrorKind::Transient`.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// The protocol status code that caused this error, if any.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Status { code } => Some(*code),
            Self::AttemptsExhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }
}
