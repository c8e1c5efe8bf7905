//! Per-connection mutable session state.
//!
//! One [`Session`] lives behind one mutex inside the client; every dispatcher
//! entry point serializes on it, so redirect and re-auth can never race.

use std::collections::HashMap;
use std::time::Duration;

use compass_wire::{AuthCredential, GeoPosition};
use tokio::time::Instant;

/// Username/password pair retained for automatic re-login on ticket expiry.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the password.
        write!(f, "Credentials {{ username: {:?} }}", self.username)
    }
}

/// Identity-provider bearer token, used until the server issues a ticket.
#[derive(Clone, Debug)]
pub struct BearerToken {
    pub provider: String,
    pub token:    String,
}

/// Mutable state for one logical connection. Not persisted.
pub struct Session {
    /// Current RPC URL. Starts at the bootstrap endpoint; a redirect response
    /// replaces it for all subsequent calls.
    pub endpoint:       String,
    /// Provider token obtained at login.
    pub auth_token:     Option<BearerToken>,
    /// Server-issued ticket; supersedes the token once present.
    pub auth_ticket:    Option<Vec<u8>>,
    /// Credentials retained for auto-relogin, if the caller opted in.
    pub credentials:    Option<Credentials>,
    /// Player position, read by the codec on every envelope build.
    pub position:       Option<GeoPosition>,
    /// Hash returned by the last settings fetch.
    pub settings_hash:  Option<String>,
    /// Minimum spacing between calls of a throttled opcode. Server-adjustable.
    pub min_call_delay: Duration,
    /// Completion time of the last successful call, per throttled opcode.
    pub last_throttled: HashMap<u32, Instant>,
}

impl Session {
    pub fn new(endpoint: String, min_call_delay: Duration) -> Self {
        Self {
            endpoint,
            auth_token:     None,
            auth_ticket:    None,
            credentials:    None,
            position:       None,
            settings_hash:  None,
            min_call_delay,
            last_throttled: HashMap::new(),
        }
    }

    /// The credential to stamp on the next envelope: ticket first, then token.
    pub fn credential(&self) -> Option<AuthCredential> {
        if let Some(ticket) = &self.auth_ticket {
            return Some(AuthCredential::Ticket(ticket.clone()));
        }
        self.auth_token.as_ref().map(|t| AuthCredential::Token {
            provider: t.provider.clone(),
            token:    t.token.clone(),
        })
    }

    /// Earliest instant at which a call of `opcode` may be transmitted.
    pub fn throttle_deadline(&self, opcode: u32) -> Option<Instant> {
        self.last_throttled
            .get(&opcode)
            .map(|last| *last + self.min_call_delay)
    }

    /// Record a successful call of a throttled opcode.
    pub fn note_throttled(&mut self, opcode: u32) {
        self.last_throttled.insert(opcode, Instant::now());
    }
}
