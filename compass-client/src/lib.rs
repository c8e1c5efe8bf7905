//! # compass-client
//!
//! Async client for the compass binary RPC protocol.
//!
//! ## Features
//! - Multiplexed request batches (one envelope, one HTTP POST per round trip)
//! - Fluent [`Batch`] builder with per-operation chain methods
//! - Two-phase session bootstrap: first envelope unsigned, redirect handled
//!   transparently, auth ticket captured and reused thereafter
//! - Endpoint redirects (status 53) and server-busy cooldowns (status 52)
//!   resolved without consuming the retry budget
//! - Auto-relogin on ticket expiry (status 102) when credentials are retained
//! - Exponential-backoff retries over transient failures with a pluggable
//!   [`RetryPolicy`]
//! - Client-side throttling of map-object fetches, floor negotiated from
//!   server settings at [`Client::init`]
//! - Pluggable [`Transport`], [`SignatureProvider`] and [`AuthProvider`]
//!   collaborators
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # async fn f() -> Result<(), Box<dyn std::error::Error>> {
//! use compass_client::{Client, Config};
//! use compass_wire::GeoPosition;
//!
//! let client = Client::new(Config::default())?;
//! client.login("trainer", "hunter2").await?;
//! client.set_position(GeoPosition::new(48.2082, 16.3738)).await;
//! client.init().await?;
//!
//! let map = client.get_map_objects(&[0x5ab1, 0x5ab2], 48.2082, 16.3738).await?;
//! println!("{} cells", map.cells.len());
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod batch;
pub mod catalog;
mod errors;
pub mod messages;
mod providers;
mod retry;
mod session;
mod transport;

pub use batch::Batch;
pub use catalog::{LogicalRequest, Opcode, ResponseDecoder, ResponseMessage};
pub use errors::{
    AuthError, ErrorKind, InvocationError, SignatureError, TransportError, status,
};
pub use providers::{
    AuthProvider, HmacSigner, RemoteHashSigner, SignatureProvider, StaticTokenProvider,
};
pub use retry::{Backoff, NoRetries, RetryContext, RetryPolicy};
pub use session::{BearerToken, Credentials, Session};
pub use transport::{BoxFuture, HttpResponse, HttpTransport, Transport};

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use compass_wire::{GeoPosition, RequestEnvelope, ResponseEnvelope, Serializable, WireRequest};
use messages::{BeaconDetails, Inventory, MapObjects, PlayerData, Settings};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, sleep_until, timeout};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Configuration for [`Client::new`].
#[derive(Clone)]
pub struct Config {
    /// Bootstrap RPC URL; replaced at runtime when the server redirects.
    pub endpoint:           String,
    pub user_agent:         String,
    /// Optional proxy URL — every request is tunnelled through it.
    pub proxy:              Option<String>,
    /// Per-request HTTP timeout. Expiry is a transient, retryable failure.
    pub http_timeout:       Duration,
    /// Overall deadline for one `call`, covering redirects, cooldowns and
    /// retries. `None` means unbounded.
    pub call_deadline:      Option<Duration>,
    pub retry_policy:       Arc<dyn RetryPolicy>,
    pub signer:             Arc<dyn SignatureProvider>,
    pub auth_provider:      Arc<dyn AuthProvider>,
    /// Substitute transport; `None` builds an [`HttpTransport`] from the
    /// fields above.
    pub transport:          Option<Arc<dyn Transport>>,
    /// Opcodes subject to client-side throttling.
    pub throttled_opcodes:  Vec<Opcode>,
    pub throttling_enabled: bool,
    /// Initial minimum spacing between throttled calls; the server may raise
    /// it during [`Client::init`].
    pub min_call_delay:     Duration,
    /// Cooldown before resubmitting after a server-busy (52) response.
    pub busy_cooldown:      Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint:           "https://rpc.compass-game.example/plfe/rpc".to_string(),
            user_agent:         concat!("compass-client/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy:              None,
            http_timeout:       Duration::from_secs(15),
            call_deadline:      None,
            retry_policy:       Arc::new(Backoff::default()),
            signer:             Arc::new(HmacSigner::new(&b"compass-envelope-mac"[..])),
            auth_provider:      Arc::new(StaticTokenProvider::new("portal", "anonymous")),
            transport:          None,
            throttled_opcodes:  vec![Opcode::GetMapObjects],
            throttling_enabled: true,
            min_call_delay:     Duration::from_secs(5),
            busy_cooldown:      Duration::from_secs(2),
        }
    }
}

// ─── CallOutcome ─────────────────────────────────────────────────────────────

/// The resolved value of one dispatched call.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome {
    /// No request in the batch expected a response.
    NoContent,
    /// Exactly one request expected a response.
    Single(ResponseMessage),
    /// More than one request expected a response; order matches the batch.
    Many(Vec<ResponseMessage>),
}

impl CallOutcome {
    /// Flatten into a list, empty for [`CallOutcome::NoContent`].
    pub fn into_messages(self) -> Vec<ResponseMessage> {
        match self {
            Self::NoContent  => Vec::new(),
            Self::Single(m)  => vec![m],
            Self::Many(msgs) => msgs,
        }
    }
}

// ─── ClientInner ─────────────────────────────────────────────────────────────

struct ClientInner {
    session:            Mutex<Session>,
    transport:          Arc<dyn Transport>,
    signer:             Arc<dyn SignatureProvider>,
    auth_provider:      Arc<dyn AuthProvider>,
    retry_policy:       Arc<dyn RetryPolicy>,
    throttled_opcodes:  Vec<Opcode>,
    throttling_enabled: bool,
    busy_cooldown:      Duration,
    call_deadline:      Option<Duration>,
}

/// The compass RPC client. Cheap to clone — internally Arc-wrapped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Construction ───────────────────────────────────────────────────────

    pub fn new(config: Config) -> Result<Self, InvocationError> {
        let transport = match config.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(
                &config.user_agent,
                config.http_timeout,
                config.proxy.as_deref(),
            )?),
        };

        let session = Session::new(config.endpoint, config.min_call_delay);

        Ok(Self {
            inner: Arc::new(ClientInner {
                session:            Mutex::new(session),
                transport,
                signer:             config.signer,
                auth_provider:      config.auth_provider,
                retry_policy:       config.retry_policy,
                throttled_opcodes:  config.throttled_opcodes,
                throttling_enabled: config.throttling_enabled,
                busy_cooldown:      config.busy_cooldown,
                call_deadline:      config.call_deadline,
            }),
        })
    }

    // ── Auth / session ─────────────────────────────────────────────────────

    /// Authenticate via the configured identity provider and retain the
    /// credentials for automatic re-login on ticket expiry.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), InvocationError> {
        let token = self.inner.auth_provider.authenticate(username, password).await?;
        let provider = self.inner.auth_provider.name().to_string();

        let mut session = self.inner.session.lock().await;
        session.auth_token = Some(BearerToken { provider: provider.clone(), token });
        session.auth_ticket = None;
        session.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        tracing::info!("logged in via {provider}");
        Ok(())
    }

    /// Install a provider token directly, without retaining credentials.
    ///
    /// A session set up this way cannot auto-relogin: ticket expiry surfaces
    /// as a fatal error instead.
    pub async fn set_auth_token(&self, provider: &str, token: &str) {
        let mut session = self.inner.session.lock().await;
        session.auth_token = Some(BearerToken {
            provider: provider.to_string(),
            token:    token.to_string(),
        });
        session.auth_ticket = None;
        session.credentials = None;
    }

    /// Update the player position used for envelopes and signatures.
    pub async fn set_position(&self, position: GeoPosition) {
        self.inner.session.lock().await.position = Some(position);
    }

    /// The RPC URL currently in use.
    pub async fn endpoint(&self) -> String {
        self.inner.session.lock().await.endpoint.clone()
    }

    /// The server-issued auth ticket, once one has been captured.
    pub async fn auth_ticket(&self) -> Option<Vec<u8>> {
        self.inner.session.lock().await.auth_ticket.clone()
    }

    /// The current minimum spacing between throttled calls.
    pub async fn min_call_delay(&self) -> Duration {
        self.inner.session.lock().await.min_call_delay
    }

    // ── Bootstrap ──────────────────────────────────────────────────────────

    /// Establish the session: one fixed batch (player, hatched eggs,
    /// inventory, badges, settings) sent to the bootstrap endpoint.
    ///
    /// Under normal operation the first hop answers with a redirect, which
    /// the dispatcher resolves transparently; the decoded responses come
    /// back from the assigned endpoint. The settings response seeds the
    /// map-fetch throttle floor and the settings hash, a one-time
    /// negotiation.
    pub async fn init(&self) -> Result<Vec<ResponseMessage>, InvocationError> {
        let hash = self.inner.session.lock().await.settings_hash.clone();
        let requests = vec![
            catalog::get_player(),
            catalog::get_hatched_eggs(),
            catalog::get_inventory(),
            catalog::check_awarded_badges(),
            catalog::download_settings(hash.as_deref()),
        ];

        let messages = self.call(requests).await?.into_messages();

        let mut session = self.inner.session.lock().await;
        for message in &messages {
            if let ResponseMessage::Settings(settings) = message {
                if settings.map_min_refresh_seconds > 0.0 {
                    session.min_call_delay =
                        Duration::from_secs_f64(settings.map_min_refresh_seconds);
                }
                session.settings_hash = Some(settings.hash.clone());
                tracing::info!(
                    "session established, map fetch floor {:?}",
                    session.min_call_delay,
                );
            }
        }
        Ok(messages)
    }

    // ── Batching ───────────────────────────────────────────────────────────

    /// Begin a fresh request batch.
    pub fn batch(&self) -> Batch {
        Batch::new(self.clone())
    }

    // ── Dispatch ───────────────────────────────────────────────────────────

    /// Submit an ordered request list as one envelope and resolve the
    /// decoded responses.
    ///
    /// All entry points serialize on the session: overlapping calls on one
    /// client cannot race the endpoint or ticket.
    pub async fn call(
        &self,
        requests: Vec<LogicalRequest>,
    ) -> Result<CallOutcome, InvocationError> {
        if requests.is_empty() {
            return Ok(CallOutcome::NoContent);
        }

        let mut session = self.inner.session.lock().await;
        self.throttle_gate(&session, &requests).await;

        let outcome = match self.inner.call_deadline {
            Some(deadline) => {
                match timeout(deadline, self.call_with_retries(&mut session, &requests)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(InvocationError::DeadlineExceeded),
                }
            }
            None => self.call_with_retries(&mut session, &requests).await?,
        };

        for request in &requests {
            if self.is_throttled(request.opcode()) {
                session.note_throttled(request.opcode().code());
            }
        }
        Ok(outcome)
    }

    fn is_throttled(&self, opcode: Opcode) -> bool {
        self.inner.throttled_opcodes.contains(&opcode)
    }

    /// Scheduling, not error handling: a throttled opcode issued too soon
    /// suspends the call until the spacing floor is met, then proceeds.
    async fn throttle_gate(&self, session: &Session, requests: &[LogicalRequest]) {
        if !self.inner.throttling_enabled {
            return;
        }
        let mut latest: Option<Instant> = None;
        for request in requests {
            if !self.is_throttled(request.opcode()) {
                continue;
            }
            if let Some(deadline) = session.throttle_deadline(request.opcode().code()) {
                latest = Some(latest.map_or(deadline, |d| d.max(deadline)));
            }
        }
        if let Some(deadline) = latest {
            let now = Instant::now();
            if deadline > now {
                tracing::debug!("throttled opcode issued too soon, waiting {:?}", deadline - now);
                sleep_until(deadline).await;
            }
        }
    }

    async fn call_with_retries(
        &self,
        session:  &mut Session,
        requests: &[LogicalRequest],
    ) -> Result<CallOutcome, InvocationError> {
        let mut envelope = self.build_signed_envelope(session, requests).await?;

        let mut fail_count   = NonZeroU32::new(1).unwrap();
        let mut slept_so_far = Duration::default();
        loop {
            match self.attempt(session, &mut envelope, requests).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    let ctx = RetryContext { fail_count, slept_so_far, error: e };
                    match self.inner.retry_policy.should_retry(&ctx) {
                        ControlFlow::Continue(delay) => {
                            sleep(delay).await;
                            slept_so_far += delay;
                            fail_count = fail_count.saturating_add(1);
                        }
                        ControlFlow::Break(()) => {
                            return Err(if ctx.error.is_transient() {
                                InvocationError::AttemptsExhausted {
                                    tries: fail_count.get(),
                                    last:  Box::new(ctx.error),
                                }
                            } else {
                                ctx.error
                            });
                        }
                    }
                }
            }
        }
    }

    /// One attempt: transmit, decode, classify. Redirects, busy cooldowns
    /// and a single re-login resolve inside the attempt without touching the
    /// retry budget.
    async fn attempt(
        &self,
        session:  &mut Session,
        envelope: &mut RequestEnvelope,
        requests: &[LogicalRequest],
    ) -> Result<CallOutcome, InvocationError> {
        let mut relogged_in = false;
        loop {
            // A ticket may have arrived since the envelope was built (the
            // bootstrap redirect carries one); sign before transmitting.
            if session.auth_ticket.is_some() && envelope.signature().is_none() {
                self.sign_envelope(envelope, session).await?;
            }

            let body = envelope.to_bytes();
            let response = self.inner.transport.post(&session.endpoint, body).await?;
            if response.status != 200 {
                return Err(InvocationError::Http { code: response.status });
            }

            let decoded = ResponseEnvelope::decode(&response.body)?;

            // Capture a refreshed ticket first; every path benefits,
            // including the redirect resubmission below.
            if let Some(ticket) = &decoded.auth_ticket {
                session.auth_ticket = Some(ticket.clone());
            }

            match decoded.status_code {
                status::OK | status::OK_ALT => {
                    return pair_responses(&decoded, requests);
                }
                status::REDIRECT => {
                    let Some(url) = decoded.api_url.as_deref() else {
                        // Redirect without a destination: nothing sane to do
                        // locally, let the retry loop have it.
                        return Err(InvocationError::Status { code: status::REDIRECT });
                    };
                    let endpoint = normalize_endpoint(url);
                    tracing::info!("endpoint redirect to {endpoint}");
                    session.endpoint = endpoint;
                    // Platform sub-requests never survive a redirect; the
                    // loop top recomputes the signature for the new hop.
                    envelope.clear_platform();
                }
                status::SERVER_BUSY => {
                    tracing::debug!("server busy, cooling down {:?}", self.inner.busy_cooldown);
                    sleep(self.inner.busy_cooldown).await;
                }
                status::AUTH_EXPIRED => {
                    let credentials = session.credentials.clone();
                    match credentials {
                        Some(creds) if !relogged_in => {
                            relogged_in = true;
                            tracing::info!("auth ticket expired, re-authenticating as {}", creds.username);
                            let token = self
                                .inner
                                .auth_provider
                                .authenticate(&creds.username, &creds.password)
                                .await?;
                            session.auth_ticket = None;
                            session.auth_token = Some(BearerToken {
                                provider: self.inner.auth_provider.name().to_string(),
                                token,
                            });
                            *envelope = self.build_signed_envelope(session, requests).await?;
                        }
                        _ => return Err(InvocationError::Status { code: status::AUTH_EXPIRED }),
                    }
                }
                code => return Err(InvocationError::Status { code }),
            }
        }
    }

    async fn build_signed_envelope(
        &self,
        session:  &Session,
        requests: &[LogicalRequest],
    ) -> Result<RequestEnvelope, InvocationError> {
        let wire: Vec<WireRequest> = requests.iter().map(LogicalRequest::to_wire).collect();
        let mut envelope = RequestEnvelope::build(session.credential(), session.position, wire)?;
        self.sign_envelope(&mut envelope, session).await?;
        Ok(envelope)
    }

    /// Attach a signature when a ticket exists. The bootstrap call goes out
    /// unsigned: there is no ticket to sign against yet.
    async fn sign_envelope(
        &self,
        envelope: &mut RequestEnvelope,
        session:  &Session,
    ) -> Result<(), InvocationError> {
        let Some(ticket) = session.auth_ticket.clone() else {
            return Ok(());
        };
        let payloads: Vec<Vec<u8>> = envelope
            .requests
            .iter()
            .filter_map(|r| r.payload.clone())
            .collect();
        let blob = self
            .sign_with_retry(&payloads, session.position.as_ref(), &ticket)
            .await?;
        envelope.attach_signature(blob);
        Ok(())
    }

    /// Signature-provider rate limiting gets its own small inner retry,
    /// separate from the outer attempt budget.
    async fn sign_with_retry(
        &self,
        payloads: &[Vec<u8>],
        position: Option<&GeoPosition>,
        ticket:   &[u8],
    ) -> Result<Vec<u8>, InvocationError> {
        const SIGN_TRIES: u32 = 3;
        const SIGN_RETRY_DELAY: Duration = Duration::from_millis(500);

        let mut tries = 1;
        loop {
            match self.inner.signer.sign(payloads, position, ticket).await {
                Ok(blob) => return Ok(blob),
                Err(SignatureError::RateLimited) if tries < SIGN_TRIES => {
                    tries += 1;
                    tracing::debug!("signature provider rate limited, retry {tries}/{SIGN_TRIES}");
                    sleep(SIGN_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Convenience wrappers ───────────────────────────────────────────────

    pub async fn get_player(&self) -> Result<PlayerData, InvocationError> {
        match self.call(vec![catalog::get_player()]).await? {
            CallOutcome::Single(ResponseMessage::Player(player)) => Ok(player),
            other => Err(unexpected_shape("player fetch", &other)),
        }
    }

    pub async fn get_inventory(&self) -> Result<Inventory, InvocationError> {
        match self.call(vec![catalog::get_inventory()]).await? {
            CallOutcome::Single(ResponseMessage::Inventory(inventory)) => Ok(inventory),
            other => Err(unexpected_shape("inventory fetch", &other)),
        }
    }

    /// Fetch settings, sending the stored hash so an unchanged server config
    /// answers cheaply. Updates the stored hash on success.
    pub async fn download_settings(&self) -> Result<Settings, InvocationError> {
        let hash = self.inner.session.lock().await.settings_hash.clone();
        match self.call(vec![catalog::download_settings(hash.as_deref())]).await? {
            CallOutcome::Single(ResponseMessage::Settings(settings)) => {
                self.inner.session.lock().await.settings_hash = Some(settings.hash.clone());
                Ok(settings)
            }
            other => Err(unexpected_shape("settings fetch", &other)),
        }
    }

    pub async fn get_map_objects(
        &self,
        cell_ids:  &[u64],
        latitude:  f64,
        longitude: f64,
    ) -> Result<MapObjects, InvocationError> {
        match self.call(vec![catalog::get_map_objects(cell_ids, latitude, longitude)]).await? {
            CallOutcome::Single(ResponseMessage::MapObjects(map)) => Ok(map),
            other => Err(unexpected_shape("map fetch", &other)),
        }
    }

    pub async fn beacon_details(
        &self,
        beacon_id: &str,
        latitude:  f64,
        longitude: f64,
    ) -> Result<BeaconDetails, InvocationError> {
        match self.call(vec![catalog::beacon_details(beacon_id, latitude, longitude)]).await? {
            CallOutcome::Single(ResponseMessage::BeaconDetails(details)) => Ok(details),
            other => Err(unexpected_shape("beacon details", &other)),
        }
    }
}

// ─── Free helpers ────────────────────────────────────────────────────────────

/// Zip the requests that declared a decoder against the returned payloads in
/// order; any element failing to decode fails the whole call.
fn pair_responses(
    envelope: &ResponseEnvelope,
    requests: &[LogicalRequest],
) -> Result<CallOutcome, InvocationError> {
    let decoders: Vec<ResponseDecoder> = requests.iter().filter_map(LogicalRequest::decoder).collect();
    let returns = envelope.pair(decoders.len())?;

    let mut messages = Vec::with_capacity(decoders.len());
    for (decoder, raw) in decoders.into_iter().zip(returns) {
        messages.push(decoder(raw)?);
    }

    Ok(match messages.len() {
        0 => CallOutcome::NoContent,
        1 => CallOutcome::Single(messages.remove(0)),
        _ => CallOutcome::Many(messages),
    })
}

/// Redirect hints arrive as bare authorities; default them to https.
fn normalize_endpoint(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn unexpected_shape(what: &str, got: &CallOutcome) -> InvocationError {
    InvocationError::Decode(format!("{what} returned an unexpected response shape: {got:?}"))
}
