//! Dispatcher behavior against a scripted in-memory server.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use compass_client::{
    AuthError, AuthProvider, Backoff, BoxFuture, CallOutcome, Client, Config, HttpResponse,
    InvocationError, Opcode, ResponseMessage, RetryContext, RetryPolicy,
    Transport, TransportError, catalog,
    messages::{AwardedBadges, HatchedEggs, Inventory, MapObjects, PlayerData, Settings},
    status,
};
use compass_wire::{Deserializable, RequestEnvelope, ResponseEnvelope, Serializable};
use tokio::sync::Mutex;
use tokio::time::Instant;

// ─── Scripted transport ──────────────────────────────────────────────────────

enum Step {
    /// Serve a protocol response envelope with HTTP 200.
    Respond(ResponseEnvelope),
    /// Serve an empty body with this HTTP status.
    Http(u16),
    /// Fail at the network level.
    NetworkError,
}

#[derive(Clone)]
struct Sent {
    url:  String,
    body: Vec<u8>,
    at:   Instant,
}

/// In-memory server: pops one scripted step per POST and records every
/// request for later inspection.
struct ScriptTransport {
    script: Mutex<VecDeque<Step>>,
    sent:   Mutex<Vec<Sent>>,
}

impl ScriptTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            sent:   Mutex::new(Vec::new()),
        })
    }

    async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    async fn post_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Transport for ScriptTransport {
    fn post<'a>(
        &'a self,
        url:  &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            self.sent.lock().await.push(Sent {
                url: url.to_string(),
                body,
                at: Instant::now(),
            });
            match self.script.lock().await.pop_front() {
                Some(Step::Respond(envelope)) => Ok(HttpResponse {
                    status: 200,
                    body:   envelope.to_bytes(),
                }),
                Some(Step::Http(code)) => Ok(HttpResponse { status: code, body: Vec::new() }),
                Some(Step::NetworkError) => {
                    Err(TransportError::Network("connection reset".into()))
                }
                None => panic!("transport called more times than scripted"),
            }
        })
    }
}

// ─── Counting wrappers ───────────────────────────────────────────────────────

/// Retry policy that counts how often the retry loop consults it.
struct CountingPolicy {
    inner: Backoff,
    asked: AtomicU32,
}

impl CountingPolicy {
    fn new(inner: Backoff) -> Arc<Self> {
        Arc::new(Self { inner, asked: AtomicU32::new(0) })
    }
}

impl RetryPolicy for CountingPolicy {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.inner.should_retry(ctx)
    }
}

/// Auth provider that counts authentications.
struct CountingAuth {
    calls: AtomicU32,
}

impl CountingAuth {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0) })
    }
}

impl AuthProvider for CountingAuth {
    fn name(&self) -> &str {
        "portal"
    }

    fn authenticate<'a>(
        &'a self,
        _username: &'a str,
        _password: &'a str,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-{n}"))
        })
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

const BOOTSTRAP: &str = "https://bootstrap.test/rpc";

fn config(transport: Arc<ScriptTransport>) -> Config {
    Config {
        endpoint: BOOTSTRAP.to_string(),
        transport: Some(transport),
        ..Config::default()
    }
}

async fn logged_in_client(cfg: Config) -> Client {
    let client = Client::new(cfg).unwrap();
    client.login("trainer", "hunter2").await.unwrap();
    client
}

fn ok(returns: Vec<Vec<u8>>) -> ResponseEnvelope {
    ResponseEnvelope {
        status_code: status::OK,
        returns,
        ..ResponseEnvelope::default()
    }
}

fn redirect(url: &str, ticket: &[u8]) -> ResponseEnvelope {
    ResponseEnvelope {
        status_code: status::REDIRECT,
        api_url:     Some(url.to_string()),
        auth_ticket: Some(ticket.to_vec()),
        ..ResponseEnvelope::default()
    }
}

fn bare_status(code: i32) -> ResponseEnvelope {
    ResponseEnvelope { status_code: code, ..ResponseEnvelope::default() }
}

fn player() -> PlayerData {
    PlayerData {
        username:   "trainer".into(),
        team:       1,
        level:      12,
        currency:   2500,
        created_ms: 1_600_000_000_000,
    }
}

fn init_returns(settings: &Settings) -> Vec<Vec<u8>> {
    vec![
        player().to_bytes(),
        HatchedEggs::default().to_bytes(),
        Inventory::default().to_bytes(),
        AwardedBadges::default().to_bytes(),
        settings.to_bytes(),
    ]
}

// ─── Pairing / outcome shape ─────────────────────────────────────────────────

#[tokio::test]
async fn responses_preserve_request_order_and_length() {
    let transport = ScriptTransport::new(vec![Step::Respond(ok(vec![
        player().to_bytes(),
        Inventory { timestamp_ms: 7, items: vec![] }.to_bytes(),
    ]))]);
    let client = logged_in_client(config(transport)).await;

    let outcome = client
        .call(vec![catalog::get_player(), catalog::get_inventory()])
        .await
        .unwrap();

    match outcome {
        CallOutcome::Many(messages) => {
            assert_eq!(messages.len(), 2);
            assert!(matches!(messages[0], ResponseMessage::Player(_)));
            assert!(matches!(messages[1], ResponseMessage::Inventory(_)));
        }
        other => panic!("expected Many, got {other:?}"),
    }
}

#[tokio::test]
async fn decoderless_call_resolves_to_no_content() {
    let transport = ScriptTransport::new(vec![Step::Respond(ok(vec![]))]);
    let client = logged_in_client(config(transport.clone())).await;

    let outcome = client
        .call(vec![catalog::player_update(48.2, 16.3)])
        .await
        .unwrap();
    assert_eq!(outcome, CallOutcome::NoContent);
    assert_eq!(transport.post_count().await, 1);
}

#[tokio::test]
async fn decoderless_requests_are_skipped_during_pairing() {
    // player (decoder) + player_update (none) + inventory (decoder):
    // two payloads pair against the two decoders, order preserved.
    let transport = ScriptTransport::new(vec![Step::Respond(ok(vec![
        player().to_bytes(),
        Inventory::default().to_bytes(),
    ]))]);
    let client = logged_in_client(config(transport)).await;

    let outcome = client
        .call(vec![
            catalog::get_player(),
            catalog::player_update(48.2, 16.3),
            catalog::get_inventory(),
        ])
        .await
        .unwrap();

    match outcome {
        CallOutcome::Many(messages) => {
            assert!(matches!(messages[0], ResponseMessage::Player(_)));
            assert!(matches!(messages[1], ResponseMessage::Inventory(_)));
        }
        other => panic!("expected Many, got {other:?}"),
    }
}

#[tokio::test]
async fn count_mismatch_is_fatal() {
    let transport = ScriptTransport::new(vec![Step::Respond(ok(vec![]))]);
    let client = logged_in_client(config(transport.clone())).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert!(matches!(
        err,
        InvocationError::Envelope(compass_wire::EnvelopeError::CountMismatch { expected: 1, actual: 0 })
    ));
    assert_eq!(transport.post_count().await, 1, "fatal errors must not retry");
}

#[tokio::test]
async fn single_payload_decode_failure_fails_the_call() {
    let transport = ScriptTransport::new(vec![Step::Respond(ok(vec![vec![0xFF]]))]);
    let client = logged_in_client(config(transport.clone())).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert!(matches!(err, InvocationError::Decode(_)));
    assert_eq!(transport.post_count().await, 1);
}

// ─── Redirect (53) ───────────────────────────────────────────────────────────

#[tokio::test]
async fn redirect_resubmits_once_and_adopts_endpoint() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(redirect("rpc.fra1.test/rpc", b"ticket-1")),
        Step::Respond(ok(vec![player().to_bytes()])),
    ]);
    let policy = CountingPolicy::new(Backoff::default());
    let mut cfg = config(transport.clone());
    cfg.retry_policy = policy.clone();
    let client = logged_in_client(cfg).await;

    let outcome = client.call(vec![catalog::get_player()]).await.unwrap();
    assert!(matches!(outcome, CallOutcome::Single(ResponseMessage::Player(_))));

    let sent = transport.sent().await;
    assert_eq!(sent.len(), 2, "exactly one internal resubmission");
    assert_eq!(sent[0].url, BOOTSTRAP);
    assert_eq!(sent[1].url, "https://rpc.fra1.test/rpc");
    assert_eq!(client.endpoint().await, "https://rpc.fra1.test/rpc");
    assert_eq!(client.auth_ticket().await, Some(b"ticket-1".to_vec()));
    assert_eq!(policy.asked.load(Ordering::SeqCst), 0, "redirect consumes no retry budget");
}

#[tokio::test]
async fn bootstrap_hop_is_unsigned_then_resubmission_is_signed() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(redirect("rpc.fra1.test/rpc", b"ticket-1")),
        Step::Respond(ok(vec![player().to_bytes()])),
    ]);
    let client = logged_in_client(config(transport.clone())).await;

    client.call(vec![catalog::get_player()]).await.unwrap();

    let sent = transport.sent().await;
    let first = RequestEnvelope::from_bytes(&sent[0].body).unwrap();
    let second = RequestEnvelope::from_bytes(&sent[1].body).unwrap();
    assert!(first.signature().is_none(), "no ticket yet, bootstrap goes out unsigned");
    assert!(second.signature().is_some(), "resubmission signs against the fresh ticket");
    assert_eq!(second.requests, first.requests, "same logical requests on both hops");
}

#[tokio::test]
async fn redirect_without_destination_is_a_plain_status_failure() {
    let transport = ScriptTransport::new(vec![Step::Respond(bare_status(status::REDIRECT))]);
    let mut cfg = config(transport);
    cfg.retry_policy = Arc::new(compass_client::NoRetries);
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert_eq!(err.status_code(), Some(status::REDIRECT));
}

// ─── Server busy (52) ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn server_busy_cooldowns_resolve_without_retry_budget() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(bare_status(status::SERVER_BUSY)),
        Step::Respond(bare_status(status::SERVER_BUSY)),
        Step::Respond(ok(vec![player().to_bytes()])),
    ]);
    let policy = CountingPolicy::new(Backoff::default());
    let mut cfg = config(transport.clone());
    cfg.retry_policy = policy.clone();
    cfg.busy_cooldown = Duration::from_secs(2);
    let client = logged_in_client(cfg).await;

    let started = Instant::now();
    let outcome = client.call(vec![catalog::get_player()]).await.unwrap();
    assert!(matches!(outcome, CallOutcome::Single(_)));

    assert_eq!(transport.post_count().await, 3);
    assert_eq!(policy.asked.load(Ordering::SeqCst), 0, "cooldowns consume no retry budget");
    assert!(started.elapsed() >= Duration::from_secs(4), "two cooldown waits observed");
}

// ─── Transient retries ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_up_to_budget_then_succeed() {
    let transport = ScriptTransport::new(vec![
        Step::Http(500),
        Step::Http(502),
        Step::NetworkError,
        Step::Http(503),
        Step::Respond(ok(vec![player().to_bytes()])),
    ]);
    let mut cfg = config(transport.clone());
    cfg.retry_policy = Arc::new(Backoff { max_tries: 5, ..Backoff::default() });
    let client = logged_in_client(cfg).await;

    let outcome = client.call(vec![catalog::get_player()]).await.unwrap();
    assert!(matches!(outcome, CallOutcome::Single(_)));
    assert_eq!(transport.post_count().await, 5);
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_reports_last_transient_cause() {
    let transport = ScriptTransport::new(vec![
        Step::Http(500),
        Step::Http(500),
        Step::Http(500),
    ]);
    let mut cfg = config(transport.clone());
    cfg.retry_policy = Arc::new(Backoff { max_tries: 3, ..Backoff::default() });
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    match err {
        InvocationError::AttemptsExhausted { tries, last } => {
            assert_eq!(tries, 3);
            assert!(matches!(*last, InvocationError::Http { code: 500 }));
        }
        other => panic!("expected AttemptsExhausted, got {other:?}"),
    }
    assert_eq!(transport.post_count().await, 3);
}

#[tokio::test]
async fn invalid_request_rejects_immediately_despite_budget() {
    let transport = ScriptTransport::new(vec![Step::Respond(bare_status(status::INVALID_REQUEST))]);
    let mut cfg = config(transport.clone());
    cfg.retry_policy = Arc::new(Backoff { max_tries: 5, ..Backoff::default() });
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert_eq!(err.status_code(), Some(status::INVALID_REQUEST));
    assert_eq!(transport.post_count().await, 1);
}

#[tokio::test]
async fn http_4xx_is_fatal() {
    let transport = ScriptTransport::new(vec![Step::Http(403)]);
    let mut cfg = config(transport.clone());
    cfg.retry_policy = Arc::new(Backoff { max_tries: 5, ..Backoff::default() });
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert!(matches!(err, InvocationError::Http { code: 403 }));
    assert_eq!(transport.post_count().await, 1);
}

#[tokio::test]
async fn malformed_response_is_fatal() {
    // A transport that answers 200 with bytes no envelope could produce.
    struct Garbage;
    impl Transport for Garbage {
        fn post<'a>(
            &'a self,
            _url: &'a str,
            _body: Vec<u8>,
        ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
            Box::pin(async move { Ok(HttpResponse { status: 200, body: vec![0xde, 0xad] }) })
        }
    }

    let mut cfg = Config {
        endpoint: BOOTSTRAP.to_string(),
        transport: Some(Arc::new(Garbage)),
        ..Config::default()
    };
    cfg.retry_policy = Arc::new(Backoff { max_tries: 5, ..Backoff::default() });
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert!(matches!(
        err,
        InvocationError::Envelope(compass_wire::EnvelopeError::Malformed(_))
    ));
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn call_without_login_is_auth_missing() {
    let transport = ScriptTransport::new(vec![]);
    let client = Client::new(config(transport)).unwrap();

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert!(matches!(
        err,
        InvocationError::Envelope(compass_wire::EnvelopeError::AuthMissing)
    ));
}

#[tokio::test]
async fn auth_expiry_triggers_one_relogin_and_resubmission() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(bare_status(status::AUTH_EXPIRED)),
        Step::Respond(ok(vec![player().to_bytes()])),
    ]);
    let auth = CountingAuth::new();
    let policy = CountingPolicy::new(Backoff::default());
    let mut cfg = config(transport.clone());
    cfg.auth_provider = auth.clone();
    cfg.retry_policy = policy.clone();
    let client = logged_in_client(cfg).await;

    let outcome = client.call(vec![catalog::get_player()]).await.unwrap();
    assert!(matches!(outcome, CallOutcome::Single(_)));
    assert_eq!(auth.calls.load(Ordering::SeqCst), 2, "login plus one relogin");
    assert_eq!(transport.post_count().await, 2);
    assert_eq!(policy.asked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn auth_expiry_without_credentials_is_fatal() {
    let transport = ScriptTransport::new(vec![Step::Respond(bare_status(status::AUTH_EXPIRED))]);
    let client = Client::new(config(transport.clone())).unwrap();
    client.set_auth_token("portal", "tok").await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert_eq!(err.status_code(), Some(status::AUTH_EXPIRED));
    assert_eq!(transport.post_count().await, 1, "no relogin credentials, no resubmission");
}

#[tokio::test]
async fn repeated_auth_expiry_in_one_call_is_fatal() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(bare_status(status::AUTH_EXPIRED)),
        Step::Respond(bare_status(status::AUTH_EXPIRED)),
    ]);
    let mut cfg = config(transport.clone());
    cfg.auth_provider = CountingAuth::new();
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert_eq!(err.status_code(), Some(status::AUTH_EXPIRED));
    assert_eq!(transport.post_count().await, 2);
}

// ─── Throttling ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn map_fetches_are_spaced_by_min_delay() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(ok(vec![MapObjects::default().to_bytes()])),
        Step::Respond(ok(vec![MapObjects::default().to_bytes()])),
    ]);
    let mut cfg = config(transport.clone());
    cfg.min_call_delay = Duration::from_secs(10);
    let client = logged_in_client(cfg).await;

    client.get_map_objects(&[1], 48.2, 16.3).await.unwrap();
    client.get_map_objects(&[1], 48.2, 16.3).await.unwrap();

    let sent = transport.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(
        sent[1].at - sent[0].at >= Duration::from_secs(10),
        "second transmission observed before the spacing floor",
    );
}

#[tokio::test(start_paused = true)]
async fn throttling_disabled_sends_back_to_back() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(ok(vec![MapObjects::default().to_bytes()])),
        Step::Respond(ok(vec![MapObjects::default().to_bytes()])),
    ]);
    let mut cfg = config(transport.clone());
    cfg.min_call_delay = Duration::from_secs(10);
    cfg.throttling_enabled = false;
    let client = logged_in_client(cfg).await;

    client.get_map_objects(&[1], 48.2, 16.3).await.unwrap();
    client.get_map_objects(&[1], 48.2, 16.3).await.unwrap();

    let sent = transport.sent().await;
    assert!(sent[1].at - sent[0].at < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn unthrottled_opcodes_are_never_gated() {
    let transport = ScriptTransport::new(vec![
        Step::Respond(ok(vec![player().to_bytes()])),
        Step::Respond(ok(vec![player().to_bytes()])),
    ]);
    let mut cfg = config(transport.clone());
    cfg.min_call_delay = Duration::from_secs(10);
    let client = logged_in_client(cfg).await;

    client.get_player().await.unwrap();
    client.get_player().await.unwrap();

    let sent = transport.sent().await;
    assert!(sent[1].at - sent[0].at < Duration::from_secs(1));
}

// ─── Deadline ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn deadline_abandons_a_busy_loop() {
    // Endless 52s; the caller-supplied deadline must cut the call loose.
    let transport = ScriptTransport::new(
        (0..64).map(|_| Step::Respond(bare_status(status::SERVER_BUSY))).collect(),
    );
    let mut cfg = config(transport);
    cfg.call_deadline = Some(Duration::from_secs(9));
    cfg.busy_cooldown = Duration::from_secs(2);
    let client = logged_in_client(cfg).await;

    let err = client.call(vec![catalog::get_player()]).await.unwrap_err();
    assert!(matches!(err, InvocationError::DeadlineExceeded));
}

// ─── Bootstrap ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn init_negotiates_map_delay_through_the_redirect() {
    let settings = Settings {
        hash:                    "abc123".into(),
        map_min_refresh_seconds: 12.0,
        max_batch_size:          20,
    };
    let transport = ScriptTransport::new(vec![
        Step::Respond(redirect("rpc.fra1.test/rpc", b"ticket-1")),
        Step::Respond(ok(init_returns(&settings))),
    ]);
    let client = logged_in_client(config(transport.clone())).await;

    let messages = client.init().await.unwrap();
    assert_eq!(messages.len(), 5);
    assert!(matches!(messages[0], ResponseMessage::Player(_)));
    assert!(matches!(messages[4], ResponseMessage::Settings(_)));

    assert_eq!(client.endpoint().await, "https://rpc.fra1.test/rpc");
    assert_eq!(client.min_call_delay().await, Duration::from_secs(12));

    // Both hops carried the identical five-request batch.
    let sent = transport.sent().await;
    let first = RequestEnvelope::from_bytes(&sent[0].body).unwrap();
    assert_eq!(first.requests.len(), 5);
    assert_eq!(first.requests[0].opcode, Opcode::GetPlayer.code());
    assert_eq!(first.requests[4].opcode, Opcode::DownloadSettings.code());
}

#[tokio::test]
async fn second_settings_fetch_carries_the_stored_hash() {
    let settings = Settings {
        hash:                    "abc123".into(),
        map_min_refresh_seconds: 5.0,
        max_batch_size:          20,
    };
    let transport = ScriptTransport::new(vec![
        Step::Respond(ok(vec![settings.to_bytes()])),
        Step::Respond(ok(vec![settings.to_bytes()])),
    ]);
    let client = logged_in_client(config(transport.clone())).await;

    client.download_settings().await.unwrap();
    client.download_settings().await.unwrap();

    let sent = transport.sent().await;
    let first = RequestEnvelope::from_bytes(&sent[0].body).unwrap();
    let second = RequestEnvelope::from_bytes(&sent[1].body).unwrap();

    let hash_of = |env: &RequestEnvelope| {
        let payload = env.requests[0].payload.clone().unwrap();
        Option::<String>::from_bytes(&payload).unwrap()
    };
    assert_eq!(hash_of(&first), None);
    assert_eq!(hash_of(&second), Some("abc123".into()));
}

// ─── Envelope round trip through the dispatcher ──────────────────────────────

#[tokio::test]
async fn synthetic_response_round_trips_field_for_field() {
    use compass_client::messages::{Beacon, MapCell, SpawnPoint};

    let map = MapObjects {
        cells: vec![MapCell {
            cell_id: 0x5ab1,
            beacons: vec![Beacon {
                id:        "bcn-1".into(),
                latitude:  48.2,
                longitude: 16.3,
                kind:      2,
            }],
            spawn_points: vec![SpawnPoint { latitude: 48.21, longitude: 16.31 }],
        }],
    };
    let expected = map.clone();

    let transport = ScriptTransport::new(vec![Step::Respond(ok(vec![map.to_bytes()]))]);
    let client = logged_in_client(config(transport)).await;

    let got = client.get_map_objects(&[0x5ab1], 48.2, 16.3).await.unwrap();
    assert_eq!(got, expected);
}
