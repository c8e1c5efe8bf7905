//! Fluent batch builder.
//!
//! A [`Batch`] is a distinct owned value: two concurrent batches can never
//! share an accumulator, and `submit` consumes the batch so it cannot be
//! sent twice. Start a fresh one per group:
//!
//! ```rust,no_run
//! # async fn f(client: compass_client::Client) -> Result<(), compass_client::InvocationError> {
//! let outcome = client
//!     .batch()
//!     .get_player()
//!     .get_inventory()
//!     .get_map_objects(&[123, 124], 48.2, 16.3)
//!     .submit()
//!     .await?;
//! # Ok(()) }
//! ```

use crate::catalog::{self, LogicalRequest};
use crate::errors::InvocationError;
use crate::{CallOutcome, Client};

/// An ordered sequence of logical requests under construction.
pub struct Batch {
    client:   Client,
    requests: Vec<LogicalRequest>,
}

impl Batch {
    pub(crate) fn new(client: Client) -> Self {
        Self { client, requests: Vec::new() }
    }

    /// Append an arbitrary pre-built request.
    pub fn raw(mut self, request: LogicalRequest) -> Self {
        self.requests.push(request);
        self
    }

    /// Number of accumulated requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Submit the accumulated requests as one multiplexed envelope.
    ///
    /// An empty batch resolves to [`CallOutcome::NoContent`] without touching
    /// the network.
    pub async fn submit(self) -> Result<CallOutcome, InvocationError> {
        if self.requests.is_empty() {
            return Ok(CallOutcome::NoContent);
        }
        self.client.call(self.requests).await
    }

    // ── Per-operation chain methods ────────────────────────────────────────

    pub fn get_player(self) -> Self {
        let req = catalog::get_player();
        self.raw(req)
    }

    pub fn get_hatched_eggs(self) -> Self {
        let req = catalog::get_hatched_eggs();
        self.raw(req)
    }

    pub fn get_inventory(self) -> Self {
        let req = catalog::get_inventory();
        self.raw(req)
    }

    pub fn check_awarded_badges(self) -> Self {
        let req = catalog::check_awarded_badges();
        self.raw(req)
    }

    pub fn download_settings(self, hash: Option<&str>) -> Self {
        let req = catalog::download_settings(hash);
        self.raw(req)
    }

    pub fn get_map_objects(self, cell_ids: &[u64], latitude: f64, longitude: f64) -> Self {
        let req = catalog::get_map_objects(cell_ids, latitude, longitude);
        self.raw(req)
    }

    pub fn beacon_details(self, beacon_id: &str, latitude: f64, longitude: f64) -> Self {
        let req = catalog::beacon_details(beacon_id, latitude, longitude);
        self.raw(req)
    }

    pub fn beacon_search(self, beacon_id: &str, latitude: f64, longitude: f64) -> Self {
        let req = catalog::beacon_search(beacon_id, latitude, longitude);
        self.raw(req)
    }

    pub fn encounter(self, encounter_id: u64, spawn_point_id: &str) -> Self {
        let req = catalog::encounter(encounter_id, spawn_point_id);
        self.raw(req)
    }

    pub fn capture_attempt(self, encounter_id: u64, item_id: u32) -> Self {
        let req = catalog::capture_attempt(encounter_id, item_id);
        self.raw(req)
    }

    pub fn evolve_creature(self, creature_id: u64) -> Self {
        let req = catalog::evolve_creature(creature_id);
        self.raw(req)
    }

    pub fn release_creature(self, creature_id: u64) -> Self {
        let req = catalog::release_creature(creature_id);
        self.raw(req)
    }

    pub fn use_item(self, item_id: u32) -> Self {
        let req = catalog::use_item(item_id);
        self.raw(req)
    }

    pub fn claim_codename(self, codename: &str) -> Self {
        let req = catalog::claim_codename(codename);
        self.raw(req)
    }

    pub fn player_update(self, latitude: f64, longitude: f64) -> Self {
        let req = catalog::player_update(latitude, longitude);
        self.raw(req)
    }
}
