//! The static operation catalog.
//!
//! Every logical operation is an explicit [`Opcode`] plus a plain factory
//! function producing a [`LogicalRequest`]: a static table, no runtime
//! method injection. Operations whose responses the client understands carry
//! a decoder; the rest surface as [`ResponseMessage::Raw`].

use compass_wire::deserialize;
use compass_wire::{Deserializable, Serializable, WireRequest};

use crate::messages::{
    AwardedBadges, BeaconDetails, HatchedEggs, Inventory, MapObjects, PlayerData, Settings,
};

// ─── Opcode ──────────────────────────────────────────────────────────────────

/// Numeric operation codes understood by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    GetPlayer          = 2,
    GetInventory       = 4,
    DownloadSettings   = 5,
    PlayerUpdate       = 8,
    BeaconSearch       = 101,
    Encounter          = 102,
    CaptureAttempt     = 103,
    BeaconDetails      = 104,
    GetMapObjects      = 106,
    EvolveCreature     = 125,
    GetHatchedEggs     = 126,
    UseItem            = 133,
    ReleaseCreature    = 137,
    CheckAwardedBadges = 156,
    ClaimCodename      = 403,
}

impl Opcode {
    /// Wire value.
    pub const fn code(self) -> u32 {
        self as u32
    }
}

// ─── ResponseMessage ─────────────────────────────────────────────────────────

/// A decoded response payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseMessage {
    Player(PlayerData),
    HatchedEggs(HatchedEggs),
    Inventory(Inventory),
    AwardedBadges(AwardedBadges),
    Settings(Settings),
    MapObjects(MapObjects),
    BeaconDetails(BeaconDetails),
    /// Payload of an operation without a typed shape.
    Raw(Vec<u8>),
}

/// Decodes one raw response payload into a [`ResponseMessage`].
pub type ResponseDecoder = fn(&[u8]) -> deserialize::Result<ResponseMessage>;

// ─── LogicalRequest ──────────────────────────────────────────────────────────

/// One opcode + payload pairing destined to be multiplexed into an envelope.
///
/// Immutable once constructed. A request without a decoder contributes no
/// paired response value.
#[derive(Clone, Debug)]
pub struct LogicalRequest {
    opcode:  Opcode,
    payload: Option<Vec<u8>>,
    decoder: Option<ResponseDecoder>,
}

impl LogicalRequest {
    /// A bare request with no payload and no expected response.
    pub fn new(opcode: Opcode) -> Self {
        Self { opcode, payload: None, decoder: None }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_decoder(mut self, decoder: ResponseDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Whether this request expects a paired response payload.
    pub fn expects_response(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn decoder(&self) -> Option<ResponseDecoder> {
        self.decoder
    }

    pub(crate) fn to_wire(&self) -> WireRequest {
        WireRequest {
            opcode:  self.opcode.code(),
            payload: self.payload.clone(),
        }
    }
}

// ─── Decoders ────────────────────────────────────────────────────────────────

fn decode_player(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::Player(PlayerData::from_bytes(bytes)?))
}

fn decode_hatched_eggs(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::HatchedEggs(HatchedEggs::from_bytes(bytes)?))
}

fn decode_inventory(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::Inventory(Inventory::from_bytes(bytes)?))
}

fn decode_awarded_badges(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::AwardedBadges(AwardedBadges::from_bytes(bytes)?))
}

fn decode_settings(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::Settings(Settings::from_bytes(bytes)?))
}

fn decode_map_objects(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::MapObjects(MapObjects::from_bytes(bytes)?))
}

fn decode_beacon_details(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::BeaconDetails(BeaconDetails::from_bytes(bytes)?))
}

fn decode_raw(bytes: &[u8]) -> deserialize::Result<ResponseMessage> {
    Ok(ResponseMessage::Raw(bytes.to_vec()))
}

// ─── Factories ───────────────────────────────────────────────────────────────

pub fn get_player() -> LogicalRequest {
    LogicalRequest::new(Opcode::GetPlayer).with_decoder(decode_player)
}

pub fn get_hatched_eggs() -> LogicalRequest {
    LogicalRequest::new(Opcode::GetHatchedEggs).with_decoder(decode_hatched_eggs)
}

pub fn get_inventory() -> LogicalRequest {
    LogicalRequest::new(Opcode::GetInventory).with_decoder(decode_inventory)
}

pub fn check_awarded_badges() -> LogicalRequest {
    LogicalRequest::new(Opcode::CheckAwardedBadges).with_decoder(decode_awarded_badges)
}

/// Settings fetch; `hash` is the value from the previous settings response so
/// an unchanged server config can answer with an empty delta.
pub fn download_settings(hash: Option<&str>) -> LogicalRequest {
    let mut payload = Vec::new();
    hash.map(str::to_string).serialize(&mut payload);
    LogicalRequest::new(Opcode::DownloadSettings)
        .with_payload(payload)
        .with_decoder(decode_settings)
}

pub fn get_map_objects(cell_ids: &[u64], latitude: f64, longitude: f64) -> LogicalRequest {
    let mut payload = Vec::new();
    cell_ids.to_vec().serialize(&mut payload);
    latitude.serialize(&mut payload);
    longitude.serialize(&mut payload);
    LogicalRequest::new(Opcode::GetMapObjects)
        .with_payload(payload)
        .with_decoder(decode_map_objects)
}

pub fn beacon_details(beacon_id: &str, latitude: f64, longitude: f64) -> LogicalRequest {
    let mut payload = Vec::new();
    beacon_id.serialize(&mut payload);
    latitude.serialize(&mut payload);
    longitude.serialize(&mut payload);
    LogicalRequest::new(Opcode::BeaconDetails)
        .with_payload(payload)
        .with_decoder(decode_beacon_details)
}

pub fn beacon_search(beacon_id: &str, latitude: f64, longitude: f64) -> LogicalRequest {
    let mut payload = Vec::new();
    beacon_id.serialize(&mut payload);
    latitude.serialize(&mut payload);
    longitude.serialize(&mut payload);
    LogicalRequest::new(Opcode::BeaconSearch)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

pub fn encounter(encounter_id: u64, spawn_point_id: &str) -> LogicalRequest {
    let mut payload = Vec::new();
    encounter_id.serialize(&mut payload);
    spawn_point_id.serialize(&mut payload);
    LogicalRequest::new(Opcode::Encounter)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

pub fn capture_attempt(encounter_id: u64, item_id: u32) -> LogicalRequest {
    let mut payload = Vec::new();
    encounter_id.serialize(&mut payload);
    item_id.serialize(&mut payload);
    LogicalRequest::new(Opcode::CaptureAttempt)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

pub fn evolve_creature(creature_id: u64) -> LogicalRequest {
    let mut payload = Vec::new();
    creature_id.serialize(&mut payload);
    LogicalRequest::new(Opcode::EvolveCreature)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

pub fn release_creature(creature_id: u64) -> LogicalRequest {
    let mut payload = Vec::new();
    creature_id.serialize(&mut payload);
    LogicalRequest::new(Opcode::ReleaseCreature)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

pub fn use_item(item_id: u32) -> LogicalRequest {
    let mut payload = Vec::new();
    item_id.serialize(&mut payload);
    LogicalRequest::new(Opcode::UseItem)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

pub fn claim_codename(codename: &str) -> LogicalRequest {
    let mut payload = Vec::new();
    codename.serialize(&mut payload);
    LogicalRequest::new(Opcode::ClaimCodename)
        .with_payload(payload)
        .with_decoder(decode_raw)
}

/// Fire-and-forget position report; the server sends nothing back.
pub fn player_update(latitude: f64, longitude: f64) -> LogicalRequest {
    let mut payload = Vec::new();
    latitude.serialize(&mut payload);
    longitude.serialize(&mut payload);
    LogicalRequest::new(Opcode::PlayerUpdate).with_payload(payload)
}
