//! Typed request/response payloads for the operations the client decodes.
//!
//! Only the calls the core flows depend on get a typed shape; everything else
//! rides through as raw bytes. Field layouts follow the envelope codec's
//! primitive encodings.

use compass_wire::deserialize::{self, Buffer};
use compass_wire::{Deserializable, Serializable};

// ─── Player ──────────────────────────────────────────────────────────────────

/// Profile data returned by the player fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerData {
    pub username:   String,
    pub team:       u32,
    pub level:      u32,
    pub currency:   u64,
    pub created_ms: u64,
}

impl Serializable for PlayerData {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.username.serialize(buf);
        self.team.serialize(buf);
        self.level.serialize(buf);
        self.currency.serialize(buf);
        self.created_ms.serialize(buf);
    }
}

impl Deserializable for PlayerData {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            username:   String::deserialize(buf)?,
            team:       u32::deserialize(buf)?,
            level:      u32::deserialize(buf)?,
            currency:   u64::deserialize(buf)?,
            created_ms: u64::deserialize(buf)?,
        })
    }
}

// ─── Hatched eggs ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HatchedEggs {
    pub egg_ids:    Vec<u64>,
    pub experience: Vec<u32>,
}

impl Serializable for HatchedEggs {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.egg_ids.serialize(buf);
        self.experience.serialize(buf);
    }
}

impl Deserializable for HatchedEggs {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            egg_ids:    Vec::<u64>::deserialize(buf)?,
            experience: Vec::<u32>::deserialize(buf)?,
        })
    }
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct InventoryItem {
    pub item_id: u32,
    pub count:   u32,
}

impl Serializable for InventoryItem {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.item_id.serialize(buf);
        self.count.serialize(buf);
    }
}

impl Deserializable for InventoryItem {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            item_id: u32::deserialize(buf)?,
            count:   u32::deserialize(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inventory {
    pub timestamp_ms: u64,
    pub items:        Vec<InventoryItem>,
}

impl Serializable for Inventory {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.timestamp_ms.serialize(buf);
        self.items.serialize(buf);
    }
}

impl Deserializable for Inventory {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            timestamp_ms: u64::deserialize(buf)?,
            items:        Vec::<InventoryItem>::deserialize(buf)?,
        })
    }
}

// ─── Badges ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AwardedBadges {
    pub badge_ids: Vec<u32>,
}

impl Serializable for AwardedBadges {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.badge_ids.serialize(buf);
    }
}

impl Deserializable for AwardedBadges {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self { badge_ids: Vec::<u32>::deserialize(buf)? })
    }
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Server-pushed client settings. The map refresh floor here feeds the
/// client-side throttle for map-object fetches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    pub hash:                    String,
    pub map_min_refresh_seconds: f64,
    pub max_batch_size:          u32,
}

impl Serializable for Settings {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.hash.serialize(buf);
        self.map_min_refresh_seconds.serialize(buf);
        self.max_batch_size.serialize(buf);
    }
}

impl Deserializable for Settings {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            hash:                    String::deserialize(buf)?,
            map_min_refresh_seconds: f64::deserialize(buf)?,
            max_batch_size:          u32::deserialize(buf)?,
        })
    }
}

// ─── Map objects ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct Beacon {
    pub id:        String,
    pub latitude:  f64,
    pub longitude: f64,
    pub kind:      u32,
}

impl Serializable for Beacon {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.id.serialize(buf);
        self.latitude.serialize(buf);
        self.longitude.serialize(buf);
        self.kind.serialize(buf);
    }
}

impl Deserializable for Beacon {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            id:        String::deserialize(buf)?,
            latitude:  f64::deserialize(buf)?,
            longitude: f64::deserialize(buf)?,
            kind:      u32::deserialize(buf)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnPoint {
    pub latitude:  f64,
    pub longitude: f64,
}

impl Serializable for SpawnPoint {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.latitude.serialize(buf);
        self.longitude.serialize(buf);
    }
}

impl Deserializable for SpawnPoint {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            latitude:  f64::deserialize(buf)?,
            longitude: f64::deserialize(buf)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapCell {
    pub cell_id:      u64,
    pub beacons:      Vec<Beacon>,
    pub spawn_points: Vec<SpawnPoint>,
}

impl Serializable for MapCell {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.cell_id.serialize(buf);
        self.beacons.serialize(buf);
        self.spawn_points.serialize(buf);
    }
}

impl Deserializable for MapCell {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            cell_id:      u64::deserialize(buf)?,
            beacons:      Vec::<Beacon>::deserialize(buf)?,
            spawn_points: Vec::<SpawnPoint>::deserialize(buf)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapObjects {
    pub cells: Vec<MapCell>,
}

impl Serializable for MapObjects {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.cells.serialize(buf);
    }
}

impl Deserializable for MapObjects {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self { cells: Vec::<MapCell>::deserialize(buf)? })
    }
}

// ─── Beacon details ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeaconDetails {
    pub name:      String,
    pub latitude:  f64,
    pub longitude: f64,
    pub active:    bool,
}

impl Serializable for BeaconDetails {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.name.serialize(buf);
        self.latitude.serialize(buf);
        self.longitude.serialize(buf);
        self.active.serialize(buf);
    }
}

impl Deserializable for BeaconDetails {
    fn deserialize(buf: Buffer) -> deserialize::Result<Self> {
        Ok(Self {
            name:      String::deserialize(buf)?,
            latitude:  f64::deserialize(buf)?,
            longitude: f64::deserialize(buf)?,
            active:    bool::deserialize(buf)?,
        })
    }
}
