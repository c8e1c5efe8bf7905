//! # compass-wire
//!
//! Binary envelope codec for the compass RPC protocol.
//!
//! Every round trip with the backend is a single binary envelope carrying one
//! or more multiplexed sub-requests plus session metadata (auth credential,
//! player position, signature). This crate owns the byte-level encoding:
//!
//! | Module          | Contents                                                |
//! |-----------------|---------------------------------------------------------|
//! | [`serialize`]   | [`Serializable`] trait and primitive encodings          |
//! | [`deserialize`] | [`Deserializable`] trait, [`Cursor`] buffer             |
//! | [`envelope`]    | Request/response envelope structures and their codec    |
//!
//! The codec knows nothing about HTTP, retries or session lifecycle; those
//! live in `compass-client`.

#![deny(unsafe_code)]

pub mod deserialize;
pub mod envelope;
pub mod serialize;

pub use deserialize::{Cursor, Deserializable};
pub use envelope::{
    AuthCredential, EnvelopeError, GeoPosition, RequestEnvelope, ResponseEnvelope, WireRequest,
};
pub use serialize::Serializable;
