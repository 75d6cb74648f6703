//! Decode Mapbox Vector Tile payloads into features with classified geometry.
//!
//! This crate turns the raw bytes of a vector tile into a [`ParsedTile`]:
//! command streams are expanded into absolute tile-local coordinates,
//! polygon rings are split into exteriors and holes, and tag pairs are
//! resolved into typed property bags.
//!
//! # Design principles
//!
//! - **Synchronous**: No async, no threading primitives
//! - **Lenient per feature**: A malformed feature is skipped and counted,
//!   it never fails the whole tile
//! - **Web-compatible**: Compiles to WASM

mod command;
mod error;
mod geometry;
mod key;
mod tile;
mod value;

pub use command::{Path, command_integer, decode_commands, decode_zigzag, encode_zigzag};
pub use error::{DecodeError, DecodeResult};
pub use geometry::{Geometry, GeometryType, Polygon, signed_area};
pub use key::{MAX_ZOOM, TileKey};
pub use tile::{DEFAULT_EXTENT, Feature, ParsedLayer, ParsedTile, decode_tile};
pub use value::{Properties, PropertyValue, decode_properties};
