//! Generated protobuf types for the Mapbox Vector Tile format.
//!
//! This crate provides Rust types generated from the `vector_tile.proto`
//! schema (specification version 2.1). These types represent the wire format
//! for layers, features, property dictionaries and geometry command streams.
//!
//! # Key types
//!
//! - [`Tile`]: Root message, a list of named layers
//! - [`tile::Layer`]: Features plus the key/value dictionaries they index into
//! - [`tile::Feature`]: Id, property tags, geometry type and command stream
//! - [`tile::Value`]: Variant-typed property value
//!
//! # Regenerating types
//!
//! To regenerate the protobuf types after modifying `proto/vector_tile.proto`:
//!
//! ```sh
//! cargo run -p tessera-proto --bin generate
//! ```
//!
//! This requires `protoc` to be installed.

mod generated;

pub use generated::*;
