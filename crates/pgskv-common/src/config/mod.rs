//! Configuration for pgskv.
//!
//! This module provides the gate configuration and its TOML loading.

mod gate;

pub use gate::{CapacityConfig, CollectionConfig, GateConfig};
