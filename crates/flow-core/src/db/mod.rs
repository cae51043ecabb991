//! Local cache layer for Flow
//!
//! A libSQL database mirrors remote state for offline reads. All UI reads are
//! served from here; mutations go through the sync repositories only.

mod connection;
mod entity_store;
mod migrations;
mod tombstones;

pub use connection::Database;
pub use entity_store::EntityStore;
pub use tombstones::TombstoneStore;
