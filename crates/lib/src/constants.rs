//! Constants used throughout the zdoc library.
//!
//! This module provides central definitions for wire tags and numeric limits
//! shared by the event, transaction and sync layers.

/// Update message tag for a full snapshot (`[tag][clock][state]`).
pub const STATE_RESET: u32 = 1;

/// Update message tag for a serialized transaction batch.
pub const TRANSACTION: u32 = 2;

/// Largest value a zid or a resolve priority can take (24 bits).
pub const ID_MAX: u32 = 0x00FF_FFFF;

/// Every block in an update message starts on a multiple of this many bytes.
pub const WIRE_ALIGNMENT: usize = 4;

/// Size of one `u32` on the wire.
pub const WORD: usize = std::mem::size_of::<u32>();
