#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod concurrent;
pub mod config;
pub mod error;
pub mod key;

/// Linear probing with tombstone deletion and a fixed 50% growth trigger.
pub mod linear;

mod probe;

/// Triangular ("quadratic") probing with tombstone deletion and a
/// configurable load factor.
pub mod quadratic;

/// Robin Hood hashing with backward-shift deletion.
pub mod robin_hood;

mod slot;

/// Probe-length statistics for the single-threaded tables.
#[cfg(feature = "stats")]
pub mod stats;

pub mod table;

pub use concurrent::ConcurrentTable;
pub use config::LoadFactor;
pub use error::TableError;
pub use key::FixedStr;
#[cfg(feature = "foldhash")]
pub use key::FoldKey;
pub use key::IdentityKey;
pub use key::MixedKey;
pub use key::TableKey;
pub use linear::LinearTable;
pub use quadratic::QuadraticTable;
pub use robin_hood::RobinHoodTable;
pub use table::Table;
