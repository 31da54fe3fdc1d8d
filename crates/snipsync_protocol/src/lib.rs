//! # snipsync protocol
//!
//! Item, fingerprint, ledger and conflict types for snipsync.
//!
//! This crate provides:
//! - `ItemId`, `Item` and `Fingerprint`
//! - `LedgerEntry` and the text codec for the ledger file
//! - `Observation` and `Action`, the three-way classification of one item
//! - `ConflictResolver` and the built-in `ConflictPolicy`
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod conflict;
mod error;
mod fingerprint;
mod item;
mod ledger;

pub use action::{Action, Observation};
pub use conflict::{ConflictPolicy, ConflictResolver, Winner};
pub use error::{ProtocolError, ProtocolResult};
pub use fingerprint::Fingerprint;
pub use item::{Item, ItemId};
pub use ledger::{decode_ledger, encode_ledger, LedgerEntry, LEDGER_HEADER};
