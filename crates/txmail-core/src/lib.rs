//! # txmail core
//!
//! Runtime-agnostic logic for txmail: field extraction from transaction
//! notification emails, amount and timestamp normalization, the
//! cursor-based mailbox sync state machine, and the idempotent ledger.
//!
//! This crate contains no sqlx, HTTP client, or filesystem I/O. The
//! mailbox and storage are reached through the [`mailbox::Mailbox`] and
//! [`store::Store`] traits.

pub mod assemble;
pub mod extract;
pub mod fields;
pub mod ledger;
pub mod mailbox;
pub mod models;
pub mod normalize;
pub mod store;
pub mod sync;
