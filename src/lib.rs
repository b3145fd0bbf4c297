//! # txmail
//!
//! Ingests bank transaction notification emails from Gmail into SQLite.
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌───────────────┐   ┌──────────┐
//! │  Gmail   │──▶│ SyncCtrl   │──▶│ Extract +     │──▶│  Ledger  │
//! │ history  │   │ (cursor)   │   │ Assemble      │   │ (SQLite) │
//! └──────────┘   └────────────┘   └───────────────┘   └────┬─────┘
//!                                                          │
//!                            ┌─────────────────────────────┤
//!                            ▼                             ▼
//!                       ┌──────────┐                 ┌──────────┐
//!                       │   CLI    │                 │   HTTP   │
//!                       │ (txmail) │                 │   API    │
//!                       └──────────┘                 └──────────┘
//! ```
//!
//! The runtime-agnostic pieces (extraction, normalization, sync state
//! machine, idempotent ledger) live in `txmail-core`. This crate provides
//! the native adapters and outer surfaces.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`gmail`] | Gmail `Mailbox` implementation |
//! | [`ingest`] | Single-flight ingestion cycle |
//! | [`scheduler`] | Interval timer, retention, keep-alive |
//! | [`server`] | HTTP API |
//! | [`stats`] | Store statistics |
//! | [`retention`] | Old-record cleanup |
//! | [`inspect`] | Offline parsing of saved emails |

pub mod config;
pub mod db;
pub mod gmail;
pub mod ingest;
pub mod inspect;
pub mod migrate;
pub mod retention;
pub mod scheduler;
pub mod server;
pub mod sqlite_store;
pub mod stats;
