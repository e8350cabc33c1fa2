//! Syncbox Core - Change-tracking domain model
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `FileChange`, `StreamContext`, the result wrappers
//!   and the transfer failure taxonomy
//! - **Port definitions** - Traits for adapters: `ISyncDataProvider`,
//!   `ISyncSettings`, `IQueueStore`, `ITransferExecutor`
//! - **Configuration** - YAML-backed settings that implement `ISyncSettings`
//! - **Migrations** - The ordered migration-list contract storage adapters
//!   apply on open
//!
//! # Architecture
//!
//! The domain module contains pure data and invariants with no I/O. Ports
//! define the trait interfaces that the coordination crate consumes and that
//! adapter crates implement.

pub mod config;
pub mod domain;
pub mod migration;
pub mod ports;
