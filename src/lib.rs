//! Embedded persistence for the ProtonDrive desktop client.
//!
//! This crate provides the local database core and the `pdstore` operator CLI.
//!
//! # Architecture
//!
//! - [`storage`] - SQLite connection lifecycle, queries, transactions, migrations
//! - [`backup`] - Snapshots, retention, restore
//! - [`config`] - Validated settings and path resolution
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling
//!
//! Startup order is: open the [`storage::Store`], bring the schema current with
//! [`storage::migrations::apply`], then initialize the [`backup::BackupManager`].

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{Error, Result};
