//! SQLite persistence layer.
//!
//! This module provides the persistence core using SQLite with:
//! - A single owned connection with an explicit initialize/close lifecycle
//! - WAL mode and foreign-key enforcement
//! - Closure-scoped transactions with rollback on error
//! - Versioned, transactional schema migrations
//!
//! # Submodules
//!
//! - [`engine`] - Connection lifecycle and query primitives
//! - [`migrations`] - Migration discovery and application

pub mod engine;
pub mod migrations;

pub use engine::{RunResult, Store};
pub use migrations::{
    AppliedMigration, DirectorySource, EmbeddedSource, Migration, MigrationReport,
    MigrationSource,
};
