//! Version command implementation.

use super::print_json;
use crate::error::Result;
use crate::storage::migrations::{self, EmbeddedSource, MigrationSource};
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    /// Highest schema version compiled into this binary.
    schema_version: u32,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let schema_version = migrations::discover(EmbeddedSource::bundled().list()?)?
        .last()
        .map_or(0, |m| m.version);

    if json {
        return print_json(&VersionOutput {
            version,
            build,
            schema_version,
        });
    }

    println!("pdstore version {version} ({build}, schema {schema_version})");
    Ok(())
}
