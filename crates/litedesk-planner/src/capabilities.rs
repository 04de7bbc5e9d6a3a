//! What the linked SQLite engine can do in-place

use litedesk_db::Database;

/// ALTER-related capabilities of the engine, plus the connection state
/// the planner must preserve.
#[derive(Debug, Clone, Copy)]
pub struct EngineCapabilities {
    /// `ALTER TABLE .. RENAME COLUMN` exists (3.25.0+).
    pub rename_column: bool,
    /// `ALTER TABLE .. RENAME TO` also rewrites references in views and
    /// triggers (3.25.0+ with legacy_alter_table off).
    pub full_rename_table: bool,
    /// `PRAGMA foreign_keys` is currently ON; remembered so a rebuild
    /// script can restore it.
    pub foreign_keys_enabled: bool,
}

impl EngineCapabilities {
    /// Probe the connection.
    pub fn detect(db: &Database) -> Self {
        let version = db.sqlite_version_number();
        let modern = version >= 3_025_000;
        let foreign_keys_enabled = db
            .pragma("foreign_keys")
            .ok()
            .flatten()
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
            != 0;
        Self {
            rename_column: modern,
            full_rename_table: modern,
            foreign_keys_enabled,
        }
    }

    /// A 3.25+ engine with foreign keys off, the common default.
    pub fn modern() -> Self {
        Self {
            rename_column: true,
            full_rename_table: true,
            foreign_keys_enabled: false,
        }
    }

    /// An engine without the rename family, forcing rebuilds.
    pub fn legacy() -> Self {
        Self {
            rename_column: false,
            full_rename_table: false,
            foreign_keys_enabled: false,
        }
    }
}
