//! Small key/value table for cache bookkeeping.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

pub(crate) const KEY_ROOMS_SAVED_AT: &str = "rooms_saved_at";
const KEY_INSTALL_ID: &str = "install_id";

impl Database {
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_meta(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM cache_meta WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Identifier of the installation that last wrote this cache.
    pub fn install_marker(&self) -> Result<Option<String>> {
        self.get_meta(KEY_INSTALL_ID)
    }

    pub fn set_install_marker(&self, install_id: &str) -> Result<()> {
        self.set_meta(KEY_INSTALL_ID, install_id)
    }
}
