//! `RecipeCache` on the `recipe_cache` table

use crate::{cache_key, now_secs, SqliteStore, StoreError};
use ricettario_domain::{ExtractionRecord, RecipeCache};
use rusqlite::{params, OptionalExtension};

impl RecipeCache for SqliteStore {
    type Error = StoreError;

    fn get(&self, normalized_caption: &str) -> Result<Option<ExtractionRecord>, Self::Error> {
        let key = cache_key(normalized_caption);
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT record_json FROM recipe_cache WHERE cache_key = ?1",
                params![&key],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put(&self, normalized_caption: &str, record: &ExtractionRecord) -> Result<bool, Self::Error> {
        let key = cache_key(normalized_caption);
        let json = serde_json::to_string(record)?;

        // Write-once: an existing entry is never replaced
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO recipe_cache (cache_key, record_json, created_at)
             VALUES (?1, ?2, ?3)",
            params![&key, &json, now_secs() as i64],
        )?;

        Ok(inserted == 1)
    }

    fn len(&self) -> Result<usize, Self::Error> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM recipe_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
