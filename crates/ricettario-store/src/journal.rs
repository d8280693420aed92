//! `JobJournal` on the `batch_jobs` table

use crate::{now_secs, SqliteStore, StoreError};
use ricettario_domain::{JobJournal, JournalEntry};
use rusqlite::{params, OptionalExtension};

impl JobJournal for SqliteStore {
    type Error = StoreError;

    fn record_submission(&self, entry: &JournalEntry) -> Result<(), Self::Error> {
        // A manifest resubmitted after its previous job finished replaces the old row
        self.conn()?.execute(
            "INSERT OR REPLACE INTO batch_jobs
             (manifest_fingerprint, provider_job_id, request_count, submitted_at, finished_at, final_state)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL)",
            params![
                &entry.manifest_fingerprint,
                &entry.provider_job_id,
                entry.request_count as i64,
                entry.submitted_at as i64,
            ],
        )?;
        Ok(())
    }

    fn find_unfinished(&self, manifest_fingerprint: &str) -> Result<Option<JournalEntry>, Self::Error> {
        let entry = self
            .conn()?
            .query_row(
                "SELECT manifest_fingerprint, provider_job_id, request_count, submitted_at
                 FROM batch_jobs WHERE manifest_fingerprint = ?1 AND finished_at IS NULL",
                params![manifest_fingerprint],
                |row| {
                    Ok(JournalEntry {
                        manifest_fingerprint: row.get(0)?,
                        provider_job_id: row.get(1)?,
                        request_count: row.get::<_, i64>(2)? as usize,
                        submitted_at: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn mark_finished(&self, manifest_fingerprint: &str, final_state: &str) -> Result<(), Self::Error> {
        self.conn()?.execute(
            "UPDATE batch_jobs SET finished_at = ?2, final_state = ?3
             WHERE manifest_fingerprint = ?1 AND finished_at IS NULL",
            params![manifest_fingerprint, now_secs() as i64, final_state],
        )?;
        Ok(())
    }
}
