//! `RunLedger` on the `runs` table
//!
//! Records are only ever inserted. `latest` orders by the autoincrement
//! sequence, so two runs with the same timestamp still come back in append
//! order.

use crate::{SqliteStore, StoreError};
use ricettario_domain::{ExecutionMode, RunComparison, RunDetails, RunId, RunLedger, RunRecord};
use rusqlite::{params, OptionalExtension, Row};

const RUN_COLUMNS: &str = "run_id, timestamp, total_captions, accepted_count, rejected_count,
     errored_count, cache_hits, mode_used, total_cost_estimate, success_rate, model_name,
     average_confidence, duration_seconds, avg_call_latency_ms, fallback_count, cancelled,
     prompt_fingerprint, details_json";

fn run_id_to_bytes(id: RunId) -> Vec<u8> {
    id.value().to_be_bytes().to_vec()
}

fn bytes_to_run_id(bytes: &[u8]) -> Result<RunId, StoreError> {
    if bytes.len() != 16 {
        return Err(StoreError::InvalidData(format!(
            "Expected 16 bytes for RunId, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 16];
    arr.copy_from_slice(bytes);
    Ok(RunId::from_value(u128::from_be_bytes(arr)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let run_id = bytes_to_run_id(&id_bytes).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Blob, Box::new(e))
    })?;

    let mode: String = row.get(7)?;
    let mode_used = ExecutionMode::parse(&mode).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            Box::new(StoreError::InvalidData(format!("Unknown mode: {}", mode))),
        )
    })?;

    let details_json: String = row.get(17)?;
    let details: RunDetails = serde_json::from_str(&details_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(17, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(RunRecord {
        run_id,
        timestamp: row.get::<_, i64>(1)? as u64,
        total_captions: row.get::<_, i64>(2)? as usize,
        accepted_count: row.get::<_, i64>(3)? as usize,
        rejected_count: row.get::<_, i64>(4)? as usize,
        errored_count: row.get::<_, i64>(5)? as usize,
        cache_hits: row.get::<_, i64>(6)? as usize,
        mode_used,
        total_cost_estimate: row.get(8)?,
        success_rate: row.get(9)?,
        model_name: row.get(10)?,
        average_confidence: row.get(11)?,
        duration_seconds: row.get(12)?,
        avg_call_latency_ms: row.get(13)?,
        fallback_count: row.get::<_, i64>(14)? as usize,
        cancelled: row.get(15)?,
        prompt_fingerprint: row.get(16)?,
        details,
    })
}

impl RunLedger for SqliteStore {
    type Error = StoreError;

    fn append(&self, record: &RunRecord) -> Result<(), Self::Error> {
        let details_json = serde_json::to_string(&record.details)?;
        self.conn()?.execute(
            &format!(
                "INSERT INTO runs ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                RUN_COLUMNS
            ),
            params![
                run_id_to_bytes(record.run_id),
                record.timestamp as i64,
                record.total_captions as i64,
                record.accepted_count as i64,
                record.rejected_count as i64,
                record.errored_count as i64,
                record.cache_hits as i64,
                record.mode_used.as_str(),
                record.total_cost_estimate,
                record.success_rate,
                &record.model_name,
                record.average_confidence,
                record.duration_seconds,
                record.avg_call_latency_ms,
                record.fallback_count as i64,
                record.cancelled,
                &record.prompt_fingerprint,
                details_json,
            ],
        )?;
        Ok(())
    }

    fn latest(&self, n: usize) -> Result<Vec<RunRecord>, Self::Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY seq DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![n as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get_run(&self, run_id: RunId) -> Result<Option<RunRecord>, Self::Error> {
        let record = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM runs WHERE run_id = ?1", RUN_COLUMNS),
                params![run_id_to_bytes(run_id)],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn since(&self, since: u64) -> Result<Vec<RunRecord>, Self::Error> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs WHERE timestamp >= ?1 ORDER BY seq ASC",
            RUN_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![since as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn compare(&self, run_a: RunId, run_b: RunId) -> Result<RunComparison, Self::Error> {
        let a = self
            .get_run(run_a)?
            .ok_or_else(|| StoreError::NotFound(run_a.to_string()))?;
        let b = self
            .get_run(run_b)?
            .ok_or_else(|| StoreError::NotFound(run_b.to_string()))?;
        Ok(RunComparison::between(&a, &b))
    }
}
