use rusqlite::params;

use crate::{
    database::Database,
    models::{SyncDirection, SyncLogEntry, SyncState, SyncStatus},
    utils::AppError,
};

/// Entries kept in `sync_log`; older ones are pruned on insert.
pub const SYNC_LOG_RETENTION: u32 = 1000;

/// Appends a finalized state to the audit trail. Non-terminal states are ignored.
pub async fn record_sync(db: &Database, state: &SyncState) -> Result<(), AppError> {
    record_sync_keeping(db, state, SYNC_LOG_RETENTION).await
}

async fn record_sync_keeping(db: &Database, state: &SyncState, keep: u32) -> Result<(), AppError> {
    let (Some(direction), Some(started_at), Some(finished_at)) =
        (state.direction, state.started_at, state.finished_at)
    else {
        return Ok(());
    };
    if !state.is_terminal() {
        return Ok(());
    }

    let status = state.status;
    let records_affected = state.records_affected as i64;
    let error_kind = state.error.as_ref().map(|e| e.kind.clone());
    let error_message = state.error.as_ref().map(|e| e.message.clone());

    db.call(move |conn| {
        conn.execute(
            "INSERT INTO sync_log
                 (direction, status, started_at, finished_at, records_affected,
                  error_kind, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                direction.as_str(),
                status.as_str(),
                started_at,
                finished_at,
                records_affected,
                error_kind,
                error_message,
            ],
        )?;

        let pruned = conn.execute(
            "DELETE FROM sync_log WHERE id <= (SELECT MAX(id) FROM sync_log) - ?1",
            params![keep],
        )?;
        if pruned > 0 {
            log::debug!("🧹 Pruned {} old sync log entries", pruned);
        }
        Ok(())
    })
    .await
}

/// Most recent entries first.
pub async fn recent_syncs(db: &Database, limit: u32) -> Result<Vec<SyncLogEntry>, AppError> {
    db.call(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, direction, status, started_at, finished_at, records_affected,
                    error_kind, error_message
             FROM sync_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, direction, status, started_at, finished_at, affected, kind, message) in rows {
            let direction = SyncDirection::parse(&direction).ok_or_else(|| {
                AppError::Persistence(format!(
                    "sync_log {} has unknown direction '{}'",
                    id, direction
                ))
            })?;
            let status = SyncStatus::parse(&status).ok_or_else(|| {
                AppError::Persistence(format!("sync_log {} has unknown status '{}'", id, status))
            })?;
            entries.push(SyncLogEntry {
                id,
                direction,
                status,
                started_at,
                finished_at,
                records_affected: affected.max(0) as usize,
                error_kind: kind,
                error_message: message,
            });
        }
        Ok(entries)
    })
    .await
}
