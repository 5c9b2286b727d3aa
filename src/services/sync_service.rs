use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use thiserror::Error;

use crate::{
    database::Database,
    models::{SyncCounts, SyncDirection, SyncErrorDetail, SyncState},
    services::{
        risk_calculator::RiskModel,
        sheets::{SheetRow, SheetsClient},
        sync_log_service, user_service,
    },
    utils::AppError,
};

#[derive(Debug, Error)]
pub enum SyncError {
    /// Another sync holds the guard. The current state was not touched.
    #[error("A synchronization is already running")]
    InProgress,

    /// The sync started and aborted; `state` is the recorded Failed state.
    #[error("{cause}")]
    Failed { state: SyncState, cause: AppError },
}

/// Reconciles the record store with the spreadsheet.
///
/// At most one sync runs per process: `guard` is taken with `try_lock`, so a
/// concurrent request is rejected instead of queued. `state` always holds the
/// latest attempt (Idle until the first one) and is only written while the
/// guard is held.
pub struct SyncService {
    db: Database,
    sheets: Arc<dyn SheetsClient>,
    risk: Arc<dyn RiskModel>,
    guard: tokio::sync::Mutex<()>,
    state: RwLock<SyncState>,
}

impl SyncService {
    pub fn new(db: Database, sheets: Arc<dyn SheetsClient>, risk: Arc<dyn RiskModel>) -> Self {
        Self {
            db,
            sheets,
            risk,
            guard: tokio::sync::Mutex::new(()),
            state: RwLock::new(SyncState::idle()),
        }
    }

    pub fn status(&self) -> SyncState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sheets(&self) -> &dyn SheetsClient {
        self.sheets.as_ref()
    }

    fn set_state(&self, state: SyncState) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    pub async fn run(&self, direction: SyncDirection) -> Result<SyncState, SyncError> {
        let _permit = self.guard.try_lock().map_err(|_| {
            log::warn!("⛔ Rejected {} sync: another sync is running", direction);
            SyncError::InProgress
        })?;

        let running = SyncState::running(direction, chrono::Utc::now().timestamp());
        self.set_state(running.clone());

        log::info!("🔄 Starting {} sync (sheets backend: {})", direction, self.sheets.name());
        let timer = Instant::now();

        // Declared after `_permit` so it finalizes before the guard is released.
        let mut attempt = Attempt {
            service: self,
            running: running.clone(),
            counts: SyncCounts::default(),
            finished: false,
        };

        let result = match direction {
            SyncDirection::FromSheets => self.pull_from_sheets(&mut attempt.counts).await,
            SyncDirection::ToSheets => self.push_to_sheets(&mut attempt.counts).await,
            SyncDirection::Bidirectional => {
                // Sheet edits land first, then the merged store is echoed back.
                match self.pull_from_sheets(&mut attempt.counts).await {
                    Ok(()) => self.push_to_sheets(&mut attempt.counts).await,
                    Err(e) => Err(e),
                }
            }
        };

        let counts = attempt.counts;
        let finished_at = chrono::Utc::now().timestamp();
        let (state, outcome) = match result {
            Ok(()) => {
                let state = running.succeed(counts, finished_at);
                log::info!(
                    "✅ {} sync finished in {:?}: {} records affected ({:?})",
                    direction,
                    timer.elapsed(),
                    state.records_affected,
                    counts
                );
                (state.clone(), Ok(state))
            }
            Err(cause) => {
                let detail = SyncErrorDetail {
                    kind: cause.kind().to_string(),
                    message: cause.public_message(),
                };
                let state = running.fail(counts, detail, finished_at);
                log::error!(
                    "❌ {} sync failed after {:?} with {} records already applied: {}",
                    direction,
                    timer.elapsed(),
                    state.records_affected,
                    cause
                );
                (state.clone(), Err(SyncError::Failed { state, cause }))
            }
        };

        self.set_state(state.clone());
        attempt.finished = true;

        // The insert runs on the blocking pool, so it completes even if this
        // future is dropped while awaiting it.
        if let Err(e) = sync_log_service::record_sync(&self.db, &state).await {
            log::warn!("⚠️  Could not write sync log entry: {}", e);
        }

        outcome
    }

    /// Sheet → store. Existing records are overwritten and rescored, missing
    /// ones created. Store-only records are left alone.
    async fn pull_from_sheets(&self, counts: &mut SyncCounts) -> Result<(), AppError> {
        let rows = self.sheets.read_all().await.map_err(|e| {
            log::error!("❌ from_sheets: reading sheet failed: {}", e);
            AppError::from(e)
        })?;

        for row in &rows {
            let (key, profile) = row.to_profile().map_err(|e| {
                log::error!("❌ from_sheets: rejected sheet row: {}", e);
                AppError::ExternalService(format!("invalid sheet row: {}", e))
            })?;

            let scores = self.risk.compute(&profile);
            let existing = user_service::find_by_user_id(&self.db, &key).await.map_err(|e| {
                log::error!("❌ from_sheets: lookup of user_id {} failed: {}", key, e);
                e
            })?;

            if existing.is_some() {
                user_service::overwrite_user(&self.db, &key, profile, scores)
                    .await
                    .map_err(|e| {
                        log::error!("❌ from_sheets: update of user_id {} failed: {}", key, e);
                        e
                    })?;
                counts.store_updated += 1;
            } else {
                user_service::create_user(&self.db, key.clone(), profile, scores)
                    .await
                    .map_err(|e| {
                        log::error!("❌ from_sheets: insert of user_id {} failed: {}", key, e);
                        e
                    })?;
                counts.store_created += 1;
            }
        }

        Ok(())
    }

    /// Store → sheet. Rows sharing a key are overwritten in place, the rest are
    /// appended in one batch. Sheet-only rows are left alone.
    async fn push_to_sheets(&self, counts: &mut SyncCounts) -> Result<(), AppError> {
        let sheet_keys: HashSet<String> = self
            .sheets
            .read_all()
            .await
            .map_err(|e| {
                log::error!("❌ to_sheets: reading sheet failed: {}", e);
                AppError::from(e)
            })?
            .iter()
            .filter_map(|row| row.key().map(str::to_string))
            .collect();

        let records = user_service::list_users(&self.db, 0, None).await?;

        let (existing, new_rows): (Vec<SheetRow>, Vec<SheetRow>) = records
            .iter()
            .map(SheetRow::from_record)
            .partition(|row| row.key().is_some_and(|key| sheet_keys.contains(key)));

        if !existing.is_empty() {
            self.sheets.update_rows(&existing).await.map_err(|e| {
                log::error!("❌ to_sheets: updating {} rows failed: {}", existing.len(), e);
                AppError::from(e)
            })?;
            counts.sheet_updated += existing.len();
        }

        if !new_rows.is_empty() {
            self.sheets.append_rows(&new_rows).await.map_err(|e| {
                log::error!("❌ to_sheets: appending {} rows failed: {}", new_rows.len(), e);
                AppError::from(e)
            })?;
            counts.sheet_appended += new_rows.len();
        }

        Ok(())
    }
}

/// One in-flight `run`. If the future is dropped before the outcome is
/// published (actix drops handler futures when the client disconnects), the
/// attempt is finalized as Failed with kind `cancelled` and logged.
struct Attempt<'a> {
    service: &'a SyncService,
    running: SyncState,
    counts: SyncCounts,
    finished: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let detail = SyncErrorDetail {
            kind: "cancelled".to_string(),
            message: "The synchronization was interrupted before it finished".to_string(),
        };
        let state = self
            .running
            .clone()
            .fail(self.counts, detail, chrono::Utc::now().timestamp());
        log::warn!(
            "🛑 {} sync cancelled with {} records already applied",
            state.direction.map(|d| d.as_str()).unwrap_or("unknown"),
            state.records_affected
        );
        self.service.set_state(state.clone());

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let db = self.service.db.clone();
                handle.spawn(async move {
                    if let Err(e) = sync_log_service::record_sync(&db, &state).await {
                        log::warn!("⚠️  Could not write sync log entry: {}", e);
                    }
                });
            }
            Err(_) => log::warn!("⚠️  Cancelled sync not written to the sync log: no runtime"),
        }
    }
}
