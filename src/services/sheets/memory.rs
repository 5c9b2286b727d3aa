use async_trait::async_trait;
use std::sync::Mutex;

use super::{SheetRow, SheetsClient, SheetsError};

/// Process-local sheet. Used by tests and when no spreadsheet is configured.
#[derive(Debug, Default)]
pub struct InMemorySheetsClient {
    rows: Mutex<Vec<SheetRow>>,
}

impl InMemorySheetsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<SheetRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Snapshot of the current rows, in sheet order.
    pub fn rows(&self) -> Vec<SheetRow> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SheetRow>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SheetsClient for InMemorySheetsClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn test_connection(&self) -> Result<bool, SheetsError> {
        Ok(true)
    }

    async fn read_all(&self) -> Result<Vec<SheetRow>, SheetsError> {
        Ok(self.lock().iter().filter(|r| !r.is_blank()).cloned().collect())
    }

    async fn append_rows(&self, rows: &[SheetRow]) -> Result<(), SheetsError> {
        self.lock().extend_from_slice(rows);
        Ok(())
    }

    async fn update_rows(&self, updates: &[SheetRow]) -> Result<(), SheetsError> {
        let mut rows = self.lock();

        let mut targets = Vec::with_capacity(updates.len());
        for update in updates {
            let key = update.key().unwrap_or_default();
            let index = rows
                .iter()
                .position(|r| r.key() == Some(key))
                .ok_or_else(|| SheetsError::RowNotFound(key.to_string()))?;
            targets.push(index);
        }

        for (index, update) in targets.into_iter().zip(updates) {
            rows[index] = update.clone();
        }
        Ok(())
    }
}
