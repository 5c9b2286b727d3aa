//! Spreadsheet access. The sync service only talks to [`SheetsClient`], so the
//! Google implementation can be swapped for the in-memory one in tests and in
//! local runs without credentials.

pub mod google;
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{UserProfile, UserRecord};

pub use google::GoogleSheetsClient;
pub use memory::InMemorySheetsClient;

/// Column correlating sheet rows with store records.
pub const KEY_COLUMN: &str = "user_id";

/// Canonical header, written when the sheet is empty.
pub const HEADERS: [&str; 17] = [
    "user_id",
    "name",
    "age",
    "gender",
    "email",
    "phone",
    "height_cm",
    "weight_kg",
    "lifestyle_score",
    "smoking_status",
    "exercise_frequency",
    "diet_type",
    "medical_conditions",
    "insurance_risk_score",
    "diabetes_risk_score",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SheetsError {
    /// Network failure, timeout, rate limit or 5xx. Worth retrying.
    #[error("spreadsheet unreachable: {0}")]
    Connectivity(String),

    /// Credentials or permissions problem. Never retried.
    #[error("spreadsheet authorization failed: {0}")]
    Authorization(String),

    #[error("unexpected spreadsheet response: {0}")]
    InvalidResponse(String),

    #[error("no sheet row with user_id '{0}'")]
    RowNotFound(String),

    #[error("sheet header has no user_id column")]
    MissingKeyColumn,
}

impl SheetsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SheetsError::Connectivity(_))
    }
}

#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    async fn test_connection(&self) -> Result<bool, SheetsError>;

    /// Every non-blank data row, in sheet order.
    async fn read_all(&self) -> Result<Vec<SheetRow>, SheetsError>;

    async fn append_rows(&self, rows: &[SheetRow]) -> Result<(), SheetsError>;

    /// Overwrites, for each of `rows`, the sheet row sharing its key. Every key
    /// must already be present; otherwise nothing is written.
    async fn update_rows(&self, rows: &[SheetRow]) -> Result<(), SheetsError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("row has no user_id")]
    MissingKey,

    #[error("row '{key}' is missing required column '{column}'")]
    MissingField { key: String, column: &'static str },

    #[error("row '{key}' has invalid {column} '{value}'")]
    InvalidValue {
        key: String,
        column: &'static str,
        value: String,
    },
}

/// One spreadsheet row, addressed by normalized header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    cells: BTreeMap<String, String>,
}

pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

impl SheetRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zips a raw row with the sheet's header. Short rows are padded with blanks.
    pub fn from_cells(headers: &[String], values: &[String]) -> Self {
        let mut row = SheetRow::new();
        for (i, header) in headers.iter().enumerate() {
            let header = normalize_header(header);
            if header.is_empty() {
                continue;
            }
            let value = values.get(i).cloned().unwrap_or_default();
            row.cells.insert(header, value);
        }
        row
    }

    /// Lays the row out in `headers` order; unknown headers get blanks.
    pub fn to_cells(&self, headers: &[String]) -> Vec<String> {
        headers
            .iter()
            .map(|h| self.get(&normalize_header(h)).unwrap_or_default().to_string())
            .collect()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(normalize_header(column), value.into());
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.get(KEY_COLUMN).map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }

    pub fn from_record(record: &UserRecord) -> Self {
        let p = &record.profile;
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let num = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();

        SheetRow::new()
            .with("user_id", record.user_id.clone())
            .with("name", p.name.clone())
            .with("age", p.age.to_string())
            .with("gender", p.gender.clone())
            .with("email", opt(&p.email))
            .with("phone", opt(&p.phone))
            .with("height_cm", num(p.height_cm))
            .with("weight_kg", num(p.weight_kg))
            .with("lifestyle_score", num(p.lifestyle_score))
            .with("smoking_status", opt(&p.smoking_status))
            .with("exercise_frequency", opt(&p.exercise_frequency))
            .with("diet_type", opt(&p.diet_type))
            .with("medical_conditions", p.medical_conditions.join(", "))
            .with("insurance_risk_score", num(record.insurance_risk_score))
            .with("diabetes_risk_score", num(record.diabetes_risk_score))
            .with("created_at", record.created_at.to_string())
            .with("updated_at", record.updated_at.to_string())
    }

    /// Parses the row into record fields. Score and timestamp columns are
    /// ignored: scores are always recomputed on import.
    pub fn to_profile(&self) -> Result<(String, UserProfile), RowError> {
        let key = self.key().ok_or(RowError::MissingKey)?.to_string();

        let text = |column: &'static str| -> Option<String> {
            self.get(column)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let required = |column: &'static str| {
            text(column).ok_or_else(|| RowError::MissingField { key: key.clone(), column })
        };
        let number = |column: &'static str| -> Result<Option<f64>, RowError> {
            match text(column) {
                None => Ok(None),
                Some(raw) => parse_decimal(&raw)
                    .filter(|n| n.is_finite())
                    .map(Some)
                    .ok_or_else(|| RowError::InvalidValue { key: key.clone(), column, value: raw }),
            }
        };

        let raw_age = required("age")?;
        let age = parse_age(&raw_age).ok_or_else(|| RowError::InvalidValue {
            key: key.clone(),
            column: "age",
            value: raw_age.clone(),
        })?;

        let profile = UserProfile {
            name: required("name")?,
            age,
            gender: required("gender")?,
            email: text("email"),
            phone: text("phone"),
            height_cm: number("height_cm")?,
            weight_kg: number("weight_kg")?,
            lifestyle_score: number("lifestyle_score")?,
            smoking_status: text("smoking_status"),
            exercise_frequency: text("exercise_frequency"),
            diet_type: text("diet_type"),
            medical_conditions: text("medical_conditions")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        Ok((key, profile))
    }
}

/// Sheets locales may render decimals with a comma.
fn parse_decimal(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .or_else(|| raw.replace(',', ".").parse::<f64>().ok())
}

fn parse_age(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().or_else(|| {
        let n = parse_decimal(raw)?;
        (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn record() -> UserRecord {
        UserRecord {
            id: 7,
            user_id: "u1".into(),
            profile: UserProfile {
                name: "Ana".into(),
                age: 41,
                gender: "female".into(),
                height_cm: Some(165.5),
                smoking_status: Some("never".into()),
                medical_conditions: vec!["hypertension".into(), "asthma".into()],
                ..Default::default()
            },
            insurance_risk_score: Some(33.5),
            diabetes_risk_score: Some(41.0),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
        }
    }

    #[test]
    fn from_cells_normalizes_headers_and_pads_short_rows() {
        let row = SheetRow::from_cells(
            &headers(&[" User_ID ", "Name", "Age"]),
            &headers(&["u9", "Bo"]),
        );
        assert_eq!(row.key(), Some("u9"));
        assert_eq!(row.get("name"), Some("Bo"));
        assert_eq!(row.get("age"), Some(""));
    }

    #[test]
    fn to_cells_follows_sheet_column_order() {
        let row = SheetRow::from_record(&record());
        let cells = row.to_cells(&headers(&["age", "user_id", "notes"]));
        assert_eq!(cells, vec!["41".to_string(), "u1".to_string(), String::new()]);
    }

    #[test]
    fn record_survives_export_and_import() {
        let original = record();
        let row = SheetRow::from_record(&original);
        let (key, profile) = row.to_profile().unwrap();
        assert_eq!(key, "u1");
        assert_eq!(profile, original.profile);
    }

    #[test]
    fn import_coerces_sheet_text() {
        let row = SheetRow::new()
            .with("user_id", "u2")
            .with("name", "Caio")
            .with("age", "52.0")
            .with("gender", "male")
            .with("weight_kg", "81,5")
            .with("height_cm", "");
        let (_, profile) = row.to_profile().unwrap();
        assert_eq!(profile.age, 52);
        assert_eq!(profile.weight_kg, Some(81.5));
        assert_eq!(profile.height_cm, None);
    }

    #[test]
    fn import_rejects_bad_rows() {
        let missing_key = SheetRow::new().with("name", "X");
        assert_eq!(missing_key.to_profile().unwrap_err(), RowError::MissingKey);

        let bad_age = SheetRow::new()
            .with("user_id", "u3")
            .with("name", "X")
            .with("age", "forty")
            .with("gender", "f");
        assert!(matches!(
            bad_age.to_profile().unwrap_err(),
            RowError::InvalidValue { column: "age", .. }
        ));

        let no_gender = SheetRow::new().with("user_id", "u3").with("name", "X").with("age", "40");
        assert!(matches!(
            no_gender.to_profile().unwrap_err(),
            RowError::MissingField { column: "gender", .. }
        ));
    }

    #[test]
    fn blank_detection() {
        let row = SheetRow::from_cells(&headers(&["user_id", "name"]), &headers(&[" ", ""]));
        assert!(row.is_blank());
        assert!(!SheetRow::new().with("name", "x").is_blank());
    }

    #[test]
    fn only_connectivity_errors_are_transient() {
        assert!(SheetsError::Connectivity("timeout".into()).is_transient());
        assert!(!SheetsError::Authorization("403".into()).is_transient());
        assert!(!SheetsError::RowNotFound("u1".into()).is_transient());
    }
}
