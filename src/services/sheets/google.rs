use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{normalize_header, SheetRow, SheetsClient, SheetsError, HEADERS, KEY_COLUMN};
use crate::config::{SheetsCredential, SheetsSettings};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const DATA_RANGE: &str = "A1:ZZ";

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

struct ServiceAccount {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

enum Credential {
    Static(String),
    ServiceAccount(ServiceAccount),
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    properties: Option<SpreadsheetProperties>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

/// Google Sheets v4 REST client for a single tab of one spreadsheet.
///
/// Reads, header lookups and in-place batch updates are retried on transient
/// failures. Appends are sent once: a retried append after a timeout could
/// duplicate rows.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    sheet_name: String,
    credential: Option<Credential>,
    max_retries: u32,
}

impl GoogleSheetsClient {
    pub fn new(spreadsheet_id: String, settings: &SheetsSettings) -> Result<Self, SheetsError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SheetsError::Connectivity(format!("failed to build HTTP client: {}", e)))?;

        let credential = match &settings.credential {
            None => None,
            Some(SheetsCredential::AccessToken(token)) => Some(Credential::Static(token.clone())),
            Some(SheetsCredential::ServiceAccountFile(path)) => {
                Some(Credential::ServiceAccount(load_service_account(path)?))
            }
        };

        if credential.is_none() {
            log::warn!(
                "⚠️  No Google credential configured; spreadsheet calls will be unauthorized"
            );
        }

        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id,
            sheet_name: settings.sheet_name.clone(),
            credential,
            max_retries: settings.max_retries,
        })
    }

    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.sheet_name.replace('\'', "''"), cells)
    }

    fn values_url(&self, cells: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            self.spreadsheet_id,
            urlencoding::encode(&self.range(cells))
        )
    }

    async fn access_token(&self) -> Result<String, SheetsError> {
        match &self.credential {
            None => Err(SheetsError::Authorization(
                "no spreadsheet credential configured".to_string(),
            )),
            Some(Credential::Static(token)) => Ok(token.clone()),
            Some(Credential::ServiceAccount(account)) => account.token(&self.http).await,
        }
    }

    async fn execute<T, F>(&self, idempotent: bool, build: F) -> Result<T, SheetsError>
    where
        T: DeserializeOwned + Send,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let attempts = if idempotent { self.max_retries + 1 } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.execute_once(&build).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    log::warn!(
                        "⚠️  Sheets request failed (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn execute_once<T, F>(&self, build: &F) -> Result<T, SheetsError>
    where
        T: DeserializeOwned + Send,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.access_token().await?;
        let response = build(&self.http)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SheetsError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    fn batch_update_body(
        &self,
        header: &[String],
        targets: &[(usize, &SheetRow)],
    ) -> serde_json::Value {
        let data: Vec<serde_json::Value> = targets
            .iter()
            .map(|(sheet_row, row)| {
                serde_json::json!({
                    "range": self.range(&format!("A{}", sheet_row)),
                    "majorDimension": "ROWS",
                    "values": [row.to_cells(header)],
                })
            })
            .collect();
        serde_json::json!({ "valueInputOption": "RAW", "data": data })
    }

    async fn read_values(&self, cells: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.values_url(cells);
        let range: ValueRange = self.execute(true, |http| http.get(&url)).await?;
        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

fn load_service_account(path: &str) -> Result<ServiceAccount, SheetsError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SheetsError::Authorization(format!("cannot read service account key file {}: {}", path, e))
    })?;
    let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|_| {
        SheetsError::Authorization(format!("service account key file {} is not valid JSON", path))
    })?;
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|_| {
        SheetsError::Authorization("service account private key is not a valid RSA PEM".to_string())
    })?;

    log::info!("🔑 Using Google service account {}", key.client_email);

    Ok(ServiceAccount {
        client_email: key.client_email,
        token_uri: key.token_uri,
        key: encoding_key,
        cached: Mutex::new(None),
    })
}

impl ServiceAccount {
    /// Returns a cached access token, exchanging a fresh signed assertion when
    /// the cached one is missing or about to expire.
    async fn token(&self, http: &reqwest::Client) -> Result<String, SheetsError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.access_token.clone());
            }
        }

        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|_| SheetsError::Authorization("failed to sign token request".to_string()))?;

        log::debug!("🔑 Exchanging service account assertion for an access token");

        let response = http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_client_error() {
                SheetsError::Authorization(format!("token exchange refused ({})", status.as_u16()))
            } else {
                SheetsError::Connectivity(format!("token endpoint returned {}", status.as_u16()))
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::InvalidResponse(format!("invalid token response: {}", e)))?;

        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(token.access_token)
    }
}

fn transport_error(e: reqwest::Error) -> SheetsError {
    if e.is_timeout() {
        SheetsError::Connectivity("request timed out".to_string())
    } else {
        SheetsError::Connectivity(e.without_url().to_string())
    }
}

/// Maps a non-2xx Sheets response onto the error taxonomy.
fn status_error(status: StatusCode, body: &str) -> SheetsError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    let detail = format!("{} {}", status.as_u16(), message);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetsError::Authorization(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            SheetsError::Connectivity(detail)
        }
        s if s.is_server_error() => SheetsError::Connectivity(detail),
        _ => SheetsError::InvalidResponse(detail),
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetsClient for GoogleSheetsClient {
    fn name(&self) -> &str {
        "google"
    }

    async fn test_connection(&self) -> Result<bool, SheetsError> {
        let url = format!(
            "{}/v4/spreadsheets/{}?fields=properties.title",
            self.api_base, self.spreadsheet_id
        );
        let meta: SpreadsheetMeta = self.execute(true, |http| http.get(&url)).await?;
        let title = meta.properties.map(|p| p.title).unwrap_or_default();
        log::info!("✅ Connected to spreadsheet '{}'", title);
        Ok(true)
    }

    async fn read_all(&self) -> Result<Vec<SheetRow>, SheetsError> {
        let values = self.read_values(DATA_RANGE).await?;
        let rows = rows_from_values(&values)?;
        log::info!("📄 Read {} rows from sheet '{}'", rows.len(), self.sheet_name);
        Ok(rows)
    }

    async fn append_rows(&self, rows: &[SheetRow]) -> Result<(), SheetsError> {
        if rows.is_empty() {
            return Ok(());
        }

        let header = self
            .read_values("1:1")
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let values = append_values(&header, rows)?;

        let url = format!("{}:append", self.values_url("A1"));
        let body = serde_json::json!({ "majorDimension": "ROWS", "values": values });
        let _: serde_json::Value = self
            .execute(false, |http| {
                http.post(&url)
                    .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
                    .json(&body)
            })
            .await?;

        log::info!("➕ Appended {} rows to sheet '{}'", rows.len(), self.sheet_name);
        Ok(())
    }

    async fn update_rows(&self, rows: &[SheetRow]) -> Result<(), SheetsError> {
        if rows.is_empty() {
            return Ok(());
        }

        let values = self.read_values(DATA_RANGE).await?;
        let targets = locate_rows(&values, rows)?;
        let header = values.first().map(Vec::as_slice).unwrap_or_default();
        let body = self.batch_update_body(header, &targets);

        let url = format!(
            "{}/v4/spreadsheets/{}/values:batchUpdate",
            self.api_base, self.spreadsheet_id
        );
        let _: serde_json::Value = self.execute(true, |http| http.post(&url).json(&body)).await?;

        log::info!("✏️  Updated {} rows in sheet '{}'", rows.len(), self.sheet_name);
        Ok(())
    }
}

fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

fn key_column(header: &[String]) -> Result<usize, SheetsError> {
    header
        .iter()
        .position(|h| normalize_header(h) == KEY_COLUMN)
        .ok_or(SheetsError::MissingKeyColumn)
}

/// Zips data rows with the header row, skipping blank rows. A sheet whose
/// header lacks the key column is rejected: its rows could never be matched.
fn rows_from_values(values: &[Vec<String>]) -> Result<Vec<SheetRow>, SheetsError> {
    let Some((header, data)) = values.split_first() else {
        return Ok(Vec::new());
    };

    let rows: Vec<SheetRow> = data
        .iter()
        .map(|cells| SheetRow::from_cells(header, cells))
        .filter(|row| !row.is_blank())
        .collect();

    if !(is_blank_row(header) && rows.is_empty()) {
        key_column(header)?;
    }
    Ok(rows)
}

/// Cells to append, laid out in the sheet's column order. An empty sheet gets
/// the canonical header first.
fn append_values(header: &[String], rows: &[SheetRow]) -> Result<Vec<Vec<String>>, SheetsError> {
    if is_blank_row(header) {
        let canonical: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        let mut values = Vec::with_capacity(rows.len() + 1);
        values.extend(rows.iter().map(|row| row.to_cells(&canonical)));
        values.insert(0, canonical);
        return Ok(values);
    }

    key_column(header)?;
    Ok(rows.iter().map(|row| row.to_cells(header)).collect())
}

/// Pairs each update with the 1-based sheet row holding its key. `values[0]`
/// is sheet row 1. The first row with a given key wins.
fn locate_rows<'a>(
    values: &[Vec<String>],
    rows: &'a [SheetRow],
) -> Result<Vec<(usize, &'a SheetRow)>, SheetsError> {
    let not_found =
        |row: &SheetRow| SheetsError::RowNotFound(row.key().unwrap_or_default().to_string());

    let Some(header) = values.first() else {
        return Err(rows.first().map(not_found).unwrap_or(SheetsError::MissingKeyColumn));
    };
    let key_index = key_column(header)?;

    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, cells) in values.iter().enumerate().skip(1) {
        if let Some(key) = cells.get(key_index).map(|c| c.trim()).filter(|k| !k.is_empty()) {
            positions.entry(key).or_insert(index + 1);
        }
    }

    rows.iter()
        .map(|row| {
            row.key()
                .and_then(|key| positions.get(key))
                .map(|&sheet_row| (sheet_row, row))
                .ok_or_else(|| not_found(row))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SheetsBackend;
    use std::io::Write;

    fn settings(credential: Option<SheetsCredential>) -> SheetsSettings {
        SheetsSettings {
            backend: SheetsBackend::Google,
            spreadsheet_id: Some("sheet-123".into()),
            sheet_name: "user data".into(),
            credential,
            api_base: "https://sheets.example.test/".into(),
            timeout: Duration::from_secs(2),
            max_retries: 0,
        }
    }

    #[test]
    fn ranges_are_quoted_and_url_encoded() {
        let client = GoogleSheetsClient::new("sheet-123".into(), &settings(None)).unwrap();
        assert_eq!(client.range("A1:ZZ"), "'user data'!A1:ZZ");
        assert_eq!(
            client.values_url("A1"),
            "https://sheets.example.test/v4/spreadsheets/sheet-123/values/%27user%20data%27%21A1"
        );
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let body = r#"{"error":{"code":403,"message":"The caller does not have permission"}}"#;
        assert_eq!(
            status_error(StatusCode::FORBIDDEN, body),
            SheetsError::Authorization("403 The caller does not have permission".into())
        );
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "not json"),
            SheetsError::InvalidResponse(ref m) if m == "400 Bad Request"
        ));
    }

    #[test]
    fn cells_render_as_text() {
        assert_eq!(cell_text(&serde_json::json!("abc")), "abc");
        assert_eq!(cell_text(&serde_json::json!(42)), "42");
        assert_eq!(cell_text(&serde_json::Value::Null), "");
    }

    #[tokio::test]
    async fn missing_credential_is_an_authorization_error() {
        let client = GoogleSheetsClient::new("sheet-123".into(), &settings(None)).unwrap();
        let err = client.access_token().await.unwrap_err();
        assert!(matches!(err, SheetsError::Authorization(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn static_token_is_used_as_is() {
        let client = GoogleSheetsClient::new(
            "sheet-123".into(),
            &settings(Some(SheetsCredential::AccessToken("ya29.test".into()))),
        )
        .unwrap();
        assert_eq!(client.access_token().await.unwrap(), "ya29.test");
    }

    #[test]
    fn invalid_service_account_key_is_rejected_without_leaking_it() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{"client_email":"svc@example.iam.gserviceaccount.com","private_key":"{}"}}"#,
            "SUPER-SECRET-NOT-PEM"
        )
        .expect("write");

        let result = GoogleSheetsClient::new(
            "sheet-123".into(),
            &settings(Some(SheetsCredential::ServiceAccountFile(
                file.path().display().to_string(),
            ))),
        );
        let err = match result {
            Ok(_) => panic!("expected key to be rejected"),
            Err(e) => e,
        };
        assert!(matches!(err, SheetsError::Authorization(_)));
        assert!(!err.to_string().contains("SUPER-SECRET"));
    }

    #[test]
    fn missing_key_file_is_an_authorization_error() {
        let result = GoogleSheetsClient::new(
            "sheet-123".into(),
            &settings(Some(SheetsCredential::ServiceAccountFile(
                "/nonexistent/service-account.json".into(),
            ))),
        );
        assert!(matches!(result, Err(SheetsError::Authorization(_))));
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn row(key: &str, name: &str) -> SheetRow {
        SheetRow::new().with("user_id", key).with("name", name)
    }

    #[test]
    fn read_zips_reordered_header_and_skips_blank_rows() {
        let values = vec![
            cells(&["Name", " USER_ID ", "Age"]),
            cells(&["Ana", "u1", "30"]),
            cells(&["", " "]),
            cells(&["Bo", "u2"]),
        ];
        let rows = rows_from_values(&values).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key(), Some("u1"));
        assert_eq!(rows[0].get("age"), Some("30"));
        assert_eq!(rows[1].get("name"), Some("Bo"));
        assert_eq!(rows[1].get("age"), Some(""));

        assert!(rows_from_values(&[]).unwrap().is_empty());
    }

    #[test]
    fn header_without_key_column_is_rejected() {
        let values = vec![cells(&["name", "age"]), cells(&["Ana", "30"])];
        assert_eq!(rows_from_values(&values).unwrap_err(), SheetsError::MissingKeyColumn);
        assert_eq!(
            append_values(&cells(&["name", "age"]), &[row("u1", "Ana")]).unwrap_err(),
            SheetsError::MissingKeyColumn
        );
        assert_eq!(
            locate_rows(&values, &[row("u1", "Ana")]).unwrap_err(),
            SheetsError::MissingKeyColumn
        );
    }

    #[test]
    fn append_to_empty_sheet_writes_canonical_header_first() {
        let values = append_values(&[], &[row("u1", "Ana")]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        assert_eq!(values[1][0], "u1");
        assert_eq!(values[1][1], "Ana");
        assert_eq!(values[1].len(), HEADERS.len());
    }

    #[test]
    fn append_follows_existing_column_order() {
        let values = append_values(&cells(&["name", "user_id"]), &[row("u1", "Ana")]).unwrap();
        assert_eq!(values, vec![cells(&["Ana", "u1"])]);
    }

    #[test]
    fn updates_target_the_sheet_row_holding_each_key() {
        let values = vec![
            cells(&["name", "user_id"]),
            cells(&["Ana", "u1"]),
            cells(&["", ""]),
            cells(&["Bo", "u2"]),
        ];
        let updates = [row("u2", "Bo2"), row("u1", "Ana2")];
        let targets = locate_rows(&values, &updates).unwrap();
        assert_eq!(targets.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![4, 2]);

        let err = locate_rows(&values, &[row("ghost", "X")]).unwrap_err();
        assert_eq!(err, SheetsError::RowNotFound("ghost".into()));
    }

    #[test]
    fn batch_update_body_uses_quoted_a1_ranges() {
        let client = GoogleSheetsClient::new("sheet-123".into(), &settings(None)).unwrap();
        let header = cells(&["name", "user_id"]);
        let update = row("u1", "Ana2");
        let body = client.batch_update_body(&header, &[(2, &update)]);
        assert_eq!(
            body,
            serde_json::json!({
                "valueInputOption": "RAW",
                "data": [{
                    "range": "'user data'!A2",
                    "majorDimension": "ROWS",
                    "values": [["Ana2", "u1"]],
                }]
            })
        );
    }

    #[test]
    fn second_push_rewrites_the_same_row() {
        // First push into an empty sheet: header plus one appended row.
        let mut sheet = append_values(&[], &[row("u1", "Ana")]).unwrap();
        assert_eq!(sheet.len(), 2);

        // Second push: the key is found by the read, so it becomes an update.
        let keys: Vec<String> = rows_from_values(&sheet)
            .unwrap()
            .iter()
            .filter_map(|r| r.key().map(str::to_string))
            .collect();
        assert_eq!(keys, vec!["u1"]);

        let update = row("u1", "Ana Maria");
        let targets = locate_rows(&sheet, std::slice::from_ref(&update)).unwrap();
        for (sheet_row, r) in targets {
            let header = sheet[0].clone();
            sheet[sheet_row - 1] = r.to_cells(&header);
        }

        assert_eq!(sheet.len(), 2);
        let rows = rows_from_values(&sheet).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some("Ana Maria"));
    }
}
