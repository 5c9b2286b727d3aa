use actix_web::{web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    database::Database,
    models::{SyncDirection, SyncState},
    services::{sync_log_service, SyncError, SyncService},
    utils::AppError,
};

const DEFAULT_HISTORY: u32 = 20;
const MAX_HISTORY: u32 = 200;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Entries to return, newest first (default 20, max 200)
    pub limit: Option<u32>,
}

/// Successful syncs return the final state. Failed ones use the cause's
/// status code and carry the recorded state under `sync`.
fn sync_response(result: Result<SyncState, SyncError>) -> HttpResponse {
    match result {
        Ok(state) => HttpResponse::Ok().json(state),
        Err(SyncError::InProgress) => AppError::SyncInProgress.error_response(),
        Err(SyncError::Failed { state, cause }) => {
            HttpResponse::build(cause.status_code()).json(serde_json::json!({
                "success": false,
                "kind": cause.kind(),
                "error": cause.public_message(),
                "sync": state
            }))
        }
    }
}

async fn run(sync: &SyncService, direction: SyncDirection) -> HttpResponse {
    log::info!("🔄 Sync requested: {}", direction);
    sync_response(sync.run(direction).await)
}

#[utoipa::path(
    get,
    path = "/sync/test_connection",
    tag = "Sync",
    responses(
        (
            status = 200,
            description = "Reachability of the configured spreadsheet",
            body = ConnectionResponse
        )
    )
)]
pub async fn test_connection(sync: web::Data<SyncService>) -> HttpResponse {
    let response = match sync.sheets().test_connection().await {
        Ok(connected) => ConnectionResponse {
            connected,
            error: None,
        },
        Err(e) => {
            log::warn!("⚠️  Spreadsheet connection test failed: {}", e);
            ConnectionResponse {
                connected: false,
                error: Some(AppError::from(e).public_message()),
            }
        }
    };
    HttpResponse::Ok().json(response)
}

#[utoipa::path(
    post,
    path = "/sync/to_sheets",
    tag = "Sync",
    responses(
        (status = 200, description = "Store pushed to the spreadsheet", body = SyncState),
        (status = 409, description = "Another sync is running"),
        (status = 500, description = "Data store failure; body carries the failed state"),
        (status = 502, description = "Spreadsheet failure; body carries the failed state")
    )
)]
pub async fn sync_to_sheets(sync: web::Data<SyncService>) -> HttpResponse {
    run(&sync, SyncDirection::ToSheets).await
}

#[utoipa::path(
    post,
    path = "/sync/from_sheets",
    tag = "Sync",
    responses(
        (status = 200, description = "Spreadsheet pulled into the store", body = SyncState),
        (status = 409, description = "Another sync is running"),
        (status = 500, description = "Data store failure; body carries the failed state"),
        (
            status = 502,
            description = "Spreadsheet failure or invalid row; body carries the failed state"
        )
    )
)]
pub async fn sync_from_sheets(sync: web::Data<SyncService>) -> HttpResponse {
    run(&sync, SyncDirection::FromSheets).await
}

#[utoipa::path(
    post,
    path = "/sync/",
    tag = "Sync",
    responses(
        (status = 200, description = "Spreadsheet pulled, then store pushed", body = SyncState),
        (status = 409, description = "Another sync is running"),
        (status = 500, description = "Data store failure; body carries the failed state"),
        (status = 502, description = "Spreadsheet failure; body carries the failed state")
    )
)]
pub async fn sync_bidirectional(sync: web::Data<SyncService>) -> HttpResponse {
    run(&sync, SyncDirection::Bidirectional).await
}

#[utoipa::path(
    get,
    path = "/sync/status",
    tag = "Sync",
    responses(
        (status = 200, description = "Latest sync attempt, or idle", body = SyncState)
    )
)]
pub async fn sync_status(sync: web::Data<SyncService>) -> HttpResponse {
    HttpResponse::Ok().json(sync.status())
}

#[utoipa::path(
    get,
    path = "/sync/history",
    tag = "Sync",
    params(HistoryQuery),
    responses(
        (
            status = 200,
            description = "Finished syncs, newest first",
            body = [crate::models::SyncLogEntry]
        ),
        (status = 500, description = "Data store failure")
    )
)]
pub async fn sync_history(
    db: web::Data<Database>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY).min(MAX_HISTORY);

    match sync_log_service::recent_syncs(&db, limit).await {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(e) => {
            log::error!("❌ Failed to read sync history: {}", e);
            e.error_response()
        }
    }
}
