use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::{config::Settings, database::Database};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub name: String,
    pub version: String,
    pub environment: String,
}

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: i64,
    /// "connected" or "unavailable"
    pub database: String,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Health",
    responses(
        (status = 200, description = "Service info", body = RootResponse)
    )
)]
pub async fn root(settings: web::Data<Settings>) -> impl Responder {
    HttpResponse::Ok().json(RootResponse {
        message: format!("{} is running", settings.app_name),
        name: settings.app_name.clone(),
        version: settings.app_version.clone(),
        environment: settings.environment.clone(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(
    settings: web::Data<Settings>,
    db: web::Data<Database>,
) -> impl Responder {
    let (status, database) = match db.ping().await {
        Ok(()) => ("healthy", "connected"),
        Err(e) => {
            log::error!("❌ Health check: database ping failed: {}", e);
            ("degraded", "unavailable")
        }
    };

    let body = HealthResponse {
        status: status.to_string(),
        service: settings.app_name.clone(),
        version: settings.app_version.clone(),
        timestamp: chrono::Utc::now().timestamp(),
        database: database.to_string(),
    };

    if database == "connected" {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
