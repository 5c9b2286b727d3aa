use actix_web::{web, HttpResponse, ResponseError};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    database::Database,
    models::{CreateUserRequest, DeleteUsersResponse},
    services::{user_service, RiskModel},
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Records to skip (default 0)
    pub skip: Option<u32>,
    /// Maximum records to return (default: all)
    pub limit: Option<u32>,
}

#[utoipa::path(
    post,
    path = "/user/",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (
            status = 201,
            description = "Record stored with computed risk scores",
            body = crate::models::UserRecord
        ),
        (status = 400, description = "Missing or invalid fields"),
        (status = 409, description = "user_id already exists"),
        (status = 500, description = "Data store failure")
    )
)]
pub async fn create_user(
    db: web::Data<Database>,
    risk: web::Data<dyn RiskModel>,
    body: web::Json<CreateUserRequest>,
) -> HttpResponse {
    let (user_id, profile) = match body.into_inner().into_parts() {
        Ok(parts) => parts,
        Err(e) => {
            log::warn!("⚠️  POST /user rejected: {}", e);
            return e.error_response();
        }
    };

    log::info!("📝 POST /user - Storing record {}", user_id);
    let scores = risk.compute(&profile);

    match user_service::create_user(&db, user_id, profile, scores).await {
        Ok(record) => {
            log::info!(
                "✅ Record {} stored (insurance {:.2}, diabetes {:.2})",
                record.user_id,
                scores.insurance_risk_score,
                scores.diabetes_risk_score
            );
            HttpResponse::Created().json(record)
        }
        Err(e) => {
            log::error!("❌ Failed to store record: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/user/",
    tag = "Users",
    params(ListUsersQuery),
    responses(
        (
            status = 200,
            description = "Records in insertion order",
            body = [crate::models::UserRecord]
        ),
        (status = 500, description = "Data store failure")
    )
)]
pub async fn list_users(
    db: web::Data<Database>,
    query: web::Query<ListUsersQuery>,
) -> HttpResponse {
    let skip = query.skip.unwrap_or(0);

    match user_service::list_users(&db, skip, query.limit).await {
        Ok(records) => {
            log::info!(
                "📋 GET /user - {} records (skip {}, limit {:?})",
                records.len(),
                skip,
                query.limit
            );
            HttpResponse::Ok().json(records)
        }
        Err(e) => {
            log::error!("❌ Failed to list records: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/user/",
    tag = "Users",
    responses(
        (status = 200, description = "Every record deleted", body = DeleteUsersResponse),
        (status = 500, description = "Data store failure")
    )
)]
pub async fn delete_users(db: web::Data<Database>) -> HttpResponse {
    match user_service::delete_all_users(&db).await {
        Ok(deleted) => {
            log::warn!("🗑️  DELETE /user - {} records deleted", deleted);
            HttpResponse::Ok().json(DeleteUsersResponse { deleted })
        }
        Err(e) => {
            log::error!("❌ Failed to delete records: {}", e);
            e.error_response()
        }
    }
}
