pub mod health;
pub mod risk_scores;
pub mod swagger;
pub mod sync;
pub mod users;

use actix_web::web;

use crate::utils::AppError;

/// Registers every route. Shared by the server and the endpoint tests, so the
/// shared state (`Database`, `SyncService`, `dyn RiskModel`, `Settings`) must
/// be added by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        log::warn!("⚠️  Rejected request body: {}", err);
        AppError::Validation(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        log::warn!("⚠️  Rejected query string: {}", err);
        AppError::Validation(err.to_string()).into()
    }))
    .route("/", web::get().to(health::root))
    .route("/health", web::get().to(health::health_check))
    // Records
    .service(
        web::resource(["/user", "/user/"])
            .route(web::post().to(users::create_user))
            .route(web::get().to(users::list_users))
            .route(web::delete().to(users::delete_users)),
    )
    // Risk
    .service(
        web::resource(["/risk_scores", "/risk_scores/"])
            .route(web::post().to(risk_scores::compute_risk_scores)),
    )
    // Sync: the bare resource must be registered before the scope
    .service(
        web::resource(["/sync", "/sync/"]).route(web::post().to(sync::sync_bidirectional)),
    )
    .service(
        web::scope("/sync")
            .route("/test_connection", web::get().to(sync::test_connection))
            .route("/to_sheets", web::post().to(sync::sync_to_sheets))
            .route("/from_sheets", web::post().to(sync::sync_from_sheets))
            .route("/status", web::get().to(sync::sync_status))
            .route("/history", web::get().to(sync::sync_history)),
    );
}
