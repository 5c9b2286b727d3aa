mod api;
mod config;
mod database;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Settings, SheetsBackend, SheetsSettings};
use crate::services::{
    sheets::{GoogleSheetsClient, InMemorySheetsClient, SheetsClient, SheetsError},
    RiskModel, SyncService, WeightedRiskModel,
};

fn build_sheets_client(settings: &SheetsSettings) -> Result<Arc<dyn SheetsClient>, SheetsError> {
    match (settings.backend, settings.spreadsheet_id.as_ref()) {
        (SheetsBackend::Memory, _) => {
            log::info!("📄 Spreadsheet: in-memory (SHEETS_BACKEND=memory)");
            Ok(Arc::new(InMemorySheetsClient::new()))
        }
        (SheetsBackend::Google, None) => {
            log::warn!("⚠️  GOOGLE_SHEET_ID not set, using an in-memory spreadsheet");
            Ok(Arc::new(InMemorySheetsClient::new()))
        }
        (SheetsBackend::Google, Some(id)) => {
            log::info!("📄 Spreadsheet: Google Sheets '{}' (tab '{}')", id, settings.sheet_name);
            Ok(Arc::new(GoogleSheetsClient::new(id.clone(), settings)?))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings =
        Settings::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    log::info!(
        "🚀 Starting {} v{} ({})",
        settings.app_name,
        settings.app_version,
        settings.environment
    );
    log::info!("📊 Database: {}", settings.database_url);

    let db = database::Database::open(&settings.database_url)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    log::info!("✅ Database ready");

    let sheets = build_sheets_client(&settings.sheets)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let risk: Arc<dyn RiskModel> = Arc::new(WeightedRiskModel);
    log::info!("🧮 Risk model: {}", risk.name());

    let db_data = web::Data::new(db.clone());
    let sync_data = web::Data::new(SyncService::new(db, sheets, Arc::clone(&risk)));
    let risk_data: web::Data<dyn RiskModel> = web::Data::from(risk);
    let settings_data = web::Data::new(settings.clone());

    let host = settings.host.clone();
    let port = settings.port;

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", host, port);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(sync_data.clone())
            .app_data(risk_data.clone())
            .app_data(settings_data.clone())
            .wrap(cors)
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            .configure(api::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
