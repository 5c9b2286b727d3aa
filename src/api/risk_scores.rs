use actix_web::{web, HttpResponse, ResponseError};

use crate::{
    models::{RiskScoresResponse, UserProfile},
    services::RiskModel,
};

/// Scores an ad-hoc profile. Nothing is stored.
#[utoipa::path(
    post,
    path = "/risk_scores/",
    tag = "Risk",
    request_body = UserProfile,
    responses(
        (status = 200, description = "Computed scores", body = RiskScoresResponse),
        (status = 400, description = "Missing or invalid fields")
    )
)]
pub async fn compute_risk_scores(
    risk: web::Data<dyn RiskModel>,
    body: web::Json<UserProfile>,
) -> HttpResponse {
    let profile = body.into_inner();
    if let Err(e) = profile.validate() {
        log::warn!("⚠️  POST /risk_scores rejected: {}", e);
        return e.error_response();
    }

    let scores = risk.compute(&profile);
    log::debug!("🧮 {} scored age {}: {:?}", risk.name(), profile.age, scores);

    HttpResponse::Ok().json(RiskScoresResponse {
        insurance_risk_score: scores.insurance_risk_score,
        diabetes_risk_score: scores.diabetes_risk_score,
        model: risk.name().to_string(),
    })
}
