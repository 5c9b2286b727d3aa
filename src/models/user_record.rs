use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::AppError;

/// Stored chatbot submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    /// Store-assigned identifier; also the insertion order
    pub id: i64,
    /// Key shared with the spreadsheet
    pub user_id: String,
    #[serde(flatten)]
    pub profile: UserProfile,
    pub insurance_risk_score: Option<f64>,
    pub diabetes_risk_score: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Demographic and lifestyle fields. Everything a sync is allowed to overwrite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub lifestyle_score: Option<f64>,
    /// current / former / never
    #[serde(default)]
    pub smoking_status: Option<String>,
    /// never / rarely / sometimes / regularly / daily
    #[serde(default)]
    pub exercise_frequency: Option<String>,
    /// unhealthy / average / healthy / very_healthy
    #[serde(default)]
    pub diet_type: Option<String>,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
}

impl UserProfile {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".to_string()));
        }
        if self.gender.trim().is_empty() {
            return Err(AppError::Validation("gender must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Body of `POST /user/`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    /// Optional sync key; generated when absent
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl CreateUserRequest {
    /// Validates the payload and resolves the sync key.
    pub fn into_parts(self) -> Result<(String, UserProfile), AppError> {
        self.profile.validate()?;
        let user_id = match self.user_id {
            Some(key) if key.trim().is_empty() => {
                return Err(AppError::Validation("user_id must not be blank".to_string()))
            }
            Some(key) => key.trim().to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok((user_id, self.profile))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RiskScores {
    pub insurance_risk_score: f64,
    pub diabetes_risk_score: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RiskScoresResponse {
    pub insurance_risk_score: f64,
    pub diabetes_risk_score: f64,
    pub model: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteUsersResponse {
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> CreateUserRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn generates_user_id_when_absent() {
        let (user_id, profile) = request(serde_json::json!({
            "name": "Ana", "age": 41, "gender": "female"
        }))
        .into_parts()
        .unwrap();
        assert!(uuid::Uuid::parse_str(&user_id).is_ok());
        assert_eq!(profile.age, 41);
        assert!(profile.medical_conditions.is_empty());
    }

    #[test]
    fn trims_supplied_user_id() {
        let (user_id, _) = request(serde_json::json!({
            "user_id": " u1 ", "name": "Ana", "age": 41, "gender": "female"
        }))
        .into_parts()
        .unwrap();
        assert_eq!(user_id, "u1");
    }

    #[test]
    fn rejects_blank_required_strings() {
        let err = request(serde_json::json!({ "name": " ", "age": 41, "gender": "female" }))
            .into_parts()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = request(serde_json::json!({
            "user_id": "", "name": "Ana", "age": 41, "gender": "female"
        }))
        .into_parts()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn negative_age_fails_to_deserialize() {
        let body = serde_json::json!({ "name": "Ana", "age": -3, "gender": "female" });
        let parsed: Result<CreateUserRequest, _> = serde_json::from_value(body);
        assert!(parsed.is_err());
    }

    #[test]
    fn record_serializes_flat() {
        let record = UserRecord {
            id: 1,
            user_id: "u1".into(),
            profile: UserProfile {
                name: "Ana".into(),
                age: 41,
                gender: "female".into(),
                ..Default::default()
            },
            insurance_risk_score: Some(12.5),
            diabetes_risk_score: Some(30.0),
            created_at: 1,
            updated_at: 1,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "Ana");
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["insurance_risk_score"], 12.5);
    }
}
