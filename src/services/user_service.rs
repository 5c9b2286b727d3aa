use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    database::Database,
    models::{RiskScores, UserProfile, UserRecord},
    utils::AppError,
};

const RECORD_COLUMNS: &str = "id, user_id, name, age, gender, email, phone, height_cm, weight_kg, \
     lifestyle_score, smoking_status, exercise_frequency, diet_type, medical_conditions, \
     insurance_risk_score, diabetes_risk_score, created_at, updated_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let conditions: String = row.get(13)?;
    let medical_conditions = serde_json::from_str(&conditions).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(UserRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        profile: UserProfile {
            name: row.get(2)?,
            age: row.get(3)?,
            gender: row.get(4)?,
            email: row.get(5)?,
            phone: row.get(6)?,
            height_cm: row.get(7)?,
            weight_kg: row.get(8)?,
            lifestyle_score: row.get(9)?,
            smoking_status: row.get(10)?,
            exercise_frequency: row.get(11)?,
            diet_type: row.get(12)?,
            medical_conditions,
        },
        insurance_risk_score: row.get(14)?,
        diabetes_risk_score: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn conditions_json(profile: &UserProfile) -> Result<String, AppError> {
    serde_json::to_string(&profile.medical_conditions)
        .map_err(|e| AppError::Persistence(format!("failed to encode medical conditions: {}", e)))
}

fn find_in(conn: &Connection, user_id: &str) -> Result<Option<UserRecord>, AppError> {
    let sql = format!("SELECT {} FROM user_records WHERE user_id = ?1", RECORD_COLUMNS);
    Ok(conn
        .query_row(&sql, params![user_id], record_from_row)
        .optional()?)
}

/// Inserts a new record. Scores are computed by the caller so the row is
/// written complete in one statement.
pub async fn create_user(
    db: &Database,
    user_id: String,
    profile: UserProfile,
    scores: RiskScores,
) -> Result<UserRecord, AppError> {
    let now = chrono::Utc::now().timestamp();
    let conditions = conditions_json(&profile)?;

    db.call(move |conn| {
        conn.execute(
            "INSERT INTO user_records (
                user_id, name, age, gender, email, phone, height_cm, weight_kg, lifestyle_score,
                smoking_status, exercise_frequency, diet_type, medical_conditions,
                insurance_risk_score, diabetes_risk_score, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
            params![
                user_id,
                profile.name,
                profile.age,
                profile.gender,
                profile.email,
                profile.phone,
                profile.height_cm,
                profile.weight_kg,
                profile.lifestyle_score,
                profile.smoking_status,
                profile.exercise_frequency,
                profile.diet_type,
                conditions,
                scores.insurance_risk_score,
                scores.diabetes_risk_score,
                now,
            ],
        )?;

        Ok(UserRecord {
            id: conn.last_insert_rowid(),
            user_id,
            profile,
            insurance_risk_score: Some(scores.insurance_risk_score),
            diabetes_risk_score: Some(scores.diabetes_risk_score),
            created_at: now,
            updated_at: now,
        })
    })
    .await
}

/// Records in insertion order. `limit = None` returns everything after `skip`.
pub async fn list_users(
    db: &Database,
    skip: u32,
    limit: Option<u32>,
) -> Result<Vec<UserRecord>, AppError> {
    db.call(move |conn| {
        let sql = format!(
            "SELECT {} FROM user_records ORDER BY id LIMIT ?1 OFFSET ?2",
            RECORD_COLUMNS
        );
        let limit = limit.map(i64::from).unwrap_or(-1);
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![limit, skip], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    })
    .await
}

pub async fn find_by_user_id(db: &Database, user_id: &str) -> Result<Option<UserRecord>, AppError> {
    let user_id = user_id.to_string();
    db.call(move |conn| find_in(conn, &user_id)).await
}

/// Replaces every field except `id`, `user_id` and `created_at`, together
/// with freshly computed scores, in a single UPDATE.
pub async fn overwrite_user(
    db: &Database,
    user_id: &str,
    profile: UserProfile,
    scores: RiskScores,
) -> Result<UserRecord, AppError> {
    let user_id = user_id.to_string();
    let now = chrono::Utc::now().timestamp();
    let conditions = conditions_json(&profile)?;

    db.call(move |conn| {
        let changed = conn.execute(
            "UPDATE user_records SET
                name = ?2, age = ?3, gender = ?4, email = ?5, phone = ?6, height_cm = ?7,
                weight_kg = ?8, lifestyle_score = ?9, smoking_status = ?10,
                exercise_frequency = ?11, diet_type = ?12, medical_conditions = ?13,
                insurance_risk_score = ?14, diabetes_risk_score = ?15, updated_at = ?16
             WHERE user_id = ?1",
            params![
                user_id,
                profile.name,
                profile.age,
                profile.gender,
                profile.email,
                profile.phone,
                profile.height_cm,
                profile.weight_kg,
                profile.lifestyle_score,
                profile.smoking_status,
                profile.exercise_frequency,
                profile.diet_type,
                conditions,
                scores.insurance_risk_score,
                scores.diabetes_risk_score,
                now,
            ],
        )?;

        if changed == 0 {
            return Err(AppError::Persistence(format!(
                "record {} disappeared during update",
                user_id
            )));
        }

        find_in(conn, &user_id)?.ok_or_else(|| {
            AppError::Persistence(format!("record {} disappeared during update", user_id))
        })
    })
    .await
}

pub async fn delete_all_users(db: &Database) -> Result<usize, AppError> {
    db.call(|conn| Ok(conn.execute("DELETE FROM user_records", [])?))
        .await
}
