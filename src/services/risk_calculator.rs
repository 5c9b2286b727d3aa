use crate::models::{RiskScores, UserProfile};

/// Pluggable scoring strategy. Implementations must be deterministic and
/// return both scores within `0..=100` for every profile.
pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;
    fn compute(&self, profile: &UserProfile) -> RiskScores;
}

const INSURANCE_WEIGHTS: InsuranceWeights = InsuranceWeights {
    age: 0.2,
    bmi: 0.15,
    smoking: 0.25,
    exercise: 0.15,
    medical_history: 0.25,
};

const DIABETES_WEIGHTS: DiabetesWeights = DiabetesWeights {
    age: 0.15,
    bmi: 0.2,
    family_history: 0.25,
    exercise: 0.2,
    diet: 0.2,
};

/// Risk for unknown or missing answers
const NEUTRAL_RISK: f64 = 0.5;

struct InsuranceWeights {
    age: f64,
    bmi: f64,
    smoking: f64,
    exercise: f64,
    medical_history: f64,
}

struct DiabetesWeights {
    age: f64,
    bmi: f64,
    family_history: f64,
    exercise: f64,
    diet: f64,
}

/// Placeholder weighted-factor model. Each factor maps to `0..=1`, the
/// weighted sum is clamped and scaled to `0..=100`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRiskModel;

impl RiskModel for WeightedRiskModel {
    fn name(&self) -> &str {
        "weighted-v1"
    }

    fn compute(&self, profile: &UserProfile) -> RiskScores {
        let bmi = bmi_risk(profile.height_cm, profile.weight_kg);
        let exercise = exercise_risk(profile.exercise_frequency.as_deref());

        let insurance = age_risk(profile.age, false) * INSURANCE_WEIGHTS.age
            + bmi * INSURANCE_WEIGHTS.bmi
            + smoking_risk(profile.smoking_status.as_deref()) * INSURANCE_WEIGHTS.smoking
            + exercise * INSURANCE_WEIGHTS.exercise
            + medical_risk(&profile.medical_conditions) * INSURANCE_WEIGHTS.medical_history;

        let diabetes = age_risk(profile.age, true) * DIABETES_WEIGHTS.age
            + bmi * DIABETES_WEIGHTS.bmi
            + family_risk(&profile.medical_conditions) * DIABETES_WEIGHTS.family_history
            + exercise * DIABETES_WEIGHTS.exercise
            + diet_risk(profile.diet_type.as_deref()) * DIABETES_WEIGHTS.diet;

        RiskScores {
            insurance_risk_score: to_score(insurance),
            diabetes_risk_score: to_score(diabetes),
        }
    }
}

fn to_score(raw: f64) -> f64 {
    let clamped = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { NEUTRAL_RISK };
    (clamped * 10_000.0).round() / 100.0
}

fn age_risk(age: u32, diabetes_context: bool) -> f64 {
    let (high, mid, low) = if diabetes_context { (65, 45, 35) } else { (70, 50, 30) };
    if age > high {
        1.0
    } else if age > mid {
        0.7
    } else if age > low {
        0.4
    } else {
        0.2
    }
}

fn bmi_risk(height_cm: Option<f64>, weight_kg: Option<f64>) -> f64 {
    let (Some(height_cm), Some(weight_kg)) = (height_cm, weight_kg) else {
        return NEUTRAL_RISK;
    };
    if !height_cm.is_finite() || !weight_kg.is_finite() || height_cm <= 0.0 || weight_kg <= 0.0 {
        return NEUTRAL_RISK;
    }

    let height_m = height_cm / 100.0;
    let bmi = weight_kg / (height_m * height_m);
    if bmi > 35.0 {
        1.0
    } else if bmi > 30.0 {
        0.8
    } else if bmi > 25.0 {
        0.6
    } else if bmi < 18.5 {
        0.4
    } else {
        0.2
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase().replace([' ', '-'], "_"))
        .filter(|v| !v.is_empty())
}

fn smoking_risk(status: Option<&str>) -> f64 {
    match normalized(status).as_deref() {
        Some("current") => 1.0,
        Some("former") => 0.6,
        Some("never") => 0.1,
        _ => NEUTRAL_RISK,
    }
}

fn exercise_risk(frequency: Option<&str>) -> f64 {
    match normalized(frequency).as_deref() {
        Some("never") => 1.0,
        Some("rarely") => 0.8,
        Some("sometimes") => 0.6,
        Some("regularly") => 0.3,
        Some("daily") => 0.1,
        _ => NEUTRAL_RISK,
    }
}

fn diet_risk(diet: Option<&str>) -> f64 {
    match normalized(diet).as_deref() {
        Some("unhealthy") => 1.0,
        Some("average") => 0.5,
        Some("healthy") => 0.2,
        Some("very_healthy") => 0.1,
        _ => NEUTRAL_RISK,
    }
}

fn medical_risk(conditions: &[String]) -> f64 {
    let risk = conditions.iter().fold(0.3_f64, |acc, condition| {
        match normalized(Some(condition.as_str())).as_deref() {
            Some("heart_disease" | "diabetes" | "cancer") => acc + 0.3,
            Some("hypertension" | "high_cholesterol") => acc + 0.15,
            _ => acc,
        }
    });
    risk.min(1.0)
}

fn family_risk(conditions: &[String]) -> f64 {
    let names: Vec<String> = conditions
        .iter()
        .filter_map(|c| normalized(Some(c.as_str())))
        .collect();

    let mut risk = 0.2;
    if names.iter().any(|c| c == "diabetes") {
        risk += 0.4;
    }
    if names.iter().any(|c| c == "heart_disease") {
        risk += 0.2;
    }
    f64::min(risk, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(age: u32) -> UserProfile {
        UserProfile {
            name: "Test".into(),
            age,
            gender: "other".into(),
            ..Default::default()
        }
    }

    fn in_range(scores: RiskScores) -> bool {
        (0.0..=100.0).contains(&scores.insurance_risk_score)
            && (0.0..=100.0).contains(&scores.diabetes_risk_score)
    }

    #[test]
    fn same_input_same_output() {
        let model = WeightedRiskModel;
        let mut p = profile(52);
        p.height_cm = Some(172.0);
        p.weight_kg = Some(91.0);
        p.smoking_status = Some("former".into());
        p.medical_conditions = vec!["Hypertension".into()];

        assert_eq!(model.compute(&p), model.compute(&p.clone()));
    }

    #[test]
    fn scores_stay_bounded_for_extreme_inputs() {
        let model = WeightedRiskModel;

        let mut worst = profile(u32::MAX);
        worst.height_cm = Some(120.0);
        worst.weight_kg = Some(250.0);
        worst.smoking_status = Some("current".into());
        worst.exercise_frequency = Some("never".into());
        worst.diet_type = Some("unhealthy".into());
        worst.medical_conditions = vec!["diabetes".into(), "heart disease".into(), "cancer".into()];

        let mut odd = profile(0);
        odd.height_cm = Some(f64::NAN);
        odd.weight_kg = Some(-10.0);
        odd.smoking_status = Some("".into());

        let mut infinite = profile(30);
        infinite.height_cm = Some(f64::INFINITY);
        infinite.weight_kg = Some(f64::INFINITY);

        for p in [worst, odd, infinite, profile(30)] {
            assert!(in_range(model.compute(&p)), "out of range for {:?}", p);
        }
    }

    #[test]
    fn healthier_profile_scores_lower() {
        let model = WeightedRiskModel;

        let mut healthy = profile(25);
        healthy.height_cm = Some(180.0);
        healthy.weight_kg = Some(72.0);
        healthy.smoking_status = Some("never".into());
        healthy.exercise_frequency = Some("daily".into());
        healthy.diet_type = Some("very healthy".into());

        let mut risky = profile(68);
        risky.height_cm = Some(165.0);
        risky.weight_kg = Some(110.0);
        risky.smoking_status = Some("Current".into());
        risky.exercise_frequency = Some("never".into());
        risky.diet_type = Some("unhealthy".into());
        risky.medical_conditions = vec!["diabetes".into()];

        let h = model.compute(&healthy);
        let r = model.compute(&risky);
        assert!(h.insurance_risk_score < r.insurance_risk_score);
        assert!(h.diabetes_risk_score < r.diabetes_risk_score);
    }

    #[test]
    fn known_profile_matches_weighted_sum() {
        // age 30 -> 0.2 / 0.2, bmi missing -> 0.5, everything else neutral or base
        let scores = WeightedRiskModel.compute(&profile(30));
        // 0.2*0.2 + 0.5*0.15 + 0.5*0.25 + 0.5*0.15 + 0.3*0.25 = 0.39
        assert_eq!(scores.insurance_risk_score, 39.0);
        // 0.2*0.15 + 0.5*0.2 + 0.2*0.25 + 0.5*0.2 + 0.5*0.2 = 0.38
        assert_eq!(scores.diabetes_risk_score, 38.0);
    }
}
