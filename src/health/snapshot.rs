//! Standard health snapshot built from profile plus today's check-in

use super::{
    bmi_category, calc_bmi, calc_bmr_mifflin, calc_daily_water_target_ml,
    calc_sleep_recommendation_hours, estimate_tdee, BmiCategory, Climate, SleepRange,
    ML_PER_GLASS,
};
use crate::models::{DailyCheckIn, UserProfile};
use serde::{Deserialize, Serialize};

/// Core body metrics plus simple OK flags for sleep and hydration.
///
/// Every field is optional: a missing input leaves its dependents unset
/// instead of guessing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub bmi: Option<f64>,
    pub bmi_category: Option<BmiCategory>,
    pub bmr: Option<f64>,
    pub tdee: Option<f64>,
    pub daily_water_target_ml: Option<u32>,
    pub sleep_recommendation: Option<SleepRange>,
    /// Intake reached 80% of the water target
    pub hydration_ok: Option<bool>,
    /// Last night's sleep fell inside the recommended window
    pub sleep_ok: Option<bool>,
}

pub fn build_standard_health_snapshot(
    profile: &UserProfile,
    checkin: &DailyCheckIn,
    climate: Climate,
) -> HealthSnapshot {
    let bmi = match (profile.weight_kg, profile.height_cm) {
        (Some(w), Some(h)) => calc_bmi(w, h),
        _ => None,
    };

    let bmr = match (profile.weight_kg, profile.height_cm, profile.age) {
        (Some(w), Some(h), Some(age)) => calc_bmr_mifflin(w, h, age, profile.sex),
        _ => None,
    };
    let tdee = bmr.and_then(|b| estimate_tdee(b, profile.activity_level));

    let daily_water_target_ml = profile
        .weight_kg
        .and_then(|w| calc_daily_water_target_ml(w, profile.activity_level, climate));
    let sleep_recommendation = profile.age.and_then(calc_sleep_recommendation_hours);

    let hydration_ok = match (daily_water_target_ml, checkin.water_glasses) {
        (Some(target), Some(glasses)) => {
            Some(f64::from(glasses) * ML_PER_GLASS >= 0.8 * f64::from(target))
        }
        _ => None,
    };
    let sleep_ok = match (sleep_recommendation, checkin.sleep_hours) {
        (Some(range), Some(hours)) => Some(range.contains(hours)),
        _ => None,
    };

    HealthSnapshot {
        bmi,
        bmi_category: bmi.map(bmi_category),
        bmr,
        tdee,
        daily_water_target_ml,
        sleep_recommendation,
        hydration_ok,
        sleep_ok,
    }
}
