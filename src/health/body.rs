//! Body composition and energy formulas: BMI, BMR, TDEE, water and sleep targets

use super::round_to;
use crate::models::{ActivityLevel, Sex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// WHO adult BMI category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "underweight",
            BmiCategory::Normal => "normal",
            BmiCategory::Overweight => "overweight",
            BmiCategory::Obese => "obese",
        }
    }

    pub fn is_above_normal(&self) -> bool {
        matches!(self, BmiCategory::Overweight | BmiCategory::Obese)
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Climate adjustment for water targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Climate {
    Cold,
    #[default]
    Temperate,
    Hot,
}

impl Climate {
    fn water_bonus_ml(&self) -> f64 {
        match self {
            Climate::Cold => -200.0,
            Climate::Temperate => 0.0,
            Climate::Hot => 300.0,
        }
    }
}

/// Recommended nightly sleep window in hours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepRange {
    pub min: f64,
    pub max: f64,
}

impl SleepRange {
    pub fn contains(&self, hours: f64) -> bool {
        self.min <= hours && hours <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Body Mass Index in kg/m², one decimal.
///
/// Weight must be in (0, 500] kg and height in [50, 300] cm.
pub fn calc_bmi(weight_kg: f64, height_cm: f64) -> Option<f64> {
    if weight_kg <= 0.0 || weight_kg > 500.0 {
        return None;
    }
    if !(50.0..=300.0).contains(&height_cm) {
        return None;
    }

    let height_m = height_cm / 100.0;
    Some(round_to(weight_kg / (height_m * height_m), 1))
}

pub fn bmi_category(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

/// Mifflin-St Jeor basal metabolic rate in kcal/day.
///
/// Unknown sex uses the mean of the male and female equations. The result
/// never drops below 800 kcal.
pub fn calc_bmr_mifflin(
    weight_kg: f64,
    height_cm: f64,
    age_years: u32,
    sex: Option<Sex>,
) -> Option<f64> {
    if weight_kg <= 0.0 || weight_kg > 500.0 {
        return None;
    }
    if height_cm <= 0.0 || height_cm > 300.0 {
        return None;
    }
    if age_years == 0 || age_years > 120 {
        return None;
    }

    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age_years);
    let bmr = match sex {
        Some(Sex::Male) => base + 5.0,
        Some(Sex::Female) => base - 161.0,
        None => ((base + 5.0) + (base - 161.0)) / 2.0,
    };

    Some(bmr.max(800.0).round())
}

/// Total daily energy expenditure from BMR; BMR must be in [800, 5000]
pub fn estimate_tdee(bmr: f64, activity: ActivityLevel) -> Option<f64> {
    if !(800.0..=5000.0).contains(&bmr) {
        return None;
    }
    Some((bmr * activity.tdee_factor()).round())
}

/// Daily water target in ml: 35 ml/kg plus activity and climate bonuses,
/// rounded to the nearest 10 ml
pub fn calc_daily_water_target_ml(
    weight_kg: f64,
    activity: ActivityLevel,
    climate: Climate,
) -> Option<u32> {
    if weight_kg <= 0.0 {
        return None;
    }

    let target = weight_kg * 35.0 + activity.water_bonus_ml() + climate.water_bonus_ml();
    Some(((target / 10.0).round() * 10.0).max(0.0) as u32)
}

/// Age-banded nightly sleep recommendation
pub fn calc_sleep_recommendation_hours(age_years: u32) -> Option<SleepRange> {
    let (min, max) = match age_years {
        0 => return None,
        1..=13 => (9.0, 11.0),
        14..=17 => (8.0, 10.0),
        18..=64 => (7.0, 9.0),
        _ => (7.0, 8.0),
    };
    Some(SleepRange { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_normal_adult() {
        assert_eq!(calc_bmi(70.0, 175.0), Some(22.9));
        assert_eq!(bmi_category(22.9), BmiCategory::Normal);
    }

    #[test]
    fn test_bmi_rejects_unrealistic_inputs() {
        assert_eq!(calc_bmi(0.0, 175.0), None);
        assert_eq!(calc_bmi(501.0, 175.0), None);
        assert_eq!(calc_bmi(70.0, 49.0), None);
        assert_eq!(calc_bmi(70.0, 301.0), None);
    }

    #[test]
    fn test_bmi_category_boundaries() {
        assert_eq!(bmi_category(18.4), BmiCategory::Underweight);
        assert_eq!(bmi_category(18.5), BmiCategory::Normal);
        assert_eq!(bmi_category(25.0), BmiCategory::Overweight);
        assert_eq!(bmi_category(30.0), BmiCategory::Obese);
        assert!(BmiCategory::Obese.is_above_normal());
        assert!(!BmiCategory::Normal.is_above_normal());
    }

    #[test]
    fn test_bmr_by_sex() {
        // 700 + 1093.75 - 150 = 1643.75
        assert_eq!(calc_bmr_mifflin(70.0, 175.0, 30, Some(Sex::Male)), Some(1649.0));
        assert_eq!(
            calc_bmr_mifflin(70.0, 175.0, 30, Some(Sex::Female)),
            Some(1483.0)
        );
        assert_eq!(calc_bmr_mifflin(70.0, 175.0, 30, None), Some(1566.0));
    }

    #[test]
    fn test_bmr_floor_and_validation() {
        assert_eq!(calc_bmr_mifflin(30.0, 100.0, 100, Some(Sex::Female)), Some(800.0));
        assert_eq!(calc_bmr_mifflin(70.0, 175.0, 0, Some(Sex::Male)), None);
        assert_eq!(calc_bmr_mifflin(70.0, 175.0, 121, Some(Sex::Male)), None);
    }

    #[test]
    fn test_tdee() {
        assert_eq!(estimate_tdee(1649.0, ActivityLevel::Light), Some(2267.0));
        assert_eq!(estimate_tdee(1500.0, ActivityLevel::Sedentary), Some(1800.0));
        assert_eq!(estimate_tdee(700.0, ActivityLevel::Light), None);
        assert_eq!(estimate_tdee(5001.0, ActivityLevel::Light), None);
    }

    #[test]
    fn test_water_target() {
        assert_eq!(
            calc_daily_water_target_ml(70.0, ActivityLevel::Light, Climate::Temperate),
            Some(2650)
        );
        assert_eq!(
            calc_daily_water_target_ml(61.0, ActivityLevel::VeryActive, Climate::Hot),
            Some(3240)
        );
        assert_eq!(
            calc_daily_water_target_ml(0.0, ActivityLevel::Light, Climate::Temperate),
            None
        );
    }

    #[test]
    fn test_sleep_recommendation_bands() {
        assert_eq!(calc_sleep_recommendation_hours(0), None);
        assert_eq!(
            calc_sleep_recommendation_hours(10),
            Some(SleepRange { min: 9.0, max: 11.0 })
        );
        assert_eq!(
            calc_sleep_recommendation_hours(17),
            Some(SleepRange { min: 8.0, max: 10.0 })
        );
        assert_eq!(
            calc_sleep_recommendation_hours(64),
            Some(SleepRange { min: 7.0, max: 9.0 })
        );
        assert_eq!(
            calc_sleep_recommendation_hours(65),
            Some(SleepRange { min: 7.0, max: 8.0 })
        );
    }
}
