//! Scores for the six preventive pillars
//!
//! Most scores start from a neutral base and add or subtract points per
//! factor, then clamp onto 1-10. Thresholds follow common clinical rules of
//! thumb (AASM, ACSM, APA, AHA).

use super::{clamp_score, round_to, RiskLevel};
use crate::models::{ExerciseType, Sex};

// ---- Pillar 1: sleep ----

/// Sleep efficiency percentage, capped at 100
pub fn calc_sleep_efficiency(actual_sleep_hours: f64, time_in_bed_hours: f64) -> Option<f64> {
    if actual_sleep_hours <= 0.0 || time_in_bed_hours <= 0.0 {
        return None;
    }
    if actual_sleep_hours > time_in_bed_hours {
        return Some(100.0);
    }
    Some(round_to(actual_sleep_hours / time_in_bed_hours * 100.0, 1))
}

/// Hours short of the recommended minimum; negative means surplus
pub fn calc_sleep_debt(sleep_hours: f64, recommended_min: f64) -> f64 {
    round_to(recommended_min - sleep_hours, 1)
}

/// Sleep quality 1-10 from duration, stress and alcohol
pub fn calc_sleep_quality_score(
    sleep_hours: f64,
    stress_score: Option<u8>,
    alcohol_units: Option<u32>,
) -> u8 {
    let mut score = 5;

    if (7.0..=9.0).contains(&sleep_hours) {
        score += 3;
    } else if (6.0..7.0).contains(&sleep_hours) || (sleep_hours > 9.0 && sleep_hours <= 10.0) {
        score += 1;
    } else if sleep_hours < 5.0 {
        score -= 2;
    }

    match stress_score {
        Some(s) if s <= 3 => score += 2,
        Some(s) if s >= 7 => score -= 2,
        _ => {}
    }

    if let Some(units) = alcohol_units.filter(|u| *u > 0) {
        score -= units.min(3) as i32;
    }

    clamp_score(score)
}

// ---- Pillar 2: hydration ----

/// Dehydration risk from intake coverage and exercise load
pub fn calc_dehydration_risk(water_ml: f64, target_ml: f64, exercise_minutes: u32) -> Option<RiskLevel> {
    if target_ml <= 0.0 {
        return None;
    }

    let coverage = water_ml / target_ml;
    let risk = if coverage >= 0.8 && exercise_minutes < 60 {
        RiskLevel::Low
    } else if coverage >= 0.5 {
        if exercise_minutes > 90 {
            RiskLevel::High
        } else {
            RiskLevel::Moderate
        }
    } else {
        RiskLevel::High
    };
    Some(risk)
}

/// Hydration 1-10 from glasses against target, nudged by urine frequency
pub fn calc_hydration_score(
    water_glasses: u32,
    target_glasses: u32,
    urine_frequency: Option<u32>,
) -> Option<u8> {
    if target_glasses == 0 {
        return None;
    }

    let ratio = f64::from(water_glasses) / f64::from(target_glasses);
    let mut score: u8 = if ratio >= 0.9 {
        10
    } else if ratio >= 0.8 {
        8
    } else if ratio >= 0.6 {
        6
    } else if ratio >= 0.4 {
        4
    } else {
        2
    };

    match urine_frequency {
        Some(f) if (4..=7).contains(&f) => score = (score + 1).min(10),
        Some(f) if f < 3 => score = score.saturating_sub(2).max(1),
        _ => {}
    }

    Some(score)
}

// ---- Pillar 3: movement ----

/// Metabolic equivalent of the activity; unknown type counts as light activity
pub fn met_value(exercise_type: Option<ExerciseType>) -> f64 {
    match exercise_type {
        Some(ExerciseType::Cardio) => 6.0,
        Some(ExerciseType::Strength) => 4.5,
        Some(ExerciseType::Both) => 5.5,
        Some(ExerciseType::None) => 0.0,
        None => 3.5,
    }
}

/// MET-minutes for the day
pub fn calc_met_score(exercise_minutes: u32, exercise_type: Option<ExerciseType>) -> f64 {
    if exercise_minutes == 0 {
        return 0.0;
    }
    round_to(f64::from(exercise_minutes) * met_value(exercise_type), 1)
}

/// Non-exercise VO2 max estimate in ml/kg/min, clamped to 20-80
pub fn estimate_vo2_max(
    age: u32,
    sex: Sex,
    exercise_minutes_weekly: f64,
    resting_hr: Option<u32>,
) -> Option<f64> {
    if age == 0 {
        return None;
    }

    let age = f64::from(age);
    let base = match sex {
        Sex::Male => 60.0 - 0.6 * age,
        Sex::Female => 48.0 - 0.5 * age,
    };
    let activity_factor = exercise_minutes_weekly / 150.0 * 5.0;
    let hr_adjustment = (75.0 - f64::from(resting_hr.unwrap_or(70))) * 0.1;

    Some(round_to((base + activity_factor + hr_adjustment).clamp(20.0, 80.0), 1))
}

/// Calories burned: MET × kg × hours
pub fn calc_active_calorie_burn(exercise_minutes: u32, met: f64, weight_kg: f64) -> Option<f64> {
    if exercise_minutes == 0 || met <= 0.0 || weight_kg <= 0.0 {
        return None;
    }
    Some((met * weight_kg * f64::from(exercise_minutes) / 60.0).round())
}

/// Sedentary lifestyle risk 1-10; sitting defaults to 8 hours
pub fn calc_sedentary_risk_score(exercise_minutes_daily: u32, sitting_hours: Option<f64>) -> u8 {
    let sitting = sitting_hours.unwrap_or(8.0);
    let mut risk = 5;

    if exercise_minutes_daily >= 60 {
        risk -= 3;
    } else if exercise_minutes_daily >= 30 {
        risk -= 1;
    } else {
        risk += 2;
    }

    if sitting >= 10.0 {
        risk += 3;
    } else if sitting >= 8.0 {
        risk += 1;
    } else if sitting <= 5.0 {
        risk -= 1;
    }

    clamp_score(risk)
}

// ---- Pillar 4: mental health ----

/// Stress amplified by short sleep and buffered by social time
pub fn calc_stress_load_index(
    stress_score: u8,
    sleep_hours: Option<f64>,
    social_hours: Option<f64>,
) -> u8 {
    let mut load = i32::from(stress_score);

    match sleep_hours {
        Some(h) if h < 6.0 => load += 2,
        Some(h) if h >= 8.0 => load -= 1,
        _ => {}
    }

    match social_hours {
        Some(h) if h >= 2.0 => load -= 2,
        Some(h) if h < 0.5 => load += 1,
        _ => {}
    }

    clamp_score(load)
}

/// Burnout risk 1-10 from stress, energy depletion, mood and sleep
pub fn calc_burnout_risk_score(
    stress_score: u8,
    energy_score: u8,
    mood_score: u8,
    sleep_hours: Option<f64>,
) -> u8 {
    let mut risk = 0;

    if stress_score >= 7 {
        risk += 4;
    } else if stress_score >= 5 {
        risk += 2;
    }

    if energy_score <= 2 {
        risk += 3;
    } else if energy_score <= 3 {
        risk += 1;
    }

    if mood_score <= 2 {
        risk += 2;
    }

    if sleep_hours.is_some_and(|h| h < 6.0) {
        risk += 1;
    }

    clamp_score(risk)
}

/// Resilience 1-10 from mood, stress, social support and exercise
pub fn calc_mental_resilience_score(
    stress_score: u8,
    mood_score: u8,
    social_hours: Option<f64>,
    exercise_minutes: Option<u32>,
) -> u8 {
    let mut resilience = 5;

    if mood_score >= 4 {
        resilience += 2;
    } else if mood_score <= 2 {
        resilience -= 2;
    }

    if stress_score <= 3 {
        resilience += 2;
    } else if stress_score >= 7 {
        resilience -= 2;
    }

    match social_hours {
        Some(h) if h >= 2.0 => resilience += 2,
        Some(h) if h < 0.5 => resilience -= 1,
        _ => {}
    }

    if exercise_minutes.is_some_and(|m| m >= 30) {
        resilience += 1;
    }

    clamp_score(resilience)
}

// ---- Pillar 5: social connection ----

/// Loneliness risk from daily social time, one step worse with low mood
pub fn calc_loneliness_risk_index(social_hours: f64, mood_score: Option<u8>) -> RiskLevel {
    let risk = if social_hours < 0.5 {
        RiskLevel::High
    } else if social_hours < 1.5 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    if mood_score.is_some_and(|m| m <= 2) {
        risk.escalate()
    } else {
        risk
    }
}

pub fn calc_social_wellness_score(
    social_hours: f64,
    mood_score: Option<u8>,
    stress_score: Option<u8>,
) -> u8 {
    let mut score = 5;

    if social_hours >= 2.0 {
        score += 3;
    } else if social_hours >= 1.0 {
        score += 1;
    } else if social_hours < 0.5 {
        score -= 2;
    }

    match mood_score {
        Some(m) if m >= 4 => score += 2,
        Some(m) if m <= 2 => score -= 2,
        _ => {}
    }

    match stress_score {
        Some(s) if s <= 3 => score += 1,
        Some(s) if s >= 7 => score -= 1,
        _ => {}
    }

    clamp_score(score)
}

// ---- Pillar 6: toxin avoidance ----

/// Toxin exposure 0-10 (higher is worse)
pub fn calc_toxin_load_score(
    alcohol_units: Option<u32>,
    smoking_today: bool,
    processed_food_servings: Option<u32>,
) -> u8 {
    let mut load: u32 = match alcohol_units {
        None | Some(0) => 0,
        Some(1) => 1,
        Some(2) => 2,
        Some(units) => units.min(6),
    };

    if smoking_today {
        load += 4;
    }

    match processed_food_servings {
        Some(s) if s > 3 => load += 2,
        Some(s) if s > 1 => load += 1,
        _ => {}
    }

    load.min(10) as u8
}

/// Liver stress from alcohol, one step worse with a BMI of 30 or more
pub fn calc_liver_stress_indicator(alcohol_units: u32, bmi: Option<f64>) -> RiskLevel {
    let risk = match alcohol_units {
        0..=2 => RiskLevel::Low,
        3..=4 => RiskLevel::Moderate,
        _ => RiskLevel::High,
    };

    if bmi.is_some_and(|b| b >= 30.0) {
        risk.escalate()
    } else {
        risk
    }
}

/// Cardiovascular impact 1-10 of smoking and alcohol, amplified by stress
pub fn calc_cardiovascular_toxin_impact(
    smoking_today: bool,
    alcohol_units: Option<u32>,
    stress_score: Option<u8>,
) -> u8 {
    let mut impact: u32 = 1;

    if smoking_today {
        impact += 5;
    }

    match alcohol_units {
        Some(u) if u > 3 => impact += 3,
        Some(u) if u > 1 => impact += 1,
        _ => {}
    }

    if stress_score.is_some_and(|s| s >= 7) {
        impact += 1;
    }

    impact.min(10) as u8
}
