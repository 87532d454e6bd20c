//! Deterministic metrics stage
//!
//! No model is involved here. The report combines the standard snapshot,
//! clinical reference ranges, gap fields and the six pillar scores, plus
//! flags and notes the later stages use to prioritise.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::registry::AgentCard;
use super::{AgentContext, PipelineStage};
use crate::error::NiravaResult;
use crate::health::{
    build_standard_health_snapshot, calc_active_calorie_burn, calc_burnout_risk_score,
    calc_cardiovascular_toxin_impact, calc_dehydration_risk, calc_hydration_score,
    calc_liver_stress_indicator, calc_loneliness_risk_index, calc_mental_resilience_score,
    calc_met_score, calc_sedentary_risk_score, calc_sleep_debt, calc_sleep_quality_score,
    calc_social_wellness_score, calc_stress_load_index, calc_toxin_load_score,
    estimate_vo2_max, get_ideal_benchmarks, met_value, round_to, Climate, HealthSnapshot,
    IdealBenchmarks, RiskLevel, SleepRange, ML_PER_GLASS,
};
use crate::models::{DailyCheckIn, UserProfile};

/// Water target used when weight is unknown
pub const DEFAULT_WATER_TARGET_ML: u32 = 2000;

/// Sleep window used when age is unknown
pub const DEFAULT_SLEEP_RANGE: SleepRange = SleepRange { min: 7.0, max: 9.0 };

/// Upper bound of the normal BMI band
const BMI_NORMAL_MAX: f64 = 24.9;

/// Warning raised by a pillar score crossing its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthFlag {
    SleepQualityConcern,
    ChronicSleepDeficit,
    DehydrationWarning,
    SedentaryWarning,
    HighStressLoad,
    BurnoutWarning,
    SocialIsolationRisk,
    HighToxinExposure,
    LiverWarning,
    CardiovascularWarning,
    AlcoholWarning,
    SmokingWarning,
}

/// Distance between today's numbers and the healthy ranges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricGaps {
    /// BMI points above 24.9, only when overweight or obese
    pub bmi_gap_above_normal: Option<f64>,
    /// Hours relative to the middle of the recommended window
    pub sleep_gap_from_mid_recommendation: Option<f64>,
    /// Fraction of the water target reached, e.g. 0.6
    pub hydration_coverage_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarScores {
    pub sleep_quality_score: Option<u8>,
    pub sleep_debt_hours: Option<f64>,
    pub dehydration_risk: Option<RiskLevel>,
    pub hydration_score: Option<u8>,
    pub met_score: f64,
    pub active_calories_burned: Option<f64>,
    pub estimated_vo2_max: Option<f64>,
    pub sedentary_risk_score: u8,
    pub stress_load_index: Option<u8>,
    pub burnout_risk_score: Option<u8>,
    pub mental_resilience_score: Option<u8>,
    pub loneliness_risk: Option<RiskLevel>,
    pub social_wellness_score: Option<u8>,
    pub toxin_load_score: u8,
    pub liver_stress_indicator: RiskLevel,
    pub cardiovascular_toxin_impact: u8,
}

/// Output of the metrics stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub snapshot: HealthSnapshot,
    pub ideals: IdealBenchmarks,
    pub sleep_hours_last_night: Option<f64>,
    pub water_glasses_today: Option<u32>,
    pub approx_water_ml_today: Option<f64>,
    pub gaps: MetricGaps,
    pub pillars: PillarScores,
    pub flags: Vec<HealthFlag>,
    pub notes: Vec<String>,
}

impl MetricsReport {
    pub fn has_flag(&self, flag: HealthFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn tdee(&self) -> Option<f64> {
        self.snapshot.tdee
    }

    pub fn water_target_ml(&self) -> u32 {
        self.snapshot
            .daily_water_target_ml
            .unwrap_or(DEFAULT_WATER_TARGET_ML)
    }

    pub fn sleep_range(&self) -> SleepRange {
        self.snapshot
            .sleep_recommendation
            .unwrap_or(DEFAULT_SLEEP_RANGE)
    }
}

/// Build the full report for a profile and today's check-in
pub fn compute_report(profile: &UserProfile, checkin: &DailyCheckIn, climate: Climate) -> MetricsReport {
    let snapshot = build_standard_health_snapshot(profile, checkin, climate);
    let ideals = get_ideal_benchmarks(profile.age, profile.sex);

    let target_ml = snapshot
        .daily_water_target_ml
        .unwrap_or(DEFAULT_WATER_TARGET_ML);
    let sleep_range = snapshot.sleep_recommendation.unwrap_or(DEFAULT_SLEEP_RANGE);
    let water_ml = checkin.water_glasses.map(|g| f64::from(g) * ML_PER_GLASS);

    let gaps = MetricGaps {
        bmi_gap_above_normal: match (snapshot.bmi, snapshot.bmi_category) {
            (Some(bmi), Some(category)) if category.is_above_normal() => {
                Some(round_to(bmi - BMI_NORMAL_MAX, 1))
            }
            _ => None,
        },
        sleep_gap_from_mid_recommendation: checkin
            .sleep_hours
            .map(|hours| round_to(hours - sleep_range.midpoint(), 1)),
        hydration_coverage_ratio: water_ml.map(|ml| round_to(ml / f64::from(target_ml), 2)),
    };

    let mut flags = Vec::new();
    let mut notes = Vec::new();
    let mut flag = |f: HealthFlag, on: bool| {
        if on {
            flags.push(f);
        }
    };

    // Pillar 1: sleep
    let sleep_quality_score = checkin
        .sleep_hours
        .map(|h| calc_sleep_quality_score(h, checkin.stress_score, checkin.alcohol_units));
    flag(
        HealthFlag::SleepQualityConcern,
        sleep_quality_score.is_some_and(|s| s <= 4),
    );
    let sleep_debt_hours = checkin
        .sleep_hours
        .map(|h| calc_sleep_debt(h, sleep_range.min));
    flag(
        HealthFlag::ChronicSleepDeficit,
        sleep_debt_hours.is_some_and(|d| d > 2.0),
    );

    // Pillar 2: hydration
    let exercise_minutes = checkin.exercise_minutes.unwrap_or(0);
    let dehydration_risk =
        water_ml.and_then(|ml| calc_dehydration_risk(ml, f64::from(target_ml), exercise_minutes));
    flag(
        HealthFlag::DehydrationWarning,
        dehydration_risk == Some(RiskLevel::High),
    );
    let target_glasses = (f64::from(target_ml) / ML_PER_GLASS) as u32;
    let hydration_score = checkin
        .water_glasses
        .and_then(|g| calc_hydration_score(g, target_glasses, None));

    // Pillar 3: movement, today's minutes taken as a typical day
    let met_score = calc_met_score(exercise_minutes, checkin.exercise_type);
    let active_calories_burned = profile.weight_kg.and_then(|kg| {
        calc_active_calorie_burn(exercise_minutes, met_value(checkin.exercise_type), kg)
    });
    let estimated_vo2_max = match (profile.age, profile.sex) {
        (Some(age), Some(sex)) => {
            estimate_vo2_max(age, sex, f64::from(exercise_minutes) * 7.0, None)
        }
        _ => None,
    };
    let sedentary_risk_score = calc_sedentary_risk_score(exercise_minutes, None);
    flag(HealthFlag::SedentaryWarning, sedentary_risk_score >= 7);

    // Pillar 4: mental health
    let stress_load_index = checkin
        .stress_score
        .map(|s| calc_stress_load_index(s, checkin.sleep_hours, checkin.social_hours));
    if stress_load_index.is_some_and(|s| s >= 7) {
        flag(HealthFlag::HighStressLoad, true);
        notes.push("High stress load - risk of burnout".to_string());
    }

    let burnout_risk_score = match (checkin.stress_score, checkin.energy_score, checkin.mood_score) {
        (Some(stress), Some(energy), Some(mood)) => Some(calc_burnout_risk_score(
            stress,
            energy,
            mood,
            checkin.sleep_hours,
        )),
        _ => None,
    };
    match burnout_risk_score {
        Some(score) if score >= 7 => {
            flag(HealthFlag::BurnoutWarning, true);
            notes.push("High burnout risk detected - urgent self-care needed".to_string());
        }
        Some(score) if score >= 4 => {
            notes.push("Moderate burnout risk - monitor closely".to_string());
        }
        _ => {}
    }

    let mental_resilience_score = match (checkin.stress_score, checkin.mood_score) {
        (Some(stress), Some(mood)) => Some(calc_mental_resilience_score(
            stress,
            mood,
            checkin.social_hours,
            checkin.exercise_minutes,
        )),
        _ => None,
    };
    match mental_resilience_score {
        Some(score) if score >= 8 => notes.push("Strong mental resilience".to_string()),
        Some(score) if score <= 4 => notes.push(
            "Low resilience - focus on social connection and exercise".to_string(),
        ),
        _ => {}
    }

    // Pillar 5: social connection
    let loneliness_risk = checkin
        .social_hours
        .map(|h| calc_loneliness_risk_index(h, checkin.mood_score));
    match loneliness_risk {
        Some(RiskLevel::High) => {
            flag(HealthFlag::SocialIsolationRisk, true);
            notes.push(
                "High loneliness risk - social connection critical for health".to_string(),
            );
        }
        Some(RiskLevel::Moderate) => notes.push(
            "Moderate loneliness risk - consider increasing social time".to_string(),
        ),
        _ => {}
    }

    let social_wellness_score = checkin
        .social_hours
        .map(|h| calc_social_wellness_score(h, checkin.mood_score, checkin.stress_score));
    match social_wellness_score {
        Some(score) if score >= 8 => notes.push("Thriving socially".to_string()),
        Some(score) if score <= 4 => {
            notes.push("Social wellness concern - prioritize connection".to_string())
        }
        _ => {}
    }

    // Pillar 6: toxin avoidance
    let smoking = checkin.smoking_today.unwrap_or(false);
    let toxin_load_score = calc_toxin_load_score(checkin.alcohol_units, smoking, None);
    if toxin_load_score >= 6 {
        flag(HealthFlag::HighToxinExposure, true);
        notes.push("High toxin exposure - significant health risk".to_string());
    } else if toxin_load_score >= 3 {
        notes.push("Moderate toxin exposure - consider reduction".to_string());
    }

    let liver_stress_indicator =
        calc_liver_stress_indicator(checkin.alcohol_units.unwrap_or(0), snapshot.bmi);
    if liver_stress_indicator == RiskLevel::High {
        flag(HealthFlag::LiverWarning, true);
        notes.push(
            "High liver stress - reduce alcohol and consider medical consultation".to_string(),
        );
    }

    let cardiovascular_toxin_impact =
        calc_cardiovascular_toxin_impact(smoking, checkin.alcohol_units, checkin.stress_score);
    if cardiovascular_toxin_impact >= 7 {
        flag(HealthFlag::CardiovascularWarning, true);
        notes.push(
            "High cardiovascular risk from toxins - urgent lifestyle change needed".to_string(),
        );
    }

    flag(
        HealthFlag::AlcoholWarning,
        checkin.alcohol_units.is_some_and(|u| u > 2),
    );
    flag(HealthFlag::SmokingWarning, smoking);

    MetricsReport {
        snapshot,
        ideals,
        sleep_hours_last_night: checkin.sleep_hours,
        water_glasses_today: checkin.water_glasses,
        approx_water_ml_today: water_ml,
        gaps,
        pillars: PillarScores {
            sleep_quality_score,
            sleep_debt_hours,
            dehydration_risk,
            hydration_score,
            met_score,
            active_calories_burned,
            estimated_vo2_max,
            sedentary_risk_score,
            stress_load_index,
            burnout_risk_score,
            mental_resilience_score,
            loneliness_risk,
            social_wellness_score,
            toxin_load_score,
            liver_stress_indicator,
            cardiovascular_toxin_impact,
        },
        flags,
        notes,
    }
}

/// First pipeline stage: deterministic health calculations
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAgent {
    climate: Climate,
}

impl MetricsAgent {
    pub fn new(climate: Climate) -> Self {
        Self { climate }
    }
}

#[async_trait]
impl PipelineStage for MetricsAgent {
    fn name(&self) -> &'static str {
        "MetricsAgent"
    }

    fn card(&self) -> AgentCard {
        AgentCard::new(
            "metrics_agent",
            "Metrics Agent",
            "Deterministic health calculations across the six preventive pillars",
        )
        .with_skill("calculate_bmi", "Calculate Body Mass Index")
        .with_skill("calculate_bmr", "Calculate Basal Metabolic Rate")
        .with_skill("pillar_scores", "Score sleep, hydration, movement, mental, social and toxin pillars")
        .with_task_types(&["health_snapshot", "calculate_bmi", "pillar_scores"])
    }

    async fn run(&self, context: &mut AgentContext) -> NiravaResult<()> {
        let report = compute_report(&context.profile, &context.checkin, self.climate);
        info!(
            flags = report.flags.len(),
            bmi = ?report.snapshot.bmi,
            "Health snapshot computed"
        );
        debug!(notes = ?report.notes, "Pillar notes");
        context.metrics = Some(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::BmiCategory;
    use crate::models::Sex;

    fn profile() -> UserProfile {
        UserProfile {
            age: Some(28),
            sex: Some(Sex::Male),
            height_cm: Some(165.0),
            weight_kg: Some(60.0),
            ..Default::default()
        }
    }

    fn checkin() -> DailyCheckIn {
        DailyCheckIn {
            sleep_hours: Some(6.0),
            water_glasses: Some(4),
            mood_score: Some(3),
            energy_score: Some(2),
            stress_score: Some(7),
            exercise_minutes: Some(20),
            ..Default::default()
        }
    }

    #[test]
    fn test_report_gaps() {
        let report = compute_report(&profile(), &checkin(), Climate::Temperate);

        assert_eq!(report.snapshot.bmi_category, Some(BmiCategory::Normal));
        assert_eq!(report.gaps.bmi_gap_above_normal, None);
        assert_eq!(report.gaps.sleep_gap_from_mid_recommendation, Some(-2.0));
        assert_eq!(report.approx_water_ml_today, Some(1000.0));
        assert_eq!(report.pillars.sleep_debt_hours, Some(1.0));
        assert!(!report.has_flag(HealthFlag::ChronicSleepDeficit));
        assert!(report.pillars.estimated_vo2_max.is_some());
    }

    #[test]
    fn test_overweight_gap() {
        let mut p = profile();
        p.weight_kg = Some(80.0);
        let report = compute_report(&p, &checkin(), Climate::Temperate);
        // 80 / 1.65² = 29.4
        assert_eq!(report.gaps.bmi_gap_above_normal, Some(4.5));
    }

    #[test]
    fn test_missing_profile_uses_defaults() {
        let checkin = DailyCheckIn {
            sleep_hours: Some(5.0),
            water_glasses: Some(4),
            ..Default::default()
        };
        let report = compute_report(&UserProfile::default(), &checkin, Climate::Temperate);

        assert_eq!(report.water_target_ml(), 2000);
        assert_eq!(report.sleep_range(), DEFAULT_SLEEP_RANGE);
        assert_eq!(report.gaps.hydration_coverage_ratio, Some(0.5));
        assert_eq!(report.gaps.sleep_gap_from_mid_recommendation, Some(-3.0));
        assert_eq!(report.pillars.sleep_debt_hours, Some(2.0));
        assert_eq!(report.pillars.estimated_vo2_max, None);
        assert_eq!(report.pillars.active_calories_burned, None);
        assert_eq!(report.pillars.burnout_risk_score, None);
        assert_eq!(report.tdee(), None);
    }

    #[test]
    fn test_toxin_flags() {
        let checkin = DailyCheckIn {
            alcohol_units: Some(4),
            smoking_today: Some(true),
            ..Default::default()
        };
        let report = compute_report(&UserProfile::default(), &checkin, Climate::Temperate);

        assert!(report.has_flag(HealthFlag::AlcoholWarning));
        assert!(report.has_flag(HealthFlag::SmokingWarning));
        assert!(report.pillars.toxin_load_score >= 3);
        assert!(report.has_flag(HealthFlag::SedentaryWarning));
    }

    #[tokio::test]
    async fn test_stage_fills_context() {
        let mut context = AgentContext {
            profile: profile(),
            checkin: checkin(),
            ..Default::default()
        };
        MetricsAgent::default().run(&mut context).await.unwrap();

        let report = context.metrics.expect("metrics report");
        assert_eq!(report.snapshot.bmi, Some(22.0));
        assert_eq!(report.sleep_hours_last_night, Some(6.0));
    }
}
