//! Today's self-reported wellness signals
//!
//! Signals map onto six preventive pillars: sleep, hydration, movement,
//! mental health, social connection and toxin avoidance.

use serde::{Deserialize, Serialize};

/// Kind of movement done today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseType {
    Cardio,
    Strength,
    Both,
    None,
}

impl ExerciseType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cardio" => Some(Self::Cardio),
            "strength" => Some(Self::Strength),
            "both" => Some(Self::Both),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cardio => "cardio",
            Self::Strength => "strength",
            Self::Both => "both",
            Self::None => "none",
        }
    }
}

/// Short-term memory: the facts extracted today
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCheckIn {
    /// Hours slept last night (1-12)
    pub sleep_hours: Option<f64>,
    /// Glasses of water today (0-20), ~250 ml each
    pub water_glasses: Option<u32>,
    pub exercise_minutes: Option<u32>,
    pub exercise_type: Option<ExerciseType>,
    /// 1 = low, 5 = great
    pub mood_score: Option<u8>,
    /// 1 = calm, 10 = overwhelmed
    pub stress_score: Option<u8>,
    /// 1 = exhausted, 5 = energized
    pub energy_score: Option<u8>,
    /// Hours of meaningful social connection today
    pub social_hours: Option<f64>,
    /// Units today, 1 unit = one beer or glass of wine
    pub alcohol_units: Option<u32>,
    pub smoking_today: Option<bool>,
    #[serde(default)]
    pub symptoms: Vec<String>,
}

impl DailyCheckIn {
    /// Minimum data needed to give advice
    pub fn is_complete(&self) -> bool {
        self.sleep_hours.is_some()
            && self.water_glasses.is_some()
            && self.mood_score.is_some()
            && self.energy_score.is_some()
            && self.stress_score.is_some()
            && self.exercise_minutes.is_some()
    }

    /// Human labels of the core signals still missing, in asking order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.sleep_hours.is_none() {
            missing.push("sleep duration");
        }
        if self.water_glasses.is_none() {
            missing.push("water intake");
        }
        if self.mood_score.is_none() {
            missing.push("mood (1-5)");
        }
        if self.energy_score.is_none() {
            missing.push("energy level (1-5)");
        }
        if self.stress_score.is_none() {
            missing.push("stress level (1-5)");
        }
        if self.exercise_minutes.is_none() {
            missing.push("daily movement/exercise");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_checkin_missing_everything() {
        let checkin = DailyCheckIn::default();
        assert!(!checkin.is_complete());
        assert_eq!(
            checkin.missing_fields(),
            vec![
                "sleep duration",
                "water intake",
                "mood (1-5)",
                "energy level (1-5)",
                "stress level (1-5)",
                "daily movement/exercise",
            ]
        );
    }

    #[test]
    fn test_complete_checkin_ignores_optional_pillars() {
        let checkin = DailyCheckIn {
            sleep_hours: Some(7.0),
            water_glasses: Some(6),
            mood_score: Some(4),
            energy_score: Some(3),
            stress_score: Some(5),
            exercise_minutes: Some(20),
            ..Default::default()
        };
        assert!(checkin.is_complete());
        assert!(checkin.missing_fields().is_empty());
    }

    #[test]
    fn test_exercise_type_parsing() {
        assert_eq!(ExerciseType::parse("Cardio"), Some(ExerciseType::Cardio));
        assert_eq!(ExerciseType::parse("yoga"), None);
    }
}
