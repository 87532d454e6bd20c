//! Age- and sex-adjusted reference ranges the user is compared against

use crate::models::Sex;
use serde::{Deserialize, Serialize};

const DEFAULT_AGE: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepBenchmark {
    pub hours: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterBenchmark {
    pub liters: f64,
    pub glasses: u32,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmiBenchmark {
    pub range: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseBenchmark {
    pub weekly: String,
    pub daily_min: u32,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressBenchmark {
    pub target: String,
    pub note: String,
}

/// Clinical reference ranges (NSF, IOM, WHO, AHA guidelines)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdealBenchmarks {
    pub sleep: SleepBenchmark,
    pub water: WaterBenchmark,
    pub bmi: BmiBenchmark,
    pub exercise: ExerciseBenchmark,
    pub resting_heart_rate: String,
    pub stress: StressBenchmark,
    pub summary: String,
}

/// Reference ranges for the given age and sex. Missing age is treated as 30.
pub fn get_ideal_benchmarks(age: Option<u32>, sex: Option<Sex>) -> IdealBenchmarks {
    let age = age.filter(|a| *a > 0).unwrap_or(DEFAULT_AGE);
    let sex_label = sex.map(|s| s.as_str()).unwrap_or("unknown");
    let is_male = sex == Some(Sex::Male);

    let (sleep_hours, sleep_note) = match age {
        0..=13 => ("9-11", "Growing bodies need more recovery time"),
        14..=17 => ("8-10", "Teens need extra sleep for brain development"),
        18..=25 => ("7-9", "Young adults benefit from consistent 7-9h"),
        26..=64 => ("7-9", "Adults function best with 7-9h"),
        _ => ("7-8", "Seniors may need slightly less but quality matters"),
    };

    let (liters, glasses) = if is_male { (3.7, 15) } else { (2.7, 11) };
    let water_note = if age > 65 {
        "Thirst sensation decreases with age - drink proactively"
    } else {
        "Includes water from food (~20%)"
    };

    let (bmi_range, bmi_note) = if age > 65 {
        (
            "22 - 27",
            "Slightly higher BMI may be protective in older adults",
        )
    } else {
        ("18.5 - 24.9", "Normal range for disease prevention")
    };

    let (exercise_weekly, exercise_note) = match age {
        0..=17 => ("60 min/day (420 min/week)", "Children need daily active play"),
        18..=64 => (
            "150-300 min/week moderate OR 75-150 min vigorous",
            "Plus 2 days strength training",
        ),
        _ => (
            "150 min/week moderate + balance exercises",
            "Focus on mobility and fall prevention",
        ),
    };

    let resting_heart_rate = if is_male {
        "60-100 bpm (fit: 50-70)"
    } else {
        "60-100 bpm (fit: 55-75)"
    };

    IdealBenchmarks {
        sleep: SleepBenchmark {
            hours: sleep_hours.to_string(),
            note: sleep_note.to_string(),
        },
        water: WaterBenchmark {
            liters,
            glasses,
            note: water_note.to_string(),
        },
        bmi: BmiBenchmark {
            range: bmi_range.to_string(),
            note: bmi_note.to_string(),
        },
        exercise: ExerciseBenchmark {
            weekly: exercise_weekly.to_string(),
            daily_min: if age >= 18 { 22 } else { 60 },
            note: exercise_note.to_string(),
        },
        resting_heart_rate: resting_heart_rate.to_string(),
        stress: StressBenchmark {
            target: "Below 4/10 daily average".to_string(),
            note: "Chronic stress >6/10 impacts sleep, immunity, and recovery".to_string(),
        },
        summary: format!("Benchmarks for {age}y old {sex_label}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_age_or_sex() {
        let ideals = get_ideal_benchmarks(None, None);
        assert_eq!(ideals.summary, "Benchmarks for 30y old unknown");
        assert_eq!(ideals.sleep.hours, "7-9");
        assert_eq!(ideals.water.glasses, 11);
        assert_eq!(ideals.exercise.daily_min, 22);
        assert_eq!(ideals.resting_heart_rate, "60-100 bpm (fit: 55-75)");
    }

    #[test]
    fn test_male_water_and_heart_rate() {
        let ideals = get_ideal_benchmarks(Some(40), Some(Sex::Male));
        assert_eq!(ideals.water.liters, 3.7);
        assert_eq!(ideals.water.glasses, 15);
        assert_eq!(ideals.resting_heart_rate, "60-100 bpm (fit: 50-70)");
        assert_eq!(ideals.summary, "Benchmarks for 40y old male");
    }

    #[test]
    fn test_senior_adjustments() {
        let ideals = get_ideal_benchmarks(Some(70), Some(Sex::Female));
        assert_eq!(ideals.sleep.hours, "7-8");
        assert_eq!(ideals.bmi.range, "22 - 27");
        assert!(ideals.water.note.starts_with("Thirst sensation"));
        assert_eq!(
            ideals.exercise.weekly,
            "150 min/week moderate + balance exercises"
        );
    }

    #[test]
    fn test_teen_exercise() {
        let ideals = get_ideal_benchmarks(Some(15), None);
        assert_eq!(ideals.sleep.hours, "8-10");
        assert_eq!(ideals.exercise.daily_min, 60);
        assert_eq!(ideals.exercise.weekly, "60 min/day (420 min/week)");
    }
}
