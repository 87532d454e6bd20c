//! User profile and the enums describing who the user is

use serde::{Deserialize, Serialize};
use std::fmt;

/// Biological sex, used only by the metabolic formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Parse the loose forms people type: "M", "woman", "Female"
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "male" | "m" | "man" => Some(Sex::Male),
            "female" | "f" | "woman" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Habitual activity level, drives TDEE and water targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    #[default]
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// Multiplier applied to BMR
    pub fn tdee_factor(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }

    /// Extra water on top of the per-kg base, in ml
    pub fn water_bonus_ml(&self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 0.0,
            ActivityLevel::Light => 200.0,
            ActivityLevel::Moderate => 400.0,
            ActivityLevel::Active => 600.0,
            ActivityLevel::VeryActive => 800.0,
        }
    }
}

/// Dietary pattern the nutrition stage plans around
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DietaryPreference {
    Vegetarian,
    Vegan,
    Pescatarian,
    #[default]
    Omnivore,
}

impl DietaryPreference {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "vegetarian" => Some(Self::Vegetarian),
            "vegan" => Some(Self::Vegan),
            "pescatarian" => Some(Self::Pescatarian),
            "omnivore" => Some(Self::Omnivore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vegetarian => "vegetarian",
            Self::Vegan => "vegan",
            Self::Pescatarian => "pescatarian",
            Self::Omnivore => "omnivore",
        }
    }
}

/// Long-term memory: who the user is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub activity_level: ActivityLevel,
    pub primary_goal: String,
    pub target_weight_kg: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub dietary_preference: DietaryPreference,
    #[serde(default)]
    pub food_restrictions: Vec<String>,
    pub origin: Option<String>,
    pub religion: Option<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "Friend".to_string(),
            age: None,
            sex: None,
            height_cm: None,
            weight_kg: None,
            activity_level: ActivityLevel::default(),
            primary_goal: "General Health".to_string(),
            target_weight_kg: None,
            conditions: Vec::new(),
            dietary_preference: DietaryPreference::default(),
            food_restrictions: Vec::new(),
            origin: None,
            religion: None,
        }
    }
}

impl UserProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let profile = UserProfile::default();
        assert_eq!(profile.name, "Friend");
        assert_eq!(profile.primary_goal, "General Health");
        assert_eq!(profile.dietary_preference, DietaryPreference::Omnivore);
        assert_eq!(profile.activity_level, ActivityLevel::Light);
        assert!(profile.age.is_none());
    }

    #[test]
    fn test_sex_parsing() {
        assert_eq!(Sex::parse("M"), Some(Sex::Male));
        assert_eq!(Sex::parse(" Woman "), Some(Sex::Female));
        assert_eq!(Sex::parse("other"), None);
    }

    #[test]
    fn test_diet_parsing() {
        assert_eq!(
            DietaryPreference::parse("Vegan"),
            Some(DietaryPreference::Vegan)
        );
        assert_eq!(DietaryPreference::parse("keto"), None);
    }

    #[test]
    fn test_activity_serialization() {
        let json = serde_json::to_string(&ActivityLevel::VeryActive).unwrap();
        assert_eq!(json, "\"very_active\"");
    }
}
