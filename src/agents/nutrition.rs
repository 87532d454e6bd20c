//! Meal planning for the build-a-plan journey
//!
//! Calorie and macro targets come from TDEE and the weight goal; the model
//! fills in culturally appropriate meals. Without a model the stage picks
//! one of five fixed templates by origin and dietary preference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::registry::AgentCard;
use super::{note_fallback, AgentContext, AgentModel, PipelineStage};
use crate::error::{NiravaError, NiravaResult};
use crate::models::{IssueType, JourneyMode, UserProfile};

const DEFAULT_TDEE: f64 = 2000.0;
const DEFAULT_WEIGHT_KG: f64 = 70.0;
const PROTEIN_G_PER_KG: f64 = 1.6;
const FAT_CALORIE_SHARE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightGoal {
    WeightLoss,
    WeightGain,
    Maintenance,
}

impl WeightGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightGoal::WeightLoss => "weight_loss",
            WeightGoal::WeightGain => "weight_gain",
            WeightGoal::Maintenance => "maintenance",
        }
    }
}

/// Daily energy and macro targets derived from TDEE
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionTargets {
    pub goal: WeightGoal,
    pub calorie_target: i64,
    pub protein_g: i64,
    pub protein_cal: i64,
    pub carb_g: i64,
    pub carb_cal: i64,
    pub fat_g: i64,
    pub fat_cal: i64,
}

impl NutritionTargets {
    /// 15% deficit to lose, 15% surplus to gain; protein at 1.6 g/kg and
    /// fat at a quarter of calories, carbs take the rest
    pub fn compute(tdee: f64, weight_kg: Option<f64>, target_weight_kg: Option<f64>) -> Self {
        let weight = weight_kg.unwrap_or(DEFAULT_WEIGHT_KG);
        let (goal, calorie_target) = match target_weight_kg {
            Some(target) if target < weight => (WeightGoal::WeightLoss, (tdee * 0.85) as i64),
            Some(target) if target > weight => (WeightGoal::WeightGain, (tdee * 1.15) as i64),
            _ => (WeightGoal::Maintenance, tdee as i64),
        };

        let protein_g = (weight * PROTEIN_G_PER_KG) as i64;
        let protein_cal = protein_g * 4;
        let fat_cal = (calorie_target as f64 * FAT_CALORIE_SHARE) as i64;
        let carb_cal = calorie_target - protein_cal - fat_cal;

        Self {
            goal,
            calorie_target,
            protein_g,
            protein_cal,
            carb_g: carb_cal / 4,
            carb_cal,
            fat_g: fat_cal / 9,
            fat_cal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    #[serde(default)]
    pub protein_g: u32,
    #[serde(default)]
    pub carbs_g: u32,
    #[serde(default)]
    pub fats_g: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub name: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub foods: Vec<String>,
    #[serde(default)]
    pub calories: u32,
    #[serde(default)]
    pub protein_g: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_nutrients: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    #[serde(default)]
    pub daily_calories: u32,
    #[serde(default)]
    pub macros: Macros,
    #[serde(default)]
    pub meals: Vec<Meal>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
struct MealPlanEnvelope {
    meal_plan: MealPlan,
}

fn meal(name: &str, time: &str, foods: &[&str], calories: f64, protein_g: u32) -> Meal {
    Meal {
        name: name.to_string(),
        time: time.to_string(),
        foods: foods.iter().map(|f| f.to_string()).collect(),
        calories: calories as u32,
        protein_g,
        ..Default::default()
    }
}

/// Fixed plan for when the model is unavailable
pub fn template_meal_plan(profile: &UserProfile, tdee: Option<f64>) -> MealPlan {
    let tdee = tdee.unwrap_or(DEFAULT_TDEE);
    let diet = profile.dietary_preference.as_str();
    let indian = profile
        .origin
        .as_deref()
        .is_some_and(|o| o.to_lowercase().contains("indian"));
    let vegetarian = diet.contains("veg");

    let share = |fraction: f64| tdee * fraction;
    let (macros, meals, notes) = if indian {
        let times = ["8:00 AM", "1:00 PM", "8:00 PM", "4:00 PM"];
        if vegetarian {
            (
                (70, 250, 60),
                [
                    meal("Breakfast", times[0], &["Poha with peanuts", "Chai (tea)"], share(0.25), 10),
                    meal("Lunch", times[1], &["Dal Tadka", "Roti (2)", "Sabzi (seasonal)"], share(0.35), 20),
                    meal("Dinner", times[2], &["Khichdi", "Curd (yogurt)"], share(0.30), 15),
                    meal("Snack", times[3], &["Roasted Chana", "Fruit"], share(0.10), 5),
                ],
                "Balanced Indian vegetarian plan focused on protein from lentils and dairy.",
            )
        } else {
            (
                (100, 200, 70),
                [
                    meal("Breakfast", times[0], &["Egg Bhurji", "Multigrain Bread"], share(0.25), 20),
                    meal("Lunch", times[1], &["Chicken Curry", "Rice", "Salad"], share(0.35), 35),
                    meal("Dinner", times[2], &["Fish Fry (shallow)", "Dal", "Roti"], share(0.30), 30),
                    meal("Snack", times[3], &["Sprouts Chaat"], share(0.10), 10),
                ],
                "High-protein Indian plan suitable for non-vegetarians.",
            )
        }
    } else {
        let times = ["7:30 AM", "12:30 PM", "7:00 PM", "3:30 PM"];
        if diet.contains("vegan") {
            (
                (80, 280, 60),
                [
                    meal("Breakfast", times[0], &["Oatmeal with chia seeds", "Almond milk"], share(0.25), 15),
                    meal("Lunch", times[1], &["Quinoa Buddha Bowl", "Tofu", "Tahini dressing"], share(0.35), 25),
                    meal("Dinner", times[2], &["Lentil Stew", "Sweet potato"], share(0.30), 20),
                    meal("Snack", times[3], &["Apple", "Walnuts"], share(0.10), 5),
                ],
                "Plant-based plan rich in fiber and healthy fats.",
            )
        } else if vegetarian {
            (
                (90, 250, 70),
                [
                    meal("Breakfast", times[0], &["Greek Yogurt with berries", "Granola"], share(0.25), 20),
                    meal("Lunch", times[1], &["Spinach & Feta Salad", "Chickpeas", "Olive oil"], share(0.35), 25),
                    meal("Dinner", times[2], &["Whole wheat pasta", "Marinara sauce", "Mozzarella"], share(0.30), 20),
                    meal("Snack", times[3], &["Hard boiled egg", "Fruit"], share(0.10), 8),
                ],
                "Vegetarian plan including dairy and eggs for protein.",
            )
        } else {
            (
                (120, 200, 80),
                [
                    meal("Breakfast", times[0], &["Scrambled Eggs (2)", "Avocado Toast"], share(0.25), 20),
                    meal("Lunch", times[1], &["Grilled Chicken Breast", "Brown Rice", "Broccoli"], share(0.35), 40),
                    meal("Dinner", times[2], &["Baked Salmon", "Asparagus", "Quinoa"], share(0.30), 35),
                    meal("Snack", times[3], &["Protein Shake", "Almonds"], share(0.10), 20),
                ],
                "Balanced high-protein omnivore plan.",
            )
        }
    };

    MealPlan {
        daily_calories: tdee as u32,
        macros: Macros {
            protein_g: macros.0,
            carbs_g: macros.1,
            fats_g: macros.2,
        },
        meals: meals.into(),
        notes: notes.to_string(),
    }
}

fn build_prompt(context: &AgentContext, tdee: f64, targets: &NutritionTargets) -> String {
    let profile = &context.profile;
    let report = context.metrics.as_ref();
    let pillars = report.map(|r| &r.pillars);
    let unknown = || "unknown".to_string();

    let restrictions = if profile.food_restrictions.is_empty() {
        "None".to_string()
    } else {
        profile.food_restrictions.join(", ")
    };

    let sources = context
        .research
        .as_ref()
        .map(|r| r.sources.as_slice())
        .unwrap_or_default();
    let source_citations = if sources.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = sources
            .iter()
            .take(3)
            .enumerate()
            .map(|(i, s)| format!("[{}] {} ({})", i + 1, s.title, s.domain))
            .collect();
        format!("\n=== RESEARCH SOURCES (For Citation) ===\n{}\n", lines.join("\n"))
    };

    let issue = context.issue_type;
    let headline = |s: &str| s.to_uppercase().replace('_', " ");

    format!(
        r#"You are a certified nutritionist creating a personalized meal plan.

USER PROFILE:
- Age: {age}y, Sex: {sex}
- Origin/Culture: {origin} (Prioritize culturally relevant foods)
- Religion: {religion} (Strictly adhere to religious dietary laws)
- Current Weight: {weight}kg
- Target Weight: {target}kg
- Goal: {goal}
- Dietary Preference: {diet}
- Food Restrictions: {restrictions}
- Health Issue: {issue}

METABOLIC DATA:
- BMR: {bmr} kcal/day
- TDEE: {tdee} kcal/day
- Target Calories: {calories} kcal/day

MACRO TARGETS:
- Protein: {protein_g}g ({protein_cal} kcal) for muscle preservation
- Carbs: {carb_g}g ({carb_cal} kcal) for energy
- Fats: {fat_g}g ({fat_cal} kcal) for hormones

HEALTH INSIGHTS (Customize meals based on this):
- Liver Stress: {liver} (If HIGH: Avoid fried foods, alcohol, processed sugar)
- Burnout Risk: {burnout}/10 (If >7: Include magnesium-rich foods like spinach, almonds)
- Dehydration Risk: {dehydration} (If HIGH: Include hydrating foods like cucumber, watermelon)
- Toxin Load: {toxin}/10 (If >5: Include antioxidants, cruciferous veggies)

=== CULTURAL & RELIGIOUS RULES (CRITICAL) ===
1. Indian Vegetarian: NO meat, fish, poultry. NO eggs (unless specified). Dairy is allowed (Lacto-vegetarian).
2. Jain: NO meat, fish, poultry, eggs. NO root vegetables (onions, garlic, potatoes).
3. Hindu: STRICTLY NO BEEF.
4. Muslim (Halal): STRICTLY NO PORK or alcohol. Meat must be Halal.
5. Jewish (Kosher): STRICTLY NO PORK or shellfish. Do not mix meat and dairy.
6. Western Vegetarian: No meat, fish, poultry. Eggs and dairy allowed.

=== MEAL PLANNING RULES ===
1. Dietary Compliance: Respect preference AND origin/religion.
2. Food Restrictions: Strictly avoid listed items.
3. Structure: 3 main meals + 1 snack.
4. Nutrient Focus:
   - If 'mental_fatigue': Focus on Omega-3s (walnuts, flax, fish)
   - If 'physical_fatigue': Focus on Iron and B-vitamins
   - If 'sleep_issues': Focus on Tryptophan (dairy, nuts) and Magnesium
{source_citations}
=== YOUR OUTPUT ===
Create a meal plan. Explain WHY specific foods were chosen (e.g., "Spinach for magnesium to help sleep [1]").

OUTPUT JSON:
{{
  "meal_plan": {{
    "daily_calories": int,
    "macros": {{"protein_g": int, "carbs_g": int, "fats_g": int}},
    "meals": [
      {{
        "name": "Breakfast",
        "time": "7:00 AM",
        "foods": ["Food 1 (Qty)", "Food 2 (Qty)"],
        "calories": int,
        "protein_g": int,
        "key_nutrients": "Vitamin/Mineral focus",
        "reasoning": "Why this meal helps their specific issue/goal (Cite source if applicable)"
      }}
    ],
    "notes": "Explanation of cultural/religious considerations and health focus"
  }}
}}"#,
        age = profile.age.unwrap_or(30),
        sex = profile.sex.map(|s| s.as_str()).unwrap_or("unknown"),
        origin = profile.origin.clone().unwrap_or_else(unknown),
        religion = profile.religion.clone().unwrap_or_else(unknown),
        weight = profile.weight_kg.unwrap_or(DEFAULT_WEIGHT_KG),
        target = profile
            .target_weight_kg
            .map(|t| t.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        goal = headline(targets.goal.as_str()),
        diet = profile.dietary_preference.as_str().to_uppercase(),
        issue = headline(issue.as_str()),
        bmr = report
            .and_then(|r| r.snapshot.bmr)
            .map(|b| b.to_string())
            .unwrap_or_else(unknown),
        calories = targets.calorie_target,
        protein_g = targets.protein_g,
        protein_cal = targets.protein_cal,
        carb_g = targets.carb_g,
        carb_cal = targets.carb_cal,
        fat_g = targets.fat_g,
        fat_cal = targets.fat_cal,
        liver = pillars
            .map(|p| p.liver_stress_indicator.as_str().to_string())
            .unwrap_or_else(unknown),
        burnout = pillars
            .and_then(|p| p.burnout_risk_score)
            .map(|b| b.to_string())
            .unwrap_or_else(unknown),
        dehydration = pillars
            .and_then(|p| p.dehydration_risk)
            .map(|d| d.as_str().to_string())
            .unwrap_or_else(unknown),
        toxin = pillars
            .map(|p| p.toxin_load_score.to_string())
            .unwrap_or_else(unknown),
    )
}

/// Conditional stage: only the build-a-plan journey gets a meal plan
#[derive(Debug, Clone, Default)]
pub struct NutritionAgent {
    model: Option<AgentModel>,
}

impl NutritionAgent {
    pub fn new(model: Option<AgentModel>) -> Self {
        Self { model }
    }

    async fn plan_meals(
        &self,
        model: &AgentModel,
        context: &AgentContext,
        tdee: f64,
    ) -> NiravaResult<MealPlan> {
        let targets = NutritionTargets::compute(
            tdee,
            context.profile.weight_kg,
            context.profile.target_weight_kg,
        );
        debug!(goal = targets.goal.as_str(), calories = targets.calorie_target, "Nutrition targets");

        let result = model
            .generate_json(build_prompt(context, tdee, &targets))
            .await?;
        let envelope: MealPlanEnvelope = serde_json::from_value(result)?;
        if envelope.meal_plan.meals.is_empty() {
            return Err(NiravaError::pipeline("nutrition", "meal plan has no meals"));
        }
        Ok(envelope.meal_plan)
    }
}

#[async_trait]
impl PipelineStage for NutritionAgent {
    fn name(&self) -> &'static str {
        "NutritionAgent"
    }

    fn card(&self) -> AgentCard {
        AgentCard::new(
            "nutrition_agent",
            "Nutrition Agent",
            "Culturally aware meal plans built from metabolic targets",
        )
        .with_skill("meal_planning", "Plan three meals and a snack around calorie targets")
        .with_skill("macro_targets", "Derive protein, carb and fat targets from TDEE")
        .with_task_types(&["meal_planning"])
    }

    fn should_run(&self, context: &AgentContext) -> bool {
        context.journey_mode == Some(JourneyMode::BuildPlan)
            && context.metrics.as_ref().and_then(|m| m.tdee()).is_some()
    }

    async fn run(&self, context: &mut AgentContext) -> NiravaResult<()> {
        let Some(tdee) = context.metrics.as_ref().and_then(|m| m.tdee()) else {
            warn!("No TDEE available, skipping meal plan");
            return Ok(());
        };

        let meal_plan = match &self.model {
            Some(model) => match self.plan_meals(model, context, tdee).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!(error = %e, "Meal planning failed");
                    note_fallback("nutrition", "model error");
                    template_meal_plan(&context.profile, Some(tdee))
                }
            },
            None => template_meal_plan(&context.profile, Some(tdee)),
        };

        info!(
            diet = context.profile.dietary_preference.as_str(),
            issue = %context.issue_type,
            meals = meal_plan.meals.len(),
            calories = meal_plan.daily_calories,
            "Meal plan ready"
        );
        context.meal_plan = Some(meal_plan);
        Ok(())
    }
}

/// Nutrient emphasis for an issue, used when rendering plans
pub fn nutrient_focus(issue: IssueType) -> Option<&'static str> {
    match issue {
        IssueType::MentalFatigue => Some("Omega-3s (walnuts, flax, fish)"),
        IssueType::PhysicalFatigue => Some("Iron and B-vitamins"),
        IssueType::SleepIssues => Some("Tryptophan (dairy, nuts) and Magnesium"),
        _ => None,
    }
}
