//! Patient persona snapshot.
//!
//! A persona is resolved once when a session is created and is never mutated
//! afterwards. Every prompt in the session is built from the same snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How anxious the simulated patient is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnxietyLevel {
    Low,
    #[default]
    Moderate,
    High,
}

impl fmt::Display for AnxietyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnxietyLevel::Low => write!(f, "low"),
            AnxietyLevel::Moderate => write!(f, "moderate"),
            AnxietyLevel::High => write!(f, "high"),
        }
    }
}

fn default_communication_style() -> String {
    "direct".to_string()
}

fn default_emotional_state() -> String {
    "calm".to_string()
}

/// Immutable description of the simulated patient for one session.
///
/// Field aliases accept the camelCase keys used by scenario content authored
/// for the web client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub background: String,
    #[serde(alias = "primaryCondition")]
    pub condition: String,
    #[serde(default, alias = "currentSymptoms")]
    pub current_symptoms: Vec<String>,
    #[serde(default, alias = "medicalHistory")]
    pub medical_history: Vec<String>,
    #[serde(default, alias = "personalityTraits")]
    pub personality_traits: Vec<String>,
    #[serde(default = "default_communication_style", alias = "communicationStyle")]
    pub communication_style: String,
    #[serde(default, alias = "anxietyLevel")]
    pub anxiety_level: AnxietyLevel,
    #[serde(default = "default_emotional_state", alias = "emotionalState")]
    pub emotional_state: String,
    /// Preferred synthesis voice, when the scenario pins one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

impl PersonaSnapshot {
    /// Emotion tag attached to the persona's replies.
    pub fn emotion(&self) -> &str {
        match self.anxiety_level {
            AnxietyLevel::High => "anxious",
            AnxietyLevel::Moderate => "concerned",
            AnxietyLevel::Low => "neutral",
        }
    }
}

impl Default for PersonaSnapshot {
    fn default() -> Self {
        Self {
            name: "Sarah Johnson".to_string(),
            age: 45,
            background: "Office manager, lives with her partner".to_string(),
            condition: "persistent headaches".to_string(),
            current_symptoms: vec![
                "headache most mornings".to_string(),
                "occasional nausea".to_string(),
            ],
            medical_history: vec!["mild hypertension".to_string()],
            personality_traits: vec!["talkative".to_string(), "worried".to_string()],
            communication_style: default_communication_style(),
            anxiety_level: AnxietyLevel::Moderate,
            emotional_state: "worried".to_string(),
            voice: None,
        }
    }
}
