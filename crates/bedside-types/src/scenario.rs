//! Scenario metadata: target profession, difficulty, and catalog entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::persona::PersonaSnapshot;

/// Healthcare profession the learner is practicing as.
///
/// Unrecognised values deserialize to [`Profession::Other`] so that new
/// professions in scenario content never break session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profession {
    #[default]
    Doctor,
    Nurse,
    Dentist,
    Pharmacist,
    Physiotherapist,
    #[serde(other)]
    Other,
}

impl Profession {
    /// Title used as the speaker label for the learner in transcripts and prompts.
    pub fn title(&self) -> &'static str {
        match self {
            Profession::Doctor => "Doctor",
            Profession::Nurse => "Nurse",
            Profession::Dentist => "Dentist",
            Profession::Pharmacist => "Pharmacist",
            Profession::Physiotherapist => "Physiotherapist",
            Profession::Other => "Healthcare Professional",
        }
    }
}

impl fmt::Display for Profession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profession::Doctor => write!(f, "doctor"),
            Profession::Nurse => write!(f, "nurse"),
            Profession::Dentist => write!(f, "dentist"),
            Profession::Pharmacist => write!(f, "pharmacist"),
            Profession::Physiotherapist => write!(f, "physiotherapist"),
            Profession::Other => write!(f, "other"),
        }
    }
}

impl FromStr for Profession {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "doctor" => Ok(Profession::Doctor),
            "nurse" => Ok(Profession::Nurse),
            "dentist" => Ok(Profession::Dentist),
            "pharmacist" => Ok(Profession::Pharmacist),
            "physiotherapist" => Ok(Profession::Physiotherapist),
            "other" => Ok(Profession::Other),
            other => Err(format!("invalid profession: '{other}'")),
        }
    }
}

/// Difficulty level of a practice scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Beginner => write!(f, "beginner"),
            Difficulty::Intermediate => write!(f, "intermediate"),
            Difficulty::Advanced => write!(f, "advanced"),
        }
    }
}

pub fn default_scenario_type() -> String {
    "consultation".to_string()
}

/// A scenario entry from the configured catalog.
///
/// Scenario authoring lives elsewhere; the orchestrator only needs enough to
/// resolve a persona and the scoring context when a session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profession: Profession,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// consultation, emergency, follow_up, ...
    #[serde(default = "default_scenario_type")]
    pub scenario_type: String,
    pub persona: PersonaSnapshot,
}
