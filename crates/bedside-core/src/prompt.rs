//! Persona prompt construction.
//!
//! Turns a session's persona snapshot, profession, and conversation history
//! into a [`GenerationRequest`]. The system prompt carries the patient
//! profile; prior turns become role-mapped messages; the final user message
//! frames the clinician's latest words.

use bedside_types::gateway::{GenerationRequest, PromptMessage, PromptRole};
use bedside_types::persona::{AnxietyLevel, PersonaSnapshot};
use bedside_types::scenario::Profession;
use bedside_types::session::{Session, Speaker, Turn};

const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.8;

/// Confidence attached to canned replies used when generation fails.
pub const FALLBACK_CONFIDENCE: f32 = 0.3;

#[derive(Debug, Clone, Default)]
pub struct PersonaPromptBuilder {
    history_window: Option<usize>,
}

impl PersonaPromptBuilder {
    /// `history_window` caps how many prior turns are sent; `None` sends all.
    pub fn new(history_window: Option<usize>) -> Self {
        Self { history_window }
    }

    /// Build the generation request for the persona's next reply.
    ///
    /// `history` is the conversation before the utterance being answered.
    /// An empty `utterance` means the clinician could not be understood.
    pub fn build(&self, session: &Session, history: &[Turn], utterance: &str) -> GenerationRequest {
        let spoken: Vec<&Turn> = history
            .iter()
            .filter(|t| t.speaker != Speaker::System)
            .collect();
        let skip = match self.history_window {
            Some(window) => spoken.len().saturating_sub(window),
            None => 0,
        };

        let mut messages: Vec<PromptMessage> = spoken
            .into_iter()
            .skip(skip)
            .map(|turn| PromptMessage {
                role: match turn.speaker {
                    Speaker::Ai => PromptRole::Assistant,
                    _ => PromptRole::User,
                },
                content: turn.text.clone(),
            })
            .collect();
        messages.push(PromptMessage {
            role: PromptRole::User,
            content: frame_utterance(&session.persona, utterance),
        });

        GenerationRequest {
            system: system_prompt(session),
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stop_sequences: stop_sequences(session.profession),
        }
    }

    /// Opening line spoken by the persona when the session starts.
    pub fn greeting(&self, persona: &PersonaSnapshot) -> String {
        match persona.anxiety_level {
            AnxietyLevel::High => format!(
                "Hello... I'm {}. I'm really worried about my {}. Can you help me?",
                persona.name, persona.condition
            ),
            AnxietyLevel::Moderate => format!(
                "Hello, I'm {}. I've come in about my {}.",
                persona.name, persona.condition
            ),
            AnxietyLevel::Low => format!(
                "Hi, I'm {}. Thanks for seeing me about my {}.",
                persona.name, persona.condition
            ),
        }
    }
}

/// Canned in-character reply used when generation fails or times out.
pub fn fallback_reply(profession: Profession) -> &'static str {
    match profession {
        Profession::Doctor => "I'm sorry, doctor, could you say that again? I didn't quite follow.",
        Profession::Nurse => "Sorry, nurse, could you repeat that please?",
        Profession::Dentist => {
            "Sorry, could you say that again? It's hard to concentrate with this tooth."
        }
        Profession::Pharmacist => {
            "Sorry, could you explain that again? I want to be sure I take my medicine properly."
        }
        Profession::Physiotherapist => {
            "Sorry, could you repeat that? I want to make sure I do the exercises right."
        }
        Profession::Other => "I'm sorry, could you repeat that please?",
    }
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn system_prompt(session: &Session) -> String {
    let p = &session.persona;
    format!(
        "You are simulating a patient in a medical {scenario} with a {profession}.\n\
         This is a {difficulty} level scenario for OET training.\n\
         Stay in character as {name} at all times and never reveal that you are simulated.\n\
         \n\
         Patient Profile:\n\
         - Name: {name}\n\
         - Age: {age}\n\
         - Background: {background}\n\
         - Primary Condition: {condition}\n\
         - Current Symptoms: {symptoms}\n\
         - Medical History: {history}\n\
         - Personality: {traits}\n\
         - Emotional State: {emotional}\n\
         - Anxiety Level: {anxiety}\n\
         - Communication Style: {style}",
        scenario = session.scenario_type,
        profession = session.profession.title().to_lowercase(),
        difficulty = session.difficulty,
        name = p.name,
        age = p.age,
        background = if p.background.is_empty() { "Not specified" } else { p.background.as_str() },
        condition = p.condition,
        symptoms = list_or(&p.current_symptoms, "None reported"),
        history = list_or(&p.medical_history, "None"),
        traits = list_or(&p.personality_traits, "Not specified"),
        emotional = p.emotional_state,
        anxiety = p.anxiety_level,
        style = p.communication_style,
    )
}

fn frame_utterance(persona: &PersonaSnapshot, utterance: &str) -> String {
    let utterance = utterance.trim();
    if utterance.is_empty() {
        return format!(
            "The healthcare professional's last words were inaudible.\n\n\
             Respond as {} would, politely asking them to repeat themselves, in one sentence.",
            persona.name
        );
    }
    format!(
        "Healthcare Professional just said: \"{utterance}\"\n\n\
         Respond as the patient would, staying in character. \
         Keep your response concise (1-3 sentences) and natural."
    )
}

fn stop_sequences(profession: Profession) -> Vec<String> {
    let mut stops: Vec<String> = ["Healthcare Professional:", "Doctor:", "Nurse:"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let own = format!("{}:", profession.title());
    if !stops.contains(&own) {
        stops.push(own);
    }
    stops
}
