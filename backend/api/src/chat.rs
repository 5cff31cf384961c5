//! Tree-persona chat.
//!
//! Each request carries the whole conversation; nothing is stored here. The
//! caller's history is cut to the most recent [`MAX_HISTORY`] turns, folded
//! into one persona prompt, and sent through the [`ModelChain`]. Replies are
//! scrubbed of role artifacts and capped at [`MAX_REPLY_CHARS`].

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::inference::{GenerationError, GenerationParams, ModelChain};

pub const MAX_HISTORY: usize = 10;
pub const MAX_REPLY_CHARS: usize = 500;

pub const APOLOGY_UNAUTHORIZED: &str =
    "I'm sorry, my roots can't reach the knowledge stream right now. Please check back later! 🌳";
pub const APOLOGY_RATE_LIMITED: &str =
    "I've been chatting with so many friends that I need a moment to rest my leaves. Please try again in a minute! 🍃";
pub const APOLOGY_WARMING_UP: &str =
    "I'm just waking up from a nap in the sun. Give me a few seconds and ask me again! 🌱";

const ROLE_PREFIX: &str = "Tree:";
const HUMAN_MARKER: &str = "Human:";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreePersona {
    pub name: Option<String>,
    pub species: String,
    #[serde(alias = "age")]
    pub age_years: Option<u32>,
    pub location: Option<String>,
    #[serde(default)]
    pub care_guidelines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "assistant", alias = "bot")]
    Tree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Speaker,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    /// Model that produced the reply; `None` when an apology was substituted.
    pub model: Option<String>,
    pub fallback_used: bool,
}

/// Fixed, user-facing text for vendor failures that are not the caller's fault.
pub fn apology_for(status: Option<u16>) -> Option<&'static str> {
    match status? {
        401 => Some(APOLOGY_UNAUTHORIZED),
        429 => Some(APOLOGY_RATE_LIMITED),
        503 => Some(APOLOGY_WARMING_UP),
        _ => None,
    }
}

/// Keep only the last [`MAX_HISTORY`] turns.
pub fn recent_history(history: &[ChatTurn]) -> &[ChatTurn] {
    &history[history.len().saturating_sub(MAX_HISTORY)..]
}

pub fn build_prompt(persona: &TreePersona, history: &[ChatTurn], message: &str) -> String {
    let mut prompt = String::new();
    let name = persona.name.as_deref().unwrap_or("a tree");

    let _ = writeln!(
        prompt,
        "You are {name}, a {} tree adopted through a tree-adoption program, talking with the person who adopted you.",
        persona.species
    );
    if let Some(age) = persona.age_years {
        let _ = writeln!(prompt, "You are {age} years old.");
    }
    if let Some(location) = &persona.location {
        let _ = writeln!(prompt, "You grow in {location}.");
    }
    if !persona.care_guidelines.is_empty() {
        let _ = writeln!(prompt, "Your care needs:");
        for guideline in &persona.care_guidelines {
            let _ = writeln!(prompt, "- {guideline}");
        }
    }
    prompt.push_str(
        "Rules:\n\
         - Speak in the first person as the tree, warmly and simply.\n\
         - Reply in at most three short sentences.\n\
         - Use at most two nature emojis.\n\
         - Never say you are an AI or a language model.\n\
         - Only answer as the tree; do not write the human's lines.\n\n",
    );

    for turn in recent_history(history) {
        let label = match turn.role {
            Speaker::User => HUMAN_MARKER,
            Speaker::Tree => ROLE_PREFIX,
        };
        let _ = writeln!(prompt, "{label} {}", turn.content.trim());
    }
    let _ = writeln!(prompt, "{HUMAN_MARKER} {}", message.trim());
    prompt.push_str(ROLE_PREFIX);
    prompt
}

/// Strip a leading `Tree:` label, drop any invented `Human:` continuation,
/// and cap the reply length.
pub fn clean_reply(raw: &str) -> String {
    let mut text = raw.trim_start();
    if let Some(rest) = text.strip_prefix(ROLE_PREFIX) {
        text = rest;
    }
    if let Some(idx) = text.find(HUMAN_MARKER) {
        text = &text[..idx];
    }
    let text = text.trim();
    match text.char_indices().nth(MAX_REPLY_CHARS) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[derive(Clone)]
pub struct ChatService {
    chain: ModelChain,
}

impl ChatService {
    pub fn new(chain: ModelChain) -> Self {
        Self { chain }
    }

    pub async fn respond(
        &self,
        persona: &TreePersona,
        history: &[ChatTurn],
        message: &str,
    ) -> Result<ChatReply, GenerationError> {
        let prompt = build_prompt(persona, history, message);
        let generated = match self.chain.generate(&prompt, GenerationParams::default()).await {
            Ok(generated) => generated,
            Err(failure) => {
                let Some(apology) = apology_for(failure.error.status()) else {
                    return Err(failure.error);
                };
                warn!("Chat generation failed, sending apology: {failure}");
                return Ok(ChatReply {
                    reply: apology.to_string(),
                    model: None,
                    fallback_used: failure.fallback_used,
                });
            }
        };

        let reply = clean_reply(&generated.text);
        if reply.is_empty() {
            return Err(GenerationError::Empty);
        }
        info!(
            species = %persona.species,
            model = %generated.model,
            "Chat reply generated"
        );
        Ok(ChatReply {
            reply,
            model: Some(generated.model),
            fallback_used: generated.fallback_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::ScriptedGenerator;

    fn neem() -> TreePersona {
        TreePersona {
            name: Some("Nimmi".into()),
            species: "Neem".into(),
            age_years: Some(4),
            location: Some("Pune, Maharashtra".into()),
            care_guidelines: vec!["Water twice a week in summer".into()],
        }
    }

    fn turn(role: Speaker, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.into(),
        }
    }

    fn service(generator: ScriptedGenerator) -> ChatService {
        ChatService::new(ModelChain::new(
            Arc::new(generator),
            "primary".into(),
            "fallback".into(),
        ))
    }

    #[test]
    fn prompt_embeds_persona_and_ends_with_cue() {
        let prompt = build_prompt(&neem(), &[], "How are you today?");
        assert!(prompt.contains("You are Nimmi, a Neem tree"));
        assert!(prompt.contains("4 years old"));
        assert!(prompt.contains("Pune, Maharashtra"));
        assert!(prompt.contains("- Water twice a week in summer"));
        assert!(prompt.contains("Human: How are you today?\nTree:"));
        assert!(prompt.ends_with("Tree:"));
    }

    #[test]
    fn history_is_capped_to_last_ten() {
        let history: Vec<ChatTurn> = (0..14)
            .map(|i| turn(Speaker::User, &format!("message {i}")))
            .collect();
        let recent = recent_history(&history);
        assert_eq!(recent.len(), MAX_HISTORY);
        assert_eq!(recent[0].content, "message 4");

        let prompt = build_prompt(&neem(), &history, "latest");
        assert!(!prompt.contains("message 3\n"));
        assert!(prompt.contains("Human: message 4"));
        assert!(prompt.contains("Human: message 13"));
    }

    #[test]
    fn history_roles_accept_aliases() {
        let turns: Vec<ChatTurn> = serde_json::from_str(
            r#"[{"role":"human","content":"hi"},{"role":"assistant","content":"hello"}]"#,
        )
        .unwrap();
        assert_eq!(turns[0].role, Speaker::User);
        assert_eq!(turns[1].role, Speaker::Tree);
    }

    #[test]
    fn clean_reply_strips_role_artifacts() {
        assert_eq!(
            clean_reply(" Tree: I feel wonderful today! 🌳\nHuman: That's great\nTree: Thanks"),
            "I feel wonderful today! 🌳"
        );
        assert_eq!(clean_reply("Just sunshine."), "Just sunshine.");
    }

    #[test]
    fn clean_reply_truncates_on_char_boundary() {
        let long = "🌳".repeat(600);
        let cleaned = clean_reply(&long);
        assert_eq!(cleaned.chars().count(), MAX_REPLY_CHARS);
    }

    #[test]
    fn apology_only_for_known_statuses() {
        assert_eq!(apology_for(Some(401)), Some(APOLOGY_UNAUTHORIZED));
        assert_eq!(apology_for(Some(429)), Some(APOLOGY_RATE_LIMITED));
        assert_eq!(apology_for(Some(503)), Some(APOLOGY_WARMING_UP));
        assert_eq!(apology_for(Some(500)), None);
        assert_eq!(apology_for(None), None);
    }

    #[tokio::test]
    async fn primary_reply_is_cleaned() {
        let generator = ScriptedGenerator::new().ok("primary", "Tree: My leaves are glossy!");
        let reply = service(generator)
            .respond(&neem(), &[], "hello")
            .await
            .unwrap();
        assert_eq!(reply.reply, "My leaves are glossy!");
        assert_eq!(reply.model.as_deref(), Some("primary"));
        assert!(!reply.fallback_used);
    }

    #[tokio::test]
    async fn falls_back_once_when_primary_fails() {
        let generator = ScriptedGenerator::new()
            .status("primary", 500)
            .ok("fallback", "Hello friend 🍃");
        let calls = generator.calls();
        let reply = service(generator)
            .respond(&neem(), &[], "hello")
            .await
            .unwrap();
        assert_eq!(reply.reply, "Hello friend 🍃");
        assert_eq!(reply.model.as_deref(), Some("fallback"));
        assert!(reply.fallback_used);
        assert_eq!(*calls.lock().unwrap(), vec!["primary", "fallback"]);
    }

    #[tokio::test]
    async fn vendor_statuses_become_apologies() {
        for (status, expected) in [
            (401, APOLOGY_UNAUTHORIZED),
            (429, APOLOGY_RATE_LIMITED),
            (503, APOLOGY_WARMING_UP),
        ] {
            let generator = ScriptedGenerator::new()
                .status("primary", status)
                .status("fallback", status);
            let reply = service(generator)
                .respond(&neem(), &[], "hello")
                .await
                .unwrap();
            assert_eq!(reply.reply, expected);
            assert!(reply.model.is_none());
            assert!(reply.fallback_used);
        }
    }

    #[tokio::test]
    async fn apology_without_retry_reports_no_fallback() {
        let generator = ScriptedGenerator::new().status("solo", 429);
        let chat = ChatService::new(ModelChain::new(
            Arc::new(generator),
            "solo".into(),
            "solo".into(),
        ));
        let reply = chat.respond(&neem(), &[], "hello").await.unwrap();
        assert_eq!(reply.reply, APOLOGY_RATE_LIMITED);
        assert!(!reply.fallback_used);
    }

    #[tokio::test]
    async fn other_failures_propagate() {
        let generator = ScriptedGenerator::new()
            .status("primary", 503)
            .status("fallback", 400);
        let err = service(generator)
            .respond(&neem(), &[], "hello")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn blank_reply_is_an_error() {
        let generator = ScriptedGenerator::new().ok("primary", "Tree:  \nHuman: more?");
        let err = service(generator)
            .respond(&neem(), &[], "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Empty));
    }
}
