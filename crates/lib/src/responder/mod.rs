//! Chat responder: maps one user utterance to the next assistant message.
//!
//! The scripted responder is a pure keyword/phone classifier with fixed replies.
//! The [`Responder`] trait is the seam hosts depend on, so another backend (e.g.
//! the Gemini responder in `llm`) can replace it without touching callers.

mod phone;
pub mod replies;
mod whatsapp;

pub use phone::find_first as find_phone_number;
pub use whatsapp::{deep_link, handoff_message, AGENCY_NUMBER};

use crate::transcript::{Action, Message};
use async_trait::async_trait;

const PRICING_KEYWORDS: &[&str] = &["preço", "valor", "custo"];
const SERVICE_KEYWORDS: &[&str] = &["serviço", "marketing", "tráfego", "trafego"];
const CONTACT_KEYWORDS: &[&str] = &["contato", "telefone", "falar"];
const GRATITUDE_KEYWORDS: &[&str] = &[
    "obrigado",
    "obrigada",
    "valeu",
    "top",
    "sensacional",
    "ótimo",
    "incrível",
    "parabéns",
    "tchau",
    "até mais",
];

/// Produces the assistant's next message. `history` is the transcript before the current user turn.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, history: &[Message], text: &str) -> Message;
}

/// What the user's text was classified as. Earlier variants take precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// A phone number was found; holds the matched text verbatim.
    Phone(String),
    Pricing,
    Services,
    Contact,
    Gratitude,
    Fallback,
}

/// Classify a single utterance. Phone numbers win over every keyword rule.
pub fn classify(text: &str) -> Intent {
    if let Some(number) = phone::find_first(text) {
        return Intent::Phone(number.to_string());
    }

    let lower = text.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if contains_any(PRICING_KEYWORDS) {
        Intent::Pricing
    } else if contains_any(SERVICE_KEYWORDS) {
        Intent::Services
    } else if contains_any(CONTACT_KEYWORDS) {
        Intent::Contact
    } else if contains_any(GRATITUDE_KEYWORDS) {
        Intent::Gratitude
    } else {
        Intent::Fallback
    }
}

/// Fixed assistant message for an intent.
pub fn reply_for(intent: &Intent) -> Message {
    match intent {
        Intent::Phone(number) => {
            let url = whatsapp::deep_link(&whatsapp::handoff_message(number));
            Message::assistant_with_action(
                replies::PHONE_DETECTED,
                Action {
                    label: replies::WHATSAPP_ACTION_LABEL.to_string(),
                    url,
                },
            )
        }
        Intent::Pricing => Message::assistant(replies::PRICING),
        Intent::Services => Message::assistant(replies::SERVICES),
        Intent::Contact => Message::assistant(replies::CONTACT),
        Intent::Gratitude => Message::assistant(replies::GRATITUDE),
        Intent::Fallback => Message::assistant(replies::FALLBACK),
    }
}

/// Scripted reply for `text`. Total: any string yields exactly one of the fixed replies.
pub fn respond(text: &str) -> Message {
    let intent = classify(text);
    log::debug!("responder: classified utterance as {:?}", intent);
    reply_for(&intent)
}

/// Keyword/phone responder shipped with the site. Ignores history.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedResponder;

impl ScriptedResponder {
    pub fn respond(&self, text: &str) -> Message {
        respond(text)
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn reply(&self, _history: &[Message], text: &str) -> Message {
        respond(text)
    }
}
