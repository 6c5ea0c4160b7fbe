//! Chat transcript: ordered, append-only list of messages for one session.
//!
//! Messages are immutable once built. Only the session appends to a transcript,
//! and every transcript starts with the assistant greeting.

use serde::Serialize;

use crate::responder::replies;

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// Call-to-action attached to an assistant message (button label + destination link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub label: String,
    pub url: String,
}

/// One turn in the conversation.
///
/// Serialize-only: messages are built through the constructors, so a user
/// message can never carry an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    speaker: Speaker,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            action: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            action: None,
        }
    }

    /// Assistant message carrying a call-to-action. User messages never carry one.
    pub fn assistant_with_action(text: impl Into<String>, action: Action) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            action: Some(action),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }
}

/// Conversation history for one session, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// New transcript seeded with the greeting.
    pub fn new() -> Self {
        Self {
            messages: vec![Message::assistant(replies::GREETING)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true in practice: the greeting is always present.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop every turn and start over from the greeting.
    pub(crate) fn reset(&mut self) {
        self.messages.clear();
        self.messages.push(Message::assistant(replies::GREETING));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transcript_starts_with_greeting() {
        let t = Transcript::new();
        assert_eq!(t.len(), 1);
        let first = &t.messages()[0];
        assert_eq!(first.speaker(), Speaker::Assistant);
        assert_eq!(first.text(), replies::GREETING);
        assert!(first.action().is_none());
    }

    #[test]
    fn reset_keeps_only_greeting() {
        let mut t = Transcript::new();
        t.push(Message::user("oi"));
        t.push(Message::assistant("olá"));
        t.reset();
        assert_eq!(t, Transcript::new());
    }

    #[test]
    fn message_json_omits_missing_action() {
        let json = serde_json::to_value(Message::user("oi")).unwrap();
        assert_eq!(json, serde_json::json!({ "speaker": "user", "text": "oi" }));

        let msg = Message::assistant_with_action(
            "ok",
            Action {
                label: "Abrir".to_string(),
                url: "https://wa.me/1".to_string(),
            },
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["speaker"], "assistant");
        assert_eq!(json["action"]["label"], "Abrir");
    }

    struct Check<T>(std::marker::PhantomData<T>);

    trait NoDeserialize {
        const DESERIALIZE: bool = false;
    }

    impl<T> NoDeserialize for Check<T> {}

    impl<T: serde::de::DeserializeOwned> Check<T> {
        #[allow(dead_code)]
        const DESERIALIZE: bool = true;
    }

    #[test]
    fn messages_cannot_be_built_from_json() {
        // Only the constructors build messages, so a user message cannot gain an action.
        assert!(!Check::<Message>::DESERIALIZE);
        assert!(!Check::<Action>::DESERIALIZE);
        assert!(Check::<String>::DESERIALIZE);
    }
}
