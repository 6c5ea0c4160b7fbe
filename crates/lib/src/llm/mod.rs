//! LLM abstraction and Gemini client.
//!
//! The AI-backed responder is an alternative to the scripted one, selected by config.

mod gemini;

pub use gemini::{
    build_contents, Content, GeminiClient, GeminiError, GeminiResponder, Part, DEFAULT_MODEL,
};
