//! Responder selection: build the configured responder for sessions.

use crate::config::{self, Config, ResponderKind};
use crate::llm::{GeminiClient, GeminiResponder};
use crate::persona;
use crate::responder::{Responder, ScriptedResponder};
use std::path::Path;
use std::sync::Arc;

/// Responder named by `chat.responder`. Gemini reads its persona from the workspace.
pub fn build_responder(config: &Config, config_path: &Path) -> Arc<dyn Responder> {
    match config.chat.responder {
        ResponderKind::Scripted => {
            log::info!("responder: scripted");
            Arc::new(ScriptedResponder)
        }
        ResponderKind::Gemini => {
            let api_key = config::resolve_gemini_api_key(config);
            if api_key.is_none() {
                log::warn!("responder: gemini selected but no api key configured");
            }
            let client = GeminiClient::new(
                config.gemini.base_url.clone(),
                api_key,
                config.gemini.model.clone(),
            );
            log::info!("responder: gemini ({})", client.model());
            let workspace = config::resolve_workspace_dir(config, config_path);
            let instruction = persona::system_instruction(Some(workspace.as_path()));
            Arc::new(GeminiResponder::new(client, instruction))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::replies;

    #[tokio::test]
    async fn default_config_builds_scripted_responder() {
        let r = build_responder(&Config::default(), Path::new("/nonexistent/config.json"));
        assert_eq!(r.reply(&[], "qual o valor?").await.text(), replies::PRICING);
    }
}
