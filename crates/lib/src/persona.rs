//! Persona loader: the system instruction given to the AI-backed responder.
//!
//! A workspace `SYSTEM.md` overrides the bundled agency persona.

use std::fs;
use std::path::Path;

/// Bundled persona; also seeded into the workspace by `init`.
pub static DEFAULT_SYSTEM_INSTRUCTION: &str = include_str!("../config/workspace/SYSTEM.md");

/// Workspace `SYSTEM.md` when it exists and is non-empty; otherwise None.
pub fn load_workspace_instruction(workspace_dir: Option<&Path>) -> Option<String> {
    let dir = workspace_dir?;
    let path = dir.join("SYSTEM.md");
    match fs::read_to_string(&path) {
        Ok(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// System instruction to use: workspace override or the bundled default.
pub fn system_instruction(workspace_dir: Option<&Path>) -> String {
    load_workspace_instruction(workspace_dir).unwrap_or_else(|| {
        log::debug!("no workspace SYSTEM.md, using bundled persona");
        DEFAULT_SYSTEM_INSTRUCTION.to_string()
    })
}
