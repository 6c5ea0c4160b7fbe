//! Marka core library — scripted chat responder, sessions, gateway, and contact
//! forwarding used by the CLI.

pub mod agent;
pub mod config;
pub mod contact;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod persona;
pub mod responder;
pub mod session;
pub mod transcript;
