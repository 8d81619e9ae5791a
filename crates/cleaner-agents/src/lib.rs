//! Collaborators for the contact-table cleaning workflow: LLM agents, the
//! console resolver, CSV I/O, configuration and the run report.

pub mod agents;
pub mod app;
pub mod config;
pub mod handoff;
pub mod prompts;
pub mod report;
pub mod table;
pub mod telemetry;
