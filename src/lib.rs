//! TimeTurn: a goal-hearing dialogue for an AI character, and the parsers that
//! turn its replies into a task tree.
//!
//! - [`dialogue`]: stage controller, detection rules, prompt templates
//! - [`parser`]: tree text and inline action tags
//! - [`tree`]: arena-backed task forest
//! - [`service`]: turns, merges and mini-chat over [`db`] and [`llm`]
//! - [`api`] / [`mcp`]: HTTP and MCP surfaces

pub mod api;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod parser;
pub mod service;
pub mod tree;
pub mod writer;
