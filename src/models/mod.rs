//! Domain models for TimeTurn.
//!
//! # Core Concepts
//!
//! ## Dialogue
//!
//! - [`DialogueState`]: Per-conversation stage plus the hearing progress and
//!   summary. Persisted as a whole so a session can resume mid-flow.
//! - [`DialogueStage`]: `normal → hearing → proposal → output`. Only
//!   [`DialogueState::restart`] moves backwards.
//! - [`HearingProgress`] / [`HearingSummary`]: Which of the four hearing fields
//!   (why, current, target, timeline) are collected, and the user utterances
//!   that satisfied them.
//!
//! ## Task Tree
//!
//! - [`TaskNode`]: Universal tree entity (Goal ⊃ Project ⊃ Milestone ⊃ Task).
//!   Nodes are never deleted, only archived.
//! - [`ActionItem`]: A single proposed mutation extracted from mini-chat output.
//!
//! ## Conversations
//!
//! - [`Conversation`] and [`ChatMessage`]: The stored chat log a dialogue runs on.

mod action;
mod conversation;
mod dialogue;
mod task_node;

pub use action::*;
pub use conversation::*;
pub use dialogue::*;
pub use task_node::*;
