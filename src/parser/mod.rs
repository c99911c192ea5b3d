//! Text formats exchanged with the LLM: glyph task trees and inline action tags.

mod actions;
mod render;
mod tree_text;

pub use actions::extract_actions;
pub use render::render_task_tree;
pub use tree_text::{has_task_tree_structure, parse_task_tree, IMPLICIT_GOAL_TITLE};
