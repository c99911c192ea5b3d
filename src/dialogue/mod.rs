//! Goal-hearing dialogue: keyword rules, the stage controller, and prompts.
//!
//! LLM replies are free text, so the controller never relies on the model to
//! report state. It infers transitions from phrase heuristics applied to both
//! sides of the exchange:
//!
//! ```text
//! normal ──motivation──▶ hearing ──4/4 fields──▶ proposal ──agreement──▶ output
//! ```

mod controller;
mod prompts;
mod rules;

pub use controller::*;
pub use prompts::*;
pub use rules::*;
