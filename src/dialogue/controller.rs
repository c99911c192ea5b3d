//! Stage transitions for the goal-hearing dialogue.
//!
//! [`advance`] is a pure function of the current state and the latest
//! exchange; persistence and LLM calls happen around it in
//! [`crate::service::ChatService`].

use serde::{Deserialize, Serialize};

use super::rules::DetectionRules;
use crate::models::{DialogueStage, DialogueState, HearingField, HearingProgress, HearingSummary};

/// Which system prompt the next LLM call should use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "field")]
pub enum PromptKind {
    /// Generic character chat.
    Chat,
    /// React to a freshly stated goal and show interest.
    Interest,
    /// Ask specifically for one missing hearing field.
    AskField(HearingField),
    /// Summarise the hearing and ask for confirmation.
    HearingComplete,
    /// Produce (or discuss) the task tree.
    TaskOutput,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Interest => "interest",
            Self::AskField(HearingField::Why) => "ask_why",
            Self::AskField(HearingField::Current) => "ask_current",
            Self::AskField(HearingField::Target) => "ask_target",
            Self::AskField(HearingField::Timeline) => "ask_timeline",
            Self::HearingComplete => "hearing_complete",
            Self::TaskOutput => "task_output",
        }
    }
}

/// A prompt choice plus the summary to seed it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSelection {
    pub kind: PromptKind,
    pub summary: HearingSummary,
}

/// The result of one controller step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: DialogueState,
    pub prompt: PromptSelection,
    /// The hearing field newly collected this turn, if any.
    pub detected: Option<HearingField>,
}

impl Transition {
    pub fn stage_changed(&self, before: &DialogueState) -> bool {
        self.state.stage != before.stage
    }
}

/// Decide the next state and prompt for one user turn.
///
/// `last_assistant` is the assistant message immediately preceding
/// `user_message`, if there is one.
pub fn advance(
    state: &DialogueState,
    user_message: &str,
    last_assistant: Option<&str>,
    rules: &DetectionRules,
) -> Transition {
    let mut next = state.clone();
    let mut detected = None;

    let kind = match state.stage {
        DialogueStage::Normal => {
            if rules.is_motivation(user_message) {
                next.stage = DialogueStage::Hearing;
                next.summary.goal = Some(user_message.to_string());
                PromptKind::Interest
            } else {
                PromptKind::Chat
            }
        }
        DialogueStage::Hearing => {
            let curiosity = last_assistant.is_some_and(|m| rules.is_curiosity(m));
            if !curiosity {
                detected = detect_field(&state.progress, user_message, last_assistant, rules);
            }
            if let Some(field) = detected {
                next.progress.mark(field);
                next.summary.record(field, user_message);
            }

            match next.progress.next_missing() {
                None => {
                    next.stage = DialogueStage::Proposal;
                    PromptKind::HearingComplete
                }
                Some(field) => PromptKind::AskField(field),
            }
        }
        DialogueStage::Proposal => {
            if rules.is_affirmative(user_message) {
                next.stage = DialogueStage::Output;
                PromptKind::TaskOutput
            } else {
                PromptKind::HearingComplete
            }
        }
        DialogueStage::Output => PromptKind::TaskOutput,
    };

    if next.stage != state.stage {
        tracing::debug!(
            from = state.stage.as_str(),
            to = next.stage.as_str(),
            "dialogue stage transition"
        );
    }

    Transition {
        prompt: PromptSelection {
            kind,
            summary: next.summary.clone(),
        },
        state: next,
        detected,
    }
}

/// First unset field (in the fixed order) that the exchange answers.
///
/// At most one field is reported per turn.
pub fn detect_field(
    progress: &HearingProgress,
    user_message: &str,
    last_assistant: Option<&str>,
    rules: &DetectionRules,
) -> Option<HearingField> {
    HearingField::ORDER
        .into_iter()
        .filter(|field| !progress.is_set(*field))
        .find(|field| rules.field(*field).detects(user_message, last_assistant))
}
