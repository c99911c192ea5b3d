use serde::{Deserialize, Serialize};

/// The phase of the goal-hearing dialogue.
///
/// - `Normal`: Free chat, waiting for a motivation statement
/// - `Hearing`: Collecting why / current / target / timeline
/// - `Proposal`: Hearing complete, waiting for the user to confirm
/// - `Output`: Task tree produced; follow-up questions continue here
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    #[default]
    Normal,
    Hearing,
    Proposal,
    Output,
}

impl DialogueStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Hearing => "hearing",
            Self::Proposal => "proposal",
            Self::Output => "output",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "hearing" => Some(Self::Hearing),
            "proposal" => Some(Self::Proposal),
            "output" => Some(Self::Output),
            _ => None,
        }
    }

    /// Position in the forward-only stage order.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Hearing => 1,
            Self::Proposal => 2,
            Self::Output => 3,
        }
    }
}

/// One of the four pieces of information gathered during hearing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HearingField {
    Why,
    Current,
    Target,
    Timeline,
}

impl HearingField {
    /// Fixed check and question order.
    pub const ORDER: [HearingField; 4] = [
        HearingField::Why,
        HearingField::Current,
        HearingField::Target,
        HearingField::Timeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Why => "why",
            Self::Current => "current",
            Self::Target => "target",
            Self::Timeline => "timeline",
        }
    }
}

/// Which hearing fields have been collected.
///
/// Fields only ever go from `false` to `true` within a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HearingProgress {
    pub why: bool,
    pub current: bool,
    pub target: bool,
    pub timeline: bool,
}

impl HearingProgress {
    pub fn is_set(&self, field: HearingField) -> bool {
        match field {
            HearingField::Why => self.why,
            HearingField::Current => self.current,
            HearingField::Target => self.target,
            HearingField::Timeline => self.timeline,
        }
    }

    /// Mark a field as collected. Fields are never unset.
    pub fn mark(&mut self, field: HearingField) {
        match field {
            HearingField::Why => self.why = true,
            HearingField::Current => self.current = true,
            HearingField::Target => self.target = true,
            HearingField::Timeline => self.timeline = true,
        }
    }

    pub fn done_count(&self) -> usize {
        HearingField::ORDER
            .iter()
            .filter(|f| self.is_set(**f))
            .count()
    }

    /// Progress as a percentage (0, 25, 50, 75, 100).
    pub fn percent(&self) -> u8 {
        (self.done_count() * 100 / HearingField::ORDER.len()) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.done_count() == HearingField::ORDER.len()
    }

    /// The next field to ask about, in the fixed order.
    pub fn next_missing(&self) -> Option<HearingField> {
        HearingField::ORDER.into_iter().find(|f| !self.is_set(*f))
    }
}

/// The user utterances that satisfied each hearing field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HearingSummary {
    pub goal: Option<String>,
    pub why: Option<String>,
    pub current: Option<String>,
    pub target: Option<String>,
    pub timeline: Option<String>,
}

impl HearingSummary {
    pub fn get(&self, field: HearingField) -> Option<&str> {
        match field {
            HearingField::Why => self.why.as_deref(),
            HearingField::Current => self.current.as_deref(),
            HearingField::Target => self.target.as_deref(),
            HearingField::Timeline => self.timeline.as_deref(),
        }
    }

    /// Record a value unless one is already present.
    pub fn record(&mut self, field: HearingField, value: &str) {
        let slot = match field {
            HearingField::Why => &mut self.why,
            HearingField::Current => &mut self.current,
            HearingField::Target => &mut self.target,
            HearingField::Timeline => &mut self.timeline,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
}

/// Everything the stage controller needs to resume a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueState {
    pub stage: DialogueStage,
    pub progress: HearingProgress,
    pub summary: HearingSummary,
}

impl DialogueState {
    /// Start over: stage `normal`, nothing collected.
    pub fn restart() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_counts_quarters() {
        let mut progress = HearingProgress::default();
        assert_eq!(progress.percent(), 0);
        progress.mark(HearingField::Why);
        assert_eq!(progress.percent(), 25);
        progress.mark(HearingField::Timeline);
        assert_eq!(progress.percent(), 50);
        progress.mark(HearingField::Current);
        progress.mark(HearingField::Target);
        assert_eq!(progress.percent(), 100);
        assert!(progress.is_complete());
    }

    #[test]
    fn next_missing_follows_fixed_order() {
        let mut progress = HearingProgress::default();
        progress.mark(HearingField::Why);
        progress.mark(HearingField::Target);
        assert_eq!(progress.next_missing(), Some(HearingField::Current));
    }

    #[test]
    fn summary_record_does_not_overwrite() {
        let mut summary = HearingSummary::default();
        summary.record(HearingField::Why, "first");
        summary.record(HearingField::Why, "second");
        assert_eq!(summary.get(HearingField::Why), Some("first"));
    }

    #[test]
    fn stage_round_trips_through_str() {
        for stage in [
            DialogueStage::Normal,
            DialogueStage::Hearing,
            DialogueStage::Proposal,
            DialogueStage::Output,
        ] {
            assert_eq!(DialogueStage::from_str(stage.as_str()), Some(stage));
        }
    }
}
