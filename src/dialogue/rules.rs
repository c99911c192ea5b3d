//! Pattern tables for the keyword heuristics the stage controller runs on.
//!
//! Rules are plain regex strings in a [`RulesConfig`] so they can be tuned
//! from a JSON file without touching control flow. [`RulesConfig::compile`]
//! turns them into [`DetectionRules`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::HearingField;

const MOTIVATION: &[&str] = &[
    "したい",
    "学びたい",
    "なりたい",
    "やりたい",
    "始めたい",
    "身につけたい",
    "頑張りたい",
    "目標",
    "挑戦",
    "達成",
    r"(?i)\bwant to\b",
    r"(?i)\bmy goal\b",
];

const AFFIRMATIVE: &[&str] = &[
    "うん",
    "お願い",
    "はい",
    "よろしく",
    "いいね",
    "いいよ",
    "それで",
    "了解",
    "ぜひ",
    "頼む",
    r"(?i)\byes\b",
    r"(?i)\bok(?:ay)?\b",
    r"(?i)\bsure\b",
    r"(?i)\bplease\b",
];

const NEGATIVE: &[&str] = &[
    "ううん",
    "いいえ",
    "やめ",
    "違う",
    "待って",
    r"(?i)\bno\b",
    r"(?i)\bnope\b",
];

const CURIOSITY: &[&str] = &["ちょっと気になった", "ふと気になった", "余談だけど", "ところで"];

const WHY_QUESTION: &[&str] = &["なんで", "なぜ", "どうして", "理由", "きっかけ", r"(?i)\bwhy\b"];
const WHY_ANSWER: &[&str] = &[
    r"(?:から|ので|ため)(?:です|だよ|かな)?[。！!…]*$",
    "きっかけは",
    r"(?i)\bbecause\b",
];

const CURRENT_QUESTION: &[&str] = &[
    "現状",
    "現在",
    "今の(?:状況|レベル|スキル)",
    "今はどのくらい",
    "どのくらい(?:できる|経験)",
    "経験",
    r"(?i)\bcurrent(?:ly)?\b",
];
const CURRENT_ANSWER: &[&str] = &[
    "今は",
    "現在は",
    "初心者",
    "未経験",
    "経験(?:が|は)?(?:ある|ない|あり|なし)",
    "やったことない",
    r"(?i)\bbeginner\b",
];

const TARGET_QUESTION: &[&str] = &[
    "どうなりたい",
    "どんな状態",
    "ゴール",
    "目標は",
    "どこまで",
    "理想",
    r"(?i)\bwhat .*achieve\b",
];
const TARGET_ANSWER: &[&str] = &[
    "なりたい",
    "できるように",
    "合格",
    "取得",
    r"\d+点",
    "レベル",
];

const TIMELINE_QUESTION: &[&str] = &[
    "いつまで",
    "期限",
    "締め切り",
    "期間",
    r"(?i)\bdeadline\b",
    r"(?i)\bby when\b",
];
const TIMELINE_ANSWER: &[&str] = &[
    r"\d{4}年",
    r"\d+月",
    r"\d+(?:ヶ|か|カ|ケ)月",
    r"\d+週間",
    r"\d+年",
    "まで",
    "以内",
    "来年",
    "今年",
    "来月",
    "年内",
    "半年",
    r"(?i)\bby (?:the end|next)\b",
];

static BUILTIN: Lazy<DetectionRules> = Lazy::new(|| {
    RulesConfig::default()
        .compile()
        .expect("built-in detection rules are valid regexes")
});

/// A rule string failed to compile.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("invalid pattern in {table}: {pattern:?}: {source}")]
    InvalidPattern {
        table: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Question and answer patterns for one hearing field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPatterns {
    /// Matched against the previous assistant message.
    pub question: Vec<String>,
    /// Matched against the current user message.
    pub answer: Vec<String>,
}

impl FieldPatterns {
    fn from_static(question: &[&str], answer: &[&str]) -> Self {
        Self {
            question: to_strings(question),
            answer: to_strings(answer),
        }
    }
}

/// Uncompiled rule tables, as read from a rules JSON file.
///
/// Missing tables fall back to the built-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub motivation: Vec<String>,
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    pub curiosity: Vec<String>,
    pub why: FieldPatterns,
    pub current: FieldPatterns,
    pub target: FieldPatterns,
    pub timeline: FieldPatterns,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            motivation: to_strings(MOTIVATION),
            affirmative: to_strings(AFFIRMATIVE),
            negative: to_strings(NEGATIVE),
            curiosity: to_strings(CURIOSITY),
            why: FieldPatterns::from_static(WHY_QUESTION, WHY_ANSWER),
            current: FieldPatterns::from_static(CURRENT_QUESTION, CURRENT_ANSWER),
            target: FieldPatterns::from_static(TARGET_QUESTION, TARGET_ANSWER),
            timeline: FieldPatterns::from_static(TIMELINE_QUESTION, TIMELINE_ANSWER),
        }
    }
}

impl RulesConfig {
    pub fn compile(&self) -> Result<DetectionRules, RulesError> {
        Ok(DetectionRules {
            motivation: PatternSet::compile("motivation", &self.motivation)?,
            affirmative: PatternSet::compile("affirmative", &self.affirmative)?,
            negative: PatternSet::compile("negative", &self.negative)?,
            curiosity: PatternSet::compile("curiosity", &self.curiosity)?,
            why: FieldRule::compile("why", &self.why)?,
            current: FieldRule::compile("current", &self.current)?,
            target: FieldRule::compile("target", &self.target)?,
            timeline: FieldRule::compile("timeline", &self.timeline)?,
        })
    }
}

/// A list of regexes matched with "any" semantics.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    fn compile(table: &str, patterns: &[String]) -> Result<Self, RulesError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|source| RulesError::InvalidPattern {
                    table: table.to_string(),
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Compiled question/answer patterns for one hearing field.
#[derive(Debug, Clone, Default)]
pub struct FieldRule {
    pub question: PatternSet,
    pub answer: PatternSet,
}

impl FieldRule {
    fn compile(field: &str, patterns: &FieldPatterns) -> Result<Self, RulesError> {
        Ok(Self {
            question: PatternSet::compile(&format!("{}.question", field), &patterns.question)?,
            answer: PatternSet::compile(&format!("{}.answer", field), &patterns.answer)?,
        })
    }

    /// The previous assistant turn asked for this field, or the user's
    /// message reads like an answer to it.
    pub fn detects(&self, user_message: &str, last_assistant: Option<&str>) -> bool {
        last_assistant.is_some_and(|q| self.question.is_match(q)) || self.answer.is_match(user_message)
    }
}

/// Compiled heuristics used by [`crate::dialogue::advance`].
#[derive(Debug, Clone)]
pub struct DetectionRules {
    motivation: PatternSet,
    affirmative: PatternSet,
    negative: PatternSet,
    curiosity: PatternSet,
    why: FieldRule,
    current: FieldRule,
    target: FieldRule,
    timeline: FieldRule,
}

impl Default for DetectionRules {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl DetectionRules {
    /// The message states an intent to achieve something.
    pub fn is_motivation(&self, message: &str) -> bool {
        self.motivation.is_match(message)
    }

    /// The assistant message is an idle-curiosity aside.
    pub fn is_curiosity(&self, assistant_message: &str) -> bool {
        self.curiosity.is_match(assistant_message)
    }

    /// The user agreed. Negative tokens veto a match.
    pub fn is_affirmative(&self, message: &str) -> bool {
        !self.negative.is_match(message) && self.affirmative.is_match(message)
    }

    pub fn field(&self, field: HearingField) -> &FieldRule {
        match field {
            HearingField::Why => &self.why,
            HearingField::Current => &self.current,
            HearingField::Target => &self.target,
            HearingField::Timeline => &self.timeline,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
