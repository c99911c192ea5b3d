//! System prompt templates for each [`PromptKind`].

use handlebars::Handlebars;
use serde_json::json;
use thiserror::Error;

use super::controller::{PromptKind, PromptSelection};
use crate::models::{HearingField, HearingSummary};

const UNANSWERED: &str = "（まだ聞けていない）";

const CHAT: &str = r#"あなたは「{{character}}」という名前の、ユーザーの目標達成を応援するAIキャラクターです。
フレンドリーな口調で、短く自然に会話してください。
ユーザーが何かに挑戦したい様子を見せたら、その気持ちに寄り添ってください。"#;

const INTEREST: &str = r#"あなたは「{{character}}」です。ユーザーが新しい目標を話してくれました。
目標: 「{{goal}}」
まずはその目標に興味を示して、素直にワクワクを伝えてください。
そのうえで、なぜその目標を達成したいのか（理由・きっかけ）を一つだけ質問してください。"#;

const ASK_WHY: &str = r#"あなたは「{{character}}」です。ユーザーの目標についてヒアリングしています。
目標: 「{{goal}}」
まだ、なぜその目標に取り組みたいのか（理由・きっかけ）を聞けていません。
相手の話に軽く共感してから、「なんで」その目標を目指すのかを一つだけ質問してください。"#;

const ASK_CURRENT: &str = r#"あなたは「{{character}}」です。ユーザーの目標についてヒアリングしています。
目標: 「{{goal}}」
理由: {{why}}
次は、今の状況（現状のレベルや経験）を聞いてください。質問は一つだけにしてください。"#;

const ASK_TARGET: &str = r#"あなたは「{{character}}」です。ユーザーの目標についてヒアリングしています。
目標: 「{{goal}}」
理由: {{why}}
現状: {{current}}
次は、最終的に「どうなりたい」のか（具体的なゴールの状態）を聞いてください。質問は一つだけにしてください。"#;

const ASK_TIMELINE: &str = r#"あなたは「{{character}}」です。ユーザーの目標についてヒアリングしています。
目標: 「{{goal}}」
理由: {{why}}
現状: {{current}}
ゴール: {{target}}
最後に、「いつまでに」達成したいか（期限）を聞いてください。質問は一つだけにしてください。"#;

const HEARING_COMPLETE: &str = r#"あなたは「{{character}}」です。ヒアリングが完了しました。
以下の内容を短くまとめてユーザーに伝え、この内容でタスクを作ってよいか確認してください。

目標: 「{{goal}}」
理由: {{why}}
現状: {{current}}
ゴール: {{target}}
期限: {{timeline}}

最後に「この内容でタスクに分解してもいい？」のように、はい／いいえで答えられる質問をしてください。"#;

const TASK_OUTPUT: &str = r#"あなたは「{{character}}」です。以下のヒアリング内容をもとに、目標をタスクに分解してください。

目標: 「{{goal}}」
理由: {{why}}
現状: {{current}}
ゴール: {{target}}
期限: {{timeline}}

出力は必ず次のようなツリー形式にしてください。各行は「種類: タイトル」です。
種類は Goal / Project / Milestone / Task のいずれかです。

Goal: 目標のタイトル
├── Project: プロジェクトのタイトル
│   ├── Milestone: マイルストーンのタイトル
│   │   ├── Task: タスクのタイトル
│   │   └── Task: タスクのタイトル
│   └── Milestone: マイルストーンのタイトル
└── Project: プロジェクトのタイトル

ツリーのあとに、一言だけ応援のメッセージを添えてください。
ユーザーが続けて質問してきた場合は、作ったタスクについて答えてください。"#;

const MINI_CHAT: &str = r#"あなたは「{{character}}」です。ユーザーのタスクツリーについて相談に乗っています。

現在のタスクツリー:
{{outline}}

ツリーに追加したいものがあれば、返答の中に次のタグを含めてください（タグはユーザーには表示されません）。
[ADD_GOAL:タイトル]
[ADD_PROJECT:親のタイトル:タイトル]
[ADD_MILESTONE:親のタイトル:タイトル]
[ADD_TASK:親のタイトル:タイトル]
[ADD_MEMO:ノードのタイトル:メモ]
タイトルのあとに「|メモ」を付けると、追加したノードにメモを残せます。
親のタイトルは、上のツリーにあるタイトルをそのまま使ってください。"#;

const MINI_CHAT_TEMPLATE: &str = "mini_chat";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("chat", CHAT),
    ("interest", INTEREST),
    ("ask_why", ASK_WHY),
    ("ask_current", ASK_CURRENT),
    ("ask_target", ASK_TARGET),
    ("ask_timeline", ASK_TIMELINE),
    ("hearing_complete", HEARING_COMPLETE),
    ("task_output", TASK_OUTPUT),
    (MINI_CHAT_TEMPLATE, MINI_CHAT),
];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid prompt template: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    #[error("failed to render prompt: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Renders [`PromptSelection`]s into system prompt text.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    registry: Handlebars<'static>,
    character: String,
}

impl PromptLibrary {
    /// Build the library with the built-in templates.
    pub fn new(character: impl Into<String>) -> Result<Self, PromptError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        for (name, template) in BUILTIN_TEMPLATES {
            registry
                .register_template_string(name, *template)
                .map_err(Box::new)?;
        }
        Ok(Self {
            registry,
            character: character.into(),
        })
    }

    /// Replace the template used for `kind`.
    pub fn override_template(&mut self, kind: PromptKind, template: &str) -> Result<(), PromptError> {
        self.registry
            .register_template_string(kind.as_str(), template)
            .map_err(Box::new)?;
        Ok(())
    }

    pub fn render(&self, selection: &PromptSelection) -> Result<String, PromptError> {
        let data = summary_data(&self.character, &selection.summary);
        Ok(self.registry.render(selection.kind.as_str(), &data)?)
    }

    /// Prompt for the mini-chat, seeded with the user's tree outline.
    pub fn render_mini_chat(&self, outline: &str) -> Result<String, PromptError> {
        let outline = if outline.trim().is_empty() {
            "（まだ何もありません）"
        } else {
            outline
        };
        let data = json!({ "character": self.character, "outline": outline });
        Ok(self.registry.render(MINI_CHAT_TEMPLATE, &data)?)
    }
}

fn summary_data(character: &str, summary: &HearingSummary) -> serde_json::Value {
    let field = |f: HearingField| summary.get(f).unwrap_or(UNANSWERED);
    json!({
        "character": character,
        "goal": summary.goal.as_deref().unwrap_or(UNANSWERED),
        "why": field(HearingField::Why),
        "current": field(HearingField::Current),
        "target": field(HearingField::Target),
        "timeline": field(HearingField::Timeline),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> PromptLibrary {
        PromptLibrary::new("ときお").unwrap()
    }

    #[test]
    fn hearing_complete_injects_summary() {
        let selection = PromptSelection {
            kind: PromptKind::HearingComplete,
            summary: HearingSummary {
                goal: Some("英語上達".to_string()),
                why: Some("転職したいから".to_string()),
                current: Some("初心者".to_string()),
                target: Some("TOEIC 800点".to_string()),
                timeline: Some("2025年12月まで".to_string()),
            },
        };
        let text = library().render(&selection).unwrap();
        assert!(text.contains("ときお"));
        assert!(text.contains("転職したいから"));
        assert!(text.contains("2025年12月まで"));
    }

    #[test]
    fn missing_fields_render_placeholder() {
        let selection = PromptSelection {
            kind: PromptKind::AskField(HearingField::Current),
            summary: HearingSummary::default(),
        };
        let text = library().render(&selection).unwrap();
        assert!(text.contains(UNANSWERED));
    }

    #[test]
    fn html_is_not_escaped() {
        let selection = PromptSelection {
            kind: PromptKind::Interest,
            summary: HearingSummary {
                goal: Some("C++ & <Rust>".to_string()),
                ..Default::default()
            },
        };
        let text = library().render(&selection).unwrap();
        assert!(text.contains("C++ & <Rust>"));
    }

    #[test]
    fn override_replaces_template() {
        let mut lib = library();
        lib.override_template(PromptKind::Chat, "hi {{character}}").unwrap();
        let selection = PromptSelection {
            kind: PromptKind::Chat,
            summary: HearingSummary::default(),
        };
        assert_eq!(lib.render(&selection).unwrap(), "hi ときお");
    }

    #[test]
    fn unknown_variables_fail_to_render() {
        let mut lib = library();
        lib.override_template(PromptKind::Chat, "hi {{nickname}}").unwrap();
        let selection = PromptSelection {
            kind: PromptKind::Chat,
            summary: HearingSummary::default(),
        };
        assert!(matches!(lib.render(&selection), Err(PromptError::Render(_))));
    }

    #[test]
    fn mini_chat_lists_action_grammar() {
        let text = library().render_mini_chat("Goal: 英語上達\n").unwrap();
        assert!(text.contains("[ADD_TASK:"));
        assert!(text.contains("Goal: 英語上達"));
    }
}
