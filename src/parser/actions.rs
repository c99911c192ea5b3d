//! Inline action tags in mini-chat replies.
//!
//! The assistant proposes tree edits by embedding tags such as
//! `[ADD_TASK:リスニング:毎日10分聞く|通勤中に]`. Tags are stripped from the
//! displayed text and turned into [`ActionItem`]s whose parent names are
//! resolved against the user's current tree.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ActionExtraction, ActionItem, ActionType};
use crate::tree::{NodeRef, TaskTree};

static ACTION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(ADD_GOAL|ADD_PROJECT|ADD_MILESTONE|ADD_TASK|ADD_MEMO)[:：]([^\]]*)\]")
        .expect("valid regex")
});

static LEADING_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:goal|project|milestone|task|目標|プロジェクト|マイルストーン|タスク)\s*[:：]\s*")
        .expect("valid regex")
});

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// Strip action tags from `text` and resolve them against `tree`.
///
/// Actions whose parent or target cannot be found are dropped. An add whose
/// named parent has a different level is re-typed to the level that parent
/// actually takes, and a leaf parent is replaced by its own parent.
pub fn extract_actions(text: &str, tree: &TaskTree) -> ActionExtraction {
    let mut actions = Vec::new();
    for caps in ACTION_TAG.captures_iter(text) {
        let Some(action_type) = ActionType::from_tag(&caps[1]) else {
            continue;
        };
        match resolve(action_type, &caps[2], tree) {
            Some(action) => actions.push(action),
            None => tracing::debug!(tag = &caps[0], "dropping unresolved action tag"),
        }
    }

    ActionExtraction {
        display_text: clean_display_text(&ACTION_TAG.replace_all(text, "")),
        actions,
    }
}

fn resolve(action_type: ActionType, body: &str, tree: &TaskTree) -> Option<ActionItem> {
    match action_type {
        ActionType::AddGoal => {
            let (title, memo) = split_memo(body);
            let title = non_empty(title)?;
            Some(new_action(ActionType::AddGoal, None, Some(title), memo))
        }
        ActionType::AddMemo => {
            let (target, memo) = split_target(body)?;
            let node = tree.find_by_title(target)?;
            let memo = non_empty(memo)?;
            Some(new_action(
                ActionType::AddMemo,
                Some(node.id().to_string()),
                None,
                Some(memo),
            ))
        }
        ActionType::AddProject | ActionType::AddMilestone | ActionType::AddTask => {
            let (main, memo) = split_memo(body);
            let (parent_name, title) = split_target(main)?;
            let title = non_empty(title)?;
            let parent = container_for(tree.find_by_title(parent_name)?)?;
            let action_type = parent
                .node_type()
                .and_then(|t| t.child_type())
                .map(ActionType::for_node_type)
                .unwrap_or(action_type);
            Some(new_action(
                action_type,
                Some(parent.id().to_string()),
                Some(title),
                memo,
            ))
        }
    }
}

/// The node itself if it can hold children, otherwise its parent.
fn container_for(node: NodeRef<'_>) -> Option<NodeRef<'_>> {
    if node.accepts_children() {
        Some(node)
    } else {
        node.parent()
    }
}

fn new_action(
    action_type: ActionType,
    parent_id: Option<String>,
    title: Option<String>,
    memo: Option<String>,
) -> ActionItem {
    ActionItem {
        action_type,
        parent_id,
        title,
        memo,
        selected: true,
        success: None,
    }
}

/// `title|memo` → (`title`, `memo`).
fn split_memo(body: &str) -> (&str, Option<String>) {
    match body.split_once('|') {
        Some((main, memo)) => (main, non_empty(memo)),
        None => (body, None),
    }
}

/// `parent:title` → (`parent`, `title`). A leading type prefix on the parent
/// (`Goal: 英語:…`) is skipped before splitting.
fn split_target(body: &str) -> Option<(&str, &str)> {
    let skip = LEADING_TYPE.find(body).map_or(0, |m| m.end());
    let rest = &body[skip..];
    let split = rest.find([':', '：'])?;
    let sep_len = rest[split..].chars().next().map_or(1, char::len_utf8);
    Some((&rest[..split], &rest[split + sep_len..]))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn clean_display_text(text: &str) -> String {
    let lines = text
        .lines()
        .map(|line| SPACE_RUNS.replace_all(line, " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_RUNS.replace_all(&lines, "\n\n").trim().to_string()
}
