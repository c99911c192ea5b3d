//! Arena-backed task tree.
//!
//! Nodes live in a flat `Vec` with parent/child indices plus an id index, so
//! inserting under, archiving, or annotating one node touches only that node
//! and its ancestors' child lists instead of rebuilding the whole forest.

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::{distr::Alphanumeric, Rng};
use regex::Regex;
use thiserror::Error;

use crate::models::{ActionItem, ActionType, NodeType, TaskNode};
use crate::parser::render_task_tree;

static TYPE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:goal|project|milestone|micro\s*task|task|目標|プロジェクト|マイルストーン|タスク)\s*[:：]\s*")
        .expect("valid regex")
});

/// Generate a collision-resistant node id: `<prefix>-<unix millis>-<9 random chars>`.
pub fn new_node_id(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix)
}

/// Normalise a title for fuzzy comparison: type prefix and quotes stripped,
/// lowercased, trimmed.
pub fn normalize_title(title: &str) -> String {
    let stripped = TYPE_PREFIX.replace(title, "");
    stripped
        .trim()
        .trim_matches(|c| matches!(c, '「' | '」' | '"' | '\'' | '*'))
        .trim()
        .to_lowercase()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("node {0} is a leaf and cannot have children")]
    LeafParent(String),

    #[error("duplicate node id: {0}")]
    DuplicateId(String),

    #[error("node {id}: a {child} cannot be placed under a {parent}")]
    Misplaced {
        id: String,
        child: &'static str,
        parent: &'static str,
    },
}

/// A node without its subtree, with enough placement to persist it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    /// `children` is always empty.
    pub node: TaskNode,
    pub parent_id: Option<String>,
    pub position: usize,
}

/// What a batch of actions changed, for the caller to persist.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub created: Vec<FlatNode>,
    /// `(node_id, full memo after the update)`
    pub memos: Vec<(String, String)>,
    pub applied: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    node: TaskNode,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A user's task forest.
#[derive(Debug, Clone, Default)]
pub struct TaskTree {
    slots: Vec<Slot>,
    roots: Vec<usize>,
    index: HashMap<String, usize>,
}

/// Borrowed view of one node in a [`TaskTree`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a TaskTree,
    idx: usize,
}

impl<'a> NodeRef<'a> {
    fn slot(&self) -> &'a Slot {
        &self.tree.slots[self.idx]
    }

    pub fn id(&self) -> &'a str {
        &self.slot().node.id
    }

    pub fn title(&self) -> &'a str {
        &self.slot().node.title
    }

    pub fn node_type(&self) -> Option<NodeType> {
        self.slot().node.node_type
    }

    pub fn is_archived(&self) -> bool {
        self.slot().node.archived
    }

    pub fn accepts_children(&self) -> bool {
        self.slot().node.accepts_children()
    }

    pub fn memo(&self) -> Option<&'a str> {
        self.slot().node.memo.as_deref()
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.slot().parent.map(|idx| NodeRef {
            tree: self.tree,
            idx,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.slot()
            .children
            .iter()
            .map(move |&idx| NodeRef { tree, idx })
    }
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored rows. Rows must be ordered by position; rows whose
    /// parent is unknown become roots.
    pub fn from_flat(rows: Vec<FlatNode>) -> Self {
        let mut tree = Self::new();
        let mut parents = Vec::with_capacity(rows.len());
        for row in rows {
            if tree.index.contains_key(&row.node.id) {
                tracing::warn!(id = %row.node.id, "skipping duplicate stored node");
                continue;
            }
            let idx = tree.push_slot(row.node, None);
            parents.push((idx, row.parent_id));
        }
        for (idx, parent_id) in parents {
            match parent_id.and_then(|pid| tree.index.get(&pid).copied()) {
                Some(parent) if parent != idx => {
                    tree.slots[idx].parent = Some(parent);
                    tree.slots[parent].children.push(idx);
                }
                _ => tree.roots.push(idx),
            }
        }
        tree
    }

    /// Build from nested nodes.
    pub fn from_forest(forest: Vec<TaskNode>) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        tree.insert_forest(None, forest)?;
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<NodeRef<'_>> {
        self.index.get(id).map(|&idx| NodeRef { tree: self, idx })
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.roots.iter().map(move |&idx| NodeRef { tree: self, idx })
    }

    /// Nested view of the tree. Archived subtrees are dropped unless asked for.
    pub fn to_forest(&self, include_archived: bool) -> Vec<TaskNode> {
        self.roots
            .iter()
            .filter_map(|&idx| self.build_nested(idx, include_archived))
            .collect()
    }

    fn build_nested(&self, idx: usize, include_archived: bool) -> Option<TaskNode> {
        let slot = &self.slots[idx];
        if slot.node.archived && !include_archived {
            return None;
        }
        let mut node = slot.node.clone();
        node.children = slot
            .children
            .iter()
            .filter_map(|&child| self.build_nested(child, include_archived))
            .collect();
        Some(node)
    }

    /// Glyph rendering of the live (non-archived) forest.
    pub fn outline(&self) -> String {
        render_task_tree(&self.to_forest(false))
    }

    /// Insert nested nodes under `parent_id`, or as new roots.
    ///
    /// Nothing is inserted if any id collides, a leaf would gain children, or
    /// a node would sit under a level that is not above its own.
    pub fn insert_forest(
        &mut self,
        parent_id: Option<&str>,
        forest: Vec<TaskNode>,
    ) -> Result<Vec<FlatNode>, TreeError> {
        let parent = match parent_id {
            Some(pid) => {
                let idx = *self
                    .index
                    .get(pid)
                    .ok_or_else(|| TreeError::NotFound(pid.to_string()))?;
                if !self.slots[idx].node.accepts_children() {
                    return Err(TreeError::LeafParent(pid.to_string()));
                }
                Some(idx)
            }
            None => None,
        };
        let parent_type = parent.and_then(|idx| self.typed_level(idx));

        let mut seen = std::collections::HashSet::new();
        for node in &forest {
            self.validate_subtree(node, parent_type, &mut seen)?;
        }

        let mut inserted = Vec::new();
        for node in forest {
            self.insert_subtree(parent, node, &mut inserted);
        }
        Ok(inserted)
    }

    /// The type of the node at `idx`, or of its nearest typed ancestor.
    fn typed_level(&self, idx: usize) -> Option<NodeType> {
        let mut current = Some(idx);
        while let Some(i) = current {
            if let Some(t) = self.slots[i].node.node_type {
                return Some(t);
            }
            current = self.slots[i].parent;
        }
        None
    }

    fn validate_subtree<'n>(
        &self,
        node: &'n TaskNode,
        parent_type: Option<NodeType>,
        seen: &mut std::collections::HashSet<&'n str>,
    ) -> Result<(), TreeError> {
        if self.index.contains_key(&node.id) || !seen.insert(node.id.as_str()) {
            return Err(TreeError::DuplicateId(node.id.clone()));
        }
        if !node.children.is_empty() && !node.accepts_children() {
            return Err(TreeError::LeafParent(node.id.clone()));
        }
        if let (Some(parent), Some(child)) = (parent_type, node.node_type) {
            if !parent.can_contain(child) {
                return Err(TreeError::Misplaced {
                    id: node.id.clone(),
                    child: child.as_str(),
                    parent: parent.as_str(),
                });
            }
        }
        let level = node.node_type.or(parent_type);
        for child in &node.children {
            self.validate_subtree(child, level, seen)?;
        }
        Ok(())
    }

    fn insert_subtree(&mut self, parent: Option<usize>, mut node: TaskNode, out: &mut Vec<FlatNode>) {
        let children = std::mem::take(&mut node.children);
        let idx = self.push_slot(node, parent);
        match parent {
            Some(p) => self.slots[p].children.push(idx),
            None => self.roots.push(idx),
        }
        out.push(FlatNode {
            node: self.slots[idx].node.clone(),
            parent_id: parent.map(|p| self.slots[p].node.id.clone()),
            position: self.position_of(idx),
        });
        for child in children {
            self.insert_subtree(Some(idx), child, out);
        }
    }

    fn push_slot(&mut self, node: TaskNode, parent: Option<usize>) -> usize {
        let idx = self.slots.len();
        self.index.insert(node.id.clone(), idx);
        self.slots.push(Slot {
            node,
            parent,
            children: Vec::new(),
        });
        idx
    }

    fn position_of(&self, idx: usize) -> usize {
        let siblings = match self.slots[idx].parent {
            Some(p) => &self.slots[p].children,
            None => &self.roots,
        };
        siblings.iter().position(|&s| s == idx).unwrap_or(0)
    }

    /// Archive a node and its descendants. Returns every id newly archived.
    pub fn archive(&mut self, id: &str) -> Result<Vec<String>, TreeError> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        let mut archived = Vec::new();
        let mut pending = vec![idx];
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current];
            if !slot.node.archived {
                slot.node.archived = true;
                archived.push(slot.node.id.clone());
            }
            pending.extend(slot.children.iter().copied());
        }
        Ok(archived)
    }

    /// Append a memo line to a node. Returns the full memo.
    pub fn add_memo(&mut self, id: &str, memo: &str) -> Result<String, TreeError> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        let node = &mut self.slots[idx].node;
        let updated = match node.memo.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, memo),
            _ => memo.to_string(),
        };
        node.memo = Some(updated.clone());
        Ok(updated)
    }

    /// Fuzzy, case-insensitive title lookup over live nodes.
    ///
    /// Exact (normalised) matches win; otherwise the closest substring match
    /// in either direction.
    pub fn find_by_title(&self, query: &str) -> Option<NodeRef<'_>> {
        let query = normalize_title(query);
        if query.is_empty() {
            return None;
        }

        let live = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.node.archived)
            .map(|(idx, slot)| (idx, normalize_title(&slot.node.title)))
            .filter(|(_, title)| !title.is_empty())
            .collect::<Vec<_>>();

        let exact = live.iter().find(|(_, title)| *title == query);
        let fuzzy = || {
            live.iter()
                .filter(|(_, title)| title.contains(&query) || query.contains(title.as_str()))
                .min_by_key(|(_, title)| title.chars().count().abs_diff(query.chars().count()))
        };

        exact
            .or_else(fuzzy)
            .map(|&(idx, _)| NodeRef { tree: self, idx })
    }

    /// Apply the selected actions in order as one batch.
    ///
    /// Each action's `success` is set; unselected actions are left untouched.
    /// An add whose parent sits at a different level is re-typed to that
    /// parent's child level before it is applied.
    pub fn apply_actions(&mut self, actions: &mut [ActionItem]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for action in actions.iter_mut().filter(|a| a.selected) {
            let ok = match self.apply_one(action, &mut report) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(action = action.action_type.as_str(), error = %e, "action not applied");
                    false
                }
            };
            action.success = Some(ok);
            if ok {
                report.applied += 1;
            }
        }
        report
    }

    fn apply_one(&mut self, action: &mut ActionItem, report: &mut ApplyReport) -> Result<(), TreeError> {
        if action.action_type == ActionType::AddMemo {
            let target = action
                .parent_id
                .as_deref()
                .ok_or_else(|| TreeError::NotFound("memo target".to_string()))?;
            let memo = self.add_memo(target, action.memo.as_deref().unwrap_or_default())?;
            report.memos.push((target.to_string(), memo));
            return Ok(());
        }

        let parent = match action.action_type {
            ActionType::AddGoal => None,
            _ => Some(
                action
                    .parent_id
                    .as_deref()
                    .ok_or_else(|| TreeError::NotFound("parent".to_string()))?,
            ),
        };
        let expected = parent
            .and_then(|pid| self.index.get(pid).copied())
            .and_then(|idx| self.typed_level(idx))
            .and_then(|t| t.child_type());
        if let Some(child_type) = expected {
            action.action_type = ActionType::for_node_type(child_type);
        }

        let node_type = action.action_type.creates().unwrap_or(NodeType::Task);
        let title = action
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TreeError::NotFound("action title".to_string()))?;

        let mut node = TaskNode::new(new_node_id("node"), node_type, title);
        node.memo = action.memo.clone().filter(|m| !m.trim().is_empty());

        let created = self.insert_forest(parent, vec![node])?;
        report.created.extend(created);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> TaskTree {
        let mut goal = TaskNode::new("g1", NodeType::Goal, "英語上達");
        let mut project = TaskNode::new("p1", NodeType::Project, "リスニング強化");
        project.children.push(TaskNode::new("t1", NodeType::Task, "毎日シャドーイング"));
        goal.children.push(project);
        TaskTree::from_forest(vec![goal]).unwrap()
    }

    #[test]
    fn new_node_ids_are_unique_and_prefixed() {
        let a = new_node_id("ai");
        let b = new_node_id("ai");
        assert!(a.starts_with("ai-"));
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_strips_type_prefixes() {
        assert_eq!(normalize_title("Goal: English"), "english");
        assert_eq!(normalize_title("目標：英語上達"), "英語上達");
        assert_eq!(normalize_title("「リスニング」"), "リスニング");
    }

    #[test]
    fn round_trips_to_forest() {
        let tree = sample_tree();
        let forest = tree.to_forest(false);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].children[0].children[0].title, "毎日シャドーイング");
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn insert_under_leaf_is_rejected() {
        let mut tree = sample_tree();
        let err = tree
            .insert_forest(Some("t1"), vec![TaskNode::new("x", NodeType::Task, "x")])
            .unwrap_err();
        assert_eq!(err, TreeError::LeafParent("t1".to_string()));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn insert_rejects_duplicate_ids_atomically() {
        let mut tree = sample_tree();
        let forest = vec![
            TaskNode::new("new1", NodeType::Goal, "a"),
            TaskNode::new("g1", NodeType::Goal, "b"),
        ];
        assert_eq!(
            tree.insert_forest(None, forest).unwrap_err(),
            TreeError::DuplicateId("g1".to_string())
        );
        assert!(tree.get("new1").is_none());
    }

    #[test]
    fn insert_rejects_a_higher_level_under_a_lower_one() {
        let mut tree = sample_tree();
        let mut milestone = TaskNode::new("m1", NodeType::Milestone, "基礎");
        milestone.children.push(TaskNode::new("p2", NodeType::Project, "逆転"));

        let err = tree.insert_forest(Some("p1"), vec![milestone]).unwrap_err();
        assert!(matches!(err, TreeError::Misplaced { ref id, .. } if id == "p2"));
        assert!(tree.get("m1").is_none());

        let err = tree
            .insert_forest(Some("g1"), vec![TaskNode::new("g2", NodeType::Goal, "入れ子")])
            .unwrap_err();
        assert!(matches!(err, TreeError::Misplaced { .. }));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn insert_allows_skipping_levels() {
        let mut tree = sample_tree();
        tree.insert_forest(Some("g1"), vec![TaskNode::new("t2", NodeType::Task, "直下のタスク")])
            .unwrap();
        assert_eq!(tree.get("t2").unwrap().parent().unwrap().id(), "g1");
    }

    #[test]
    fn insert_reports_parent_and_position() {
        let mut tree = sample_tree();
        let inserted = tree
            .insert_forest(Some("p1"), vec![TaskNode::new("m1", NodeType::Milestone, "基礎")])
            .unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].parent_id.as_deref(), Some("p1"));
        assert_eq!(inserted[0].position, 1);
    }

    #[test]
    fn archive_hides_subtree_but_keeps_nodes() {
        let mut tree = sample_tree();
        let archived = tree.archive("p1").unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(tree.len(), 3);
        assert!(tree.to_forest(false)[0].children.is_empty());
        assert_eq!(tree.to_forest(true)[0].children.len(), 1);
    }

    #[test]
    fn find_by_title_prefers_exact_then_substring() {
        let tree = sample_tree();
        assert_eq!(tree.find_by_title("Project: リスニング強化").unwrap().id(), "p1");
        assert_eq!(tree.find_by_title("リスニング").unwrap().id(), "p1");
        assert_eq!(tree.find_by_title("英語").unwrap().id(), "g1");
        assert!(tree.find_by_title("数学").is_none());
    }

    #[test]
    fn find_by_title_ignores_archived_nodes() {
        let mut tree = sample_tree();
        tree.archive("t1").unwrap();
        assert!(tree.find_by_title("シャドーイング").is_none());
    }

    #[test]
    fn from_flat_links_children_in_order() {
        let rows = vec![
            FlatNode {
                node: TaskNode::new("g", NodeType::Goal, "G"),
                parent_id: None,
                position: 0,
            },
            FlatNode {
                node: TaskNode::new("a", NodeType::Project, "A"),
                parent_id: Some("g".to_string()),
                position: 0,
            },
            FlatNode {
                node: TaskNode::new("orphan", NodeType::Task, "O"),
                parent_id: Some("missing".to_string()),
                position: 0,
            },
        ];
        let tree = TaskTree::from_flat(rows);
        assert_eq!(tree.roots().count(), 2);
        assert_eq!(tree.get("a").unwrap().parent().unwrap().id(), "g");
    }

    #[test]
    fn add_memo_appends() {
        let mut tree = sample_tree();
        tree.add_memo("t1", "朝にやる").unwrap();
        let memo = tree.add_memo("t1", "15分").unwrap();
        assert_eq!(memo, "朝にやる\n15分");
    }

    #[test]
    fn apply_retypes_adds_to_the_parent_child_level() {
        let mut tree = sample_tree();
        tree.insert_forest(Some("p1"), vec![TaskNode::new("m", NodeType::Milestone, "基礎")])
            .unwrap();
        let mut actions = vec![ActionItem {
            action_type: ActionType::AddProject,
            parent_id: Some("m".to_string()),
            title: Some("発音".to_string()),
            memo: None,
            selected: true,
            success: None,
        }];

        let report = tree.apply_actions(&mut actions);
        assert_eq!(actions[0].success, Some(true));
        assert_eq!(actions[0].action_type, ActionType::AddTask);
        assert_eq!(report.created[0].node.node_type, Some(NodeType::Task));
        let created = tree.find_by_title("発音").unwrap();
        assert_eq!(created.parent().and_then(|p| p.node_type()), Some(NodeType::Milestone));
    }

    #[test]
    fn apply_actions_sets_success_flags() {
        let mut tree = sample_tree();
        let mut actions = vec![
            ActionItem {
                action_type: ActionType::AddMilestone,
                parent_id: Some("p1".to_string()),
                title: Some("基礎固め".to_string()),
                memo: None,
                selected: true,
                success: None,
            },
            ActionItem {
                action_type: ActionType::AddTask,
                parent_id: Some("gone".to_string()),
                title: Some("迷子".to_string()),
                memo: None,
                selected: true,
                success: None,
            },
            ActionItem {
                action_type: ActionType::AddGoal,
                parent_id: None,
                title: Some("未選択".to_string()),
                memo: None,
                selected: false,
                success: None,
            },
        ];
        let report = tree.apply_actions(&mut actions);
        assert_eq!(report.applied, 1);
        assert_eq!(actions[0].success, Some(true));
        assert_eq!(actions[1].success, Some(false));
        assert_eq!(actions[2].success, None);
        assert_eq!(report.created[0].node.node_type, Some(NodeType::Milestone));
        assert!(tree.find_by_title("未選択").is_none());
    }
}
