use serde::{Deserialize, Serialize};

/// The level of a node in the task hierarchy.
///
/// Goal ⊃ Project ⊃ Milestone ⊃ Task ⊃ MicroTask. `Task` and `MicroTask`
/// are leaves: they never carry children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeType {
    Goal,
    Project,
    Milestone,
    Task,
    MicroTask,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Goal => "Goal",
            Self::Project => "Project",
            Self::Milestone => "Milestone",
            Self::Task => "Task",
            Self::MicroTask => "MicroTask",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Goal" => Some(Self::Goal),
            "Project" => Some(Self::Project),
            "Milestone" => Some(Self::Milestone),
            "Task" => Some(Self::Task),
            "MicroTask" => Some(Self::MicroTask),
            _ => None,
        }
    }

    pub fn can_have_children(&self) -> bool {
        match self {
            Self::Goal | Self::Project | Self::Milestone => true,
            Self::Task | Self::MicroTask => false,
        }
    }

    /// Depth in the hierarchy; `Goal` is 0.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Goal => 0,
            Self::Project => 1,
            Self::Milestone => 2,
            Self::Task => 3,
            Self::MicroTask => 4,
        }
    }

    /// Whether a node of type `child` may sit directly under this one.
    /// Levels may be skipped (a Task under a Project) but never reversed.
    pub fn can_contain(&self, child: NodeType) -> bool {
        self.can_have_children() && child.rank() > self.rank()
    }

    /// The type a child of this node is expected to have.
    pub fn child_type(&self) -> Option<NodeType> {
        match self {
            Self::Goal => Some(Self::Project),
            Self::Project => Some(Self::Milestone),
            Self::Milestone => Some(Self::Task),
            Self::Task | Self::MicroTask => None,
        }
    }
}

/// A node in a user's task tree, with its subtree inlined.
///
/// This is the wire and parser shape. Stored trees are held in a
/// [`crate::tree::TaskTree`] arena and converted to this form for responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskNode {
    pub id: String,
    pub title: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            node_type: Some(node_type),
            ..Default::default()
        }
    }

    /// Whether children may be attached. Untyped nodes are treated as containers.
    pub fn accepts_children(&self) -> bool {
        self.node_type.map_or(true, |t| t.can_have_children())
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(TaskNode::subtree_len).sum::<usize>()
    }
}

/// Input for adding parsed or hand-written nodes to a user's tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeTreeInput {
    /// Attach under this node. `None` appends the nodes as new roots.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Nodes to insert. Ignored when `text` is given.
    #[serde(default)]
    pub nodes: Vec<TaskNode>,
    /// Raw LLM text to parse into nodes.
    #[serde(default)]
    pub text: Option<String>,
}

/// Result of merging a proposal into a user's tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeTreeResponse {
    /// `true` when nothing was parsed or supplied and the tree is unchanged.
    pub nothing_found: bool,
    pub inserted: Vec<TaskNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_follows_rank() {
        assert!(NodeType::Goal.can_contain(NodeType::Project));
        assert!(NodeType::Project.can_contain(NodeType::Task));
        assert!(!NodeType::Milestone.can_contain(NodeType::Project));
        assert!(!NodeType::Project.can_contain(NodeType::Project));
        assert!(!NodeType::Task.can_contain(NodeType::MicroTask));
    }

    #[test]
    fn leaves_cannot_have_children() {
        assert!(NodeType::Goal.can_have_children());
        assert!(NodeType::Milestone.can_have_children());
        assert!(!NodeType::Task.can_have_children());
        assert!(!NodeType::MicroTask.can_have_children());
    }

    #[test]
    fn serializes_type_field_name() {
        let node = TaskNode::new("n1", NodeType::Project, "Listening");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "Project");
        assert_eq!(json["title"], "Listening");
        assert!(json.get("description").is_none());
    }
}
