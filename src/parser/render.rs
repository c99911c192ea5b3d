//! Glyph tree rendering for task hierarchies.

use crate::models::{NodeType, TaskNode};

fn label(node: &TaskNode) -> String {
    match node.node_type {
        // The text form has no MicroTask marker; both are leaves.
        Some(NodeType::MicroTask) => format!("Task: {}", node.title),
        Some(t) => format!("{}: {}", t.as_str(), node.title),
        None => node.title.clone(),
    }
}

/// Render a task forest in the same `Type: Title` glyph layout the parser
/// reads back.
///
/// MicroTasks are written as `Task:` lines and come back as Tasks. Untyped
/// nodes are written as bare titles, which the parser does not read back.
///
/// Example output:
/// ```text
/// Goal: 英語上達
/// ├── Project: リスニング
/// │   ├── Task: 毎日シャドーイング
/// │   └── Task: ポッドキャストを聞く
/// └── Project: スピーキング
/// ```
pub fn render_task_tree(nodes: &[TaskNode]) -> String {
    let mut output = String::new();
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        render_node(&mut output, node, "", is_last, true);
    }
    output
}

fn render_node(output: &mut String, node: &TaskNode, prefix: &str, is_last: bool, is_root: bool) {
    if !is_root {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
    }
    output.push_str(&label(node));
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}
