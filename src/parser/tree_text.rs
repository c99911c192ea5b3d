//! Recover a task hierarchy from free-form LLM text.
//!
//! Two layouts are understood. When any line carries tree-drawing glyphs the
//! text is read in *marker form*, where nesting comes from the width of each
//! line's glyph prefix. Otherwise it is read in *flat form*, where each line's
//! type keyword alone decides where it attaches.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{NodeType, TaskNode};
use crate::tree::new_node_id;

/// Title of the root synthesised when flat-form text has no Goal line.
pub const IMPLICIT_GOAL_TITLE: &str = "目標";

const TREE_GLYPHS: &[char] = &['│', '├', '└', '─', '┬', '┼', '┃', '┣', '┗', '━'];

static TYPE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z])(?:Goal|Project|Milestone|Task)\**\s*[:：]").expect("valid regex")
});

static NODE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<prefix>[\s│├└─┬┼┃┣┗━|+`\-*•・0-9.)]*)(?P<kind>Goal|Project|Milestone|Task)\**\s*[:：](?P<title>.*)$",
    )
    .expect("valid regex")
});

static ASCII_BRANCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s|]*(?:\+--|`--|\|--|\|\s)").expect("valid regex"));

/// Whether `text` looks like a task tree: at least two type markers
/// (`Goal:`, `Project:`, `Milestone:`, `Task:`, half- or full-width colon).
///
/// `MicroTask:` is not a marker.
pub fn has_task_tree_structure(text: &str) -> bool {
    TYPE_MARKER.find_iter(text).take(2).count() >= 2
}

/// Parse LLM output into a task forest.
///
/// Lines without a type marker are ignored, as are markers with an empty
/// title. Every node gets a fresh id and an "AI suggested" description.
/// Returns an empty forest when nothing parses.
pub fn parse_task_tree(text: &str) -> Vec<TaskNode> {
    let lines: Vec<ParsedLine> = text.lines().filter_map(ParsedLine::parse).collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let marker_form = text.lines().any(is_glyph_line);
    tracing::debug!(
        lines = lines.len(),
        form = if marker_form { "marker" } else { "flat" },
        "parsing task tree"
    );

    let mut builder = ForestBuilder::default();
    if marker_form {
        parse_marker_form(&mut builder, lines);
    } else {
        parse_flat_form(&mut builder, lines);
    }
    builder.build()
}

fn is_glyph_line(line: &str) -> bool {
    line.contains(TREE_GLYPHS) || ASCII_BRANCH.is_match(line)
}

#[derive(Debug)]
struct ParsedLine {
    indent: usize,
    node_type: NodeType,
    title: String,
}

impl ParsedLine {
    fn parse(line: &str) -> Option<Self> {
        let caps = NODE_LINE.captures(line)?;
        let node_type = NodeType::from_str(&caps["kind"])?;
        let title = caps["title"]
            .trim()
            .trim_matches('*')
            .trim()
            .to_string();
        if title.is_empty() {
            return None;
        }
        let indent = caps["prefix"]
            .chars()
            .filter(|c| *c != '*')
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum();
        Some(Self {
            indent,
            node_type,
            title,
        })
    }

    fn into_node(self) -> TaskNode {
        let mut node = TaskNode::new(new_node_id("ai"), self.node_type, self.title);
        node.description = Some(format!("AIからの提案 ({})", self.node_type.as_str()));
        node
    }
}

/// Nesting follows prefix width: a line attaches to the nearest preceding
/// container with a strictly smaller indent.
fn parse_marker_form(builder: &mut ForestBuilder, lines: Vec<ParsedLine>) {
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for line in lines {
        let indent = line.indent;
        let container = line.node_type.can_have_children();

        while stack.last().is_some_and(|&(_, top)| top >= indent) {
            stack.pop();
        }
        let parent = stack.last().map(|&(idx, _)| idx);
        let idx = builder.add(parent, line.into_node());
        if container {
            stack.push((idx, indent));
        }
    }
}

/// Each type attaches under the most recent node of the nearest enclosing
/// type. Orphans go under an implicit Goal.
fn parse_flat_form(builder: &mut ForestBuilder, lines: Vec<ParsedLine>) {
    let mut goal: Option<usize> = None;
    let mut project: Option<usize> = None;
    let mut milestone: Option<usize> = None;

    for line in lines {
        match line.node_type {
            NodeType::Goal => {
                goal = Some(builder.add(None, line.into_node()));
                project = None;
                milestone = None;
            }
            NodeType::Project => {
                let parent = ensure_goal(builder, &mut goal);
                project = Some(builder.add(Some(parent), line.into_node()));
                milestone = None;
            }
            NodeType::Milestone => {
                let parent = match project {
                    Some(p) => p,
                    None => ensure_goal(builder, &mut goal),
                };
                milestone = Some(builder.add(Some(parent), line.into_node()));
            }
            NodeType::Task | NodeType::MicroTask => {
                let parent = match milestone.or(project) {
                    Some(p) => p,
                    None => ensure_goal(builder, &mut goal),
                };
                builder.add(Some(parent), line.into_node());
            }
        }
    }
}

fn ensure_goal(builder: &mut ForestBuilder, goal: &mut Option<usize>) -> usize {
    *goal.get_or_insert_with(|| {
        let mut root = TaskNode::new(new_node_id("ai"), NodeType::Goal, IMPLICIT_GOAL_TITLE);
        root.description = Some(format!("AIからの提案 ({})", NodeType::Goal.as_str()));
        builder.add(None, root)
    })
}

#[derive(Debug)]
struct Draft {
    node: TaskNode,
    children: Vec<usize>,
}

/// Index-based builder so parents can be referenced while children are added.
#[derive(Debug, Default)]
struct ForestBuilder {
    drafts: Vec<Option<Draft>>,
    roots: Vec<usize>,
}

impl ForestBuilder {
    fn add(&mut self, parent: Option<usize>, node: TaskNode) -> usize {
        let idx = self.drafts.len();
        self.drafts.push(Some(Draft {
            node,
            children: Vec::new(),
        }));
        match parent.and_then(|p| self.drafts[p].as_mut()) {
            Some(draft) => draft.children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    fn build(mut self) -> Vec<TaskNode> {
        let roots = std::mem::take(&mut self.roots);
        roots
            .into_iter()
            .filter_map(|idx| self.assemble(idx))
            .collect()
    }

    fn assemble(&mut self, idx: usize) -> Option<TaskNode> {
        let Draft { mut node, children } = self.drafts[idx].take()?;
        node.children = children
            .into_iter()
            .filter_map(|child| self.assemble(child))
            .collect();
        Some(node)
    }
}
