use timeturn::models::*;
use timeturn::parser::{
    extract_actions, has_task_tree_structure, parse_task_tree, render_task_tree, IMPLICIT_GOAL_TITLE,
};
use timeturn::tree::TaskTree;

/// Type and title of every node, ignoring generated ids.
#[derive(Debug, PartialEq)]
struct Shape {
    node_type: Option<NodeType>,
    title: String,
    children: Vec<Shape>,
}

fn shape(nodes: &[TaskNode]) -> Vec<Shape> {
    nodes
        .iter()
        .map(|n| Shape {
            node_type: n.node_type,
            title: n.title.clone(),
            children: shape(&n.children),
        })
        .collect()
}

const PROPOSAL: &str = "\
いいね！こんな感じで進めてみよう。

Goal: 英語上達
├── Project: リスニング強化
│   ├── Milestone: 基礎固め
│   │   ├── Task: 毎日15分シャドーイング
│   │   └── Task: 週末に映画を1本
│   └── Task: ポッドキャストを聞く
└── Project: スピーキング
    └── Task: オンライン英会話を週2回

無理せずいこうね。
";

mod structure_detection {
    use super::*;

    #[test]
    fn single_marker_is_prose() {
        let text = "今日は Task: 洗濯 だけやろう";
        assert!(!has_task_tree_structure(text));
    }

    #[test]
    fn two_markers_are_a_tree() {
        assert!(has_task_tree_structure(PROPOSAL));
        assert!(has_task_tree_structure("Goal: A / Task: B"));
    }

    #[test]
    fn words_ending_in_a_type_name_do_not_count() {
        assert!(!has_task_tree_structure("SubTask: a\nMultiTask: b"));
    }
}

mod flat_form {
    use super::*;

    #[test]
    fn goal_project_task_nest_in_order() {
        let forest = parse_task_tree("Goal: 英語上達\nProject: リスニング強化\nTask: 毎日15分シャドーイング");

        assert_eq!(forest.len(), 1);
        let goal = &forest[0];
        assert_eq!(goal.node_type, Some(NodeType::Goal));
        assert_eq!(goal.title, "英語上達");
        assert_eq!(goal.children.len(), 1);

        let project = &goal.children[0];
        assert_eq!(project.node_type, Some(NodeType::Project));
        assert_eq!(project.title, "リスニング強化");
        assert_eq!(project.children.len(), 1);

        let task = &project.children[0];
        assert_eq!(task.node_type, Some(NodeType::Task));
        assert_eq!(task.title, "毎日15分シャドーイング");
        assert!(task.children.is_empty());
    }

    #[test]
    fn numbered_and_bulleted_lines_parse() {
        let forest = parse_task_tree("1. Goal: 健康\n- Project: 運動\n* Task: 散歩\n・Task: 筋トレ");
        assert_eq!(forest[0].title, "健康");
        let project = &forest[0].children[0];
        assert_eq!(project.children.len(), 2);
    }

    #[test]
    fn tasks_without_any_container_get_an_implicit_goal() {
        let forest = parse_task_tree("Task: 本を読む\nTask: 日記を書く");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].title, IMPLICIT_GOAL_TITLE);
        assert_eq!(forest[0].children.len(), 2);
    }
}

mod marker_form {
    use super::*;

    #[test]
    fn nests_a_full_proposal() {
        let forest = parse_task_tree(PROPOSAL);

        assert_eq!(forest.len(), 1);
        let goal = &forest[0];
        assert_eq!(goal.subtree_len(), 8);

        let listening = &goal.children[0];
        assert_eq!(listening.title, "リスニング強化");
        assert_eq!(listening.children.len(), 2);
        assert_eq!(listening.children[0].node_type, Some(NodeType::Milestone));
        assert_eq!(listening.children[0].children.len(), 2);
        assert_eq!(listening.children[1].title, "ポッドキャストを聞く");

        let speaking = &goal.children[1];
        assert_eq!(speaking.children[0].title, "オンライン英会話を週2回");
    }

    #[test]
    fn ascii_branches_count_as_glyphs() {
        let text = "Goal: G\n+-- Project: P\n|   `-- Task: T\n`-- Project: Q\n";
        let forest = parse_task_tree(text);
        let goal = &forest[0];
        assert_eq!(goal.children.len(), 2);
        assert_eq!(goal.children[0].children[0].title, "T");
        assert!(goal.children[1].children.is_empty());
    }

    #[test]
    fn several_roots_stay_separate() {
        let text = "Goal: A\n└── Task: a1\nGoal: B\n└── Task: b1\n";
        let forest = parse_task_tree(text);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[1].children[0].title, "b1");
    }
}

mod rendering {
    use super::*;

    #[test]
    fn rendered_tree_reparses_to_the_same_shape() {
        let forest = parse_task_tree(PROPOSAL);
        let rendered = render_task_tree(&forest);

        assert!(has_task_tree_structure(&rendered));
        assert_eq!(shape(&parse_task_tree(&rendered)), shape(&forest));
    }

    #[test]
    fn parsing_twice_gives_fresh_ids_but_same_shape() {
        let first = parse_task_tree(PROPOSAL);
        let second = parse_task_tree(PROPOSAL);

        assert_ne!(first[0].id, second[0].id);
        assert_eq!(shape(&first), shape(&second));
    }

    #[test]
    fn uses_branch_glyphs() {
        let rendered = render_task_tree(&parse_task_tree("Goal: G\nProject: P\nTask: T\nProject: Q"));
        assert!(rendered.starts_with("Goal: G\n"));
        assert!(rendered.contains("├── Project: P"));
        assert!(rendered.contains("│   └── Task: T"));
        assert!(rendered.contains("└── Project: Q"));
    }
}

mod action_tags {
    use super::*;

    fn parsed_tree() -> TaskTree {
        TaskTree::from_forest(parse_task_tree(PROPOSAL)).expect("parsed forest is valid")
    }

    #[test]
    fn proposed_actions_apply_to_a_parsed_tree() {
        let mut tree = parsed_tree();
        let reply = "いいね！[ADD_MILESTONE:スピーキング:発音矯正|鏡を見ながら]\n[ADD_MEMO:基礎固め:朝にやる]";
        let mut extraction = extract_actions(reply, &tree);

        assert_eq!(extraction.display_text, "いいね！");
        assert_eq!(extraction.actions.len(), 2);

        let report = tree.apply_actions(&mut extraction.actions);
        assert_eq!(report.applied, 2);
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.memos.len(), 1);
        assert!(extraction.actions.iter().all(|a| a.success == Some(true)));

        let created = tree.find_by_title("発音矯正").expect("milestone was added");
        assert_eq!(created.node_type(), Some(NodeType::Milestone));
        assert_eq!(created.parent().map(|p| p.title()), Some("スピーキング"));
        assert_eq!(created.memo(), Some("鏡を見ながら"));
        assert_eq!(tree.find_by_title("基礎固め").and_then(|n| n.memo()), Some("朝にやる"));
    }

    #[test]
    fn deselected_actions_are_skipped() {
        let mut tree = parsed_tree();
        let before = tree.len();
        let mut extraction = extract_actions("[ADD_GOAL:読書習慣]", &tree);
        extraction.actions[0].selected = false;

        let report = tree.apply_actions(&mut extraction.actions);
        assert_eq!(report.applied, 0);
        assert_eq!(extraction.actions[0].success, None);
        assert_eq!(tree.len(), before);
    }
}
