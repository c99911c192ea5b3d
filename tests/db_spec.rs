use timeturn::db::Database;
use timeturn::models::*;
use timeturn::tree::{FlatNode, TaskTree};
use speculate2::speculate;
use uuid::Uuid;

fn create_test_conversation(db: &Database, user_id: &str) -> Conversation {
    db.create_conversation(CreateConversationInput {
        user_id: user_id.to_string(),
        title: None,
    })
    .expect("Failed to create conversation")
}

fn sample_forest() -> Vec<TaskNode> {
    let mut goal = TaskNode::new("g1", NodeType::Goal, "英語上達");
    let mut project = TaskNode::new("p1", NodeType::Project, "リスニング強化");
    project
        .children
        .push(TaskNode::new("t1", NodeType::Task, "毎日15分シャドーイング"));
    project.children.push(TaskNode::new("t2", NodeType::Task, "ポッドキャスト"));
    goal.children.push(project);
    vec![goal]
}

fn store_forest(db: &Database, user_id: &str, forest: Vec<TaskNode>) -> Vec<FlatNode> {
    let mut tree = db.get_task_tree(user_id).expect("Failed to load tree");
    let rows = tree.insert_forest(None, forest).expect("Failed to insert forest");
    db.save_nodes(user_id, &rows).expect("Failed to save nodes");
    rows
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "conversations" {
        describe "create_conversation" {
            it "uses a default title when none is given" {
                let conversation = create_test_conversation(&db, "u1");
                assert_eq!(conversation.user_id, "u1");
                assert!(!conversation.title.is_empty());
            }

            it "keeps an explicit title" {
                let conversation = db.create_conversation(CreateConversationInput {
                    user_id: "u1".to_string(),
                    title: Some("英語の相談".to_string()),
                }).expect("Failed to create conversation");
                assert_eq!(conversation.title, "英語の相談");
            }

            it "starts in the normal stage with nothing collected" {
                let conversation = create_test_conversation(&db, "u1");
                let state = db.get_dialogue_state(conversation.id).unwrap().unwrap();
                assert_eq!(state, DialogueState::default());
            }
        }

        describe "get_conversation" {
            it "returns None for an unknown id" {
                assert!(db.get_conversation(Uuid::new_v4()).unwrap().is_none());
            }

            it "round-trips stored fields" {
                let created = create_test_conversation(&db, "u1");
                let fetched = db.get_conversation(created.id).unwrap().unwrap();
                assert_eq!(fetched.id, created.id);
                assert_eq!(fetched.title, created.title);
            }
        }

        describe "list_conversations" {
            it "only lists the user's own conversations" {
                create_test_conversation(&db, "u1");
                create_test_conversation(&db, "u1");
                create_test_conversation(&db, "u2");

                assert_eq!(db.list_conversations("u1").unwrap().len(), 2);
                assert_eq!(db.list_conversations("u2").unwrap().len(), 1);
                assert!(db.list_conversations("nobody").unwrap().is_empty());
            }
        }

        describe "rename_conversation" {
            it "updates the title" {
                let conversation = create_test_conversation(&db, "u1");
                assert!(db.rename_conversation(conversation.id, "新しい名前").unwrap());
                let fetched = db.get_conversation(conversation.id).unwrap().unwrap();
                assert_eq!(fetched.title, "新しい名前");
            }
        }

        describe "delete_conversation" {
            it "removes the conversation and its messages" {
                let conversation = create_test_conversation(&db, "u1");
                db.append_message(conversation.id, Role::User, "こんにちは").unwrap();

                assert!(db.delete_conversation(conversation.id).unwrap());
                assert!(db.get_conversation(conversation.id).unwrap().is_none());
                assert!(db.get_messages(conversation.id, None).unwrap().is_empty());
            }

            it "returns false for an unknown id" {
                assert!(!db.delete_conversation(Uuid::new_v4()).unwrap());
            }
        }
    }

    describe "dialogue state" {
        it "stores the full state as a whole" {
            let conversation = create_test_conversation(&db, "u1");
            let mut state = DialogueState {
                stage: DialogueStage::Hearing,
                ..Default::default()
            };
            state.progress.mark(HearingField::Why);
            state.summary.goal = Some("プログラミングを学びたい".to_string());
            state.summary.record(HearingField::Why, "転職したいから");

            assert!(db.save_dialogue_state(conversation.id, &state).unwrap());
            let stored = db.get_dialogue_state(conversation.id).unwrap().unwrap();
            assert_eq!(stored, state);
        }

        it "reports a missing conversation" {
            let saved = db.save_dialogue_state(Uuid::new_v4(), &DialogueState::default()).unwrap();
            assert!(!saved);
            assert!(db.get_dialogue_state(Uuid::new_v4()).unwrap().is_none());
        }
    }

    describe "messages" {
        it "returns messages in the order they were appended" {
            let conversation = create_test_conversation(&db, "u1");
            db.append_message(conversation.id, Role::User, "一").unwrap();
            db.append_message(conversation.id, Role::Assistant, "二").unwrap();
            db.append_message(conversation.id, Role::User, "三").unwrap();

            let contents: Vec<String> = db
                .get_messages(conversation.id, None)
                .unwrap()
                .into_iter()
                .map(|m| m.content)
                .collect();
            assert_eq!(contents, vec!["一", "二", "三"]);
        }

        it "limits to the most recent messages" {
            let conversation = create_test_conversation(&db, "u1");
            for i in 0..5 {
                db.append_message(conversation.id, Role::User, &i.to_string()).unwrap();
            }

            let recent = db.get_messages(conversation.id, Some(2)).unwrap();
            assert_eq!(recent.len(), 2);
            assert_eq!(recent[0].content, "3");
            assert_eq!(recent[1].content, "4");
        }

        it "finds the last assistant message" {
            let conversation = create_test_conversation(&db, "u1");
            assert!(db.last_assistant_message(conversation.id).unwrap().is_none());

            db.append_message(conversation.id, Role::Assistant, "なんで学びたいの？").unwrap();
            db.append_message(conversation.id, Role::User, "転職したいから").unwrap();

            let last = db.last_assistant_message(conversation.id).unwrap();
            assert_eq!(last.as_deref(), Some("なんで学びたいの？"));
        }
    }

    describe "task tree" {
        it "starts empty" {
            assert!(db.get_task_tree("u1").unwrap().is_empty());
        }

        it "round-trips a nested forest with sibling order" {
            store_forest(&db, "u1", sample_forest());

            let forest = db.get_task_tree("u1").unwrap().to_forest(false);
            assert_eq!(forest, sample_forest());
        }

        it "keeps users' trees apart" {
            store_forest(&db, "u1", sample_forest());
            assert!(db.get_task_tree("u2").unwrap().is_empty());
        }

        it "archives without deleting" {
            store_forest(&db, "u1", sample_forest());

            let changed = db.archive_nodes("u1", &["p1".to_string(), "t1".to_string()]).unwrap();
            assert_eq!(changed, 2);

            let tree = db.get_task_tree("u1").unwrap();
            assert_eq!(tree.len(), 4);
            assert!(tree.get("p1").unwrap().is_archived());
            assert!(tree.to_forest(false)[0].children.is_empty());
        }

        it "updates memos" {
            store_forest(&db, "u1", sample_forest());

            assert!(db.update_node_memo("u1", "t1", "朝にやる").unwrap());
            assert!(!db.update_node_memo("u2", "t1", "他人のノード").unwrap());

            let tree = db.get_task_tree("u1").unwrap();
            assert_eq!(tree.get("t1").unwrap().memo(), Some("朝にやる"));
        }

        it "appends new roots after existing ones" {
            store_forest(&db, "u1", sample_forest());
            store_forest(&db, "u1", vec![TaskNode::new("g2", NodeType::Goal, "健康")]);

            let tree: TaskTree = db.get_task_tree("u1").unwrap();
            let roots: Vec<&str> = tree.roots().map(|r| r.id()).collect();
            assert_eq!(roots, vec!["g1", "g2"]);
        }
    }
}
