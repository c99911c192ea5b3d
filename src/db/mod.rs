mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::*;
use crate::tree::{FlatNode, TaskTree};

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const DEFAULT_CONVERSATION_TITLE: &str = "新しい会話";

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Conversation operations
    // ============================================================

    pub fn create_conversation(&self, input: CreateConversationInput) -> Result<Conversation> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let title = input
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string());
        let state = DialogueState::default();

        conn.execute(
            "INSERT INTO conversations (id, user_id, title, stage, hearing_progress, hearing_summary, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.user_id,
                &title,
                state.stage.as_str(),
                serde_json::to_string(&state.progress)?,
                serde_json::to_string(&state.summary)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Conversation {
            id,
            user_id: input.user_id,
            title,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let conversation = conn
            .query_row(
                "SELECT id, user_id, title, created_at, updated_at
                 FROM conversations WHERE id = ?",
                [id.to_string()],
                |row| {
                    Ok(Conversation {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        created_at: parse_datetime(row.get::<_, String>(3)?),
                        updated_at: parse_datetime(row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, created_at, updated_at
             FROM conversations WHERE user_id = ? ORDER BY updated_at DESC",
        )?;

        let conversations = stmt
            .query_map([user_id], |row| {
                Ok(Conversation {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: parse_datetime(row.get::<_, String>(3)?),
                    updated_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(conversations)
    }

    pub fn rename_conversation(&self, id: Uuid, title: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?",
            (title, Utc::now().to_rfc3339(), id.to_string()),
        )?;
        Ok(rows > 0)
    }

    /// Delete a conversation and its messages.
    pub fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM conversations WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Dialogue state operations
    // ============================================================

    /// Overwrite the stored state. Returns `false` if the conversation is gone.
    pub fn save_dialogue_state(&self, id: Uuid, state: &DialogueState) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE conversations SET stage = ?, hearing_progress = ?, hearing_summary = ?, updated_at = ?
             WHERE id = ?",
            (
                state.stage.as_str(),
                serde_json::to_string(&state.progress)?,
                serde_json::to_string(&state.summary)?,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ),
        )?;
        Ok(rows > 0)
    }

    pub fn get_dialogue_state(&self, id: Uuid) -> Result<Option<DialogueState>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let state = conn
            .query_row(
                "SELECT stage, hearing_progress, hearing_summary FROM conversations WHERE id = ?",
                [id.to_string()],
                |row| {
                    let stage: String = row.get(0)?;
                    let progress: String = row.get(1)?;
                    let summary: String = row.get(2)?;
                    Ok(DialogueState {
                        stage: DialogueStage::from_str(&stage).unwrap_or_default(),
                        progress: serde_json::from_str(&progress).unwrap_or_default(),
                        summary: serde_json::from_str(&summary).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    // ============================================================
    // Message operations
    // ============================================================

    pub fn append_message(&self, conversation_id: Uuid, role: Role, content: &str) -> Result<ChatMessage> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                conversation_id.to_string(),
                role.as_str(),
                content,
                now.to_rfc3339(),
            ),
        )?;
        conn.execute(
            "UPDATE conversations SET updated_at = ? WHERE id = ?",
            (now.to_rfc3339(), conversation_id.to_string()),
        )?;

        Ok(ChatMessage {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Messages in chronological order. With a limit, only the most recent
    /// `limit` messages are returned.
    pub fn get_messages(&self, conversation_id: Uuid, limit: Option<usize>) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let limit = limit.map_or(-1, |l| l as i64);
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at FROM (
                 SELECT rowid AS seq, id, conversation_id, role, content, created_at
                 FROM messages WHERE conversation_id = ? ORDER BY rowid DESC LIMIT ?
             ) ORDER BY seq ASC",
        )?;

        let messages = stmt
            .query_map((conversation_id.to_string(), limit), |row| {
                let role: String = row.get(2)?;
                Ok(ChatMessage {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    conversation_id: parse_uuid(row.get::<_, String>(1)?),
                    role: Role::from_str(&role).unwrap_or(Role::User),
                    content: row.get(3)?,
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    pub fn last_assistant_message(&self, conversation_id: Uuid) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let content = conn
            .query_row(
                "SELECT content FROM messages WHERE conversation_id = ? AND role = 'assistant'
                 ORDER BY rowid DESC LIMIT 1",
                [conversation_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    // ============================================================
    // Task tree operations
    // ============================================================

    /// Load a user's whole forest, archived nodes included.
    pub fn get_task_tree(&self, user_id: &str) -> Result<TaskTree> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, position, node_type, title, description, start_date, end_date, memo, archived
             FROM task_nodes WHERE user_id = ? ORDER BY position, rowid",
        )?;

        let rows = stmt
            .query_map([user_id], |row| {
                let node_type: Option<String> = row.get(3)?;
                Ok(FlatNode {
                    node: TaskNode {
                        id: row.get(0)?,
                        title: row.get(4)?,
                        node_type: node_type.as_deref().and_then(NodeType::from_str),
                        description: row.get(5)?,
                        start_date: row.get(6)?,
                        end_date: row.get(7)?,
                        memo: row.get(8)?,
                        archived: row.get::<_, i64>(9)? != 0,
                        children: Vec::new(),
                    },
                    parent_id: row.get(1)?,
                    position: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TaskTree::from_flat(rows))
    }

    /// Persist nodes produced by [`TaskTree::insert_forest`] or
    /// [`TaskTree::apply_actions`], in one transaction.
    pub fn save_nodes(&self, user_id: &str, nodes: &[FlatNode]) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO task_nodes (id, user_id, parent_id, position, node_type, title, description,
                                         start_date, end_date, memo, archived, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for flat in nodes {
                let node = &flat.node;
                stmt.execute((
                    &node.id,
                    user_id,
                    &flat.parent_id,
                    flat.position as i64,
                    node.node_type.map(|t| t.as_str()),
                    &node.title,
                    &node.description,
                    &node.start_date,
                    &node.end_date,
                    &node.memo,
                    node.archived as i64,
                    &now,
                ))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Mark nodes archived. Returns how many rows changed.
    pub fn archive_nodes(&self, user_id: &str, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let mut changed = 0;
        for id in ids {
            changed += tx.execute(
                "UPDATE task_nodes SET archived = 1 WHERE user_id = ? AND id = ?",
                (user_id, id),
            )?;
        }
        tx.commit()?;
        Ok(changed)
    }

    pub fn update_node_memo(&self, user_id: &str, id: &str, memo: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE task_nodes SET memo = ? WHERE user_id = ? AND id = ?",
            (memo, user_id, id),
        )?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// `<platform data dir>/timeturn/timeturn.db`
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "timeturn")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("timeturn.db"))
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
