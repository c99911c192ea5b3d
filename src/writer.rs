//! Debounced, fire-and-forget dialogue state persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::db::Database;
use crate::models::DialogueState;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct Pending {
    generation: u64,
    state: DialogueState,
}

/// Coalesces rapid state changes per conversation into one write.
///
/// Each write carries the full state, so the last scheduled state wins.
#[derive(Clone)]
pub struct StateWriter {
    db: Database,
    debounce: Duration,
    pending: Arc<Mutex<HashMap<Uuid, Pending>>>,
    generations: Arc<AtomicU64>,
}

impl StateWriter {
    pub fn new(db: Database, debounce: Duration) -> Self {
        Self {
            db,
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue `state` for `conversation_id`, replacing anything still pending.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, conversation_id: Uuid, state: DialogueState) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .expect("writer lock poisoned")
            .insert(conversation_id, Pending { generation, state });

        let writer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(writer.debounce).await;
            // Held through the write so readers see either the pending state
            // or the stored row, never the row it replaces.
            let mut pending = writer.pending.lock().expect("writer lock poisoned");
            let due = pending
                .get(&conversation_id)
                .is_some_and(|p| p.generation == generation);
            if let Some(p) = due.then(|| pending.remove(&conversation_id)).flatten() {
                writer.write(conversation_id, &p.state);
            }
        });
    }

    /// Write everything still pending right away.
    pub fn flush(&self) {
        let mut pending = self.pending.lock().expect("writer lock poisoned");
        for (conversation_id, p) in pending.iter() {
            self.write(*conversation_id, &p.state);
        }
        pending.clear();
    }

    /// The state waiting to be written for `conversation_id`, if any.
    ///
    /// Readers should prefer this over the stored row, which may lag.
    pub fn latest(&self, conversation_id: Uuid) -> Option<DialogueState> {
        self.pending
            .lock()
            .expect("writer lock poisoned")
            .get(&conversation_id)
            .map(|p| p.state.clone())
    }

    /// Drop any pending write for `conversation_id` and store `state` now.
    pub fn write_now(&self, conversation_id: Uuid, state: &DialogueState) -> anyhow::Result<bool> {
        let mut pending = self.pending.lock().expect("writer lock poisoned");
        pending.remove(&conversation_id);
        self.db.save_dialogue_state(conversation_id, state)
    }

    /// Number of conversations with a write still waiting.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("writer lock poisoned").len()
    }

    fn write(&self, conversation_id: Uuid, state: &DialogueState) {
        match self.db.save_dialogue_state(conversation_id, state) {
            Ok(true) => tracing::debug!(%conversation_id, stage = state.stage.as_str(), "dialogue state saved"),
            Ok(false) => tracing::warn!(%conversation_id, "dialogue state dropped: conversation not found"),
            Err(e) => tracing::error!(%conversation_id, error = %e, "failed to save dialogue state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateConversationInput, DialogueStage};

    fn setup() -> (Database, Uuid) {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        let conversation = db
            .create_conversation(CreateConversationInput {
                user_id: "u1".to_string(),
                title: None,
            })
            .unwrap();
        (db, conversation.id)
    }

    fn state(stage: DialogueStage) -> DialogueState {
        DialogueState {
            stage,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn last_scheduled_state_wins() {
        let (db, id) = setup();
        let writer = StateWriter::new(db.clone(), Duration::from_millis(20));

        writer.schedule(id, state(DialogueStage::Hearing));
        writer.schedule(id, state(DialogueStage::Proposal));
        writer.schedule(id, state(DialogueStage::Output));
        assert_eq!(writer.pending_len(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(writer.pending_len(), 0);
        let stored = db.get_dialogue_state(id).unwrap().unwrap();
        assert_eq!(stored.stage, DialogueStage::Output);
    }

    #[tokio::test]
    async fn nothing_is_written_before_the_quiet_period() {
        let (db, id) = setup();
        let writer = StateWriter::new(db.clone(), Duration::from_secs(60));

        writer.schedule(id, state(DialogueStage::Hearing));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stored = db.get_dialogue_state(id).unwrap().unwrap();
        assert_eq!(stored.stage, DialogueStage::Normal);
    }

    #[tokio::test]
    async fn flush_writes_immediately() {
        let (db, id) = setup();
        let writer = StateWriter::new(db.clone(), Duration::from_secs(60));

        writer.schedule(id, state(DialogueStage::Hearing));
        writer.flush();

        let stored = db.get_dialogue_state(id).unwrap().unwrap();
        assert_eq!(stored.stage, DialogueStage::Hearing);
        assert_eq!(writer.pending_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_never_see_the_state_being_replaced() {
        let (db, id) = setup();
        let writer = StateWriter::new(db.clone(), Duration::from_millis(1));
        let current = || {
            writer
                .latest(id)
                .or_else(|| db.get_dialogue_state(id).unwrap())
                .unwrap()
                .stage
        };

        for _ in 0..50 {
            writer.write_now(id, &state(DialogueStage::Normal)).unwrap();
            writer.schedule(id, state(DialogueStage::Hearing));

            let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
            while writer.pending_len() > 0 && tokio::time::Instant::now() < deadline {
                assert_eq!(current(), DialogueStage::Hearing);
                tokio::task::yield_now().await;
            }
            assert_eq!(current(), DialogueStage::Hearing);
        }
    }

    #[tokio::test]
    async fn write_now_cancels_the_pending_write() {
        let (db, id) = setup();
        let writer = StateWriter::new(db.clone(), Duration::from_millis(20));

        writer.schedule(id, state(DialogueStage::Output));
        assert_eq!(writer.latest(id).unwrap().stage, DialogueStage::Output);
        writer.write_now(id, &DialogueState::restart()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(writer.latest(id).is_none());
        let stored = db.get_dialogue_state(id).unwrap().unwrap();
        assert_eq!(stored.stage, DialogueStage::Normal);
    }
}
