use async_trait::async_trait;
use parking_lot::Mutex;

use super::{next_created_at, CommentStore, StoreResult};
use crate::model::{Comment, CommentId, NewComment};

/// Process-local comment table. Rows are kept in insertion order, which is also
/// `created_at` order because stamps never go backwards.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Comment>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.rows.lock().len() }

    pub fn is_empty(&self) -> bool { self.rows.lock().is_empty() }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert(&self, new: NewComment) -> StoreResult<Comment> {
        let mut rows = self.rows.lock();
        let created_at = next_created_at(rows.last().map(|c| c.created_at));
        let comment = Comment { id: CommentId::new_v4(), text: new.text, author: new.author, created_at };
        rows.push(comment.clone());
        tracing::debug!(target: "comments", id = %comment.id, "memory insert");
        Ok(comment)
    }

    async fn list_ordered(&self) -> StoreResult<Vec<Comment>> {
        Ok(self.rows.lock().clone())
    }

    fn describe(&self) -> String { "memory".to_string() }
}
