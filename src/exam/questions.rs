//! Question Set
//!
//! The questions owned by one exam, populated lazily from the store on the
//! first full listing. Readers share the lock; adds take it exclusively and
//! never leave a partially written set behind.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::domain::{ExamQuestion, QuestionId};

#[derive(Debug, Default)]
struct QuestionState {
    items: BTreeMap<QuestionId, Arc<ExamQuestion>>,
    /// Whether the full set has been loaded from the store
    populated: bool,
}

// == Question Set ==
#[derive(Debug, Default)]
pub struct QuestionSet {
    state: RwLock<QuestionState>,
    /// Serializes loaders so a cold set is fetched once
    load_gate: Mutex<()>,
}

impl QuestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    // == Add ==
    /// Inserts a question, replacing any existing one with the same id.
    pub async fn add(&self, question: ExamQuestion) -> Arc<ExamQuestion> {
        let question = Arc::new(question);
        let mut state = self.state.write().await;
        state
            .items
            .insert(question.question_id, Arc::clone(&question));
        question
    }

    // == Get ==
    pub async fn get(&self, question_id: QuestionId) -> Option<Arc<ExamQuestion>> {
        self.state.read().await.items.get(&question_id).cloned()
    }

    // == List ==
    /// Snapshot of the questions currently held, ordered by id.
    pub async fn list(&self) -> Vec<Arc<ExamQuestion>> {
        self.state.read().await.items.values().cloned().collect()
    }

    // == List Or Load ==
    /// Snapshot of the full set, loading it through `load` the first time.
    ///
    /// The store call runs outside the data lock. Questions added while the
    /// load was in flight win over the loaded copies.
    pub async fn list_or_load<F, Fut, E>(&self, load: F) -> Result<Vec<Arc<ExamQuestion>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ExamQuestion>, E>>,
    {
        {
            let state = self.state.read().await;
            if state.populated {
                return Ok(state.items.values().cloned().collect());
            }
        }

        let _gate = self.load_gate.lock().await;
        if self.is_populated().await {
            return Ok(self.list().await);
        }

        let loaded = load().await?;
        debug!(count = loaded.len(), "populated question set from store");

        let mut state = self.state.write().await;
        for question in loaded {
            state
                .items
                .entry(question.question_id)
                .or_insert_with(|| Arc::new(question));
        }
        state.populated = true;
        Ok(state.items.values().cloned().collect())
    }

    pub async fn is_populated(&self) -> bool {
        self.state.read().await.populated
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.items.is_empty()
    }
}
