//! Persistent Store Seam
//!
//! Traits the repositories call into. The relational store itself lives
//! outside this crate; an in-memory implementation backs tests and the demo
//! binary.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    Course, Entity, Exam, ExamId, ExamQuestion, GivenAnswer, GivenExam, IndexedEntity, Topic,
    User,
};

pub use memory::{MemoryBackend, MemoryRecord, MemoryStore};

// == Store Error ==
/// Failure reported by the persistent store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No row for the requested key
    #[error("no matching record")]
    NotFound,

    /// Uniqueness constraint violated
    #[error("record already exists")]
    AlreadyExists,

    /// Anything else: connectivity, timeouts, constraint bugs
    #[error("backend failure: {0}")]
    Backend(String),
}

// == Entity Store ==
/// Parameterized create/read/update for one entity type.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    async fn fetch(&self, id: &E::Id) -> Result<E, StoreError>;

    async fn insert(&self, draft: E::Draft) -> Result<E, StoreError>;

    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<E, StoreError>;
}

// == Alternate Key Store ==
/// Lookup by an entity's secondary key.
#[async_trait]
pub trait AltKeyStore<E: IndexedEntity>: EntityStore<E> {
    /// `alt` is already normalized.
    async fn fetch_by_alt(&self, alt: &str) -> Result<E, StoreError>;
}

// == Question Source ==
/// Bulk read used to populate an exam's question set.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn questions_of_exam(&self, exam_id: ExamId) -> Result<Vec<ExamQuestion>, StoreError>;
}

// == Stores ==
/// Every store the state layer reads and writes through.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn EntityStore<User>>,
    pub courses: Arc<dyn EntityStore<Course>>,
    pub course_names: Arc<dyn AltKeyStore<Course>>,
    pub topics: Arc<dyn EntityStore<Topic>>,
    pub exams: Arc<dyn EntityStore<Exam>>,
    pub questions: Arc<dyn EntityStore<ExamQuestion>>,
    pub exam_questions: Arc<dyn QuestionSource>,
    pub given_exams: Arc<dyn EntityStore<GivenExam>>,
    pub given_answers: Arc<dyn EntityStore<GivenAnswer>>,
}
