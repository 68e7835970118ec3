//! In-memory store double.
//!
//! Behaves like the relational store as far as the state layer can observe:
//! it assigns ids, enforces uniqueness, distinguishes "not found" from other
//! failures and hands out detached copies. It also counts reads and can be
//! told to fail, which the cache-aside tests rely on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::domain::{
    Course, Entity, Exam, ExamId, ExamQuestion, GivenAnswer, GivenExam, IndexedEntity, Topic,
    User, UserPatch,
};
use crate::exam::QuestionSet;
use crate::store::{AltKeyStore, EntityStore, QuestionSource, StoreError, Stores};

// == Memory Record ==
/// How a record is created and edited by the in-memory store.
pub trait MemoryRecord: Entity {
    fn build(seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    fn apply(&mut self, patch: &Self::Patch, now: DateTime<Utc>);

    /// Extra uniqueness key besides the primary key.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Copy handed to callers; must not share in-memory state with the row.
    fn detached(&self) -> Self {
        self.clone()
    }
}

// == Memory Store ==
#[derive(Debug)]
pub struct MemoryStore<E: MemoryRecord> {
    rows: RwLock<HashMap<E::Id, E>>,
    next_seq: AtomicI64,
    reads: AtomicUsize,
    writes: AtomicUsize,
    pending_failures: AtomicUsize,
    clock: SharedClock,
}

impl<E: MemoryRecord> MemoryStore<E> {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_seq: AtomicI64::new(1),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            pending_failures: AtomicUsize::new(0),
            clock,
        }
    }

    /// Inserts a row directly, bypassing counters and uniqueness checks.
    pub fn seed(&self, row: E) {
        self.rows.write().insert(row.id(), row);
    }

    /// Number of read queries served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of insert/update statements served so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes the next `count` operations fail with a backend error.
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Current row, bypassing counters.
    pub fn row(&self, id: &E::Id) -> Option<E> {
        self.rows.read().get(id).map(E::detached)
    }

    pub fn rows_where<F>(&self, pred: F) -> Vec<E>
    where
        F: Fn(&E) -> bool,
    {
        self.rows
            .read()
            .values()
            .filter(|row| pred(row))
            .map(E::detached)
            .collect()
    }

    fn injected_failure(&self) -> Result<(), StoreError> {
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StoreError::Backend("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<E: MemoryRecord> EntityStore<E> for MemoryStore<E> {
    async fn fetch(&self, id: &E::Id) -> Result<E, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        self.row(id).ok_or(StoreError::NotFound)
    }

    async fn insert(&self, draft: E::Draft) -> Result<E, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let row = E::build(seq, draft, self.clock.now());

        let mut rows = self.rows.write();
        let clashes = rows.contains_key(&row.id())
            || row.unique_key().is_some_and(|key| {
                rows.values().any(|other| other.unique_key().as_ref() == Some(&key))
            });
        if clashes {
            return Err(StoreError::AlreadyExists);
        }
        let out = row.detached();
        rows.insert(row.id(), row);
        Ok(out)
    }

    async fn update(&self, id: &E::Id, patch: &E::Patch) -> Result<E, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;

        let now = self.clock.now();
        let mut rows = self.rows.write();
        let mut edited = rows.get(id).ok_or(StoreError::NotFound)?.detached();
        edited.apply(patch, now);

        if let Some(key) = edited.unique_key() {
            let clashes = rows
                .iter()
                .any(|(other_id, other)| other_id != id && other.unique_key().as_ref() == Some(&key));
            if clashes {
                return Err(StoreError::AlreadyExists);
            }
        }
        let out = edited.detached();
        rows.insert(id.clone(), edited);
        Ok(out)
    }
}

#[async_trait]
impl AltKeyStore<Course> for MemoryStore<Course> {
    async fn fetch_by_alt(&self, alt: &str) -> Result<Course, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        self.rows
            .read()
            .values()
            .find(|course| course.alt_key() == alt)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

// == Record Implementations ==
impl MemoryRecord for User {
    fn build(_seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        User {
            user_id: draft.user_id,
            full_name: draft.full_name,
            email: draft.email,
            role: draft.role,
            is_banned: false,
            ban_reason: None,
            setup_completed: false,
            auth_hash: Uuid::new_v4().simple().to_string(),
            created_at: now,
        }
    }

    fn apply(&mut self, patch: &UserPatch, _now: DateTime<Utc>) {
        match patch {
            UserPatch::Profile { full_name, email } => {
                self.full_name = full_name.clone();
                self.email = email.clone();
            }
            UserPatch::Password(_) => {
                self.auth_hash = Uuid::new_v4().simple().to_string();
            }
            UserPatch::ConfirmAccount(_) => {
                self.auth_hash = Uuid::new_v4().simple().to_string();
                self.setup_completed = true;
            }
            UserPatch::Ban { reason } => {
                self.is_banned = true;
                self.ban_reason = reason.clone();
            }
            UserPatch::Unban => {
                self.is_banned = false;
                self.ban_reason = None;
            }
        }
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("email:{}", self.email.to_lowercase()))
    }
}

impl MemoryRecord for Course {
    fn build(seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        Course {
            course_id: seq,
            course_name: draft.course_name.trim().to_string(),
            course_description: draft.course_description.trim().to_string(),
            topic_id: draft.topic_id,
            added_by: draft.added_by,
            created_at: now,
        }
    }

    fn apply(&mut self, patch: &Self::Patch, _now: DateTime<Utc>) {
        self.course_name = patch.course_name.trim().to_string();
        self.course_description = patch.course_description.trim().to_string();
        self.topic_id = patch.topic_id;
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.alt_key())
    }
}

impl MemoryRecord for Topic {
    fn build(seq: i64, draft: Self::Draft, _now: DateTime<Utc>) -> Self {
        Topic {
            topic_id: seq,
            topic_name: draft.topic_name.trim().to_string(),
        }
    }

    fn apply(&mut self, patch: &Self::Patch, _now: DateTime<Utc>) {
        self.topic_name = patch.topic_name.trim().to_string();
    }
}

impl MemoryRecord for Exam {
    fn build(seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        Exam {
            exam_id: seq,
            course_id: draft.course_id,
            exam_title: draft.exam_title.trim().to_string(),
            exam_description: draft.exam_description.trim().to_string(),
            price: draft.price,
            schedule: draft.schedule,
            created_by: draft.created_by,
            is_public: draft.is_public,
            created_at: now,
            questions: Arc::new(QuestionSet::new()),
        }
    }

    fn apply(&mut self, patch: &Self::Patch, _now: DateTime<Utc>) {
        self.exam_title = patch.exam_title.trim().to_string();
        self.exam_description = patch.exam_description.trim().to_string();
        self.price = patch.price.clone();
        self.schedule = patch.schedule;
        self.is_public = patch.is_public;
    }

    fn detached(&self) -> Self {
        Exam {
            questions: Arc::new(QuestionSet::new()),
            ..self.clone()
        }
    }
}

impl MemoryRecord for ExamQuestion {
    fn build(seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        ExamQuestion {
            question_id: seq,
            exam_id: draft.exam_id,
            question_title: draft.question_title,
            description: draft.description,
            options: draft.options,
            created_at: now,
        }
    }

    fn apply(&mut self, patch: &Self::Patch, _now: DateTime<Utc>) {
        self.question_title = patch.question_title.clone();
        self.description = patch.description.clone();
        self.options = patch.options.clone();
    }
}

impl MemoryRecord for GivenExam {
    fn build(_seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        GivenExam {
            user_id: draft.user_id,
            exam_id: draft.exam_id,
            price: draft.price,
            added_by: draft.added_by,
            scored_by: None,
            final_score: None,
            created_at: now,
        }
    }

    fn apply(&mut self, patch: &Self::Patch, _now: DateTime<Utc>) {
        self.final_score = Some(patch.final_score.clone());
        self.scored_by = Some(patch.scored_by.clone());
    }
}

impl MemoryRecord for GivenAnswer {
    fn build(_seq: i64, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        GivenAnswer {
            exam_id: draft.key.exam_id,
            question_id: draft.key.question_id,
            answered_by: draft.key.user_id,
            chosen_option: draft.chosen_option,
            answer_text: draft.answer_text,
            seconds_taken: draft.seconds_taken,
            answered_at: now,
        }
    }

    fn apply(&mut self, patch: &Self::Patch, now: DateTime<Utc>) {
        self.chosen_option = patch.chosen_option.clone();
        self.answer_text = patch.answer_text.clone();
        self.seconds_taken = patch.seconds_taken;
        self.answered_at = now;
    }
}

// == Memory Backend ==
/// One in-memory store per entity type.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    pub users: Arc<MemoryStore<User>>,
    pub courses: Arc<MemoryStore<Course>>,
    pub topics: Arc<MemoryStore<Topic>>,
    pub exams: Arc<MemoryStore<Exam>>,
    pub questions: Arc<MemoryStore<ExamQuestion>>,
    pub given_exams: Arc<MemoryStore<GivenExam>>,
    pub given_answers: Arc<MemoryStore<GivenAnswer>>,
}

impl MemoryBackend {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            users: Arc::new(MemoryStore::new(clock.clone())),
            courses: Arc::new(MemoryStore::new(clock.clone())),
            topics: Arc::new(MemoryStore::new(clock.clone())),
            exams: Arc::new(MemoryStore::new(clock.clone())),
            questions: Arc::new(MemoryStore::new(clock.clone())),
            given_exams: Arc::new(MemoryStore::new(clock.clone())),
            given_answers: Arc::new(MemoryStore::new(clock)),
        }
    }

    /// The backend seen through the store traits.
    pub fn stores(&self) -> Stores {
        Stores {
            users: self.users.clone(),
            courses: self.courses.clone(),
            course_names: self.courses.clone(),
            topics: self.topics.clone(),
            exams: self.exams.clone(),
            questions: self.questions.clone(),
            exam_questions: self.questions.clone(),
            given_exams: self.given_exams.clone(),
            given_answers: self.given_answers.clone(),
        }
    }
}

#[async_trait]
impl QuestionSource for MemoryStore<ExamQuestion> {
    async fn questions_of_exam(&self, exam_id: ExamId) -> Result<Vec<ExamQuestion>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;
        let mut questions = self.rows_where(|q| q.exam_id == exam_id);
        questions.sort_by_key(|q| q.question_id);
        Ok(questions)
    }
}
