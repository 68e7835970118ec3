//! Domain Module
//!
//! Entity records held by the repositories, together with the creation
//! drafts and edit patches the persistent store accepts for them.

mod course;
mod exam;
mod user;

pub use course::{Course, CourseDraft, CourseId, CoursePatch, Topic, TopicDraft, TopicId, TopicPatch};
pub use exam::{
    AnswerPatch, Exam, ExamDraft, ExamId, ExamPatch, ExamQuestion, GivenAnswer, GivenAnswerDraft,
    GivenAnswerKey, GivenExam, GivenExamDraft, GivenExamKey, QuestionDraft, QuestionId,
    QuestionPatch, ScorePatch,
};
pub use user::{normalize_user_id, Secret, User, UserDraft, UserId, UserPatch, UserRole};

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::EntityKind;

// == Entity ==
/// A record cached by a repository in front of the persistent store.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Primary key
    type Id: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static;
    /// Creation input
    type Draft: Debug + Send + Sync + 'static;
    /// Edit input
    type Patch: Debug + Send + Sync + 'static;

    const KIND: EntityKind;

    fn id(&self) -> Self::Id;

    /// Moves in-memory state from the cached copy onto the fresh copy
    /// returned by the store after an edit.
    fn carry_over(&self, _fresh: &mut Self) {}
}

// == Indexed Entity ==
/// An entity that can also be looked up by a secondary key.
pub trait IndexedEntity: Entity {
    /// Normalizes a raw secondary key for lookup.
    fn normalize_alt(raw: &str) -> String;

    /// The entity's normalized secondary key.
    fn alt_key(&self) -> String;
}
