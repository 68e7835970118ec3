//! Exams, their questions, participations and answers.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CourseId, Entity, UserId};
use crate::error::EntityKind;
use crate::exam::{ExamSchedule, QuestionSet};

pub type ExamId = i64;
pub type QuestionId = i64;

// == Exam ==
/// An exam and the question set it owns.
///
/// The lifecycle phase is never stored here; it is derived from `schedule`
/// whenever it is asked for.
#[derive(Debug, Clone, Serialize)]
pub struct Exam {
    pub exam_id: ExamId,
    pub course_id: CourseId,
    pub exam_title: String,
    pub exam_description: String,
    pub price: String,
    #[serde(flatten)]
    pub schedule: ExamSchedule,
    pub created_by: UserId,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub questions: Arc<QuestionSet>,
}

#[derive(Debug, Clone)]
pub struct ExamDraft {
    pub course_id: CourseId,
    pub exam_title: String,
    pub exam_description: String,
    pub price: String,
    pub schedule: ExamSchedule,
    pub created_by: UserId,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct ExamPatch {
    pub exam_title: String,
    pub exam_description: String,
    pub price: String,
    pub schedule: ExamSchedule,
    pub is_public: bool,
}

impl Entity for Exam {
    type Id = ExamId;
    type Draft = ExamDraft;
    type Patch = ExamPatch;

    const KIND: EntityKind = EntityKind::Exam;

    fn id(&self) -> ExamId {
        self.exam_id
    }

    fn carry_over(&self, fresh: &mut Self) {
        fresh.questions = Arc::clone(&self.questions);
    }
}

// == Exam Question ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub question_id: QuestionId,
    pub exam_id: ExamId,
    pub question_title: String,
    pub description: Option<String>,
    pub options: [Option<String>; 4],
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub exam_id: ExamId,
    pub question_title: String,
    pub description: Option<String>,
    pub options: [Option<String>; 4],
}

#[derive(Debug, Clone)]
pub struct QuestionPatch {
    pub question_title: String,
    pub description: Option<String>,
    pub options: [Option<String>; 4],
}

impl Entity for ExamQuestion {
    type Id = QuestionId;
    type Draft = QuestionDraft;
    type Patch = QuestionPatch;

    const KIND: EntityKind = EntityKind::ExamQuestion;

    fn id(&self) -> QuestionId {
        self.question_id
    }
}

// == Given Exam ==
/// Participation of a user in an exam.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GivenExamKey {
    pub user_id: UserId,
    pub exam_id: ExamId,
}

impl fmt::Display for GivenExamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.exam_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GivenExam {
    pub user_id: UserId,
    pub exam_id: ExamId,
    pub price: String,
    pub added_by: Option<UserId>,
    pub scored_by: Option<UserId>,
    pub final_score: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GivenExamDraft {
    pub user_id: UserId,
    pub exam_id: ExamId,
    pub price: String,
    pub added_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct ScorePatch {
    pub final_score: String,
    pub scored_by: UserId,
}

impl Entity for GivenExam {
    type Id = GivenExamKey;
    type Draft = GivenExamDraft;
    type Patch = ScorePatch;

    const KIND: EntityKind = EntityKind::GivenExam;

    fn id(&self) -> GivenExamKey {
        GivenExamKey {
            user_id: self.user_id.clone(),
            exam_id: self.exam_id,
        }
    }
}

// == Given Answer ==
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GivenAnswerKey {
    pub exam_id: ExamId,
    pub question_id: QuestionId,
    pub user_id: UserId,
}

impl fmt::Display for GivenAnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.exam_id, self.question_id, self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GivenAnswer {
    pub exam_id: ExamId,
    pub question_id: QuestionId,
    pub answered_by: UserId,
    pub chosen_option: Option<String>,
    pub answer_text: Option<String>,
    pub seconds_taken: u32,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GivenAnswerDraft {
    pub key: GivenAnswerKey,
    pub chosen_option: Option<String>,
    pub answer_text: Option<String>,
    pub seconds_taken: u32,
}

#[derive(Debug, Clone)]
pub struct AnswerPatch {
    pub chosen_option: Option<String>,
    pub answer_text: Option<String>,
    pub seconds_taken: u32,
}

impl Entity for GivenAnswer {
    type Id = GivenAnswerKey;
    type Draft = GivenAnswerDraft;
    type Patch = AnswerPatch;

    const KIND: EntityKind = EntityKind::GivenAnswer;

    fn id(&self) -> GivenAnswerKey {
        GivenAnswerKey {
            exam_id: self.exam_id,
            question_id: self.question_id,
            user_id: self.answered_by.clone(),
        }
    }
}
