//! Exam catalog operations.
//!
//! Ties the exam, question, participation and answer repositories to the
//! exam clock. Every phase check reads the clock at call time.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::domain::{
    AnswerPatch, Exam, ExamId, ExamQuestion, GivenAnswer, GivenAnswerDraft, GivenAnswerKey,
    GivenExam, GivenExamKey, QuestionDraft, QuestionId, QuestionPatch, User, UserId, UserRole,
};
use crate::error::{EntityKind, Result, StateError};
use crate::exam::ExamPhase;
use crate::repository::{store_failure, Repository};
use crate::store::QuestionSource;

// == Exam Overview ==
/// An exam with its time-derived fields, computed for one instant.
#[derive(Debug, Clone, Serialize)]
pub struct ExamOverview {
    #[serde(flatten)]
    pub exam: Exam,
    pub phase: ExamPhase,
    pub has_started: bool,
    pub has_finished: bool,
    pub starts_in: i64,
    pub finishes_in: i64,
    pub question_count: usize,
}

// == Answer Submission ==
#[derive(Debug, Clone)]
pub struct AnswerSubmission {
    pub exam_id: ExamId,
    pub question_id: QuestionId,
    pub user_id: UserId,
    pub chosen_option: Option<String>,
    pub answer_text: Option<String>,
    pub seconds_taken: u32,
}

// == Exam Catalog ==
pub struct ExamCatalog {
    exams: Repository<Exam>,
    questions: Repository<ExamQuestion>,
    given_exams: Repository<GivenExam>,
    given_answers: Repository<GivenAnswer>,
    source: Arc<dyn QuestionSource>,
    clock: SharedClock,
}

impl ExamCatalog {
    pub fn new(
        exams: Repository<Exam>,
        questions: Repository<ExamQuestion>,
        given_exams: Repository<GivenExam>,
        given_answers: Repository<GivenAnswer>,
        source: Arc<dyn QuestionSource>,
        clock: SharedClock,
    ) -> Self {
        Self {
            exams,
            questions,
            given_exams,
            given_answers,
            source,
            clock,
        }
    }

    pub fn exams(&self) -> &Repository<Exam> {
        &self.exams
    }

    pub fn questions(&self) -> &Repository<ExamQuestion> {
        &self.questions
    }

    pub fn given_exams(&self) -> &Repository<GivenExam> {
        &self.given_exams
    }

    pub fn given_answers(&self) -> &Repository<GivenAnswer> {
        &self.given_answers
    }

    // == Overview ==
    pub async fn exam_overview(&self, exam_id: ExamId) -> Result<ExamOverview> {
        let exam = self.exams.resolve(&exam_id).await?;
        let question_count = self.questions_of(&exam).await?.len();
        let now = self.clock.now();
        let schedule = exam.schedule;

        Ok(ExamOverview {
            phase: schedule.phase_at(now),
            has_started: schedule.has_started(now),
            has_finished: schedule.has_finished(now),
            starts_in: schedule.starts_in(now),
            finishes_in: schedule.finishes_in(now),
            question_count,
            exam: Exam::clone(&exam),
        })
    }

    // == Question Count ==
    pub async fn question_count(&self, exam_id: ExamId) -> Result<usize> {
        let exam = self.exams.resolve(&exam_id).await?;
        Ok(self.questions_of(&exam).await?.len())
    }

    // == Questions For Viewer ==
    /// Lists an exam's questions for `viewer`. Before the start only the
    /// creator, owners and admins may look.
    pub async fn questions_for(
        &self,
        exam_id: ExamId,
        viewer: &User,
    ) -> Result<Vec<Arc<ExamQuestion>>> {
        let exam = self.exams.resolve(&exam_id).await?;
        let now = self.clock.now();

        let privileged = matches!(viewer.role, UserRole::Owner | UserRole::Admin)
            || exam.created_by == viewer.user_id;
        if !privileged && !exam.schedule.has_started(now) {
            debug!(exam_id, viewer = %viewer.user_id, "questions hidden before start");
            return Err(StateError::ExamClosed(ExamPhase::NotStarted));
        }
        self.questions_of(&exam).await
    }

    // == Add Question ==
    /// Stores a new question and adds it to the owning exam's set.
    pub async fn add_question(&self, draft: QuestionDraft) -> Result<Arc<ExamQuestion>> {
        let exam = self.exams.resolve(&draft.exam_id).await?;
        let question = self.questions.create(draft).await?;
        exam.questions.add(ExamQuestion::clone(&question)).await;
        info!(exam_id = exam.exam_id, question_id = question.question_id, "question added");
        Ok(question)
    }

    // == Edit Question ==
    /// Stores the edit, then refreshes the owning exam's set when that exam
    /// is cached.
    pub async fn edit_question(
        &self,
        question_id: QuestionId,
        patch: &QuestionPatch,
    ) -> Result<Arc<ExamQuestion>> {
        let question = self.questions.update(&question_id, patch).await?;
        if let Some(exam) = self.exams.cached(&question.exam_id) {
            exam.questions.add(ExamQuestion::clone(&question)).await;
        }
        Ok(question)
    }

    // == Answer Question ==
    /// Records or replaces a participant's answer while the exam is ongoing.
    pub async fn answer_question(&self, submission: AnswerSubmission) -> Result<Arc<GivenAnswer>> {
        let exam = self.exams.resolve(&submission.exam_id).await?;

        let phase = exam.schedule.phase_at(self.clock.now());
        if phase != ExamPhase::Ongoing {
            return Err(StateError::ExamClosed(phase));
        }

        let belongs = self
            .questions_of(&exam)
            .await?
            .iter()
            .any(|question| question.question_id == submission.question_id);
        if !belongs {
            return Err(StateError::NotFound(EntityKind::ExamQuestion));
        }

        let participation = GivenExamKey {
            user_id: submission.user_id.clone(),
            exam_id: submission.exam_id,
        };
        self.given_exams.resolve(&participation).await?;

        let key = GivenAnswerKey {
            exam_id: submission.exam_id,
            question_id: submission.question_id,
            user_id: submission.user_id,
        };
        let patch = AnswerPatch {
            chosen_option: submission.chosen_option,
            answer_text: submission.answer_text,
            seconds_taken: submission.seconds_taken,
        };

        match self.given_answers.resolve(&key).await {
            Ok(_) => self.given_answers.update(&key, &patch).await,
            Err(StateError::NotFound(_)) => {
                let draft = GivenAnswerDraft {
                    key: key.clone(),
                    chosen_option: patch.chosen_option.clone(),
                    answer_text: patch.answer_text.clone(),
                    seconds_taken: patch.seconds_taken,
                };
                match self.given_answers.create(draft).await {
                    // lost a race with a concurrent first answer
                    Err(StateError::AlreadyExists(_)) => {
                        self.given_answers.update(&key, &patch).await
                    }
                    other => other,
                }
            }
            Err(err) => Err(err),
        }
    }

    /// The exam's full question set, loaded from the store the first time.
    async fn questions_of(&self, exam: &Exam) -> Result<Vec<Arc<ExamQuestion>>> {
        let exam_id = exam.exam_id;
        let source = Arc::clone(&self.source);
        exam.questions
            .list_or_load(|| async move { source.questions_of_exam(exam_id).await })
            .await
            .map_err(|err| store_failure::<ExamQuestion>("load questions of", &exam_id, err))
    }
}

impl std::fmt::Debug for ExamCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamCatalog")
            .field("exams", &self.exams)
            .field("questions", &self.questions)
            .finish_non_exhaustive()
    }
}
