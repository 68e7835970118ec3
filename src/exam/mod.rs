//! Exam Module
//!
//! Schedule-derived lifecycle, the lazily populated question set each exam
//! owns, and the catalog operations built on top of the repositories.

mod clock;
mod questions;
mod service;

pub use clock::{ExamPhase, ExamSchedule};
pub use questions::QuestionSet;
pub use service::{AnswerSubmission, ExamCatalog, ExamOverview};
