//! Courses and topics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Entity, IndexedEntity, UserId};
use crate::error::EntityKind;

pub type CourseId = i64;
pub type TopicId = i64;

// == Course ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    pub course_id: CourseId,
    pub course_name: String,
    pub course_description: String,
    pub topic_id: Option<TopicId>,
    pub added_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CourseDraft {
    pub course_name: String,
    pub course_description: String,
    pub topic_id: Option<TopicId>,
    pub added_by: UserId,
}

#[derive(Debug, Clone)]
pub struct CoursePatch {
    pub course_name: String,
    pub course_description: String,
    pub topic_id: Option<TopicId>,
}

impl Entity for Course {
    type Id = CourseId;
    type Draft = CourseDraft;
    type Patch = CoursePatch;

    const KIND: EntityKind = EntityKind::Course;

    fn id(&self) -> CourseId {
        self.course_id
    }
}

impl IndexedEntity for Course {
    fn normalize_alt(raw: &str) -> String {
        raw.trim().to_lowercase()
    }

    fn alt_key(&self) -> String {
        Self::normalize_alt(&self.course_name)
    }
}

// == Topic ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub topic_id: TopicId,
    pub topic_name: String,
}

#[derive(Debug, Clone)]
pub struct TopicDraft {
    pub topic_name: String,
}

#[derive(Debug, Clone)]
pub struct TopicPatch {
    pub topic_name: String,
}

impl Entity for Topic {
    type Id = TopicId;
    type Draft = TopicDraft;
    type Patch = TopicPatch;

    const KIND: EntityKind = EntityKind::Topic;

    fn id(&self) -> TopicId {
        self.topic_id
    }
}
