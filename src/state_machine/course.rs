use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::state::CourseStatus;
use crate::api::types::{flexible_bool, nullable_string};
use crate::mapper::{self, FieldMapping, MappingError, Transform};

/// Remote wire fields to persisted fields.
pub const REMOTE_COURSE_MAPPINGS: &[FieldMapping] = &[
    FieldMapping::new("id", &["remote_id"]).required(),
    FieldMapping::new("title", &["title"]).required(),
    FieldMapping::new("descriptionText", &["description_text"]).optional(),
    FieldMapping::new("descriptionHtml", &["description_html"]).optional(),
    FieldMapping::new("thumbnailUrl", &["thumbnail_url"]).optional(),
    FieldMapping::new("duration", &["duration"]).optional(),
    FieldMapping::new("languages", &["language"])
        .with(Transform::ExtractFirst)
        .optional(),
    FieldMapping::new("categories", &["categories"])
        .with(Transform::CommaImplode)
        .optional(),
    FieldMapping::new("publisherName", &["publisher_name"]).optional(),
    FieldMapping::new("packageDownloadUrl", &["package_download_url"]).optional(),
    FieldMapping::new("aiccLaunchUrl", &["aicc_launch_url"]).optional(),
    FieldMapping::new("active", &["active"]).optional(),
];

/// The mutable, remote-sourced part of a synced course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseFields {
    pub remote_id: String,
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description_text: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description_html: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub duration: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Comma separated category paths.
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub publisher_name: Option<String>,
    #[serde(default)]
    pub package_download_url: Option<String>,
    #[serde(default)]
    pub aicc_launch_url: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub active: bool,
}

impl CourseFields {
    pub fn new(remote_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            title: title.into(),
            description_text: String::new(),
            description_html: String::new(),
            thumbnail_url: None,
            duration: String::new(),
            language: None,
            categories: None,
            publisher_name: None,
            package_download_url: None,
            aicc_launch_url: None,
            active: true,
        }
    }

    /// Run a raw listing record through [`REMOTE_COURSE_MAPPINGS`].
    ///
    /// `id` and `title` must be present and non-null; everything else falls
    /// back to empty.
    pub fn from_value(source: &Value) -> Result<Self, MappingError> {
        let mut fields = Map::new();
        mapper::apply_mappings(&mut fields, source, REMOTE_COURSE_MAPPINGS)?;
        mapper::into_record(fields)
    }
}

/// Local bookkeeping row tracking one remote course through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedCourse {
    #[serde(flatten)]
    pub fields: CourseFields,
    pub local_course_id: Option<u64>,
    pub status: CourseStatus,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl SyncedCourse {
    pub fn new(fields: CourseFields) -> Self {
        let now = Utc::now();
        Self {
            fields,
            local_course_id: None,
            status: CourseStatus::Retrieved,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.fields.remote_id
    }

    /// Replace the remote-sourced fields, leaving status and host link alone.
    pub fn refresh(&mut self, fields: CourseFields) {
        self.fields = fields;
    }

    /// Operator reset back to the first step.
    pub fn reset(&mut self) {
        self.status = CourseStatus::Retrieved;
    }

    pub fn mark_deleted(&mut self) {
        self.local_course_id = None;
        self.status = CourseStatus::Deleted;
    }
}

/// Conjunctive filter over synced courses. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseFilter {
    pub statuses: Vec<CourseStatus>,
    pub active: Option<bool>,
    pub has_local_course: Option<bool>,
    pub exclude_status: Option<CourseStatus>,
}

impl CourseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: CourseStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn has_local_course(mut self, linked: bool) -> Self {
        self.has_local_course = Some(linked);
        self
    }

    pub fn excluding(mut self, status: CourseStatus) -> Self {
        self.exclude_status = Some(status);
        self
    }

    /// Courses a background task should be working on.
    pub fn in_flight() -> Self {
        CourseFilter {
            statuses: vec![
                CourseStatus::Queued,
                CourseStatus::Created,
                CourseStatus::ImageImported,
            ],
            ..Self::default()
        }
    }

    pub fn matches(&self, course: &SyncedCourse) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&course.status))
            && self.active.is_none_or(|active| course.fields.active == active)
            && self
                .has_local_course
                .is_none_or(|linked| course.local_course_id.is_some() == linked)
            && self.exclude_status != Some(course.status)
    }
}
