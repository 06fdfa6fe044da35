//! Narrow interfaces onto the host learning platform.
//!
//! The pipeline never reimplements platform primitives. Courses, categories,
//! stored files, enrolment instances, learning-package activities, background
//! tasks and its own bookkeeping table are all reached through the traits
//! below. [`memory::MemoryHost`] implements every one of them in memory and can
//! be snapshotted to disk.

pub mod lock;
pub mod memory;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::SyncError;
use crate::state_machine::{CourseFilter, SyncedCourse};

/// Component name under which tasks, files and locks are registered.
pub const COMPONENT: &str = "tool_opensesame";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Data for creating or updating a host course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoursePayload {
    /// Set when updating an existing course.
    #[serde(default)]
    pub id: Option<u64>,
    pub fullname: String,
    pub shortname: String,
    pub idnumber: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enable_completion: bool,
    #[serde(default)]
    pub completion_notify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCourse {
    pub id: u64,
    pub payload: CoursePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub parent: Option<u64>,
    /// Materialised `/1/4/9` style path, refreshed by `rebuild_paths`.
    #[serde(default)]
    pub path: String,
}

/// A file area inside a course context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArea {
    pub course_id: u64,
    pub component: String,
    pub area: String,
}

impl FileArea {
    pub fn course_overview(course_id: u64) -> Self {
        Self {
            course_id,
            component: "course".into(),
            area: "overviewfiles".into(),
        }
    }

    pub fn package(course_id: u64) -> Self {
        Self {
            course_id,
            component: "mod_scorm".into(),
            area: "package".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub area: FileArea,
    pub filename: String,
}

impl FileMeta {
    pub fn new(area: FileArea, filename: impl Into<String>) -> Self {
        Self {
            area,
            filename: filename.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    Url(String),
    Path { path: String, size: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub meta: FileMeta,
    pub source: FileSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrolStatus {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolInstance {
    pub id: u64,
    pub course_id: u64,
    pub method: String,
    pub status: EnrolStatus,
}

/// How a learning-package activity is launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    /// The package zip is stored inside the course.
    #[default]
    Local,
    /// The activity launches the remote AICC URL.
    AiccUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageActivity {
    pub id: u64,
    pub course_id: u64,
    pub name: String,
    pub package_type: PackageType,
    pub package_file: String,
    pub package_url: Option<String>,
}

/// Everything about an activity except its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub course_id: u64,
    pub name: String,
    pub package_type: PackageType,
    pub package_file: String,
    pub package_url: Option<String>,
}

/// A background unit of work. Carries only the remote course identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdhocTask {
    pub id: Uuid,
    pub component: String,
    pub remote_id: String,
}

impl AdhocTask {
    pub fn new(component: &str, remote_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            component: component.to_string(),
            remote_id: remote_id.to_string(),
        }
    }
}

pub trait CourseStore {
    fn course_exists(&self, idnumber: &str) -> Result<bool, HostError> {
        Ok(self.find_course_id(idnumber)?.is_some())
    }
    fn find_course_id(&self, idnumber: &str) -> Result<Option<u64>, HostError>;
    fn create_course(&self, payload: &CoursePayload) -> Result<HostCourse, HostError>;
    fn update_course(&self, payload: &CoursePayload) -> Result<(), HostError>;
    /// Returns `false` when the platform refused or the course was unknown.
    fn delete_course(&self, id: u64) -> Result<bool, HostError>;
}

pub trait CategoryStore {
    fn category_exists(&self, name: &str) -> Result<bool, HostError> {
        Ok(self.find_category(name)?.is_some())
    }
    fn find_category(&self, name: &str) -> Result<Option<Category>, HostError>;
    fn create_category(&self, name: &str, parent: Option<u64>) -> Result<Category, HostError>;
    fn rebuild_paths(&self) -> Result<(), HostError>;
}

pub trait FileStore {
    fn delete_area_files(&self, area: &FileArea) -> Result<(), HostError>;
    fn store_file_from_url(&self, meta: &FileMeta, url: &str) -> Result<(), HostError>;
    fn store_file_from_path(&self, meta: &FileMeta, path: &Path) -> Result<(), HostError>;
}

pub trait EnrolmentStore {
    fn get_enrol_instance(
        &self,
        course_id: u64,
        method: &str,
    ) -> Result<Option<EnrolInstance>, HostError>;
    fn set_enrol_status(&self, instance: &EnrolInstance, status: EnrolStatus)
    -> Result<(), HostError>;
}

pub trait ActivityStore {
    fn package_activities(&self, course_id: u64) -> Result<Vec<PackageActivity>, HostError>;
    fn all_package_activities(&self) -> Result<Vec<PackageActivity>, HostError>;
    fn create_package_activity(&self, activity: &NewActivity)
    -> Result<PackageActivity, HostError>;
    fn update_package_activity(&self, id: u64, activity: &NewActivity) -> Result<(), HostError>;
    fn rename_package_activity(&self, id: u64, name: &str) -> Result<(), HostError>;
}

pub trait TaskScheduler {
    fn schedule(&self, task: AdhocTask, run_not_before: DateTime<Utc>) -> Result<(), HostError>;
    /// Drop every pending task of `component`, returning how many were dropped.
    fn purge(&self, component: &str) -> Result<usize, HostError>;
    /// Remove and return the tasks of `component` whose time has come.
    fn claim_due(&self, component: &str, now: DateTime<Utc>) -> Result<Vec<AdhocTask>, HostError>;
    fn pending(&self, component: &str) -> Result<Vec<AdhocTask>, HostError>;
}

/// Persistence for [`SyncedCourse`] rows, keyed by remote identifier.
pub trait CourseRepository {
    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<SyncedCourse>, HostError>;
    /// Insert or overwrite; refreshes `modified_at`.
    fn save(&self, course: &mut SyncedCourse) -> Result<(), HostError>;
    fn find_all_by(&self, filter: &CourseFilter) -> Result<Vec<SyncedCourse>, HostError>;
    fn count(&self) -> Result<usize, HostError>;
}

/// Process-wide persisted integration state.
pub trait StateStore {
    fn failure_count(&self) -> Result<u32, HostError>;
    fn set_failure_count(&self, count: u32) -> Result<(), HostError>;
}

/// Named mutual exclusion with a bounded wait. The guard releases the lock
/// when dropped.
#[allow(async_fn_in_trait)]
pub trait LockFactory {
    type Guard;

    /// Fails with [`SyncError::LockTimeout`] when `name` stays held for
    /// longer than `timeout`.
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<Self::Guard, SyncError>;
}

/// The platform primitives the edge handlers touch.
pub trait HostPlatform:
    CourseStore + CategoryStore + FileStore + EnrolmentStore + ActivityStore
{
}

impl<T> HostPlatform for T where
    T: CourseStore + CategoryStore + FileStore + EnrolmentStore + ActivityStore + ?Sized
{
}
