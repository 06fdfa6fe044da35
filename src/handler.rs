//! Edge handlers that move a course onto the host platform.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::api::CatalogApi;
use crate::category::{CategoryResolver, LIST_DELIMITER};
use crate::error::SyncError;
use crate::host::{
    CoursePayload, CourseRepository, EnrolStatus, FileArea, FileMeta, HostPlatform, NewActivity,
    PackageType, StateStore, TaskScheduler,
};
use crate::mapper::{self, FieldMapping};
use crate::queue::TaskQueue;
use crate::state_machine::{CourseFilter, Edge, EdgeHandler, SyncedCourse};

/// Synced course fields to host course fields.
pub const SYNCED_TO_HOST_COURSE: &[FieldMapping] = &[
    FieldMapping::new("title", &["shortname", "fullname"]),
    FieldMapping::new("remote_id", &["idnumber"]),
];

pub const DEFAULT_TAG: &str = "open-sesame";
pub const SELF_ENROL: &str = "self";

fn course_defaults() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("tags".into(), json!([DEFAULT_TAG]));
    defaults.insert("enable_completion".into(), json!(true));
    defaults.insert("completion_notify".into(), json!(true));
    defaults
}

/// How learning-package activities are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityNaming {
    #[default]
    RemoteId,
    CourseId,
    CourseName,
    /// Only the configured prefix.
    Prefix,
}

/// Activity name for `course` under `naming`, with `prefix` prepended when set.
pub fn activity_name(naming: ActivityNaming, prefix: &str, course: &SyncedCourse) -> String {
    let name = match naming {
        ActivityNaming::RemoteId => course.remote_id().to_string(),
        ActivityNaming::CourseId => course
            .local_course_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        ActivityNaming::CourseName => course.fields.title.clone(),
        ActivityNaming::Prefix => String::new(),
    };
    format!("{prefix}{name}")
}

/// Apply the naming scheme to every existing package activity.
///
/// Returns how many activities were renamed.
pub fn rename_activities<H, R>(
    host: &H,
    repository: &R,
    naming: ActivityNaming,
    prefix: &str,
) -> Result<usize, SyncError>
where
    H: HostPlatform + ?Sized,
    R: CourseRepository + ?Sized,
{
    let by_host_id: HashMap<u64, SyncedCourse> = repository
        .find_all_by(&CourseFilter::new().has_local_course(true))?
        .into_iter()
        .filter_map(|course| course.local_course_id.map(|id| (id, course)))
        .collect();

    let mut renamed = 0;
    for activity in host.all_package_activities()? {
        let Some(course) = by_host_id.get(&activity.course_id) else {
            continue;
        };
        let name = activity_name(naming, prefix, course);
        if name != activity.name {
            host.rename_package_activity(activity.id, &name)?;
            debug!(activity = activity.id, name, "renamed activity");
            renamed += 1;
        }
    }
    info!(renamed, "activities renamed");
    Ok(renamed)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerSettings {
    pub package_type: PackageType,
    pub activity_naming: ActivityNaming,
    pub activity_prefix: String,
    pub root_category: Option<u64>,
}

pub struct CourseSyncHandler<'a, A: ?Sized, H: ?Sized, Q: ?Sized, S: ?Sized> {
    api: &'a A,
    host: &'a H,
    queue: &'a TaskQueue<'a, Q, S>,
    settings: HandlerSettings,
}

impl<'a, A, H, Q, S> CourseSyncHandler<'a, A, H, Q, S>
where
    A: CatalogApi + ?Sized,
    H: HostPlatform + ?Sized,
    Q: TaskScheduler + ?Sized,
    S: StateStore + ?Sized,
{
    pub fn new(
        api: &'a A,
        host: &'a H,
        queue: &'a TaskQueue<'a, Q, S>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            api,
            host,
            queue,
            settings,
        }
    }

    /// Build the host course payload for `course`.
    pub fn course_payload(&self, course: &SyncedCourse) -> Result<CoursePayload, SyncError> {
        let source = serde_json::to_value(&course.fields)?;
        let mut fields = course_defaults();
        mapper::apply_mappings(&mut fields, &source, SYNCED_TO_HOST_COURSE)?;

        let publisher = course.fields.publisher_name.as_deref().unwrap_or_default();
        let summary = format!(
            "{}<br>Publisher Name: {publisher}<br>Duration: {}",
            course.fields.description_text, course.fields.duration
        );
        fields.insert("summary".into(), Value::String(summary));

        let resolver = CategoryResolver::new(self.host, self.settings.root_category);
        if let Some(paths) = course.fields.categories.as_deref() {
            let paths: Vec<&str> = paths.split(LIST_DELIMITER).collect();
            resolver.ensure_paths(paths.as_slice())?;
        }
        let category = resolver.resolve_target(course.fields.categories.as_deref())?;
        fields.insert("category".into(), json!(category));

        Ok(mapper::into_record(fields)?)
    }

    fn host_course_id(course: &SyncedCourse) -> Result<u64, SyncError> {
        course.local_course_id.ok_or_else(|| {
            SyncError::Integrity(format!(
                "course {} has no host course yet",
                course.remote_id()
            ))
        })
    }

    fn queue_course(&self, course: &SyncedCourse) -> Result<(), SyncError> {
        match self.queue.queue_task(course.remote_id()) {
            Err(SyncError::QueueBlocked) => Err(SyncError::Halted(
                "task queue is blocked, course left in retrieved".into(),
            )),
            other => other,
        }
    }

    fn create_course(&self, course: &mut SyncedCourse) -> Result<(), SyncError> {
        let mut payload = self.course_payload(course)?;
        let id = match self.host.find_course_id(&payload.idnumber)? {
            Some(id) => {
                payload.id = Some(id);
                self.host.update_course(&payload)?;
                debug!(remote_id = course.remote_id(), course_id = id, "updated host course");
                id
            }
            None => {
                let created = self.host.create_course(&payload)?;
                info!(
                    remote_id = course.remote_id(),
                    course_id = created.id,
                    "created host course"
                );
                created.id
            }
        };
        course.local_course_id = Some(id);
        self.sync_self_enrolment(id, course.fields.active)
    }

    fn sync_self_enrolment(&self, course_id: u64, active: bool) -> Result<(), SyncError> {
        let Some(instance) = self.host.get_enrol_instance(course_id, SELF_ENROL)? else {
            return Ok(());
        };
        let status = if active {
            EnrolStatus::Enabled
        } else {
            EnrolStatus::Disabled
        };
        if instance.status != status {
            self.host.set_enrol_status(&instance, status)?;
        }
        Ok(())
    }

    fn import_image(&self, course: &SyncedCourse) -> Result<(), SyncError> {
        let id = Self::host_course_id(course)?;
        let area = FileArea::course_overview(id);
        self.host.delete_area_files(&area)?;

        match course.fields.thumbnail_url.as_deref() {
            Some(url) if !url.is_empty() => {
                let meta = FileMeta::new(area, format!("courseimage_{id}.jpg"));
                self.host.store_file_from_url(&meta, url)?;
            }
            _ => debug!(remote_id = course.remote_id(), "no thumbnail to import"),
        }
        Ok(())
    }

    async fn import_package(&self, course: &SyncedCourse) -> Result<(), SyncError> {
        let id = Self::host_course_id(course)?;
        let existing = self.host.package_activities(id)?;
        if existing.len() > 1 {
            return Err(SyncError::Integrity(format!(
                "Course with id {id} has multiple scorm activities, please delete them."
            )));
        }

        let package_type = self.settings.package_type;
        let url = match package_type {
            PackageType::Local => course.fields.package_download_url.as_deref(),
            PackageType::AiccUrl => course.fields.aicc_launch_url.as_deref(),
        }
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            SyncError::Halted(format!(
                "course {} has no {package_type:?} package url",
                course.remote_id()
            ))
        })?;

        let file_name = format!("{}.zip", course.remote_id());
        let package = self.api.download_package(url, &file_name).await?;

        let area = FileArea::package(id);
        self.host.delete_area_files(&area)?;
        self.host
            .store_file_from_path(&FileMeta::new(area, file_name.clone()), package.path())?;

        let activity = NewActivity {
            course_id: id,
            name: activity_name(
                self.settings.activity_naming,
                &self.settings.activity_prefix,
                course,
            ),
            package_type,
            package_file: file_name,
            package_url: match package_type {
                PackageType::AiccUrl => Some(url.to_string()),
                PackageType::Local => None,
            },
        };
        match existing.first() {
            Some(current) => self.host.update_package_activity(current.id, &activity)?,
            None => {
                self.host.create_package_activity(&activity)?;
            }
        }
        info!(remote_id = course.remote_id(), course_id = id, "package imported");
        Ok(())
    }
}

impl<A, H, Q, S> EdgeHandler for CourseSyncHandler<'_, A, H, Q, S>
where
    A: CatalogApi + ?Sized,
    H: HostPlatform + ?Sized,
    Q: TaskScheduler + ?Sized,
    S: StateStore + ?Sized,
{
    async fn handle(&self, edge: Edge, course: &mut SyncedCourse) -> Result<(), SyncError> {
        match edge {
            Edge::Queue => self.queue_course(course),
            Edge::CreateCourse => self.create_course(course),
            Edge::ImportImage => self.import_image(course),
            Edge::ImportPackage => self.import_package(course).await,
        }
    }
}
