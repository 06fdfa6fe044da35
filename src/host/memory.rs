//! Plataforma host em memória com snapshots JSON.
//!
//! Usada pelos testes e pela CLI, que carrega o snapshot do arquivo de estado
//! configurado, executa um comando e grava o resultado de volta.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::{
    ActivityStore, AdhocTask, Category, CategoryStore, CourseRepository, CoursePayload,
    CourseStore, EnrolInstance, EnrolStatus, EnrolmentStore, FileArea, FileMeta, FileSource,
    FileStore, HostCourse, HostError, LockFactory, NewActivity, PackageActivity, StateStore,
    StoredFile, TaskScheduler,
};
use super::lock::NamedLocks;
use crate::error::SyncError;
use crate::state_machine::{CourseFilter, SyncedCourse};

/// Name of the category every fresh host starts with.
pub const DEFAULT_CATEGORY: &str = "Miscellaneous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task: AdhocTask,
    pub run_not_before: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HostState {
    next_id: u64,
    courses: BTreeMap<u64, HostCourse>,
    categories: BTreeMap<u64, Category>,
    files: Vec<StoredFile>,
    enrol_instances: BTreeMap<u64, EnrolInstance>,
    activities: BTreeMap<u64, PackageActivity>,
    synced_courses: BTreeMap<String, SyncedCourse>,
    tasks: Vec<ScheduledTask>,
    failure_count: u32,
}

impl Default for HostState {
    fn default() -> Self {
        let mut state = Self {
            next_id: 1,
            courses: BTreeMap::new(),
            categories: BTreeMap::new(),
            files: Vec::new(),
            enrol_instances: BTreeMap::new(),
            activities: BTreeMap::new(),
            synced_courses: BTreeMap::new(),
            tasks: Vec::new(),
            failure_count: 0,
        };
        let id = state.allocate_id();
        state.categories.insert(
            id,
            Category {
                id,
                name: DEFAULT_CATEGORY.to_string(),
                parent: None,
                path: format!("/{id}"),
            },
        );
        state
    }
}

impl HostState {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn category_path(&self, id: u64) -> String {
        let mut chain = vec![id];
        let mut current = self.categories.get(&id).and_then(|c| c.parent);
        while let Some(parent) = current {
            // A cycle would otherwise loop forever.
            if chain.contains(&parent) || chain.len() > self.categories.len() {
                break;
            }
            chain.push(parent);
            current = self.categories.get(&parent).and_then(|c| c.parent);
        }
        chain
            .iter()
            .rev()
            .map(|id| format!("/{id}"))
            .collect::<String>()
    }
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
    locks: NamedLocks,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot, or start empty when the file does not exist yet.
    pub fn load_snapshot(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            debug!(path = %path.display(), "no state file, starting empty");
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        let state: HostState = serde_json::from_str(&contents)?;
        Ok(Self {
            state: Mutex::new(state),
            locks: NamedLocks::new(),
        })
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<(), SyncError> {
        let contents = serde_json::to_string_pretty(&*self.lock())?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn courses(&self) -> Vec<HostCourse> {
        self.lock().courses.values().cloned().collect()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.lock().categories.values().cloned().collect()
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.lock().files.clone()
    }

    pub fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        self.lock().tasks.clone()
    }

    pub fn enrol_instances(&self) -> Vec<EnrolInstance> {
        self.lock().enrol_instances.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CourseStore for MemoryHost {
    fn find_course_id(&self, idnumber: &str) -> Result<Option<u64>, HostError> {
        Ok(self
            .lock()
            .courses
            .values()
            .find(|course| course.payload.idnumber == idnumber)
            .map(|course| course.id))
    }

    fn create_course(&self, payload: &CoursePayload) -> Result<HostCourse, HostError> {
        let mut state = self.lock();
        if state
            .courses
            .values()
            .any(|course| course.payload.idnumber == payload.idnumber)
        {
            return Err(HostError::Conflict(format!(
                "idnumber {} is already used",
                payload.idnumber
            )));
        }

        let id = state.allocate_id();
        let course = HostCourse {
            id,
            payload: CoursePayload {
                id: Some(id),
                ..payload.clone()
            },
        };
        state.courses.insert(id, course.clone());

        // New courses come with a disabled self enrolment instance.
        let instance_id = state.allocate_id();
        state.enrol_instances.insert(
            instance_id,
            EnrolInstance {
                id: instance_id,
                course_id: id,
                method: "self".into(),
                status: EnrolStatus::Disabled,
            },
        );
        Ok(course)
    }

    fn update_course(&self, payload: &CoursePayload) -> Result<(), HostError> {
        let id = payload.id.ok_or_else(|| HostError::NotFound {
            entity: "course",
            id: payload.idnumber.clone(),
        })?;
        let mut state = self.lock();
        let course = state.courses.get_mut(&id).ok_or(HostError::NotFound {
            entity: "course",
            id: id.to_string(),
        })?;
        course.payload = payload.clone();
        Ok(())
    }

    fn delete_course(&self, id: u64) -> Result<bool, HostError> {
        let mut state = self.lock();
        if state.courses.remove(&id).is_none() {
            return Ok(false);
        }
        state.files.retain(|file| file.meta.area.course_id != id);
        state.activities.retain(|_, activity| activity.course_id != id);
        state
            .enrol_instances
            .retain(|_, instance| instance.course_id != id);
        Ok(true)
    }
}

impl CategoryStore for MemoryHost {
    fn find_category(&self, name: &str) -> Result<Option<Category>, HostError> {
        Ok(self
            .lock()
            .categories
            .values()
            .find(|category| category.name == name)
            .cloned())
    }

    fn create_category(&self, name: &str, parent: Option<u64>) -> Result<Category, HostError> {
        let mut state = self.lock();
        if let Some(parent) = parent
            && !state.categories.contains_key(&parent)
        {
            return Err(HostError::NotFound {
                entity: "category",
                id: parent.to_string(),
            });
        }
        let id = state.allocate_id();
        let category = Category {
            id,
            name: name.to_string(),
            parent,
            path: String::new(),
        };
        state.categories.insert(id, category.clone());
        Ok(category)
    }

    fn rebuild_paths(&self) -> Result<(), HostError> {
        let mut state = self.lock();
        let paths: Vec<(u64, String)> = state
            .categories
            .keys()
            .map(|&id| (id, state.category_path(id)))
            .collect();
        for (id, path) in paths {
            if let Some(category) = state.categories.get_mut(&id) {
                category.path = path;
            }
        }
        Ok(())
    }
}

impl FileStore for MemoryHost {
    fn delete_area_files(&self, area: &FileArea) -> Result<(), HostError> {
        self.lock().files.retain(|file| &file.meta.area != area);
        Ok(())
    }

    fn store_file_from_url(&self, meta: &FileMeta, url: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        state.files.retain(|file| &file.meta != meta);
        state.files.push(StoredFile {
            meta: meta.clone(),
            source: FileSource::Url(url.to_string()),
        });
        Ok(())
    }

    fn store_file_from_path(&self, meta: &FileMeta, path: &Path) -> Result<(), HostError> {
        let size = std::fs::metadata(path)
            .map_err(|e| HostError::Storage(format!("{}: {e}", path.display())))?
            .len();
        let mut state = self.lock();
        state.files.retain(|file| &file.meta != meta);
        state.files.push(StoredFile {
            meta: meta.clone(),
            source: FileSource::Path {
                path: path.display().to_string(),
                size,
            },
        });
        Ok(())
    }
}

impl EnrolmentStore for MemoryHost {
    fn get_enrol_instance(
        &self,
        course_id: u64,
        method: &str,
    ) -> Result<Option<EnrolInstance>, HostError> {
        Ok(self
            .lock()
            .enrol_instances
            .values()
            .find(|instance| instance.course_id == course_id && instance.method == method)
            .cloned())
    }

    fn set_enrol_status(
        &self,
        instance: &EnrolInstance,
        status: EnrolStatus,
    ) -> Result<(), HostError> {
        let mut state = self.lock();
        let stored = state
            .enrol_instances
            .get_mut(&instance.id)
            .ok_or(HostError::NotFound {
                entity: "enrol instance",
                id: instance.id.to_string(),
            })?;
        stored.status = status;
        Ok(())
    }
}

impl ActivityStore for MemoryHost {
    fn package_activities(&self, course_id: u64) -> Result<Vec<PackageActivity>, HostError> {
        Ok(self
            .lock()
            .activities
            .values()
            .filter(|activity| activity.course_id == course_id)
            .cloned()
            .collect())
    }

    fn all_package_activities(&self) -> Result<Vec<PackageActivity>, HostError> {
        Ok(self.lock().activities.values().cloned().collect())
    }

    fn create_package_activity(
        &self,
        activity: &NewActivity,
    ) -> Result<PackageActivity, HostError> {
        let mut state = self.lock();
        if !state.courses.contains_key(&activity.course_id) {
            return Err(HostError::NotFound {
                entity: "course",
                id: activity.course_id.to_string(),
            });
        }
        let id = state.allocate_id();
        let created = PackageActivity {
            id,
            course_id: activity.course_id,
            name: activity.name.clone(),
            package_type: activity.package_type,
            package_file: activity.package_file.clone(),
            package_url: activity.package_url.clone(),
        };
        state.activities.insert(id, created.clone());
        Ok(created)
    }

    fn update_package_activity(&self, id: u64, activity: &NewActivity) -> Result<(), HostError> {
        let mut state = self.lock();
        let stored = state.activities.get_mut(&id).ok_or(HostError::NotFound {
            entity: "activity",
            id: id.to_string(),
        })?;
        stored.name = activity.name.clone();
        stored.package_type = activity.package_type;
        stored.package_file = activity.package_file.clone();
        stored.package_url = activity.package_url.clone();
        Ok(())
    }

    fn rename_package_activity(&self, id: u64, name: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        let stored = state.activities.get_mut(&id).ok_or(HostError::NotFound {
            entity: "activity",
            id: id.to_string(),
        })?;
        stored.name = name.to_string();
        Ok(())
    }
}

impl TaskScheduler for MemoryHost {
    fn schedule(&self, task: AdhocTask, run_not_before: DateTime<Utc>) -> Result<(), HostError> {
        self.lock().tasks.push(ScheduledTask {
            task,
            run_not_before,
        });
        Ok(())
    }

    fn purge(&self, component: &str) -> Result<usize, HostError> {
        let mut state = self.lock();
        let before = state.tasks.len();
        state
            .tasks
            .retain(|scheduled| scheduled.task.component != component);
        Ok(before - state.tasks.len())
    }

    fn claim_due(&self, component: &str, now: DateTime<Utc>) -> Result<Vec<AdhocTask>, HostError> {
        let mut state = self.lock();
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.tasks)
                .into_iter()
                .partition(|scheduled| {
                    scheduled.task.component == component && scheduled.run_not_before <= now
                });
        state.tasks = waiting;
        Ok(due.into_iter().map(|scheduled| scheduled.task).collect())
    }

    fn pending(&self, component: &str) -> Result<Vec<AdhocTask>, HostError> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|scheduled| scheduled.task.component == component)
            .map(|scheduled| scheduled.task.clone())
            .collect())
    }
}

impl CourseRepository for MemoryHost {
    fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<SyncedCourse>, HostError> {
        Ok(self.lock().synced_courses.get(remote_id).cloned())
    }

    fn save(&self, course: &mut SyncedCourse) -> Result<(), HostError> {
        course.modified_at = Utc::now();
        self.lock()
            .synced_courses
            .insert(course.remote_id().to_string(), course.clone());
        Ok(())
    }

    fn find_all_by(&self, filter: &CourseFilter) -> Result<Vec<SyncedCourse>, HostError> {
        Ok(self
            .lock()
            .synced_courses
            .values()
            .filter(|course| filter.matches(course))
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, HostError> {
        Ok(self.lock().synced_courses.len())
    }
}

impl StateStore for MemoryHost {
    fn failure_count(&self) -> Result<u32, HostError> {
        Ok(self.lock().failure_count)
    }

    fn set_failure_count(&self, count: u32) -> Result<(), HostError> {
        self.lock().failure_count = count;
        Ok(())
    }
}

impl LockFactory for MemoryHost {
    type Guard = OwnedMutexGuard<()>;

    async fn acquire(&self, name: &str, timeout: Duration) -> Result<Self::Guard, SyncError> {
        self.locks.acquire(name, timeout).await
    }
}
