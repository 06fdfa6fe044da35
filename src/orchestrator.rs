use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::CatalogApi;
use crate::category::CategoryResolver;
use crate::error::{SyncError, error_chain};
use crate::host::{CategoryStore, CourseRepository, CourseStore};
use crate::state_machine::{
    CourseFields, CourseFilter, CourseStatus, EdgeHandler, StateMachine, SyncedCourse,
};

/// Counters collected during one catalog sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pages: u32,
    pub records: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub categories_created: usize,
    pub queued: usize,
    pub queue_failed: usize,
    pub deleted: usize,
    pub delete_failed: usize,
}

/// Runs a full sweep of the remote catalog.
pub struct SyncOrchestrator<'a, A: ?Sized, H: ?Sized, R: ?Sized, E: ?Sized> {
    api: &'a A,
    host: &'a H,
    repository: &'a R,
    handler: &'a E,
    machine: StateMachine,
    page_size: u32,
    root_category: Option<u64>,
    progress: Option<&'a dyn Fn(u32, usize)>,
}

impl<'a, A, H, R, E> SyncOrchestrator<'a, A, H, R, E>
where
    A: CatalogApi + ?Sized,
    H: CourseStore + CategoryStore + ?Sized,
    R: CourseRepository + ?Sized,
    E: EdgeHandler + ?Sized,
{
    pub fn new(
        api: &'a A,
        host: &'a H,
        repository: &'a R,
        handler: &'a E,
        machine: StateMachine,
    ) -> Self {
        Self {
            api,
            host,
            repository,
            handler,
            machine,
            page_size: 50,
            root_category: None,
            progress: None,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root_category(mut self, root: Option<u64>) -> Self {
        self.root_category = root;
        self
    }

    /// Called after each page with the page number and records seen so far.
    pub fn on_page(mut self, progress: &'a dyn Fn(u32, usize)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Page through the catalog, queue new active courses, then delete
    /// courses that went inactive upstream.
    ///
    /// Listing failures abort the sweep. Failures of single courses are
    /// logged and counted.
    pub async fn run(&self) -> Result<SweepReport, SyncError> {
        let mut report = SweepReport::default();
        let mut page = 1;
        loop {
            let listing = self.api.list_courses(self.page_size, page).await?;
            report.pages += 1;
            report.records += listing.data.len();
            debug!(page, records = listing.data.len(), "fetched page");

            self.ingest_page(&listing.data, &mut report);
            if let Some(progress) = self.progress {
                progress(page, report.records);
            }

            if !listing.paging.has_next() {
                break;
            }
            page += 1;
        }

        self.queue_retrieved(&mut report).await?;
        self.delete_disabled(&mut report)?;

        info!(
            pages = report.pages,
            records = report.records,
            created = report.created,
            updated = report.updated,
            queued = report.queued,
            deleted = report.deleted,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    fn ingest_page(&self, records: &[Value], report: &mut SweepReport) {
        let resolver = CategoryResolver::new(self.host, self.root_category);
        for record in records {
            let fields = match CourseFields::from_value(record) {
                Ok(fields) => fields,
                Err(e) => {
                    error!(remote_id = ?record.get("id"), error = %e, "skipping malformed course record");
                    report.failed += 1;
                    continue;
                }
            };

            let paths = category_paths(record);
            match resolver.ensure_paths(paths.as_slice()) {
                Ok(created) => report.categories_created += created,
                Err(e) => {
                    warn!(remote_id = %fields.remote_id, error = %e, "could not create categories")
                }
            }

            let remote_id = fields.remote_id.clone();
            match self.upsert(fields) {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    error!(%remote_id, error = %error_chain(&e), "could not store course");
                    report.failed += 1;
                }
            }
        }
    }

    /// Store `fields`, returning whether the course was seen for the first time.
    fn upsert(&self, fields: CourseFields) -> Result<bool, SyncError> {
        match self.repository.find_by_remote_id(&fields.remote_id)? {
            Some(mut existing) => {
                existing.refresh(fields);
                self.repository.save(&mut existing)?;
                Ok(false)
            }
            None => {
                let mut course = SyncedCourse::new(fields);
                self.repository.save(&mut course)?;
                Ok(true)
            }
        }
    }

    async fn queue_retrieved(&self, report: &mut SweepReport) -> Result<(), SyncError> {
        let filter = CourseFilter::new()
            .status(CourseStatus::Retrieved)
            .active(true);
        for mut course in self.repository.find_all_by(&filter)? {
            let outcome = self
                .machine
                .process_entity(
                    self.handler,
                    self.repository,
                    &mut course,
                    CourseStatus::Queued,
                )
                .await;
            if outcome.is_success() {
                report.queued += 1;
            } else {
                report.queue_failed += 1;
            }
        }
        Ok(())
    }

    fn delete_disabled(&self, report: &mut SweepReport) -> Result<(), SyncError> {
        let filter = CourseFilter::new()
            .active(false)
            .has_local_course(true)
            .excluding(CourseStatus::Deleted);
        for mut course in self.repository.find_all_by(&filter)? {
            let Some(course_id) = course.local_course_id else {
                continue;
            };
            info!(remote_id = course.remote_id(), course_id, "deleting course");
            match self.host.delete_course(course_id) {
                Ok(true) => {
                    course.mark_deleted();
                    self.repository.save(&mut course)?;
                    report.deleted += 1;
                }
                Ok(false) => {
                    error!(remote_id = course.remote_id(), course_id, "host refused to delete course");
                    report.delete_failed += 1;
                }
                Err(e) => {
                    error!(remote_id = course.remote_id(), course_id, error = %e, "error deleting course");
                    report.delete_failed += 1;
                }
            }
        }
        Ok(())
    }
}

/// The raw category path strings of a listing record.
fn category_paths(record: &Value) -> Vec<&str> {
    record
        .get("categories")
        .and_then(Value::as_array)
        .map(|paths| paths.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::handler::{CourseSyncHandler, HandlerSettings};
    use crate::host::memory::MemoryHost;
    use crate::host::{COMPONENT, CoursePayload, TaskScheduler};
    use crate::queue::{CircuitBreaker, TaskQueue};
    use crate::testing::{MockCatalog, page, remote_course};
    use std::time::Duration;

    fn queue(host: &MemoryHost) -> TaskQueue<'_, MemoryHost, MemoryHost> {
        TaskQueue::new(
            host,
            CircuitBreaker::new(host, 5, Duration::from_secs(1)),
            Duration::from_secs(300),
        )
    }

    async fn sweep(api: &MockCatalog, host: &MemoryHost) -> Result<SweepReport, SyncError> {
        let queue = queue(host);
        let handler = CourseSyncHandler::new(api, host, &queue, HandlerSettings::default());
        SyncOrchestrator::new(api, host, host, &handler, StateMachine::new()?)
            .page_size(2)
            .run()
            .await
    }

    fn generated_catalog(count: usize) -> Vec<Value> {
        (1..=count)
            .map(|i| {
                remote_course(
                    &format!("course-{i}"),
                    &[
                        &format!("|1st Parent Category_{i}|1st Sub Category_{i}"),
                        &format!("|2nd Parent Category_{i}|2nd Sub Category_{i}"),
                    ],
                    true,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn pages_until_next_is_null() {
        let api = MockCatalog::new(vec![
            page(
                vec![remote_course("a", &[], true), remote_course("b", &[], true)],
                Some("https://api.example.com/v1/content?page=2"),
            ),
            page(
                vec![remote_course("c", &[], true), remote_course("d", &[], true)],
                Some("https://api.example.com/v1/content?page=3"),
            ),
            page(vec![remote_course("e", &[], true)], None),
            page(vec![remote_course("never", &[], true)], None),
        ]);
        let host = MemoryHost::new();

        let report = sweep(&api, &host).await.unwrap();

        assert_eq!(api.list_calls(), vec![(2, 1), (2, 2), (2, 3)]);
        assert_eq!(report.pages, 3);
        assert_eq!(report.created, 5);
        assert_eq!(host.count().unwrap(), 5);
        assert!(host.find_by_remote_id("never").unwrap().is_none());
    }

    #[tokio::test]
    async fn generated_catalog_is_categorised_and_queued() {
        let api = MockCatalog::new(vec![page(generated_catalog(5), None)]);
        let host = MemoryHost::new();

        let report = sweep(&api, &host).await.unwrap();

        assert_eq!(report.categories_created, 20);
        assert_eq!(host.categories().len(), 5 * 4 + 1);
        let queued = host
            .find_all_by(&CourseFilter::new().status(CourseStatus::Queued))
            .unwrap();
        assert_eq!(queued.len(), 5);
        assert_eq!(host.pending(COMPONENT).unwrap().len(), 5);
        assert!(host.courses().is_empty());
    }

    #[tokio::test]
    async fn second_sweep_updates_without_requeueing() {
        let api = MockCatalog::new(vec![page(generated_catalog(2), None)]);
        let host = MemoryHost::new();
        sweep(&api, &host).await.unwrap();

        let report = sweep(&api, &host).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 2);
        assert_eq!(report.queued, 0);
        assert_eq!(report.categories_created, 0);
        assert_eq!(host.pending(COMPONENT).unwrap().len(), 2);
        let course = host.find_by_remote_id("course-1").unwrap().unwrap();
        assert_eq!(course.status, CourseStatus::Queued);
    }

    #[tokio::test]
    async fn malformed_record_fails_alone() {
        let api = MockCatalog::new(vec![page(
            vec![
                serde_json::json!({"id": "good", "title": "Good", "active": true}),
                serde_json::json!({"id": "bad", "title": null, "active": true}),
                serde_json::json!({"title": "No id", "active": true}),
                remote_course("full", &["|Safety|Fire"], true),
            ],
            None,
        )]);
        let host = MemoryHost::new();

        let report = sweep(&api, &host).await.unwrap();

        assert_eq!(report.records, 4);
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.queued, 2);
        assert_eq!(report.categories_created, 2);
        assert!(host.find_by_remote_id("good").unwrap().is_some());
        assert!(host.find_by_remote_id("bad").unwrap().is_none());
        assert_eq!(host.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn inactive_records_are_stored_but_not_queued() {
        let api = MockCatalog::new(vec![page(
            vec![remote_course("on", &[], true), remote_course("off", &[], false)],
            None,
        )]);
        let host = MemoryHost::new();

        let report = sweep(&api, &host).await.unwrap();

        assert_eq!(report.queued, 1);
        let off = host.find_by_remote_id("off").unwrap().unwrap();
        assert_eq!(off.status, CourseStatus::Retrieved);
    }

    #[tokio::test]
    async fn deactivated_course_is_deleted_and_stays_deleted() {
        let host = MemoryHost::new();
        let created = host
            .create_course(&CoursePayload {
                id: None,
                fullname: "Course gone".into(),
                shortname: "Course gone".into(),
                idnumber: "gone".into(),
                summary: String::new(),
                category: None,
                tags: vec![],
                enable_completion: true,
                completion_notify: true,
            })
            .unwrap();
        let fields = CourseFields::from_value(&remote_course("gone", &[], true)).unwrap();
        let mut synced = SyncedCourse::new(fields);
        synced.status = CourseStatus::ScormImported;
        synced.local_course_id = Some(created.id);
        host.save(&mut synced).unwrap();

        let api = MockCatalog::new(vec![page(vec![remote_course("gone", &[], false)], None)]);
        let report = sweep(&api, &host).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert!(host.courses().is_empty());
        let synced = host.find_by_remote_id("gone").unwrap().unwrap();
        assert_eq!(synced.status, CourseStatus::Deleted);
        assert_eq!(synced.local_course_id, None);

        // Reactivation upstream does not resurrect it.
        let api = MockCatalog::new(vec![page(vec![remote_course("gone", &[], true)], None)]);
        let report = sweep(&api, &host).await.unwrap();
        assert_eq!(report.queued, 0);
        assert_eq!(report.deleted, 0);
        let synced = host.find_by_remote_id("gone").unwrap().unwrap();
        assert_eq!(synced.status, CourseStatus::Deleted);
    }

    #[tokio::test]
    async fn listing_failure_aborts_sweep() {
        let api = MockCatalog::new(vec![]);
        let host = MemoryHost::new();

        let err = sweep(&api, &host).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Api(ApiError::Client { status: 404, .. })
        ));
        assert_eq!(host.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn progress_reports_each_page() {
        let api = MockCatalog::new(vec![
            page(vec![remote_course("a", &[], true)], Some("next")),
            page(vec![remote_course("b", &[], true)], None),
        ]);
        let host = MemoryHost::new();
        let queue = queue(&host);
        let handler = CourseSyncHandler::new(&api, &host, &queue, HandlerSettings::default());
        let seen = std::sync::Mutex::new(Vec::new());
        let record = |page: u32, records: usize| seen.lock().unwrap().push((page, records));

        SyncOrchestrator::new(&api, &host, &host, &handler, StateMachine::new().unwrap())
            .on_page(&record)
            .run()
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(1, 1), (2, 2)]);
    }
}
