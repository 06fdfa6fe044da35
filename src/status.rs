//! Visão de status para o operador: uma linha por curso e o indicador da fila.

use crate::error::SyncError;
use crate::host::{CourseRepository, StateStore, TaskScheduler};
use crate::queue::TaskQueue;
use crate::state_machine::{CourseFilter, CourseStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub remote_id: String,
    pub title: String,
    pub local_course_id: Option<u64>,
    pub status: CourseStatus,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub rows: Vec<StatusRow>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub blocked: bool,
    pub failures: u32,
    pub threshold: u32,
    pub pending_tasks: usize,
}

impl StatusReport {
    pub fn collect<R, Q, S>(
        repository: &R,
        queue: &TaskQueue<'_, Q, S>,
        page: usize,
        page_size: usize,
    ) -> Result<Self, SyncError>
    where
        R: CourseRepository + ?Sized,
        Q: TaskScheduler + ?Sized,
        S: StateStore + ?Sized,
    {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let courses = repository.find_all_by(&CourseFilter::new())?;
        let total = courses.len();
        let rows = courses
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .map(|course| StatusRow {
                remote_id: course.fields.remote_id,
                title: course.fields.title,
                local_course_id: course.local_course_id,
                status: course.status,
                active: course.fields.active,
            })
            .collect();

        Ok(Self {
            rows,
            page,
            page_size,
            total,
            blocked: queue.queue_is_blocked()?,
            failures: queue.breaker().failures()?,
            threshold: queue.breaker().threshold(),
            pending_tasks: queue.pending()?.len(),
        })
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size).max(1)
    }
}
