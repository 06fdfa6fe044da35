use tracing::{debug, error, warn};

use super::course::SyncedCourse;
use super::state::{CourseStatus, Edge, edge_between, validate_transitions};
use crate::error::{SyncError, error_chain};
use crate::host::CourseRepository;

/// Implements one pipeline transition per [`Edge`].
///
/// Handlers must be idempotent: re-running an edge after a partial failure
/// looks up existing host objects by remote id and updates them in place.
#[allow(async_fn_in_trait)]
pub trait EdgeHandler {
    async fn handle(&self, edge: Edge, course: &mut SyncedCourse) -> Result<(), SyncError>;
}

/// How a `process_entity` run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The course is at the requested state.
    Reached(CourseStatus),
    /// Processing stopped at `at` without advancing further.
    Failed { at: CourseStatus, message: String },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Reached(_))
    }
}

/// Drives one course along the step order, one edge at a time.
#[derive(Debug, Clone, Copy)]
pub struct StateMachine {
    _checked: (),
}

impl StateMachine {
    /// Build a machine after checking the transition table covers every step.
    pub fn new() -> Result<Self, SyncError> {
        validate_transitions().map_err(SyncError::Config)?;
        Ok(Self { _checked: () })
    }

    /// Advance `course` until it reaches `target` or a step fails.
    ///
    /// The course is saved after every successful edge. Handler errors are
    /// logged and returned as [`ProcessOutcome::Failed`], never propagated.
    pub async fn process_entity<H, R>(
        &self,
        handler: &H,
        repository: &R,
        course: &mut SyncedCourse,
        target: CourseStatus,
    ) -> ProcessOutcome
    where
        H: EdgeHandler + ?Sized,
        R: CourseRepository + ?Sized,
    {
        if course.status.is_past(target) {
            return ProcessOutcome::Failed {
                at: course.status,
                message: format!("course is already past {target}"),
            };
        }

        while course.status != target {
            let from = course.status;
            let step = from
                .next()
                .and_then(|to| edge_between(from, to).map(|edge| (to, edge)));
            let Some((to, edge)) = step else {
                let err = SyncError::NoNextStep(from);
                warn!(remote_id = course.remote_id(), "{err}");
                return ProcessOutcome::Failed {
                    at: from,
                    message: err.to_string(),
                };
            };

            debug!(remote_id = course.remote_id(), %edge, "running edge");
            let result = match handler.handle(edge, course).await {
                Ok(()) => {
                    course.status = to;
                    repository.save(course).map_err(SyncError::from)
                }
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                match &e {
                    SyncError::Halted(reason) => {
                        warn!(remote_id = course.remote_id(), %edge, reason, "step halted");
                    }
                    _ => {
                        error!(
                            remote_id = course.remote_id(),
                            %edge,
                            error = %error_chain(&e),
                            "step failed"
                        );
                    }
                }
                // A failed save must not leave the in-memory status ahead of storage.
                course.status = from;
                return ProcessOutcome::Failed {
                    at: from,
                    message: e.to_string(),
                };
            }
        }

        ProcessOutcome::Reached(course.status)
    }
}
