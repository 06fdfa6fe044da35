mod course;
mod machine;
mod state;

pub use course::{CourseFields, CourseFilter, REMOTE_COURSE_MAPPINGS, SyncedCourse};
pub use machine::{EdgeHandler, ProcessOutcome, StateMachine};
pub use state::{CourseStatus, Edge, STEPS, TRANSITIONS, edge_between, validate_transitions};
