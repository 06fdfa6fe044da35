use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline state of a synced course.
///
/// Courses flow through: RETRIEVED → QUEUED → CREATED → IMAGEIMPORTED → SCORMIMPORTED.
/// `Deleted` is terminal and sits outside the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Retrieved,
    Queued,
    Created,
    ImageImported,
    ScormImported,
    Deleted,
}

/// The ordered steps every course walks through.
pub const STEPS: [CourseStatus; 5] = [
    CourseStatus::Retrieved,
    CourseStatus::Queued,
    CourseStatus::Created,
    CourseStatus::ImageImported,
    CourseStatus::ScormImported,
];

impl CourseStatus {
    /// Position in the step order, `None` for `Deleted`.
    pub fn position(self) -> Option<usize> {
        STEPS.iter().position(|step| *step == self)
    }

    /// The single valid successor, if any.
    pub fn next(self) -> Option<CourseStatus> {
        self.position().and_then(|i| STEPS.get(i + 1).copied())
    }

    /// The last defined step, the target of background processing.
    pub fn last() -> CourseStatus {
        STEPS[STEPS.len() - 1]
    }

    /// Whether `self` comes strictly after `other` in the step order.
    pub fn is_past(self, other: CourseStatus) -> bool {
        match (self.position(), other.position()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// States a background task is expected to pick up from.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            CourseStatus::Queued | CourseStatus::Created | CourseStatus::ImageImported
        )
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseStatus::Retrieved => write!(f, "retrieved"),
            CourseStatus::Queued => write!(f, "queued"),
            CourseStatus::Created => write!(f, "created"),
            CourseStatus::ImageImported => write!(f, "imageimported"),
            CourseStatus::ScormImported => write!(f, "scormimported"),
            CourseStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// One transition of the pipeline, each with exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Queue,
    CreateCourse,
    ImportImage,
    ImportPackage,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to) = self.endpoints();
        write!(f, "{from}_to_{to}")
    }
}

/// `(from, to) -> edge` table.
pub const TRANSITIONS: [(CourseStatus, CourseStatus, Edge); 4] = [
    (CourseStatus::Retrieved, CourseStatus::Queued, Edge::Queue),
    (CourseStatus::Queued, CourseStatus::Created, Edge::CreateCourse),
    (
        CourseStatus::Created,
        CourseStatus::ImageImported,
        Edge::ImportImage,
    ),
    (
        CourseStatus::ImageImported,
        CourseStatus::ScormImported,
        Edge::ImportPackage,
    ),
];

impl Edge {
    pub fn endpoints(self) -> (CourseStatus, CourseStatus) {
        TRANSITIONS
            .iter()
            .find(|(_, _, edge)| *edge == self)
            .map(|(from, to, _)| (*from, *to))
            .unwrap_or((CourseStatus::Deleted, CourseStatus::Deleted))
    }
}

/// Look up the handler edge for a transition.
pub fn edge_between(from: CourseStatus, to: CourseStatus) -> Option<Edge> {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, edge)| *edge)
}

/// Check that every consecutive pair of steps has exactly one edge.
pub fn validate_transitions() -> Result<(), String> {
    for pair in STEPS.windows(2) {
        let matches = TRANSITIONS
            .iter()
            .filter(|(from, to, _)| *from == pair[0] && *to == pair[1])
            .count();
        if matches != 1 {
            return Err(format!(
                "expected one handler for {} -> {}, found {matches}",
                pair[0], pair[1]
            ));
        }
    }
    if TRANSITIONS.len() != STEPS.len() - 1 {
        return Err(format!(
            "{} transitions registered for {} steps",
            TRANSITIONS.len(),
            STEPS.len()
        ));
    }
    Ok(())
}
