//! Event system infrastructure for the course-selection service.
//!
//! This crate provides the event system that decouples data mutations from
//! live-update delivery to connected browsers.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing every committed change that connected
//!   clients may need to hear about
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, so producers (request
//! handlers) and consumers (the live-update hub) can both depend on it.

use async_trait::async_trait;
use log::*;
use std::sync::Arc;

/// Identifier of a student account.
pub type StudentId = i64;

/// Identifier of a course. Courses are keyed by their administrator-chosen code.
pub type CourseId = String;

/// Current enrollment of a single course, read back after a selection change committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCount {
    pub course_id: CourseId,
    pub current_students: i64,
}

impl CourseCount {
    pub fn new(course_id: impl Into<CourseId>, current_students: i64) -> Self {
        Self {
            course_id: course_id.into(),
            current_students,
        }
    }
}

/// Domain events that represent committed changes in the system.
/// These events are emitted once the owning transaction has committed.
///
/// Events that concern specific students carry their IDs. The producer is
/// responsible for determining who is affected; handlers only route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// Course categories were created, renamed or deleted.
    CategoriesChanged,
    /// Selection periods were created or deleted.
    PeriodsChanged,
    /// Courses were created, edited, deleted or imported.
    CoursesChanged,
    /// Grades or their requirement groups changed.
    GradesChanged,
    /// Course selections were created, edited, deleted or imported.
    SelectionsChanged {
        /// Students whose own selection list changed.
        student_ids: Vec<StudentId>,
        /// Enrollment counts of every course touched by the change, read after commit.
        course_counts: Vec<CourseCount>,
    },
    /// Free-text message an administrator pushes to every connected client.
    AdminNotification { message: String },
}

impl DomainEvent {
    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::CategoriesChanged => "categories_changed",
            DomainEvent::PeriodsChanged => "periods_changed",
            DomainEvent::CoursesChanged => "courses_changed",
            DomainEvent::GradesChanged => "grades_changed",
            DomainEvent::SelectionsChanged { .. } => "selections_changed",
            DomainEvent::AdminNotification { .. } => "admin_notification",
        }
    }
}

/// Trait for handling domain events.
/// Implementations perform side effects like pushing live updates,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are called sequentially and never report failure back to the producer.
    pub async fn publish(&self, event: DomainEvent) {
        debug!(
            "Publishing {} to {} handler(s)",
            event.name(),
            self.handlers.len()
        );
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
