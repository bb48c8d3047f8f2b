use crate::connection::AudienceKey;
use crate::message::{Event, Resource};
use crate::Manager;
use async_trait::async_trait;
use events::{CourseCount, DomainEvent, EventHandler, StudentId};
use log::*;
use std::collections::HashSet;

/// Handles domain events by converting them to live-update events and
/// publishing them through the hub.
///
/// Audience policy:
/// - catalogue-wide invalidations and admin notifications go to everyone;
/// - selection invalidations go to the affected students plus the unfiltered
///   (admin) streams;
/// - course counts go to everyone, because any student browsing the catalogue
///   displays them.
pub struct LiveUpdateEventHandler {
    manager: Manager,
}

impl LiveUpdateEventHandler {
    pub fn new(manager: Manager) -> Self {
        Self { manager }
    }

    fn selections_changed(&self, student_ids: &[StudentId], course_counts: &[CourseCount]) {
        let students = dedup(student_ids.iter().copied());
        if !students.is_empty() {
            let mut audience: Vec<AudienceKey> =
                students.iter().copied().map(AudienceKey::Student).collect();
            audience.push(AudienceKey::Unfiltered);
            self.manager
                .broadcast_to(audience, Event::invalidate(Resource::Selections));
        }

        let mut seen = HashSet::new();
        let mut published = 0;
        for count in course_counts {
            if count.course_id.is_empty() || !seen.insert(count.course_id.as_str()) {
                continue;
            }
            self.manager.broadcast(Event::course_count_update(
                &count.course_id,
                count.current_students,
            ));
            published += 1;
        }

        debug!(
            "Published selection change for {} student(s) and {} course count(s)",
            students.len(),
            published
        );
    }
}

fn dedup<T: Copy + Eq + std::hash::Hash>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).collect()
}

#[async_trait]
impl EventHandler for LiveUpdateEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        debug!("Handling {} event", event.name());

        match event {
            DomainEvent::CategoriesChanged => {
                self.manager.broadcast(Event::invalidate(Resource::Categories))
            }
            DomainEvent::PeriodsChanged => {
                self.manager.broadcast(Event::invalidate(Resource::Periods))
            }
            DomainEvent::CoursesChanged => {
                self.manager.broadcast(Event::invalidate(Resource::Courses))
            }
            DomainEvent::GradesChanged => {
                self.manager.broadcast(Event::invalidate(Resource::Grades))
            }
            DomainEvent::SelectionsChanged {
                student_ids,
                course_counts,
            } => self.selections_changed(student_ids, course_counts),
            DomainEvent::AdminNotification { message } => {
                self.manager.broadcast(Event::notify(message.as_str()))
            }
        }
    }
}
