use crate::connection::AudienceKey;
use crate::error::Error;
use std::fmt;

/// Event kinds understood by the browser clients.
pub mod kind {
    /// Greeting written once on a fresh WebSocket before any queued event.
    pub const HELLO: &str = "hello";
    pub const INVALIDATE_CATEGORIES: &str = "invalidate_categories";
    pub const INVALIDATE_COURSES: &str = "invalidate_courses";
    pub const INVALIDATE_PERIODS: &str = "invalidate_periods";
    pub const INVALIDATE_GRADES: &str = "invalidate_grades";
    pub const INVALIDATE_SELECTIONS: &str = "invalidate_selections";
    /// Payload is `<course_id>,<count>`; split on the last comma.
    pub const COURSE_COUNT_UPDATE: &str = "course_count_update";
    /// Payload is free text.
    pub const NOTIFY: &str = "notify";
}

/// Resources a client caches and must re-fetch when told they went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Categories,
    Courses,
    Periods,
    Grades,
    Selections,
}

impl Resource {
    pub fn event_kind(&self) -> &'static str {
        match self {
            Resource::Categories => kind::INVALIDATE_CATEGORIES,
            Resource::Courses => kind::INVALIDATE_COURSES,
            Resource::Periods => kind::INVALIDATE_PERIODS,
            Resource::Grades => kind::INVALIDATE_GRADES,
            Resource::Selections => kind::INVALIDATE_SELECTIONS,
        }
    }
}

/// An immutable state-change notification.
///
/// Both wire encodings are line oriented, so neither field may contain a
/// `\n` or `\r`, and at least one of them must be non-empty. `Event::new`
/// panics when that is violated; `Event::try_new` reports it instead and is
/// what callers holding user-supplied text should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: String,
    payload: String,
}

impl Event {
    /// Builds an event, panicking if it breaks the wire invariants.
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        match Self::try_new(kind, payload) {
            Ok(event) => event,
            Err(err) => panic!("refusing to build live-update event: {err}"),
        }
    }

    pub fn try_new(kind: impl Into<String>, payload: impl Into<String>) -> Result<Self, Error> {
        let kind = kind.into();
        let payload = payload.into();

        if kind.is_empty() && payload.is_empty() {
            return Err(Error::invalid_event("kind and payload are both empty"));
        }
        if contains_line_break(&kind) {
            return Err(Error::invalid_event(format!(
                "kind {kind:?} contains a line break"
            )));
        }
        if contains_line_break(&payload) {
            return Err(Error::invalid_event(format!(
                "payload for kind {kind:?} contains a line break"
            )));
        }

        Ok(Self { kind, payload })
    }

    /// An event that carries no payload.
    pub fn signal(kind: impl Into<String>) -> Self {
        Self::new(kind, String::new())
    }

    pub fn hello() -> Self {
        Self::signal(kind::HELLO)
    }

    pub fn invalidate(resource: Resource) -> Self {
        Self::signal(resource.event_kind())
    }

    pub fn course_count_update(course_id: &str, current_students: i64) -> Self {
        Self::new(
            kind::COURSE_COUNT_UPDATE,
            format!("{course_id},{current_students}"),
        )
    }

    pub fn notify(message: impl Into<String>) -> Self {
        Self::new(kind::NOTIFY, message)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}({})", self.kind, self.payload)
        }
    }
}

fn contains_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

#[derive(Debug, Clone)]
pub struct Message {
    pub event: Event,
    pub scope: MessageScope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageScope {
    /// Send to every connection registered under one of these keys
    Audience(Vec<AudienceKey>),
    /// Send to every registered connection, student or unfiltered
    Broadcast,
}
