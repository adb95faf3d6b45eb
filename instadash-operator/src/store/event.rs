//! Events emitted by store writes.

use crate::resource::{Dashboard, ObjectKey};

/// Events emitted when a Dashboard changes.
///
/// These events are dispatched via a broadcast channel and act as reconcile
/// triggers. Delivery is best effort: subscribers that lag must relist.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new Dashboard was created.
    Added(Dashboard),
    /// A Dashboard's spec, status or metadata changed.
    Modified(Dashboard),
    /// A Dashboard was physically removed.
    Deleted(ObjectKey),
}

impl Event {
    /// Identity of the resource this event refers to.
    pub fn key(&self) -> ObjectKey {
        match self {
            Event::Added(d) | Event::Modified(d) => d.key(),
            Event::Deleted(key) => key.clone(),
        }
    }
}
