//! Generation tickets.
//!
//! Every generation task receives a [`Ticket`] for its target when it starts.
//! The store applies the task's result only while that ticket is still the
//! current one for the target.  A newer task on the same target, deleting
//! the entity, or replacing the collection makes the ticket stale, and the
//! late result is dropped instead of resurrecting the entity or clobbering
//! newer output.

use std::collections::HashMap;

use super::model::GenerationKind;

/// What a generation task writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskTarget {
    Translation {
        config_id: String,
        kind: GenerationKind,
    },
    Image {
        id: String,
    },
}

impl TaskTarget {
    pub fn translation(config_id: impl Into<String>, kind: GenerationKind) -> Self {
        TaskTarget::Translation {
            config_id: config_id.into(),
            kind,
        }
    }

    pub fn image(id: impl Into<String>) -> Self {
        TaskTarget::Image { id: id.into() }
    }
}

impl std::fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskTarget::Translation { config_id, kind } => {
                write!(f, "{} of '{}'", kind.label(), config_id)
            }
            TaskTarget::Image { id } => write!(f, "image '{id}'"),
        }
    }
}

/// Proof that a task was started; consumed when its result is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    target: TaskTarget,
    generation: u64,
}

impl Ticket {
    pub fn target(&self) -> &TaskTarget {
        &self.target
    }
}

/// Tracks the current ticket of every target with a task in flight.
#[derive(Debug, Default)]
pub struct TicketBook {
    next: u64,
    current: HashMap<TaskTarget, u64>,
}

impl TicketBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for `target`, superseding any earlier one.
    pub fn issue(&mut self, target: TaskTarget) -> Ticket {
        self.next += 1;
        self.current.insert(target.clone(), self.next);
        Ticket {
            target,
            generation: self.next,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.current.get(&ticket.target) == Some(&ticket.generation)
    }

    /// Forget `ticket` if it is still the current one.
    pub fn retire(&mut self, ticket: &Ticket) {
        if self.is_current(ticket) {
            self.current.remove(&ticket.target);
        }
    }

    /// Keep only the targets for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&TaskTarget) -> bool) {
        self.current.retain(|target, _| keep(target));
    }

    /// Number of targets with a task in flight.
    pub fn in_flight(&self) -> usize {
        self.current.len()
    }
}
