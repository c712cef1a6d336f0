use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Sequence number of an issued request.
pub struct Ticket(u64);

impl Ticket {
    /// Position in issue order, starting at 1.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
/// Drops results of requests superseded by a newer one.
///
/// Every request gets a ticket when issued; a finished result is displayed only if its ticket is
/// still the latest. Superseded work is not cancelled, its result is just discarded.
pub struct DisplayGate {
    latest: AtomicU64,
}

impl DisplayGate {
    /// Gate with no tickets issued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for a new request, superseding every earlier one.
    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Whether `ticket` is the most recently issued.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// `value` if `ticket` is still current, `None` if a newer request was issued.
    pub fn accept<T>(&self, ticket: Ticket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            tracing::debug!(
                ticket = ticket.0,
                latest = self.latest.load(Ordering::Relaxed),
                "stale result dropped"
            );
            None
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/gate.rs"]
mod tests;
