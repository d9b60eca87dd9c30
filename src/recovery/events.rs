/// Structured event stream emitted by the runner
///
/// The runner reports progress through an injected sink; the surrounding
/// CLI owns formatting and destination. The core never prints.
use super::classification::ErrorClass;
use super::remediation::RemediationRecord;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    RunStarted {
        run_id: String,
        operation: String,
        max_attempts: u32,
    },
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    AttemptFailed {
        attempt: u32,
        class: ErrorClass,
        message: String,
    },
    /// Proactive permission fix on a degraded host, before the first attempt
    EnvironmentNormalized {
        record: RemediationRecord,
    },
    RemediationApplied {
        attempt: u32,
        record: RemediationRecord,
    },
    RetryScheduled {
        next_attempt: u32,
        delay: Duration,
    },
    Succeeded {
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        class: ErrorClass,
        message: String,
    },
    Cancelled {
        attempts_completed: u32,
    },
    /// Emitted by the storage selector when the primary store is abandoned
    StorageDowngraded {
        reason: String,
    },
    /// Terminal storage decision
    StorageSelected {
        backend: String,
        downgraded: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RecoveryEvent);
}

/// Sink that drops every event
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RecoveryEvent) {}
}

/// Sink that collects events in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecoveryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecoveryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RecoveryEvent) -> bool,
    {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &RecoveryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(&RecoveryEvent::AttemptStarted {
            attempt: 1,
            max_attempts: 3,
        });
        sink.emit(&RecoveryEvent::Succeeded { attempts: 1 });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RecoveryEvent::AttemptStarted { .. }));
        assert!(matches!(events[1], RecoveryEvent::Succeeded { attempts: 1 }));

        assert_eq!(
            sink.count(|e| matches!(e, RecoveryEvent::Succeeded { .. })),
            1
        );
    }
}
