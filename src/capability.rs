/// Capability-checked adapters for optional native dependencies
///
/// A capability exposes a single probe; the registry picks the first
/// available implementation and can report every verdict for diagnostics.
/// Callers never inspect installed modules or loaded libraries directly.
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap availability check; must not mutate shared state
    fn probe(&self) -> Availability;
}

/// Ordered set of capabilities; first registered, first preferred
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Box<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Box<dyn Capability>) {
        self.entries.push(capability);
    }

    pub fn first_available(&self) -> Option<&dyn Capability> {
        self.entries
            .iter()
            .map(|c| c.as_ref())
            .find(|c| c.probe().is_available())
    }

    /// Probe every entry, in registration order
    pub fn report(&self) -> Vec<(&'static str, Availability)> {
        self.entries
            .iter()
            .map(|c| (c.name(), c.probe()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        available: bool,
    }

    impl Capability for Stub {
        fn name(&self) -> &'static str {
            self.name
        }

        fn probe(&self) -> Availability {
            if self.available {
                Availability::Available
            } else {
                Availability::Unavailable("stubbed out".to_string())
            }
        }
    }

    #[test]
    fn first_available_respects_registration_order() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(Stub {
            name: "native",
            available: false,
        }));
        registry.register(Box::new(Stub {
            name: "portable",
            available: true,
        }));

        assert_eq!(registry.first_available().unwrap().name(), "portable");
    }

    #[test]
    fn empty_registry_has_nothing_available() {
        let registry = CapabilityRegistry::new();
        assert!(registry.first_available().is_none());
        assert!(registry.report().is_empty());
    }

    #[test]
    fn report_lists_every_verdict() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(Stub {
            name: "a",
            available: true,
        }));
        registry.register(Box::new(Stub {
            name: "b",
            available: false,
        }));

        let report = registry.report();
        assert_eq!(report.len(), 2);
        assert!(report[0].1.is_available());
        assert!(!report[1].1.is_available());
    }
}
