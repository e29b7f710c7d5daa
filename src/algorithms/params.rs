//! Per-call parameters shared by every algorithm.

use crate::config::{EngineConfig, DEFAULT_CUTOFF};
use crate::engine::SpawnOptions;
use crate::recursive::Node;
use crate::scheduler::Priority;
use std::time::Duration;

/// Name, cutoff, priority and optional deadline of one algorithm call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    name: String,
    cutoff: usize,
    priority: Priority,
    timeout: Option<Duration>,
}

impl Params {
    /// Parameters with built-in defaults and the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cutoff: DEFAULT_CUTOFF,
            priority: Priority::default(),
            timeout: None,
        }
    }

    /// Parameters seeded from an engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            name: String::from("parallel"),
            cutoff: config.default_cutoff,
            priority: config.default_priority,
            timeout: None,
        }
    }

    /// Sets the diagnostic name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the largest range handled sequentially. 0 behaves as 1.
    #[must_use]
    pub fn with_cutoff(mut self, cutoff: usize) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Sets the priority of posted work.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Bounds the call by a deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cutoff.
    #[must_use]
    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// The priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn root_node(&self) -> Node {
        Node::root(self.name.as_str(), self.cutoff, self.priority)
    }

    pub(crate) fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            timeout: self.timeout,
            priority: Some(self.priority),
            ..SpawnOptions::default()
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::new("parallel")
    }
}
