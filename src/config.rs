//! Tunables for a [`Desktop`](crate::desktop::Desktop).

use crate::focus::keys::TraversalKeys;
use crate::focus::policy::ContainerOrderPolicy;

/// Default name given to the event dispatch thread.
pub const DEFAULT_DISPATCH_THREAD_NAME: &str = "event-dispatch";

#[derive(Debug, Clone, PartialEq)]
pub struct FocusConfig {
    /// Enter nested focus cycle roots at their default component while
    /// traversing. Applies to the coordinator's default policy.
    pub implicit_down_cycle_traversal: bool,
    /// Keys used by components that did not register their own set.
    pub traversal_keys: TraversalKeys,
    pub dispatch_thread_name: String,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            implicit_down_cycle_traversal: true,
            traversal_keys: TraversalKeys::default(),
            dispatch_thread_name: DEFAULT_DISPATCH_THREAD_NAME.to_string(),
        }
    }
}

impl FocusConfig {
    pub fn default_policy(&self) -> ContainerOrderPolicy {
        ContainerOrderPolicy::new(self.implicit_down_cycle_traversal)
    }

    pub fn with_implicit_down_cycle_traversal(mut self, enabled: bool) -> Self {
        self.implicit_down_cycle_traversal = enabled;
        self
    }

    pub fn with_traversal_keys(mut self, keys: TraversalKeys) -> Self {
        self.traversal_keys = keys;
        self
    }

    pub fn with_dispatch_thread_name(mut self, name: impl Into<String>) -> Self {
        self.dispatch_thread_name = name.into();
        self
    }
}
