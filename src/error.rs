//! Error types for the event queue and the focus subsystem.
//
// Vetoed focus changes are not errors: they are recovered inside the
// coordinator and never reach the event source. Everything here is a misuse
// of the API and is reported straight back to the caller.

use thiserror::Error;

use crate::event::ComponentId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no nested event queue has been pushed")]
    EmptyStack,
    #[error("invoke_and_wait called from the event dispatch thread")]
    InvokeFromDispatchThread,
    #[error("invoked task panicked: {0}")]
    TaskPanicked(String),
    #[error("event queue has been closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FocusError {
    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),
    #[error("component {0} is not a container")]
    NotAContainer(ComponentId),
    #[error("component {0} is not a window")]
    NotAWindow(ComponentId),
    #[error("component {component} is not in the focus cycle of {root}")]
    NotInCycle {
        root: ComponentId,
        component: ComponentId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Focus(#[from] FocusError),
}
