//! Event queue and keyboard focus coordination for a windowed UI.
//!
//! Events from any thread are posted to an [`EventQueue`] and dispatched one
//! at a time on a single dispatch thread. The [`FocusCoordinator`] consumes
//! focus, window and key events there and keeps the focus owner, focused
//! window and active window consistent. [`Desktop`] ties the pieces together
//! for one component hierarchy.

pub mod config;
pub mod desktop;
pub mod drivers;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod event_queue;
pub mod focus;
pub mod log_buffer;
pub mod peer;
pub mod tracing_sub;
pub mod tree;

pub use config::FocusConfig;
pub use desktop::Desktop;
pub use error::{Error, FocusError, QueueError, Result};
pub use event::{ComponentId, EventKind, EventRecord, KeyData, NativeId};
pub use event_loop::{DispatchThread, EventSink, pump_pending};
pub use event_queue::{DispatchHook, EventQueue, QueueId, QueuedEvent};
pub use focus::{ContainerOrderPolicy, FocusCoordinator, FocusDispatcher, NativeFocusEvent};
pub use peer::{FocusPeer, PeerRequest, RecordingPeer};
pub use tree::{ComponentKind, ComponentTree, MenuBar};
