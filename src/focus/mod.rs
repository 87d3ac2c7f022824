pub mod dispatcher;
pub mod keys;
pub mod manager;
pub mod policy;

pub use dispatcher::{Disposition, FocusDispatcher, NativeFocusEvent};
pub use keys::{KeyStroke, TraversalAction, TraversalKeys};
pub use manager::{
    FocusChange, FocusCoordinator, FocusEnv, FocusProperty, FocusVeto, HandlerId,
    KeyEventDispatcher, KeyEventPostProcessor, PropertyChangeListener, VetoableChangeListener,
};
pub use policy::ContainerOrderPolicy;
