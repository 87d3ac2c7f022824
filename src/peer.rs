//! Bridge to the native windowing layer.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{ComponentId, NativeId};

/// Requests the coordinator makes of the platform. The platform answers
/// later, asynchronously, by reporting native focus changes through the
/// [`FocusDispatcher`](crate::focus::dispatcher::FocusDispatcher).
pub trait FocusPeer: Send {
    /// Ask the platform to give keyboard focus to `window`. Returns whether
    /// the request was accepted for processing.
    fn request_window_focus(&mut self, window: ComponentId) -> bool;

    /// Force native focus onto a raw native window, typically a hidden
    /// focus proxy.
    fn request_native_focus(&mut self, native: NativeId) -> bool;
}

impl<T: FocusPeer + ?Sized> FocusPeer for Box<T> {
    fn request_window_focus(&mut self, window: ComponentId) -> bool {
        (**self).request_window_focus(window)
    }

    fn request_native_focus(&mut self, native: NativeId) -> bool {
        (**self).request_native_focus(native)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRequest {
    WindowFocus(ComponentId),
    NativeFocus(NativeId),
}

/// In-process peer that accepts every request and remembers it. Clones
/// share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPeer {
    requests: Arc<Mutex<Vec<PeerRequest>>>,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<PeerRequest> {
        self.requests.lock().clone()
    }

    pub fn take_requests(&self) -> Vec<PeerRequest> {
        std::mem::take(&mut *self.requests.lock())
    }
}

impl FocusPeer for RecordingPeer {
    fn request_window_focus(&mut self, window: ComponentId) -> bool {
        self.requests.lock().push(PeerRequest::WindowFocus(window));
        true
    }

    fn request_native_focus(&mut self, native: NativeId) -> bool {
        self.requests.lock().push(PeerRequest::NativeFocus(native));
        true
    }
}
