//! Process-wide FIFO event queue with nested levels.
//!
//! Any thread may post. Exactly one thread, the dispatch thread, takes
//! events off the queue (see [`crate::event_loop`]). The queue is a stack of
//! FIFO levels: [`EventQueue::push`] makes a fresh level the target for both
//! posting and dispatch until the matching [`EventQueue::pop`].
//!
//! The queue is unbounded. A producer that outpaces the dispatch thread
//! grows memory without limit; nothing here applies back-pressure.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::error::QueueError;
use crate::event::{EventKind, EventRecord};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Identity of one level of the queue stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue-{}", self.0)
    }
}

/// Interceptor installed with [`EventQueue::push_with_hook`]. Runs on the
/// dispatch thread for every non-invocation event while its level is active.
pub trait DispatchHook: Send + Sync {
    /// Return `true` when the event was fully handled and must not reach
    /// the default dispatch.
    fn dispatch(&self, event: &mut EventRecord) -> bool;
}

impl<F> DispatchHook for F
where
    F: Fn(&mut EventRecord) -> bool + Send + Sync,
{
    fn dispatch(&self, event: &mut EventRecord) -> bool {
        self(event)
    }
}

/// An entry of the queue: the event record plus, for invocation events, the
/// task to run.
pub struct QueuedEvent {
    record: EventRecord,
    task: Option<Task>,
}

impl QueuedEvent {
    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    pub fn into_parts(self) -> (EventRecord, Option<Task>) {
        (self.record, self.task)
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("record", &self.record)
            .field("task", &self.task.is_some())
            .finish()
    }
}

struct Level {
    id: QueueId,
    events: VecDeque<QueuedEvent>,
    hook: Option<Arc<dyn DispatchHook>>,
}

impl Level {
    fn new(id: QueueId, hook: Option<Arc<dyn DispatchHook>>) -> Self {
        Self {
            id,
            events: VecDeque::new(),
            hook,
        }
    }
}

struct State {
    base: Level,
    pushed: Vec<Level>,
    next_id: u64,
    closed: bool,
    most_recent_event_time: Option<Instant>,
    current_event: Option<EventRecord>,
    dispatch_thread: Option<ThreadId>,
}

impl State {
    fn active(&mut self) -> &mut Level {
        match self.pushed.last_mut() {
            Some(level) => level,
            None => &mut self.base,
        }
    }

    fn active_ref(&self) -> &Level {
        self.pushed.last().unwrap_or(&self.base)
    }

    fn depth(&self) -> usize {
        self.pushed.len() + 1
    }
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
}

/// Cheap, cloneable handle; all clones address the same queue.
#[derive(Clone)]
pub struct EventQueue {
    shared: Arc<Shared>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("EventQueue")
            .field("depth", &state.depth())
            .field("pending", &state.active_ref().events.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    base: Level::new(QueueId(0), None),
                    pushed: Vec::new(),
                    next_id: 1,
                    closed: false,
                    most_recent_event_time: None,
                    current_event: None,
                    dispatch_thread: None,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Append `event` to the active level and wake the dispatch thread.
    /// Events posted after [`close`](Self::close) are dropped.
    pub fn post_event(&self, mut event: EventRecord) {
        event.mark_posted();
        self.post(QueuedEvent {
            record: event,
            task: None,
        });
    }

    fn post(&self, event: QueuedEvent) {
        let mut state = self.shared.state.lock();
        if state.closed {
            debug!(event = %event.record, "event posted to closed queue dropped");
            return;
        }
        trace!(event = %event.record, "post");
        state.active().events.push_back(event);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Blocking removal of the head of the active level. Returns
    /// [`QueueError::Closed`] once the queue is closed.
    pub fn next_event(&self) -> Result<QueuedEvent, QueueError> {
        let mut state = self.shared.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if let Some(event) = state.active().events.pop_front() {
                state.most_recent_event_time = Some(event.record.when());
                return Ok(event);
            }
            self.shared.available.wait(&mut state);
        }
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&self) -> Option<QueuedEvent> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return None;
        }
        let event = state.active().events.pop_front()?;
        state.most_recent_event_time = Some(event.record.when());
        Some(event)
    }

    /// Copy of the head of the active level.
    pub fn peek_event(&self) -> Option<EventRecord> {
        let state = self.shared.state.lock();
        state.active_ref().events.front().map(|e| e.record.clone())
    }

    /// Copy of the first pending event of `kind` in the active level.
    pub fn peek_event_of(&self, kind: EventKind) -> Option<EventRecord> {
        let state = self.shared.state.lock();
        state
            .active_ref()
            .events
            .iter()
            .find(|e| e.record.kind() == kind)
            .map(|e| e.record.clone())
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().active_ref().events.len()
    }

    /// Make a new level active. Events still pending on the previous level
    /// move to the new one so FIFO order is kept.
    pub fn push(&self) -> QueueId {
        self.push_level(None)
    }

    pub fn push_with_hook<H: DispatchHook + 'static>(&self, hook: H) -> QueueId {
        self.push_level(Some(Arc::new(hook)))
    }

    fn push_level(&self, hook: Option<Arc<dyn DispatchHook>>) -> QueueId {
        let mut state = self.shared.state.lock();
        let id = QueueId(state.next_id);
        state.next_id += 1;
        let mut level = Level::new(id, hook);
        level.events = std::mem::take(&mut state.active().events);
        state.pushed.push(level);
        debug!(queue = %id, depth = state.depth(), "pushed event queue");
        id
    }

    /// Remove the active level. Its leftover events are appended to the
    /// level below, which becomes active again.
    pub fn pop(&self) -> Result<QueueId, QueueError> {
        let mut state = self.shared.state.lock();
        let Some(popped) = state.pushed.pop() else {
            return Err(QueueError::EmptyStack);
        };
        let below = state.active();
        below.events.extend(popped.events);
        let pending = !below.events.is_empty();
        debug!(queue = %popped.id, depth = state.depth(), "popped event queue");
        drop(state);
        if pending {
            self.shared.available.notify_one();
        }
        Ok(popped.id)
    }

    pub fn active_queue(&self) -> QueueId {
        self.shared.state.lock().active_ref().id
    }

    /// Number of levels, the base level included.
    pub fn depth(&self) -> usize {
        self.shared.state.lock().depth()
    }

    pub(crate) fn active_hook(&self) -> Option<Arc<dyn DispatchHook>> {
        self.shared.state.lock().active_ref().hook.clone()
    }

    /// Run `task` on the dispatch thread after everything already queued.
    pub fn invoke_later<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(QueuedEvent {
            record: EventRecord::invocation(),
            task: Some(Box::new(task)),
        });
    }

    /// Run `task` on the dispatch thread and block until it has finished.
    ///
    /// Fails with [`QueueError::InvokeFromDispatchThread`] when called from
    /// the dispatch thread itself, which would otherwise wait forever. A
    /// panic inside `task` is returned as [`QueueError::TaskPanicked`].
    pub fn invoke_and_wait<F, T>(&self, task: F) -> Result<T, QueueError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_dispatch_thread() {
            return Err(QueueError::InvokeFromDispatchThread);
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.invoke_later(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| QueueError::TaskPanicked(panic_message(payload.as_ref())));
            let _ = tx.send(result);
        });
        // The sender is dropped without a value when the queue closes first.
        rx.recv().map_err(|_| QueueError::Closed)?
    }

    pub fn most_recent_event_time(&self) -> Option<Instant> {
        self.shared.state.lock().most_recent_event_time
    }

    /// Event being dispatched right now, if any.
    pub fn current_event(&self) -> Option<EventRecord> {
        self.shared.state.lock().current_event.clone()
    }

    pub(crate) fn set_current_event(&self, event: Option<EventRecord>) {
        self.shared.state.lock().current_event = event;
    }

    pub fn is_dispatch_thread(&self) -> bool {
        self.shared.state.lock().dispatch_thread == Some(thread::current().id())
    }

    pub(crate) fn dispatch_thread(&self) -> Option<ThreadId> {
        self.shared.state.lock().dispatch_thread
    }

    pub(crate) fn set_dispatch_thread(&self, id: Option<ThreadId>) {
        self.shared.state.lock().dispatch_thread = id;
    }

    /// Stop the queue. Pending events are discarded, blocked
    /// [`next_event`](Self::next_event) calls return [`QueueError::Closed`]
    /// and waiting [`invoke_and_wait`](Self::invoke_and_wait) callers are
    /// released with the same error.
    pub fn close(&self) {
        let discarded: Vec<QueuedEvent> = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            let state = &mut *state;
            std::iter::once(&mut state.base)
                .chain(state.pushed.iter_mut())
                .flat_map(|l| l.events.drain(..))
                .collect()
        };
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "discarding events on close");
        }
        // Tasks are dropped outside the lock; their completion channels
        // disconnect and wake any waiter.
        drop(discarded);
        self.shared.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ComponentId;

    fn gained(n: usize) -> EventRecord {
        EventRecord::focus_gained(ComponentId(n), None, false)
    }

    fn source_of(event: QueuedEvent) -> Option<ComponentId> {
        event.record().source()
    }

    #[test]
    fn events_come_out_in_post_order() {
        let q = EventQueue::new();
        for n in 1..=3 {
            q.post_event(gained(n));
        }
        let order: Vec<_> = (0..3)
            .map(|_| source_of(q.next_event().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                Some(ComponentId(1)),
                Some(ComponentId(2)),
                Some(ComponentId(3))
            ]
        );
        assert!(q.try_next_event().is_none());
        assert!(q.most_recent_event_time().is_some());
    }

    #[test]
    fn posted_flag_is_set() {
        let q = EventQueue::new();
        q.post_event(gained(1));
        assert!(q.peek_event().unwrap().is_posted());
    }

    #[test]
    fn peek_does_not_remove() {
        let q = EventQueue::new();
        assert!(q.peek_event().is_none());
        q.post_event(gained(1));
        q.post_event(EventRecord::focus_lost(ComponentId(2), None, false));
        assert_eq!(q.peek_event().unwrap().source(), Some(ComponentId(1)));
        let lost = q.peek_event_of(EventKind::FocusLost).unwrap();
        assert_eq!(lost.source(), Some(ComponentId(2)));
        assert!(q.peek_event_of(EventKind::KeyTyped).is_none());
        assert_eq!(q.pending(), 2);
    }

    #[test]
    fn push_and_pop_form_a_stack() {
        let q = EventQueue::new();
        let base = q.active_queue();
        let second = q.push();
        let third = q.push();
        assert_eq!(q.active_queue(), third);
        assert_eq!(q.depth(), 3);
        assert_eq!(q.pop(), Ok(third));
        assert_eq!(q.active_queue(), second);
        assert_eq!(q.pop(), Ok(second));
        assert_eq!(q.active_queue(), base);
        assert_eq!(q.pop(), Err(QueueError::EmptyStack));
    }

    #[test]
    fn pending_events_follow_the_active_level() {
        let q = EventQueue::new();
        q.post_event(gained(1));
        q.push();
        q.post_event(gained(2));
        assert_eq!(q.pending(), 2);
        q.pop().unwrap();
        q.post_event(gained(3));
        let order: Vec<_> = std::iter::from_fn(|| q.try_next_event())
            .map(source_of)
            .collect();
        assert_eq!(
            order,
            vec![
                Some(ComponentId(1)),
                Some(ComponentId(2)),
                Some(ComponentId(3))
            ]
        );
    }

    #[test]
    fn blocked_consumer_wakes_on_post() {
        let q = EventQueue::new();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.next_event().map(source_of))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        q.post_event(gained(4));
        assert_eq!(consumer.join().unwrap(), Ok(Some(ComponentId(4))));
    }

    #[test]
    fn close_releases_blocked_consumer() {
        let q = EventQueue::new();
        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.next_event().map(|_| ()))
        };
        thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert_eq!(consumer.join().unwrap(), Err(QueueError::Closed));
        q.post_event(gained(1));
        assert!(q.try_next_event().is_none());
    }

    #[test]
    fn invoke_and_wait_on_dispatch_thread_fails_fast() {
        let q = EventQueue::new();
        q.set_dispatch_thread(Some(thread::current().id()));
        assert_eq!(
            q.invoke_and_wait(|| 1),
            Err(QueueError::InvokeFromDispatchThread)
        );
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn invoke_and_wait_unblocks_when_closed() {
        let q = EventQueue::new();
        let caller = {
            let q = q.clone();
            thread::spawn(move || q.invoke_and_wait(|| 5))
        };
        while q.pending() == 0 {
            thread::yield_now();
        }
        q.close();
        assert_eq!(caller.join().unwrap(), Err(QueueError::Closed));
    }
}
