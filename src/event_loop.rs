use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::event::EventRecord;
use crate::event_queue::{EventQueue, QueuedEvent, panic_message};
use crate::log_buffer::log_line;

/// Receiver of every non-invocation event taken off the queue.
pub trait EventSink: Send {
    fn dispatch_event(&mut self, event: &mut EventRecord);
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn dispatch_event(&mut self, event: &mut EventRecord) {
        (**self).dispatch_event(event)
    }
}

/// Dispatch a single queued event on the current thread.
///
/// Invocation events run their task; anything else goes to the active
/// level's [`DispatchHook`](crate::event_queue::DispatchHook) and, unless the
/// hook claims it, to `sink`. A panic escaping a task or a listener is
/// logged and swallowed so the caller's loop keeps running.
pub fn dispatch_one<S: EventSink + ?Sized>(queue: &EventQueue, sink: &mut S, event: QueuedEvent) {
    let (mut record, task) = event.into_parts();
    queue.set_current_event(Some(record.clone()));
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match task {
        Some(task) => task(),
        None => {
            if let Some(hook) = queue.active_hook()
                && hook.dispatch(&mut record)
            {
                return;
            }
            sink.dispatch_event(&mut record);
        }
    }));
    queue.set_current_event(None);
    if let Err(payload) = outcome {
        let msg = panic_message(payload.as_ref());
        error!(event = %record, "panic during event dispatch: {msg}");
        log_line(format!("dispatch of {record} panicked: {msg}"));
    }
}

/// Drain every pending event on the calling thread, which acts as the
/// dispatch thread for the duration. Returns the number of events handled.
///
/// Meant for tests and single-threaded embedders; do not call it while a
/// [`DispatchThread`] is running on the same queue.
pub fn pump_pending<S: EventSink + ?Sized>(queue: &EventQueue, sink: &mut S) -> usize {
    let previous = queue.dispatch_thread();
    queue.set_dispatch_thread(Some(thread::current().id()));
    let mut handled = 0;
    while let Some(event) = queue.try_next_event() {
        dispatch_one(queue, sink, event);
        handled += 1;
    }
    queue.set_dispatch_thread(previous);
    handled
}

/// The dedicated event dispatch thread.
///
/// This is the "one loop" of the engine: the only place that blocks on
/// [`EventQueue::next_event`] in steady state. It runs until the queue is
/// closed, which [`shutdown`](Self::shutdown) (or dropping the handle) does.
pub struct DispatchThread {
    queue: EventQueue,
    handle: Option<JoinHandle<()>>,
}

impl DispatchThread {
    pub fn spawn<S>(queue: EventQueue, mut sink: S, name: &str) -> io::Result<Self>
    where
        S: EventSink + 'static,
    {
        let worker_queue = queue.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let queue = worker_queue;
                queue.set_dispatch_thread(Some(thread::current().id()));
                debug!("event dispatch thread started");
                while let Ok(event) = queue.next_event() {
                    dispatch_one(&queue, &mut sink, event);
                }
                queue.set_dispatch_thread(None);
                debug!("event dispatch thread stopped");
            })?;
        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Close the queue and wait for the thread to exit. Events still pending
    /// are discarded.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.queue.close();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("event dispatch thread exited with a panic");
        }
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        self.stop();
    }
}
