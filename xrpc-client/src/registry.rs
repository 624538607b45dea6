//! Asynchronous calls.
//!
//! Every asynchronous call runs on its own thread and is tracked in the
//! registry under a monotonically increasing id until it completes. Results
//! are delivered to a [`CallListener`]; a canceled call delivers nothing.

use crate::cancel::{CancelToken, FinishGuard};
use crate::error::ClientError;
use crate::executor::Executor;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use xrpc_protocol::{Fault, MethodCall, MethodResponse, Value};

/// Receives the outcome of an asynchronous call.
///
/// Callbacks run on the call's worker thread. Exactly one of them fires for
/// each call that was not canceled.
pub trait CallListener: Send + Sync {
    fn on_response(&self, id: i64, value: Value);
    fn on_fault(&self, id: i64, fault: Fault);
    fn on_error(&self, id: i64, error: ClientError);
}

type Calls = Arc<DashMap<i64, Arc<CancelToken>>>;

/// Tracks in-flight asynchronous calls.
pub struct CallRegistry {
    executor: Arc<Executor>,
    calls: Calls,
    next_id: AtomicI64,
}

impl CallRegistry {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            calls: Arc::new(DashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Starts `call` on a new worker thread and returns its id.
    pub fn dispatch(&self, listener: Arc<dyn CallListener>, call: MethodCall) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = Arc::new(CancelToken::new());
        self.calls.insert(id, token.clone());

        let executor = self.executor.clone();
        let calls = self.calls.clone();
        let worker_listener = listener.clone();
        let spawned = thread::Builder::new()
            .name(format!("xrpc-call-{}", id))
            .spawn(move || run_call(id, &executor, &calls, &token, &*worker_listener, &call));

        if let Err(e) = spawned {
            tracing::warn!("Failed to start worker for call {}: {}", id, e);
            if let Some((_, token)) = self.calls.remove(&id) {
                token.finish();
            }
            listener.on_error(id, ClientError::Transport(e));
        } else {
            tracing::debug!("Dispatched call {}", id);
        }
        id
    }

    /// Cancels a call and waits for its worker to terminate.
    ///
    /// Returns `false` if no call with this id is in flight. Canceling from
    /// a callback of the same call does not wait.
    pub fn cancel(&self, id: i64) -> bool {
        let Some(token) = self.calls.get(&id).map(|entry| entry.value().clone()) else {
            return false;
        };
        if token.cancel() {
            tracing::debug!("Canceled call {}", id);
        }
        token.wait();
        true
    }

    pub fn contains(&self, id: i64) -> bool {
        self.calls.contains_key(&id)
    }

    /// Number of in-flight calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Unregisters the call, then marks its token finished.
struct Unregister<'a> {
    id: i64,
    calls: &'a Calls,
    _finish: FinishGuard<'a>,
}

impl Drop for Unregister<'_> {
    fn drop(&mut self) {
        self.calls.remove(&self.id);
    }
}

fn run_call(
    id: i64,
    executor: &Executor,
    calls: &Calls,
    token: &CancelToken,
    listener: &dyn CallListener,
    call: &MethodCall,
) {
    token.bind_worker();
    let _unregister = Unregister {
        id,
        calls,
        _finish: FinishGuard(token),
    };

    let result = executor.execute(call, Some(token));
    if token.is_canceled() {
        return;
    }
    match result {
        Ok(MethodResponse::Success(value)) => listener.on_response(id, value),
        Ok(MethodResponse::Fault(fault)) => listener.on_fault(id, fault),
        Err(ClientError::Canceled) => {}
        Err(e) => listener.on_error(id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::executor::tests::{Gate, MockTransport, FAULT_BODY};
    use parking_lot::Mutex;
    use std::io;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Debug)]
    enum Event {
        Response(i64, Value),
        Fault(i64, Fault),
        Error(i64, String),
    }

    struct Recorder {
        events: Mutex<Vec<Event>>,
        done: Mutex<mpsc::Sender<i64>>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, mpsc::Receiver<i64>) {
            let (tx, rx) = mpsc::channel();
            let recorder = Arc::new(Self {
                events: Mutex::new(Vec::new()),
                done: Mutex::new(tx),
            });
            (recorder, rx)
        }

        fn record(&self, id: i64, event: Event) {
            self.events.lock().push(event);
            let _ = self.done.lock().send(id);
        }
    }

    impl CallListener for Recorder {
        fn on_response(&self, id: i64, value: Value) {
            self.record(id, Event::Response(id, value));
        }

        fn on_fault(&self, id: i64, fault: Fault) {
            self.record(id, Event::Fault(id, fault));
        }

        fn on_error(&self, id: i64, error: ClientError) {
            self.record(id, Event::Error(id, error.to_string()));
        }
    }

    fn registry(transport: MockTransport) -> CallRegistry {
        let config = ClientConfig::new("http://localhost/RPC2").unwrap();
        CallRegistry::new(Arc::new(Executor::new(Arc::new(config), Arc::new(transport))))
    }

    fn call() -> MethodCall {
        MethodCall::new("sample.add", vec![Value::Int32(1)])
    }

    fn wait_until_empty(registry: &CallRegistry) {
        for _ in 0..500 {
            if registry.is_empty() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("calls still in flight");
    }

    #[test]
    fn test_dispatch_delivers_response() {
        let registry = registry(MockTransport::success());
        let (recorder, rx) = Recorder::new();

        let id = registry.dispatch(recorder.clone(), call());
        assert_eq!(id, 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        wait_until_empty(&registry);

        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Response(1, Value::Int32(42))));
    }

    #[test]
    fn test_dispatch_delivers_fault_and_error() {
        let registry = registry(MockTransport::new(200, FAULT_BODY));
        let (recorder, rx) = Recorder::new();
        registry.dispatch(recorder.clone(), call());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            recorder.events.lock()[0],
            Event::Fault(1, Fault { code: 4, .. })
        ));

        let registry = super::tests::registry(MockTransport::failing(io::ErrorKind::ConnectionRefused));
        let (recorder, rx) = Recorder::new();
        registry.dispatch(recorder.clone(), call());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(recorder.events.lock()[0], Event::Error(1, _)));
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = registry(MockTransport::success());
        let (recorder, rx) = Recorder::new();
        let ids: Vec<i64> = (0..5)
            .map(|_| registry.dispatch(recorder.clone(), call()))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let mut delivered: Vec<i64> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        delivered.sort();
        assert_eq!(delivered, ids);
        wait_until_empty(&registry);
    }

    #[test]
    fn test_cancel_before_response_suppresses_callbacks() {
        let gate = Arc::new(Gate::default());
        let registry = registry(MockTransport::success().gated(gate.clone()));
        let (recorder, rx) = Recorder::new();

        let id = registry.dispatch(recorder.clone(), call());
        assert!(registry.contains(id));
        while !gate.entered.load(Ordering::SeqCst) {
            thread::yield_now();
        }

        assert!(registry.cancel(id));
        // The worker has terminated by the time cancel returns.
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent_and_ignores_stale_ids() {
        let gate = Arc::new(Gate::default());
        let registry = registry(MockTransport::success().gated(gate.clone()));
        let (recorder, _rx) = Recorder::new();

        assert!(!registry.cancel(42));

        let id = registry.dispatch(recorder.clone(), call());
        assert!(registry.cancel(id));
        assert!(!registry.cancel(id));
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let registry = registry(MockTransport::success());
        let (recorder, rx) = Recorder::new();
        let id = registry.dispatch(recorder.clone(), call());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        wait_until_empty(&registry);
        assert!(!registry.cancel(id));
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_concurrent_calls_cancel_one() {
        let gate = Arc::new(Gate::default());
        let registry = registry(MockTransport::success().gated(gate.clone()));
        let (recorder, rx) = Recorder::new();

        let first = registry.dispatch(recorder.clone(), call());
        let second = registry.dispatch(recorder.clone(), call());
        assert_eq!(registry.len(), 2);

        registry.cancel(first);
        assert!(!registry.contains(first));
        // Both calls share the gate. The second call either fails on the
        // abort or passes once released; either way it reports.
        gate.release();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), second);
        wait_until_empty(&registry);

        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::Error(id, _) | Event::Response(id, _) if id == second
        ));
    }

    struct SelfCanceling {
        registry: Mutex<Option<Arc<CallRegistry>>>,
        done: Mutex<mpsc::Sender<bool>>,
    }

    impl CallListener for SelfCanceling {
        fn on_response(&self, id: i64, _value: Value) {
            let registry = self.registry.lock().clone();
            let found = registry.map(|r| r.cancel(id)).unwrap_or(false);
            let _ = self.done.lock().send(found);
        }

        fn on_fault(&self, _id: i64, _fault: Fault) {}

        fn on_error(&self, _id: i64, _error: ClientError) {}
    }

    #[test]
    fn test_cancel_from_listener_does_not_deadlock() {
        let registry = Arc::new(registry(MockTransport::success()));
        let (tx, rx) = mpsc::channel();
        let listener = Arc::new(SelfCanceling {
            registry: Mutex::new(Some(registry.clone())),
            done: Mutex::new(tx),
        });

        registry.dispatch(listener.clone(), call());
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        wait_until_empty(&registry);
        listener.registry.lock().take();
    }
}
