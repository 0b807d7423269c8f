//! Action dispatch: immediate execution for latency-critical pointer work,
//! a bounded FIFO queue with one consumer thread for everything that may
//! block, and panic containment so a misbehaving controller never takes the
//! pipeline down.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::action::{ActionDescriptor, ActionResult};
use crate::config::{DispatchConfig, OverflowPolicy};
use crate::controllers::{ControllerError, ControllerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Run on the caller thread and return the result.
    Immediate,
    /// Enqueue for the consumer thread; returns a queue acknowledgment.
    Queued,
}

/// What `execute` tells the caller about a queued action.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Done(ActionResult),
    Enqueued { position: usize },
    Rejected(ActionResult),
}

#[derive(Debug, Default)]
pub struct DispatchStats {
    pub executed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub rejected: AtomicU64,
    last_action: Mutex<Option<String>>,
}

impl DispatchStats {
    fn record(&self, result: &ActionResult, description: &str) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if result.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut last) = self.last_action.lock() {
            *last = Some(description.to_string());
        }
    }

    pub fn last_action(&self) -> Option<String> {
        self.last_action.lock().ok().and_then(|l| l.clone())
    }

    pub fn summary(&self) -> String {
        format!(
            "executed {} (ok {}, failed {}, cancelled {}, rejected {})",
            self.executed.load(Ordering::Relaxed),
            self.succeeded.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.cancelled.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }
}

pub struct ActionDispatcher {
    controllers: Arc<ControllerRegistry>,
    queue_tx: flume::Sender<ActionDescriptor>,
    queue_rx: flume::Receiver<ActionDescriptor>,
    overflow: OverflowPolicy,
    pub stats: Arc<DispatchStats>,
    running: Arc<AtomicBool>,
    stopped: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
    subscribers: Arc<Mutex<Vec<flume::Sender<ActionResult>>>>,
}

impl ActionDispatcher {
    pub fn new(cfg: &DispatchConfig, controllers: ControllerRegistry) -> Self {
        let (queue_tx, queue_rx) = flume::bounded(cfg.queue_capacity);
        Self {
            controllers: Arc::new(controllers),
            queue_tx,
            queue_rx,
            overflow: cfg.overflow,
            stats: Arc::new(DispatchStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
            consumer: Mutex::new(None),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn controllers(&self) -> Arc<ControllerRegistry> {
        Arc::clone(&self.controllers)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_rx.len()
    }

    /// Subscribe to every result the dispatcher produces. A dropped
    /// receiver is pruned on the next publish.
    pub fn subscribe(&self) -> flume::Receiver<ActionResult> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let rx = self.queue_rx.clone();
        let controllers = Arc::clone(&self.controllers);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);
        let subscribers = Arc::clone(&self.subscribers);
        let handle = std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(descriptor) => {
                        let result = run_action(&controllers, &descriptor);
                        stats.record(&result, &descriptor.description);
                        publish(&subscribers, result);
                    }
                    Err(flume::RecvTimeoutError::Timeout) => continue,
                    Err(flume::RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        if let Ok(mut consumer) = self.consumer.lock() {
            *consumer = Some(handle);
        }
    }

    pub fn execute(&self, descriptor: ActionDescriptor, mode: DispatchMode) -> DispatchOutcome {
        match mode {
            DispatchMode::Immediate => {
                let result = run_action(&self.controllers, &descriptor);
                self.stats.record(&result, &descriptor.description);
                publish(&self.subscribers, result.clone());
                DispatchOutcome::Done(result)
            }
            DispatchMode::Queued => {
                if self.stopped.load(Ordering::SeqCst) {
                    return self.reject(&descriptor, "dispatcher stopped");
                }
                match self.queue_tx.try_send(descriptor) {
                    Ok(()) => DispatchOutcome::Enqueued {
                        position: self.queue_rx.len(),
                    },
                    Err(flume::TrySendError::Full(descriptor)) => match self.overflow {
                        OverflowPolicy::DropOldest => {
                            if let Ok(dropped) = self.queue_rx.try_recv() {
                                let result =
                                    ActionResult::fail(&dropped, "dropped by newer action".into());
                                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                                publish(&self.subscribers, result);
                            }
                            match self.queue_tx.try_send(descriptor) {
                                Ok(()) => DispatchOutcome::Enqueued {
                                    position: self.queue_rx.len(),
                                },
                                Err(flume::TrySendError::Full(d)) => self.reject(&d, "queue full"),
                                Err(flume::TrySendError::Disconnected(d)) => {
                                    self.reject(&d, "dispatcher stopped")
                                }
                            }
                        }
                        OverflowPolicy::Reject => self.reject(&descriptor, "queue full"),
                    },
                    Err(flume::TrySendError::Disconnected(descriptor)) => {
                        self.reject(&descriptor, "dispatcher stopped")
                    }
                }
            }
        }
    }

    fn reject(&self, descriptor: &ActionDescriptor, reason: &str) -> DispatchOutcome {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        let result = ActionResult::fail(descriptor, reason.to_string());
        publish(&self.subscribers, result.clone());
        DispatchOutcome::Rejected(result)
    }

    /// Stop the consumer, drain whatever is still queued as cancelled, and
    /// physically release anything a controller still holds. Later queued
    /// dispatches are rejected as stopped.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        let handle = self.consumer.lock().ok().and_then(|mut c| c.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        while let Ok(descriptor) = self.queue_rx.try_recv() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            publish(&self.subscribers, ActionResult::cancelled(&descriptor));
        }
        self.controllers.release_all();
    }
}

fn run_action(controllers: &ControllerRegistry, descriptor: &ActionDescriptor) -> ActionResult {
    let kind = descriptor.kind();
    // Per-controller lock: only this device is held, so a slow queued
    // action cannot stall an immediate dispatch on another one.
    let mut controller = match controllers.lock(kind) {
        Some(controller) => controller,
        None => {
            return ActionResult::fail(descriptor, ControllerError::Unavailable(kind).to_string());
        }
    };
    // A panicking controller must not unwind into the pipeline.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        controller.execute(&descriptor.command, &descriptor.params)
    }));
    match outcome {
        Ok(Ok(output)) => ActionResult::ok(descriptor, output),
        Ok(Err(e)) => ActionResult::fail(descriptor, e.to_string()),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "controller panicked".to_string());
            eprintln!("[DISPATCH] {} controller panicked: {}", kind, msg);
            ActionResult::fail(descriptor, format!("panic: {}", msg))
        }
    }
}

fn publish(subscribers: &Arc<Mutex<Vec<flume::Sender<ActionResult>>>>, result: ActionResult) {
    if let Ok(mut subs) = subscribers.lock() {
        subs.retain(|tx| tx.send(result.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionCommand, ActionParams, ControllerKind};
    use crate::controllers::Controller;
    use std::time::Instant;

    struct MockController {
        log: Arc<Mutex<Vec<String>>>,
        delay: Option<Duration>,
        fail: bool,
        panic: bool,
        releases: Arc<AtomicU64>,
    }

    impl MockController {
        fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                log,
                delay: None,
                fail: false,
                panic: false,
                releases: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl Controller for MockController {
        fn execute(
            &mut self,
            command: &ActionCommand,
            _params: &ActionParams,
        ) -> Result<String, ControllerError> {
            if self.panic {
                panic!("mock blew up");
            }
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if let ActionCommand::ShellRun(line) = command {
                self.log.lock().unwrap().push(line.clone());
            }
            if self.fail {
                return Err(ControllerError::Execution("mock failure".into()));
            }
            Ok("ok".into())
        }

        fn release_all(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn shell_descriptor(id: u64, line: &str) -> ActionDescriptor {
        ActionDescriptor {
            id,
            command: ActionCommand::ShellRun(line.to_string()),
            params: ActionParams::default(),
            description: line.to_string(),
            confidence: 1.0,
            profile: "test".into(),
        }
    }

    fn dispatcher_with_mock(
        mock: MockController,
        cfg: &DispatchConfig,
    ) -> (ActionDispatcher, Arc<Mutex<Vec<String>>>) {
        let log = Arc::clone(&mock.log);
        let mut registry = ControllerRegistry::new();
        registry.register(ControllerKind::Shell, Box::new(mock));
        (ActionDispatcher::new(cfg, registry), log)
    }

    #[test]
    fn test_queued_actions_run_fifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (dispatcher, log) =
            dispatcher_with_mock(MockController::new(log), &DispatchConfig::default());
        dispatcher.start();
        for name in ["A", "B", "C"] {
            dispatcher.execute(shell_descriptor(1, name), DispatchMode::Queued);
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while log.lock().unwrap().len() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        dispatcher.stop();
        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_missing_controller_is_result_not_crash() {
        let dispatcher =
            ActionDispatcher::new(&DispatchConfig::default(), ControllerRegistry::new());
        dispatcher.start();
        let outcome = dispatcher.execute(shell_descriptor(1, "A"), DispatchMode::Immediate);
        match outcome {
            DispatchOutcome::Done(result) => {
                assert!(!result.success);
                assert!(result.error.unwrap().contains("unavailable"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        dispatcher.stop();
    }

    #[test]
    fn test_panic_contained_as_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut mock = MockController::new(log);
        mock.panic = true;
        let (dispatcher, _) = dispatcher_with_mock(mock, &DispatchConfig::default());
        dispatcher.start();
        let outcome = dispatcher.execute(shell_descriptor(1, "A"), DispatchMode::Immediate);
        match outcome {
            DispatchOutcome::Done(result) => {
                assert!(!result.success);
                assert!(result.error.unwrap().contains("panic"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // The dispatcher still works afterwards.
        dispatcher.stop();
        assert_eq!(dispatcher.stats.failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stop_cancels_queued_and_releases() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mock = MockController::new(log);
        let releases = Arc::clone(&mock.releases);
        let (dispatcher, _) = dispatcher_with_mock(mock, &DispatchConfig::default());
        // Never started: everything queued is cancelled at stop.
        let rx = dispatcher.subscribe();
        dispatcher.execute(shell_descriptor(1, "A"), DispatchMode::Queued);
        dispatcher.execute(shell_descriptor(2, "B"), DispatchMode::Queued);
        dispatcher.stop();
        assert_eq!(dispatcher.stats.cancelled.load(Ordering::Relaxed), 2);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        let results: Vec<ActionResult> = rx.drain().collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success));
    }

    /// A slow queued action holds only its own controller's lock; an
    /// immediate dispatch on another controller runs right away.
    #[test]
    fn test_immediate_not_blocked_by_slow_queued() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut slow = MockController::new(Arc::clone(&log));
        slow.delay = Some(Duration::from_millis(500));
        let fast = MockController::new(Arc::clone(&log));
        let mut registry = ControllerRegistry::new();
        registry.register(ControllerKind::Shell, Box::new(slow));
        registry.register(ControllerKind::Keyboard, Box::new(fast));
        let dispatcher = ActionDispatcher::new(&DispatchConfig::default(), registry);
        dispatcher.start();

        dispatcher.execute(shell_descriptor(1, "slow"), DispatchMode::Queued);
        // Give the consumer time to pick the slow action up.
        std::thread::sleep(Duration::from_millis(100));

        let key_tap = ActionDescriptor {
            id: 2,
            command: ActionCommand::KeyTap("a".into()),
            params: ActionParams::default(),
            description: "tap".into(),
            confidence: 1.0,
            profile: "test".into(),
        };
        let started = Instant::now();
        let outcome = dispatcher.execute(key_tap, DispatchMode::Immediate);
        let elapsed = started.elapsed();
        assert!(
            matches!(outcome, DispatchOutcome::Done(ref r) if r.success),
            "unexpected outcome: {:?}",
            outcome
        );
        assert!(
            elapsed < Duration::from_millis(200),
            "immediate dispatch waited {:?} behind a queued action",
            elapsed
        );
        dispatcher.stop();
    }

    #[test]
    fn test_queued_after_stop_reports_stopped() {
        let dispatcher =
            ActionDispatcher::new(&DispatchConfig::default(), ControllerRegistry::new());
        dispatcher.start();
        dispatcher.stop();
        match dispatcher.execute(shell_descriptor(1, "late"), DispatchMode::Queued) {
            DispatchOutcome::Rejected(result) => {
                assert_eq!(result.error.as_deref(), Some("dispatcher stopped"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_reject_when_full() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = DispatchConfig {
            queue_capacity: 1,
            overflow: OverflowPolicy::Reject,
        };
        let (dispatcher, _) = dispatcher_with_mock(MockController::new(log), &cfg);
        // Consumer not started, so the first fills the queue.
        assert!(matches!(
            dispatcher.execute(shell_descriptor(1, "A"), DispatchMode::Queued),
            DispatchOutcome::Enqueued { .. }
        ));
        assert!(matches!(
            dispatcher.execute(shell_descriptor(2, "B"), DispatchMode::Queued),
            DispatchOutcome::Rejected(_)
        ));
        assert_eq!(dispatcher.stats.rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cfg = DispatchConfig {
            queue_capacity: 1,
            overflow: OverflowPolicy::DropOldest,
        };
        let (dispatcher, log) = dispatcher_with_mock(MockController::new(log), &cfg);
        dispatcher.execute(shell_descriptor(1, "A"), DispatchMode::Queued);
        assert!(matches!(
            dispatcher.execute(shell_descriptor(2, "B"), DispatchMode::Queued),
            DispatchOutcome::Enqueued { .. }
        ));
        dispatcher.start();
        let deadline = Instant::now() + Duration::from_secs(2);
        while log.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        dispatcher.stop();
        // A was displaced; only B ran.
        assert_eq!(*log.lock().unwrap(), vec!["B"]);
    }
}
