// EventLoopBridge - Coordinates between background workers and the UI thread
//
// The UI toolkit owns a single-threaded event loop; blocking filesystem work runs on
// tokio's blocking pool. The bridge provides:
// - FIFO dispatch of UI tasks from any thread onto whichever thread drives the loop
// - Timed (optionally repeating) dispatch backed by tokio timers
// - Worker spawning with in-flight accounting, so the loop can tell when it is idle

use super::{RepeatingUiTask, Scheduler, UiSurface, UiTask, WorkerJob};
use crate::metrics::Metrics;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

enum LoopMessage {
    Task(UiTask),
    Timer {
        delay: Duration,
        task: RepeatingUiTask,
    },
    /// A worker finished; wakes the loop so it can re-check idleness.
    Wake,
    Quit,
}

/// Drives UI tasks on the thread that owns it.
///
/// Create one per UI thread, hand out [`EventLoopBridgeHandle`]s to the core,
/// then pump with [`run_until_idle`](Self::run_until_idle) or [`run`](Self::run).
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let mut bridge = EventLoopBridge::new(runtime.handle().clone());
/// let scheduler = bridge.clone_handle();
///
/// scheduler.spawn_worker(Box::new(move || {
///     // Blocking work...
///     scheduler.post(Box::new(|ui| ui.show_info("Done", "Finished")));
/// }));
///
/// bridge.run_until_idle(&ui);
/// ```
pub struct EventLoopBridge {
    rx: mpsc::UnboundedReceiver<LoopMessage>,
    handle: EventLoopBridgeHandle,
}

impl EventLoopBridge {
    /// Create a new bridge backed by `tokio_handle` for workers and timers
    pub fn new(tokio_handle: tokio::runtime::Handle) -> Self {
        Self::with_metrics(tokio_handle, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = EventLoopBridgeHandle {
            tokio_handle,
            tx,
            pending: Arc::new(AtomicUsize::new(0)),
            metrics,
        };

        tracing::debug!("EventLoopBridge created");
        Self { rx, handle }
    }

    /// Clone a handle for use in the core and in workers
    pub fn clone_handle(&self) -> EventLoopBridgeHandle {
        self.handle.clone()
    }

    /// Process tasks until the queue is empty and no worker or timer is outstanding.
    ///
    /// Must not be called from inside a tokio runtime context.
    ///
    /// # Returns
    /// Number of UI tasks executed
    pub fn run_until_idle(&mut self, ui: &dyn UiSurface) -> usize {
        let mut executed = 0;

        loop {
            while let Ok(message) = self.rx.try_recv() {
                executed += self.dispatch(message, ui);
            }

            if self.handle.pending.load(Ordering::SeqCst) == 0 {
                // Workers post before they decrement, so one more drain sees
                // everything they sent.
                let mut drained_any = false;
                while let Ok(message) = self.rx.try_recv() {
                    drained_any = true;
                    executed += self.dispatch(message, ui);
                }
                if !drained_any && self.handle.pending.load(Ordering::SeqCst) == 0 {
                    return executed;
                }
                continue;
            }

            match self.rx.blocking_recv() {
                Some(message) => executed += self.dispatch(message, ui),
                None => return executed,
            }
        }
    }

    /// Process tasks until [`EventLoopBridgeHandle::quit`] is called.
    pub fn run(&mut self, ui: &dyn UiSurface) {
        tracing::debug!("Event loop started");
        while let Some(message) = self.rx.blocking_recv() {
            if matches!(message, LoopMessage::Quit) {
                break;
            }
            self.dispatch(message, ui);
        }
        tracing::debug!("Event loop stopped");
    }

    fn dispatch(&self, message: LoopMessage, ui: &dyn UiSurface) -> usize {
        match message {
            LoopMessage::Task(task) => {
                self.handle.metrics.record_ui_task();
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(ui))) {
                    tracing::error!("UI task panicked: {}", panic_message(&*payload));
                }
                1
            }
            LoopMessage::Timer { delay, mut task } => {
                self.handle.metrics.record_ui_task();
                match panic::catch_unwind(AssertUnwindSafe(|| task(ui))) {
                    Ok(true) => self.handle.post_delayed(delay, task),
                    Ok(false) => {}
                    Err(payload) => {
                        tracing::error!("Timed UI task panicked: {}", panic_message(&*payload));
                    }
                }
                self.handle.pending.fetch_sub(1, Ordering::SeqCst);
                1
            }
            LoopMessage::Wake | LoopMessage::Quit => 0,
        }
    }
}

/// Lightweight handle that can be cloned and passed to workers and callbacks
#[derive(Clone)]
pub struct EventLoopBridgeHandle {
    tokio_handle: tokio::runtime::Handle,
    tx: mpsc::UnboundedSender<LoopMessage>,
    /// Workers in flight plus timers armed
    pending: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
}

impl EventLoopBridgeHandle {
    /// Ask a loop started with [`EventLoopBridge::run`] to stop
    pub fn quit(&self) {
        let _ = self.tx.send(LoopMessage::Quit);
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Number of workers and timers not yet completed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl Scheduler for EventLoopBridgeHandle {
    fn post(&self, task: UiTask) {
        if self.tx.send(LoopMessage::Task(task)).is_err() {
            tracing::warn!("Failed to post UI task - event loop has stopped");
        }
    }

    fn post_delayed(&self, delay: Duration, task: RepeatingUiTask) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let tx = self.tx.clone();
        let pending = Arc::clone(&self.pending);

        self.tokio_handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(LoopMessage::Timer { delay, task }).is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!("Dropped timed UI task - event loop has stopped");
            }
        });
    }

    fn spawn_worker(&self, job: WorkerJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let done = WorkerDone {
            pending: Arc::clone(&self.pending),
            tx: self.tx.clone(),
        };

        self.tokio_handle.spawn_blocking(move || {
            // Dropped on every exit path, including a panicking job
            let _done = done;
            job();
        });
    }
}

struct WorkerDone {
    pending: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<LoopMessage>,
}

impl Drop for WorkerDone {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        let _ = self.tx.send(LoopMessage::Wake);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    #[derive(Default)]
    struct NullUi {
        infos: Mutex<Vec<(String, ThreadId)>>,
    }

    impl UiSurface for NullUi {
        fn show_spinner(&self, _title: &str) {}
        fn hide_spinner(&self) {}
        fn show_info(&self, title: &str, _body: &str) {
            self.infos
                .lock()
                .unwrap()
                .push((title.to_string(), thread::current().id()));
        }
        fn show_error(&self, _title: &str, _body: &str) {}
        fn reload_launcher_list(&self) {}
    }

    #[test]
    fn test_posts_run_in_fifo_order_on_loop_thread() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut bridge = EventLoopBridge::new(rt.handle().clone());
        let handle = bridge.clone_handle();
        let ui = NullUi::default();

        for i in 0..5 {
            handle.post(Box::new(move |ui| ui.show_info(&i.to_string(), "")));
        }

        assert_eq!(bridge.run_until_idle(&ui), 5);

        let infos = ui.infos.lock().unwrap();
        let titles: Vec<_> = infos.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(titles, vec!["0", "1", "2", "3", "4"]);
        assert!(infos.iter().all(|(_, id)| *id == thread::current().id()));
    }

    #[test]
    fn test_worker_posts_are_waited_for() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut bridge = EventLoopBridge::new(rt.handle().clone());
        let handle = bridge.clone_handle();
        let ui = NullUi::default();

        let worker_handle = handle.clone();
        handle.spawn_worker(Box::new(move || {
            thread::sleep(Duration::from_millis(20));
            worker_handle.post(Box::new(|ui| ui.show_info("from worker", "")));
        }));

        bridge.run_until_idle(&ui);

        assert_eq!(ui.infos.lock().unwrap().len(), 1);
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_repeating_timer_stops_on_false() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut bridge = EventLoopBridge::new(rt.handle().clone());
        let handle = bridge.clone_handle();
        let ui = NullUi::default();

        let mut remaining = 3;
        handle.post_delayed(
            Duration::from_millis(5),
            Box::new(move |ui| {
                ui.show_info("tick", "");
                remaining -= 1;
                remaining > 0
            }),
        );

        bridge.run_until_idle(&ui);

        assert_eq!(ui.infos.lock().unwrap().len(), 3);
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_stop_loop() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut bridge = EventLoopBridge::new(rt.handle().clone());
        let handle = bridge.clone_handle();
        let ui = NullUi::default();

        handle.post(Box::new(|_| panic!("boom")));
        handle.post(Box::new(|ui| ui.show_info("after", "")));
        handle.spawn_worker(Box::new(|| panic!("worker boom")));

        bridge.run_until_idle(&ui);

        assert_eq!(ui.infos.lock().unwrap().len(), 1);
        assert_eq!(handle.pending(), 0);
    }
}
