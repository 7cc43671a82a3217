use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;

use crate::scanner::{ScanError, Scanner};
use crate::scheduler::{Scheduler, SchedulerEvent, Task, TaskStatus};

/// Owns the process lifecycle: the initial scan, the signal-to-event
/// bridge, and the blocking event-dispatch loop. A signal handler never
/// calls application logic directly — it only ever posts an [`Event`] to
/// the scheduler, exactly like the original daemon's self-pipe trick.
pub struct MainLoop {
    scheduler: Arc<Scheduler>,
    scanner: Arc<Scanner>,
    signal_thread: Option<JoinHandle<()>>,
    terminate: Arc<AtomicBool>,
    cancel_scan: Arc<AtomicBool>,
}

impl MainLoop {
    pub fn new(scheduler: Arc<Scheduler>, scanner: Arc<Scanner>) -> std::io::Result<Self> {
        let cancel_scan = Arc::new(AtomicBool::new(false));
        let terminate = Arc::new(AtomicBool::new(false));

        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGQUIT, SIGUSR1])?;
        let signal_scheduler = Arc::clone(&scheduler);
        let signal_scanner = Arc::clone(&scanner);
        let signal_cancel = Arc::clone(&cancel_scan);
        let signal_terminate = Arc::clone(&terminate);
        let signal_thread = std::thread::Builder::new()
            .name("sonance-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    log::debug!("Got signal {signal}");
                    match signal {
                        SIGINT | SIGTERM | SIGHUP | SIGQUIT => {
                            signal_scheduler.add_event(Box::new(TerminateEvent {
                                terminate: Arc::clone(&signal_terminate),
                                cancel_scan: Arc::clone(&signal_cancel),
                            }));
                            return;
                        }
                        SIGUSR1 => {
                            signal_scheduler.add_event(Box::new(RescanRequestEvent {
                                scheduler: Arc::clone(&signal_scheduler),
                                scanner: Arc::clone(&signal_scanner),
                                cancel: Arc::clone(&signal_cancel),
                            }));
                        }
                        _ => unreachable!("signal-hook only delivers signals we registered for"),
                    }
                }
            })
            .expect("failed to spawn signal handling thread");

        Ok(Self {
            scheduler,
            scanner,
            signal_thread: Some(signal_thread),
            terminate,
            cancel_scan,
        })
    }

    /// Submits the initial scan as a scheduler task, then blocks dispatching
    /// events (rescan requests, shutdown) until a terminate event arrives.
    /// Does not close the scheduler itself; the caller does that afterward
    /// so in-flight tasks get a chance to wind down under one shutdown path.
    pub fn run(mut self) {
        self.submit_scan_task();

        loop {
            if !self.scheduler.run_pending_events() {
                break;
            }
            if self.terminate.load(Ordering::Acquire) {
                break;
            }
        }

        log::info!("Main loop: shutting down");
        if let Some(thread) = self.signal_thread.take() {
            let _ = thread.join();
        }
    }

    fn submit_scan_task(&self) {
        let cancel = Arc::clone(&self.cancel_scan);
        let scanner = Arc::clone(&self.scanner);
        self.scheduler.add_task(Box::new(ScanTask { scanner, cancel }));
    }
}

struct TerminateEvent {
    terminate: Arc<AtomicBool>,
    /// Raised alongside `terminate` so a scan already running on a worker
    /// thread observes cancellation at its next per-entry check, rather
    /// than running to completion while the rest of the process winds
    /// down around it — `Scheduler::close`'s queued-task cancellation
    /// alone only reaches tasks that never started.
    cancel_scan: Arc<AtomicBool>,
}

impl SchedulerEvent for TerminateEvent {
    fn name(&self) -> &str {
        "terminate"
    }

    fn run(&mut self) {
        log::debug!("Got terminate action, shutting down main loop");
        self.cancel_scan.store(true, Ordering::Release);
        self.terminate.store(true, Ordering::Release);
    }
}

struct RescanRequestEvent {
    scheduler: Arc<Scheduler>,
    scanner: Arc<Scanner>,
    cancel: Arc<AtomicBool>,
}

impl SchedulerEvent for RescanRequestEvent {
    fn name(&self) -> &str {
        "rescan-request"
    }

    fn run(&mut self) {
        log::debug!("Got music catalog refresh request");
        self.scheduler.add_task(Box::new(ScanTask {
            scanner: Arc::clone(&self.scanner),
            cancel: Arc::clone(&self.cancel),
        }));
    }
}

struct ScanTask {
    scanner: Arc<Scanner>,
    cancel: Arc<AtomicBool>,
}

impl Task for ScanTask {
    fn name(&self) -> &str {
        "scan"
    }

    fn run(&mut self) -> TaskStatus {
        match self.scanner.scan(&self.cancel) {
            Ok(outcome) => {
                log::info!("Scan finished: {outcome:?}");
                TaskStatus::Finished
            }
            Err(ScanError::AlreadyInProgress) => {
                // Finished, not Canceled: this task declined to run because
                // another scan owns `scan_in_progress`, not because *this*
                // task's own work was cut short. `on_cancel` would raise the
                // shared `cancel` flag that the already-running scan polls,
                // wrongly aborting it.
                log::warn!("Rescan requested while a scan is already running; ignoring");
                TaskStatus::Finished
            }
            Err(err) => {
                log::error!("Scan failed: {err}");
                TaskStatus::Failed
            }
        }
    }

    fn on_cancel(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}
