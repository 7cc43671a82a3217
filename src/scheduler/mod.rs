use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Outcome of a single [`Task::run`] invocation. Mirrors the daemon's
/// original four-way task status: a task either completes, asks to be
/// requeued behind whatever else is waiting, was canceled mid-run, or
/// failed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Finished,
    Yield,
    Canceled,
    Failed,
}

/// Unit of work the scheduler's worker pool runs. `run` may be invoked
/// more than once for the same task if it yields; the other callbacks
/// fire exactly once, reflecting how the task's lifecycle ended.
pub trait Task: Send {
    fn name(&self) -> &str;
    fn run(&mut self) -> TaskStatus;
    fn on_finished(&mut self) {}
    fn on_failed(&mut self) {}
    /// Invoked once a task's lifecycle ends in cancellation: either it was
    /// still queued (never started) at shutdown, or its own `run` returned
    /// [`TaskStatus::Canceled`].
    fn on_cancel(&mut self) {}
}

/// Unit of work posted to the scheduler's event queue and drained by the
/// main loop thread rather than a worker. Events run once, in FIFO order,
/// and never yield.
pub trait SchedulerEvent: Send {
    fn name(&self) -> &str;
    fn run(&mut self);
}

struct TaskQueueState {
    queue: VecDeque<Box<dyn Task>>,
    terminate: bool,
}

struct EventQueueState {
    queue: VecDeque<Box<dyn SchedulerEvent>>,
    terminate: bool,
}

/// Worker pool plus an event queue for the main loop, both backed by a
/// shared mutex and condvar per queue rather than a channel: shutdown must
/// atomically flip `terminate` and cancel every still-queued task under a
/// single lock, which a channel's own internal locking can't guarantee.
pub struct Scheduler {
    task_state: Arc<(Mutex<TaskQueueState>, Condvar)>,
    event_state: Arc<(Mutex<EventQueueState>, Condvar)>,
    /// Behind a mutex, not owned directly, so `close` can run through a
    /// shared `&self` (the scheduler is normally held in an `Arc` shared
    /// with the main loop and signal thread) rather than requiring the
    /// caller to be the sole owner.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawns the worker pool. `configured_threads` is the `scheduler-threads`
    /// config value; `0` means auto-detect, leaving one core free for the
    /// main loop when more than one CPU is available.
    pub fn new(configured_threads: usize) -> Self {
        let thread_count = resolve_thread_count(configured_threads);
        log::info!("Scheduler: starting {thread_count} worker thread(s)");

        let task_state = Arc::new((
            Mutex::new(TaskQueueState {
                queue: VecDeque::new(),
                terminate: false,
            }),
            Condvar::new(),
        ));
        let event_state = Arc::new((
            Mutex::new(EventQueueState {
                queue: VecDeque::new(),
                terminate: false,
            }),
            Condvar::new(),
        ));

        let workers = (0..thread_count)
            .map(|id| {
                let state = Arc::clone(&task_state);
                std::thread::Builder::new()
                    .name(format!("sonance-worker-{id}"))
                    .spawn(move || worker_loop(id, state))
                    .expect("failed to spawn scheduler worker thread")
            })
            .collect();

        Self {
            task_state,
            event_state,
            workers: Mutex::new(workers),
        }
    }

    pub fn add_task(&self, task: Box<dyn Task>) {
        log::debug!("Scheduler: adding task {}", task.name());
        let (mutex, cv) = &*self.task_state;
        let mut state = mutex.lock().unwrap();
        state.queue.push_back(task);
        cv.notify_one();
    }

    pub fn add_event(&self, event: Box<dyn SchedulerEvent>) {
        log::debug!("Scheduler: adding event {}", event.name());
        let (mutex, cv) = &*self.event_state;
        let mut state = mutex.lock().unwrap();
        state.queue.push_back(event);
        cv.notify_one();
    }

    /// Blocks the caller (the main loop thread) until an event is posted
    /// or the scheduler is shutting down, then drains and runs everything
    /// currently queued. Returns `false` once shutdown has been observed
    /// and the queue is empty, telling the caller to stop polling.
    pub fn run_pending_events(&self) -> bool {
        let (mutex, cv) = &*self.event_state;
        let mut state = mutex.lock().unwrap();

        while state.queue.is_empty() && !state.terminate {
            state = cv.wait(state).unwrap();
        }

        if state.queue.is_empty() && state.terminate {
            return false;
        }

        while let Some(mut event) = state.queue.pop_front() {
            drop(state);
            log::debug!("Processing event: {}", event.name());
            event.run();
            state = mutex.lock().unwrap();
        }

        true
    }

    /// Atomically marks both queues terminated and cancels every task still
    /// waiting to run, then wakes every worker and joins them. Tasks already
    /// mid-`run` finish their current invocation; this shutdown path only
    /// ever calls [`Task::on_cancel`] for tasks that never started (a task
    /// already running can still end up canceled on its own, via
    /// [`TaskStatus::Canceled`], handled by the worker loop instead).
    pub fn close(&self) {
        {
            let (mutex, cv) = &*self.task_state;
            let mut state = mutex.lock().unwrap();
            state.terminate = true;
            for mut task in state.queue.drain(..) {
                task.on_cancel();
            }
            cv.notify_all();
        }
        {
            let (mutex, cv) = &*self.event_state;
            let mut state = mutex.lock().unwrap();
            state.terminate = true;
            cv.notify_all();
        }

        for worker in self.workers.lock().unwrap().drain(..) {
            let _ = worker.join();
        }
    }
}

fn resolve_thread_count(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }

    let cpus = num_cpus::get();
    if cpus > 1 {
        cpus - 1
    } else {
        1
    }
}

fn worker_loop(id: usize, state: Arc<(Mutex<TaskQueueState>, Condvar)>) {
    log::info!("Scheduler: worker thread {id} started");
    let (mutex, cv) = &*state;

    loop {
        let mut guard = mutex.lock().unwrap();
        while guard.queue.is_empty() && !guard.terminate {
            guard = cv.wait(guard).unwrap();
        }

        if guard.terminate && guard.queue.is_empty() {
            break;
        }
        drop(guard);

        execute_ready_tasks(&state);
    }

    log::info!("Scheduler: worker thread {id} exiting");
}

/// Drains the task queue, running each task to a terminal status. A
/// yielding task goes back to the tail of the queue immediately rather
/// than waiting for the worker to sleep and be woken again.
fn execute_ready_tasks(state: &Arc<(Mutex<TaskQueueState>, Condvar)>) {
    let (mutex, _cv) = &**state;

    loop {
        let mut guard = mutex.lock().unwrap();
        let Some(mut task) = guard.queue.pop_front() else {
            return;
        };
        drop(guard);

        log::trace!("Executing task: {}", task.name());
        let status = task.run();

        match status {
            TaskStatus::Finished => {
                log::trace!("Task finished: {}", task.name());
                task.on_finished();
            }
            TaskStatus::Failed => {
                log::trace!("Task failed: {}", task.name());
                task.on_failed();
            }
            TaskStatus::Yield => {
                log::trace!("Task yielded: {}", task.name());
                let mut guard = mutex.lock().unwrap();
                guard.queue.push_back(task);
                continue;
            }
            TaskStatus::Canceled => {
                log::trace!("Task canceled: {}", task.name());
                task.on_cancel();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingTask {
        name: String,
        runs_remaining: usize,
        finished: Arc<AtomicUsize>,
    }

    impl Task for CountingTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn run(&mut self) -> TaskStatus {
            if self.runs_remaining == 0 {
                return TaskStatus::Finished;
            }
            self.runs_remaining -= 1;
            if self.runs_remaining == 0 {
                TaskStatus::Finished
            } else {
                TaskStatus::Yield
            }
        }

        fn on_finished(&mut self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_tasks_to_completion() {
        let scheduler = Scheduler::new(2);
        let finished = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            scheduler.add_task(Box::new(CountingTask {
                name: format!("task-{i}"),
                runs_remaining: 3,
                finished: Arc::clone(&finished),
            }));
        }

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(finished.load(Ordering::SeqCst), 5);
        scheduler.close();
    }

    struct CancelableTask {
        canceled: Arc<AtomicUsize>,
    }

    impl Task for CancelableTask {
        fn name(&self) -> &str {
            "cancelable"
        }

        fn run(&mut self) -> TaskStatus {
            std::thread::sleep(Duration::from_millis(500));
            TaskStatus::Finished
        }

        fn on_cancel(&mut self) {
            self.canceled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn close_cancels_queued_but_unstarted_tasks() {
        let scheduler = Scheduler::new(1);
        let canceled = Arc::new(AtomicUsize::new(0));

        // occupies the single worker so the next tasks stay queued
        scheduler.add_task(Box::new(CancelableTask {
            canceled: Arc::clone(&canceled),
        }));
        std::thread::sleep(Duration::from_millis(50));

        for _ in 0..3 {
            scheduler.add_task(Box::new(CancelableTask {
                canceled: Arc::clone(&canceled),
            }));
        }

        scheduler.close();
        assert_eq!(canceled.load(Ordering::SeqCst), 3);
    }

    struct SelfCancelingTask {
        canceled: Arc<AtomicUsize>,
    }

    impl Task for SelfCancelingTask {
        fn name(&self) -> &str {
            "self-canceling"
        }

        fn run(&mut self) -> TaskStatus {
            TaskStatus::Canceled
        }

        fn on_cancel(&mut self) {
            self.canceled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn on_cancel_fires_when_run_reports_canceled() {
        let scheduler = Scheduler::new(1);
        let canceled = Arc::new(AtomicUsize::new(0));

        scheduler.add_task(Box::new(SelfCancelingTask {
            canceled: Arc::clone(&canceled),
        }));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(canceled.load(Ordering::SeqCst), 1);
        scheduler.close();
    }

    struct RecordingEvent {
        order: Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    impl SchedulerEvent for RecordingEvent {
        fn name(&self) -> &str {
            self.label
        }

        fn run(&mut self) {
            self.order.lock().unwrap().push(self.label);
        }
    }

    #[test]
    fn events_run_in_fifo_order() {
        let scheduler = Scheduler::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        scheduler.add_event(Box::new(RecordingEvent {
            order: Arc::clone(&order),
            label: "first",
        }));
        scheduler.add_event(Box::new(RecordingEvent {
            order: Arc::clone(&order),
            label: "second",
        }));

        assert!(scheduler.run_pending_events());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        scheduler.close();
    }
}
