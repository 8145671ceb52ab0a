//! Fixed-size worker pool for crack tasks.
//!
//! Each task runs one strategy start to finish on a single worker. Tasks start
//! in submission order. A panicking task is reported to its caller as a
//! `WorkerFailure` and the worker moves on to the next task.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::crack::{crack, CrackResult, CrackTask};
use crate::error::{CrackError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub workers : usize,
    pub active : usize,
    pub queued : usize,
    pub completed : u64,
    pub failed : u64,
}

/// What a caller gets back for one task, in wire form.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TaskOutcome {
    Success(CrackResult),
    Failure { error : bool, message : String },
}

impl From<Result<CrackResult>> for TaskOutcome {
    fn from(res : Result<CrackResult>) -> Self {
        match res {
            Ok(r) => TaskOutcome::Success(r),
            Err(e) => TaskOutcome::Failure { error: true, message: e.to_string() },
        }
    }
}

pub struct TaskHandle {
    pub id : u64,
    rx : mpsc::Receiver<Result<CrackResult>>,
}

impl TaskHandle {
    /// Blocks until the task finishes.
    pub fn wait(self) -> Result<CrackResult> {
        self.rx.recv()
            .unwrap_or_else(|_| Err(CrackError::WorkerFailure(format!("task {} was dropped", self.id))))
    }

    pub fn try_wait(&self) -> Option<Result<CrackResult>> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct PoolState {
    closed : AtomicBool,
    active : AtomicUsize,
    completed : AtomicU64,
    failed : AtomicU64,
    next_id : AtomicU64,
    pending : Mutex<usize>,
    drained : Condvar,
}

impl PoolState {
    fn add_pending(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending += 1;
    }

    fn finish(&self, ok : bool) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if !ok {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn pending(&self) -> usize {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_drained(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while *pending > 0 {
            pending = self.drained.wait(pending).unwrap_or_else(|e| e.into_inner());
        }
    }
}

fn panic_message(payload : &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}

/// Runs a validated task with its own random source.
pub fn run_task(task : &CrackTask) -> Result<CrackResult> {
    let mut rng = match task.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    crack(task, &mut rng)
}

pub struct Dispatcher {
    pool : Option<rayon::ThreadPool>,
    state : Arc<PoolState>,
    workers : usize,
}

impl Dispatcher {
    pub fn new(workers : usize) -> Result<Self> {
        let workers = workers.max(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("crack-worker-{}", i))
            .build()
            .map_err(|e| CrackError::WorkerFailure(format!("cannot start worker pool: {}", e)))?;

        tracing::info!("Started dispatcher with {} workers", workers);

        Ok(Dispatcher { pool: Some(pool), state: Arc::new(PoolState::default()), workers })
    }

    pub fn dispatch(&self, task : CrackTask) -> Result<TaskHandle> {
        self.spawn(move || run_task(&task))
    }

    /// Queues an arbitrary job behind the tasks already submitted.
    pub fn spawn<F>(&self, job : F) -> Result<TaskHandle>
        where F : FnOnce() -> Result<CrackResult> + Send + 'static {

        let pool = match &self.pool {
            Some(p) if !self.state.closed.load(Ordering::SeqCst) => p,
            _ => return Err(CrackError::WorkerFailure(String::from("dispatcher is shut down"))),
        };

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        let state = self.state.clone();

        state.add_pending();

        pool.spawn_fifo(move || {
            state.active.fetch_add(1, Ordering::SeqCst);

            let res = match catch_unwind(AssertUnwindSafe(job)) {
                Ok(res) => res,
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    tracing::warn!("Task {} panicked: {}", id, msg);
                    Err(CrackError::WorkerFailure(msg))
                }
            };

            if let Err(e) = &res {
                tracing::debug!("Task {} failed: {}", id, e);
            }

            // Counters settle before the result is visible to the waiting caller.
            state.active.fetch_sub(1, Ordering::SeqCst);
            state.finish(res.is_ok());

            // The caller may have stopped waiting.
            let _ = tx.send(res);
        });

        Ok(TaskHandle { id, rx })
    }

    /// Runs named tasks with at most one in flight per worker and hands each
    /// result to `on_done` in submission order.
    ///
    /// Tasks are pulled from `tasks` only as workers free up. Once `stop` is set
    /// nothing more is pulled, while tasks already in flight still finish and
    /// are reported. Returns how many results were delivered.
    pub fn run_batch<I, F>(&self, tasks : I, stop : &AtomicBool, mut on_done : F) -> Result<usize>
        where I : IntoIterator<Item = Result<(String, CrackTask)>>,
              F : FnMut(&str, Result<CrackResult>) -> Result<()> {

        let mut tasks = tasks.into_iter();
        let mut in_flight : VecDeque<(String, TaskHandle)> = VecDeque::new();
        let mut delivered = 0;

        loop {
            while in_flight.len() < self.workers && !stop.load(Ordering::SeqCst) {
                match tasks.next() {
                    Some(item) => {
                        let (name, task) = item?;
                        in_flight.push_back((name, self.dispatch(task)?));
                    },
                    None => break,
                }
            }

            let (name, handle) = match in_flight.pop_front() {
                Some(next) => next,
                None => break,
            };

            on_done(&name, handle.wait())?;
            delivered += 1;
        }

        if stop.load(Ordering::SeqCst) {
            tracing::info!("Batch stopped after {} tasks", delivered);
        }

        Ok(delivered)
    }

    pub fn status(&self) -> DispatcherStatus {
        let active = self.state.active.load(Ordering::SeqCst);

        DispatcherStatus {
            workers: self.workers,
            active,
            queued: self.state.pending().saturating_sub(active),
            completed: self.state.completed.load(Ordering::SeqCst),
            failed: self.state.failed.load(Ordering::SeqCst),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Refuses new tasks, lets queued and running ones finish, then releases the workers.
    pub fn shutdown(&mut self) {
        if self.state.closed.swap(true, Ordering::SeqCst) && self.pool.is_none() {
            return;
        }

        tracing::info!("Shutting down dispatcher, {} tasks outstanding", self.state.pending());

        self.state.wait_drained();
        self.pool = None;

        tracing::info!("Dispatcher stopped after {} tasks", self.state.completed.load(Ordering::SeqCst));
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crack::{CrackMethod, CrackRequest};
    use crate::score::Dictionary;
    use std::time::Duration;

    fn empty_result() -> CrackResult {
        CrackResult {
            top_results: Vec::new(),
            full_decryption: String::new(),
            method: CrackMethod::BruteForce,
            message: None,
        }
    }

    #[test]
    fn runs_tasks_in_order_on_one_worker() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles : Vec<TaskHandle> = (0..5)
            .map(|i| {
                let order = order.clone();
                dispatcher.spawn(move || {
                    order.lock().unwrap().push(i);
                    Ok(empty_result())
                }).unwrap()
            })
            .collect();

        for h in handles {
            h.wait().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panic_does_not_kill_pool() {
        let dispatcher = Dispatcher::new(1).unwrap();

        let bad = dispatcher.spawn(|| panic!("boom")).unwrap();
        let good = dispatcher.spawn(|| Ok(empty_result())).unwrap();

        match bad.wait() {
            Err(CrackError::WorkerFailure(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected worker failure, got {:?}", other.is_ok()),
        }
        assert!(good.wait().is_ok());

        let status = dispatcher.status();
        assert_eq!(status.completed, 2);
        assert_eq!(status.failed, 1);
        assert_eq!(status.active, 0);
    }

    #[test]
    fn dispatches_real_task() {
        let dict = Arc::new(Dictionary::from_ranked_words(vec!["attack", "at", "dawn"]));
        let req = CrackRequest {
            ciphertext: "LXFOPV EF RNHR".into(),
            use_brute_force: true,
            known_keys: vec!["LEMON".into()],
            seed: Some(1),
            ..Default::default()
        };

        let dispatcher = Dispatcher::new(2).unwrap();
        let res = dispatcher.dispatch(req.validate(dict).unwrap()).unwrap().wait().unwrap();

        assert_eq!(res.full_decryption, "ATTACK AT DAWN");
    }

    #[test]
    fn task_errors_are_structured() {
        let dict = Arc::new(Dictionary::default());
        let req = CrackRequest { ciphertext: "too short".into(), ..Default::default() };

        let dispatcher = Dispatcher::new(1).unwrap();
        let res = dispatcher.dispatch(req.validate(dict).unwrap()).unwrap().wait();

        assert!(matches!(res, Err(CrackError::InsufficientData { .. })));

        let outcome = serde_json::to_value(TaskOutcome::from(res)).unwrap();
        assert_eq!(outcome["error"], true);
        assert!(outcome["message"].as_str().unwrap().contains("too short"));
    }

    #[test]
    fn counters_include_task_once_wait_returns() {
        let dispatcher = Dispatcher::new(2).unwrap();

        for i in 0..50u64 {
            let res = if i % 5 == 0 {
                dispatcher.spawn(|| panic!("fail")).unwrap().wait()
            } else {
                dispatcher.spawn(|| Ok(empty_result())).unwrap().wait()
            };
            assert_eq!(res.is_ok(), i % 5 != 0);

            let status = dispatcher.status();
            assert_eq!(status.completed, i + 1);
            assert_eq!(status.failed, i / 5 + 1);
            assert_eq!(status.active, 0);
            assert_eq!(status.queued, 0);
        }
    }

    fn brute_force_task() -> CrackTask {
        let dict = Arc::new(Dictionary::from_ranked_words(vec!["attack", "at", "dawn"]));
        let req = CrackRequest {
            ciphertext: "LXFOPV EF RNHR".into(),
            use_brute_force: true,
            known_keys: vec!["LEMON".into()],
            seed: Some(1),
            ..Default::default()
        };

        req.validate(dict).unwrap()
    }

    #[test]
    fn batch_reports_in_submission_order() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let stop = AtomicBool::new(false);
        let mut names = Vec::new();

        let tasks = (0..5).map(|i| Ok((format!("t{}", i), brute_force_task())));
        let delivered = dispatcher.run_batch(tasks, &stop, |name, res| {
            assert_eq!(res.unwrap().full_decryption, "ATTACK AT DAWN");
            names.push(name.to_string());
            Ok(())
        }).unwrap();

        assert_eq!(delivered, 5);
        assert_eq!(names, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn batch_stops_pulling_tasks_once_stopped() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let stop = AtomicBool::new(false);
        let pulled = std::cell::Cell::new(0);

        let tasks = (0..5).map(|i| {
            pulled.set(pulled.get() + 1);
            Ok((format!("t{}", i), brute_force_task()))
        });
        let delivered = dispatcher.run_batch(tasks, &stop, |_, res| {
            assert!(res.is_ok());
            stop.store(true, Ordering::SeqCst);
            Ok(())
        }).unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(pulled.get(), 1);
        assert_eq!(dispatcher.status().completed, 1);
    }

    #[test]
    fn batch_with_stop_already_set_runs_nothing() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let stop = AtomicBool::new(true);

        let tasks = (0..3).map(|i| Ok((format!("t{}", i), brute_force_task())));
        let delivered = dispatcher.run_batch(tasks, &stop, |_, _| Ok(())).unwrap();

        assert_eq!(delivered, 0);
        assert_eq!(dispatcher.status().completed, 0);
    }

    #[test]
    fn batch_input_error_is_returned() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let stop = AtomicBool::new(false);

        let tasks = vec![
            Ok((String::from("good"), brute_force_task())),
            Err(CrackError::invalid("unreadable input")),
        ];
        let res = dispatcher.run_batch(tasks, &stop, |_, _| Ok(()));

        assert!(matches!(res, Err(CrackError::InvalidInput(_))));
    }

    #[test]
    fn shutdown_drains_queue() {
        let mut dispatcher = Dispatcher::new(1).unwrap();

        let handles : Vec<TaskHandle> = (0..3)
            .map(|_| dispatcher.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                Ok(empty_result())
            }).unwrap())
            .collect();

        dispatcher.shutdown();

        assert!(dispatcher.is_shut_down());
        assert_eq!(dispatcher.status().completed, 3);
        assert!(handles.iter().all(|h| h.try_wait().map_or(false, |r| r.is_ok())));
        assert!(dispatcher.spawn(|| Ok(empty_result())).is_err());
    }
}
