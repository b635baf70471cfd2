//! Thread-backed execution strategy.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use log::{debug, error};
use parking_lot::Mutex;

use super::{failed_result, ExecutionStrategy, PoolError, TaskHandler};
use crate::{
    config::StrategyKind,
    executor::{panic_message, WorkerTask},
    models::StepResult,
};

type Job = (usize, WorkerTask, mpsc::Sender<(usize, StepResult)>);

struct Workers {
    sender: mpsc::Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

/// Persistent pool of OS threads sharing one job queue.
pub struct ThreadStrategy {
    workers: usize,
    handler: TaskHandler,
    pool: Option<Workers>,
}

impl ThreadStrategy {
    pub fn new(workers: usize, handler: TaskHandler) -> Self {
        Self {
            workers: workers.max(1),
            handler,
            pool: None,
        }
    }

    fn start(&mut self) -> Result<&Workers, PoolError> {
        if self.pool.is_none() {
            let (sender, receiver) = mpsc::channel::<Job>();
            let receiver = Arc::new(Mutex::new(receiver));
            let mut handles = Vec::with_capacity(self.workers);

            for id in 0..self.workers {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&self.handler);
                let handle = thread::Builder::new()
                    .name(format!("forge-worker-{id}"))
                    .spawn(move || worker_loop(id, receiver, handler))
                    .map_err(|e| PoolError::WorkerUnavailable {
                        message: format!("Failed to spawn worker thread: {e}"),
                    })?;
                handles.push(handle);
            }

            debug!("Started {} worker threads", self.workers);
            self.pool = Some(Workers { sender, handles });
        }

        self.pool.as_ref().ok_or_else(|| PoolError::WorkerUnavailable {
            message: "Thread pool not running".to_string(),
        })
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>, handler: TaskHandler) {
    loop {
        let job = receiver.lock().recv();
        let Ok((position, task, reply)) = job else {
            break;
        };

        let result = catch_unwind(AssertUnwindSafe(|| handler(&task))).unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!("Worker thread {id} caught a panic: {message}");
            failed_result(&task, &format!("Worker panicked: {message}"))
        });
        let _ = reply.send((position, result));
    }
}

impl ExecutionStrategy for ThreadStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Thread
    }

    fn is_started(&self) -> bool {
        self.pool.is_some()
    }

    fn run_batch(&mut self, tasks: &[WorkerTask]) -> Result<Vec<StepResult>, PoolError> {
        let workers = self.start()?;
        let (reply_tx, reply_rx) = mpsc::channel();

        for (position, task) in tasks.iter().enumerate() {
            workers
                .sender
                .send((position, task.clone(), reply_tx.clone()))
                .map_err(|_| PoolError::WorkerUnavailable {
                    message: "All worker threads have exited".to_string(),
                })?;
        }
        drop(reply_tx);

        let mut slots: Vec<Option<StepResult>> = vec![None; tasks.len()];
        for (position, result) in reply_rx.iter() {
            slots[position] = Some(result);
        }

        Ok(slots
            .into_iter()
            .zip(tasks)
            .map(|(slot, task)| {
                slot.unwrap_or_else(|| failed_result(task, "Worker thread exited before replying"))
            })
            .collect())
    }

    fn shutdown(&mut self) {
        if let Some(Workers { sender, handles }) = self.pool.take() {
            drop(sender);
            for handle in handles {
                let _ = handle.join();
            }
            debug!("Stopped worker threads");
        }
    }
}

impl Drop for ThreadStrategy {
    fn drop(&mut self) {
        self.shutdown();
    }
}
