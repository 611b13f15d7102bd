//! Small fixed-size worker pool used to offload AEAD seal/open work off the
//! sequencer thread; results re-enter through the platform's deferred-task
//! queue (§4.5, §4.9 "Concurrency model").

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Sender<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> WorkerPool {
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..worker_count.max(1))
            .map(|_| {
                let receiver: Arc<Mutex<Receiver<Job>>> = Arc::clone(&receiver);
                std::thread::spawn(move || loop {
                    let job = {
                        let receiver = receiver.lock().expect("worker receiver mutex poisoned");
                        receiver.recv()
                    };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break, // sender dropped, pool shutting down
                    }
                })
            })
            .collect();

        WorkerPool { sender, handles }
    }

    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) {
        // The pool outlives every submitter for the crate's lifetime; a send
        // failure here would mean a worker thread panicked and the others
        // are torn down with it, which the caller can't recover from either.
        let _ = self.sender.send(Box::new(job));
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::sync_channel;

    #[test]
    fn jobs_run_on_worker_threads() {
        let pool = WorkerPool::new(2);
        let (done_tx, done_rx) = sync_channel::<()>(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            let done_tx = done_tx.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            });
        }

        for _ in 0..4 {
            done_rx.recv().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn pool_reports_its_worker_count() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.worker_count(), 3);
    }
}
