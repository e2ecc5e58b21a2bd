use std::{
    io,
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread,
};

use log::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

type Queue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Fixed set of named worker threads pulling connections off one queue.
///
/// Dropping the pool closes the queue and joins every worker once the jobs
/// already queued have run.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    /// Spawns `size` workers, at least one.
    pub fn new(size: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let queue: Queue = Arc::new(Mutex::new(receiver));

        let workers = (0..size.max(1))
            .map(|id| Worker::spawn(id, Arc::clone(&queue)))
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            workers,
            sender: Some(sender),
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let queued = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(Box::new(f)).is_ok());
        if !queued {
            warn!("thread pool is shut down, dropping job");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        for worker in self.workers.drain(..) {
            debug!("joining worker {}", worker.id);
            if worker.handle.join().is_err() {
                warn!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn(id: usize, queue: Queue) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("stub-worker-{id}"))
            .spawn(move || {
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).recv();
                    let Ok(job) = next else {
                        debug!("worker {id} stopped, queue closed");
                        break;
                    };
                    debug!("worker {id} picked up a connection");
                    job();
                }
            })?;

        Ok(Self { id, handle })
    }
}
