use crossbeam_channel::{Receiver, Sender};
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

/// Handle of a long-lived worker thread. Sending to (or dropping)
/// `terminate_worker_tx` asks the worker loop to stop.
#[derive(Debug)]
pub struct Worker {
    pub name: &'static str,
    pub join_handle: JoinHandle<()>,
    pub terminate_worker_tx: Sender<()>,
}

impl Worker {
    pub fn terminate(&self) {
        if self.terminate_worker_tx.send(()).is_err() {
            trace!("Worker '{}' already stopped", self.name);
        }
    }

    pub fn join(self) {
        if self.join_handle.join().is_err() {
            error!("Worker '{}' panicked", self.name)
        }
    }
}

pub fn run_worker<T, F>(name: &'static str, worker: F, params: T) -> Worker
where
    T: Send + 'static,
    F: FnOnce(T, Receiver<()>) + Send + 'static,
{
    let (terminate_worker_tx, terminate_worker_rx): (Sender<()>, Receiver<()>) =
        crossbeam_channel::bounded(1);

    let join_handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || worker(params, terminate_worker_rx))
        .unwrap_or_else(|err| panic!("cannot spawn worker thread '{}': {}", name, err));

    Worker {
        name,
        join_handle,
        terminate_worker_tx,
    }
}

/// Sleeps for `delay` unless termination is requested first.
/// Returns true when the worker should stop.
pub fn wait_or_terminate(terminate_worker_rx: &Receiver<()>, delay: Duration) -> bool {
    let timeout = crossbeam_channel::after(delay);
    select!(
        recv(terminate_worker_rx) -> _ => true,
        recv(timeout) -> _ => false,
    )
}
