/*
 * Provides the dedicated I/O worker shared by a profile family. Every file read,
 * write and delete for profiles is submitted here as a boxed job and executed on a
 * single named thread in strict submission order, so two operations on the profiles
 * directory never overlap. Each submission hands back an `IoTask` that can be polled
 * from the owner thread without blocking, or waited on when a caller really needs the
 * result (for instance during shutdown).
 *
 * Jobs only ever receive owned data (byte buffers, paths, cancellation tokens); the
 * owner-thread state of the profile manager never crosses into the worker.
 */
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

type IoJob = Box<dyn FnOnce() + Send + 'static>;

enum IoMessage {
    Run(IoJob),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoTaskError {
    ExecutorStopped,
    Panicked(String),
}

impl std::fmt::Display for IoTaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoTaskError::ExecutorStopped => {
                write!(f, "I/O executor stopped before the job completed")
            }
            IoTaskError::Panicked(msg) => write!(f, "I/O job panicked: {msg}"),
        }
    }
}

impl std::error::Error for IoTaskError {}

/*
 * Completion handle for a job submitted to an `IoExecutor`.
 * The result is delivered exactly once; after `try_wait` has returned `Some`, the
 * handle is spent and should be dropped.
 */
#[derive(Debug)]
pub struct IoTask<T> {
    receiver: mpsc::Receiver<Result<T, IoTaskError>>,
}

impl<T> IoTask<T> {
    /// Creates a handle that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        let (sender, receiver) = mpsc::channel();
        // The receiver is alive right here, so the send cannot fail.
        let _ = sender.send(Ok(value));
        IoTask { receiver }
    }

    pub fn wait(self) -> Result<T, IoTaskError> {
        self.receiver
            .recv()
            .unwrap_or(Err(IoTaskError::ExecutorStopped))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, IoTaskError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(IoTaskError::ExecutorStopped)),
        }
    }

    /*
     * Non-blocking poll. Returns `None` while the job is still queued or running.
     */
    pub fn try_wait(&self) -> Option<Result<T, IoTaskError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(IoTaskError::ExecutorStopped)),
        }
    }
}

/*
 * Shared cancellation flag handed to I/O jobs. Jobs check it at their own safe points
 * (before opening a file, before committing it) and bail out with a cancellation
 * result; cancelling never interrupts a job in the middle of a system call.
 */
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct ExecutorShared {
    name: String,
    sender: mpsc::Sender<IoMessage>,
    worker: Option<JoinHandle<()>>,
    worker_thread: ThreadId,
    pending: Arc<AtomicUsize>,
}

impl Drop for ExecutorShared {
    fn drop(&mut self) {
        // Stop is queued behind whatever is still pending, so queued writes complete.
        let _ = self.sender.send(IoMessage::Stop);
        if thread::current().id() == self.worker_thread {
            return;
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("IoExecutor: Worker '{}' terminated abnormally.", self.name);
            } else {
                log::debug!("IoExecutor: Worker '{}' joined.", self.name);
            }
        }
    }
}

/*
 * Single-threaded FIFO executor. Cloning the handle shares the same worker; the
 * worker is stopped and joined when the last clone is dropped.
 */
#[derive(Clone)]
pub struct IoExecutor {
    shared: Arc<ExecutorShared>,
}

impl std::fmt::Debug for IoExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoExecutor")
            .field("name", &self.shared.name)
            .field("pending", &self.pending_jobs())
            .finish()
    }
}

impl IoExecutor {
    pub fn new(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_name, receiver))?;
        let worker_thread = handle.thread().id();
        log::debug!("IoExecutor: Started worker thread '{name}'.");
        Ok(IoExecutor {
            shared: Arc::new(ExecutorShared {
                name: name.to_string(),
                sender,
                worker: Some(handle),
                worker_thread,
                pending: Arc::new(AtomicUsize::new(0)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /*
     * Queues `job` behind everything submitted earlier. A panic inside the job is
     * caught on the worker and reported through the returned task; the worker keeps
     * serving later jobs.
     */
    pub fn submit<T, F>(&self, job: F) -> IoTask<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_sender, receiver) = mpsc::channel();
        let pending = Arc::clone(&self.shared.pending);
        let wrapped: IoJob = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| IoTaskError::Panicked(panic_message(payload.as_ref())));
            pending.fetch_sub(1, Ordering::SeqCst);
            // The submitter may have dropped its handle already.
            let _ = result_sender.send(outcome);
        });

        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.shared.sender.send(IoMessage::Run(wrapped)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            log::error!(
                "IoExecutor: Worker '{}' is no longer running; job rejected.",
                self.shared.name
            );
        }
        IoTask { receiver }
    }

    /// Queues a no-op marker that resolves once every earlier job has finished.
    pub fn drain(&self) -> IoTask<()> {
        self.submit(|| ())
    }

    /// Number of jobs queued or currently running.
    pub fn pending_jobs(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.shared.worker_thread
    }
}

fn run_worker(name: &str, receiver: mpsc::Receiver<IoMessage>) {
    log::trace!("IoExecutor: Worker '{name}' waiting for jobs.");
    while let Ok(message) = receiver.recv() {
        match message {
            IoMessage::Run(job) => job(),
            IoMessage::Stop => break,
        }
    }
    log::debug!("IoExecutor: Worker '{name}' stopped.");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
