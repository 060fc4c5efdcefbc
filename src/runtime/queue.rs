//! Contexts, queues and task submission
//!
//! A [`Queue`] owns one worker thread fed through a crossbeam channel.
//! [`Queue::submit`] returns immediately with an [`Event`]; the caller
//! blocks on [`Event::wait`] to observe completion. Task failures are
//! reported to the context's [`AsyncHandler`] before `wait` returns them.

use crate::error::{ProbeError, Result};
use crate::runtime::device::{Backend, Device};
use crate::system::ThreadAffinity;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Callback receiving errors raised asynchronously by submitted tasks
#[derive(Clone)]
pub struct AsyncHandler(Arc<dyn Fn(&ProbeError) + Send + Sync>);

impl AsyncHandler {
    /// Create a handler from a closure
    pub fn new(f: impl Fn(&ProbeError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Handler that logs the error and prints it to stdout
    pub fn logging() -> Self {
        Self::new(|err| {
            tracing::error!("Asynchronous task error: {}", err);
            println!("Exception: {}", err);
        })
    }

    /// Handler that ignores errors
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Report an error to the handler
    pub fn report(&self, err: &ProbeError) {
        (self.0)(err)
    }
}

impl Default for AsyncHandler {
    fn default() -> Self {
        Self::logging()
    }
}

impl fmt::Debug for AsyncHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncHandler")
    }
}

/// Execution context spanning a set of devices of one backend
#[derive(Debug, Clone)]
pub struct Context {
    devices: Vec<Device>,
    backend: Backend,
    handler: AsyncHandler,
}

impl Context {
    /// Build a context over `devices`
    ///
    /// Fails if the list is empty or mixes backends.
    pub fn new(devices: Vec<Device>, handler: AsyncHandler) -> Result<Self> {
        let backend = devices
            .first()
            .map(|d| d.backend())
            .ok_or_else(|| ProbeError::InvalidContext("context requires at least one device".to_string()))?;

        if let Some(other) = devices.iter().find(|d| d.backend() != backend) {
            return Err(ProbeError::InvalidContext(format!(
                "device {} uses backend {}, context uses {}",
                other.id(),
                other.backend(),
                backend
            )));
        }

        Ok(Self {
            devices,
            backend,
            handler,
        })
    }

    /// Devices in the context
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Backend shared by all devices
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Check whether `device` is part of this context
    pub fn contains(&self, device: &Device) -> bool {
        self.devices.iter().any(|d| d.id() == device.id())
    }

    /// Asynchronous error handler
    pub fn handler(&self) -> &AsyncHandler {
        &self.handler
    }
}

type Job = Box<dyn FnOnce() + Send>;

/// In-order queue bound to one device of a context
pub struct Queue {
    device: Device,
    handler: AsyncHandler,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Queue {
    /// Create a queue for `device`, which must belong to `context`
    pub fn new(context: &Context, device: &Device) -> Result<Self> {
        if !context.contains(device) {
            return Err(ProbeError::InvalidContext(format!(
                "device {} is not part of the context",
                device.id()
            )));
        }

        let (job_tx, job_rx) = unbounded::<Job>();
        let cpus = device.cpus().to_vec();
        let worker = std::thread::Builder::new()
            .name(format!("queue-{}", device.id()))
            .spawn(move || {
                if let Err(e) = ThreadAffinity::pin_to_cpus(&cpus) {
                    tracing::warn!("Could not pin queue worker: {}", e);
                }
                while let Ok(job) = job_rx.recv() {
                    job();
                }
                tracing::debug!("Queue worker shutting down");
            })
            .map_err(|e| ProbeError::runtime(format!("failed to spawn queue worker: {}", e)))?;

        tracing::info!(device = %device.id(), "Created queue");

        Ok(Self {
            device: device.clone(),
            handler: context.handler().clone(),
            sender: Some(job_tx),
            worker: Some(worker),
        })
    }

    /// Device the queue submits to
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Submit a task; returns immediately with its completion event
    pub fn submit<F>(&self, task: F) -> Result<Event>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam::channel::bounded::<Result<()>>(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                Err(ProbeError::Task(message))
            });
            let _ = done_tx.send(result);
        });

        self.sender
            .as_ref()
            .ok_or_else(|| ProbeError::runtime("queue is closed"))?
            .send(job)
            .map_err(|_| ProbeError::runtime("queue worker is gone"))?;

        Ok(Event {
            done: done_rx,
            handler: self.handler.clone(),
        })
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("device", &self.device.id()).finish()
    }
}

/// Completion handle of a submitted task
#[derive(Debug)]
pub struct Event {
    done: Receiver<Result<()>>,
    handler: AsyncHandler,
}

impl Event {
    /// Block until the task completes
    pub fn wait(self) -> Result<()> {
        let result = self
            .done
            .recv()
            .unwrap_or_else(|_| Err(ProbeError::Task("task was dropped before completion".to_string())));

        if let Err(ref e) = result {
            self.handler.report(e);
        }
        result
    }
}

/// Shared one-dimensional buffer
#[derive(Debug, Clone)]
pub struct Buffer<T> {
    data: Arc<Mutex<Vec<T>>>,
}

impl<T: Copy + Send + 'static> Buffer<T> {
    /// Create a buffer holding a copy of `values`
    pub fn from_slice(values: &[T]) -> Self {
        Self {
            data: Arc::new(Mutex::new(values.to_vec())),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Check whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-write accessor for use inside a task
    pub fn read_write(&self) -> Accessor<T> {
        Accessor {
            data: Arc::clone(&self.data),
        }
    }

    /// Copy the current contents out of the buffer
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<T>>> {
        self.data
            .lock()
            .map_err(|_| ProbeError::Task("buffer poisoned by a failed task".to_string()))
    }
}

/// Accessor granting a task read-write access to a [`Buffer`]
#[derive(Debug, Clone)]
pub struct Accessor<T> {
    data: Arc<Mutex<Vec<T>>>,
}

impl<T: Copy> Accessor<T> {
    /// Read element `index`
    pub fn get(&self, index: usize) -> Result<T> {
        let data = self
            .data
            .lock()
            .map_err(|_| ProbeError::Task("buffer poisoned".to_string()))?;
        data.get(index)
            .copied()
            .ok_or_else(|| ProbeError::Task(format!("index {} out of range ({} elements)", index, data.len())))
    }

    /// Write element `index`
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| ProbeError::Task("buffer poisoned".to_string()))?;
        let len = data.len();
        let slot = data
            .get_mut(index)
            .ok_or_else(|| ProbeError::Task(format!("index {} out of range ({} elements)", index, len)))?;
        *slot = value;
        Ok(())
    }
}
