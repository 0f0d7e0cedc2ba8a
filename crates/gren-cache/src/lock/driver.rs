//! Async driver for the lock state machine.
//!
//! One background task owns the [`LockState`]. Requests arrive over a
//! channel, timers are spawned sleeps that post their event back to the same
//! task, so every transition for a path happens strictly one after another
//! and waiting on one path never stalls the touches of another.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use super::fs::{LockFs, StdLockFs};
use super::machine::{LockEffect, LockEvent, LockState, Transition};
use super::{marker_path, LockOutcome, RetryPolicy};

enum Request {
    Acquire {
        path: PathBuf,
        reply: oneshot::Sender<LockOutcome>,
    },
    Release {
        path: PathBuf,
        reply: oneshot::Sender<Option<LockOutcome>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the lock driver task. Cheap to clone.
///
/// When every handle is dropped the driver releases whatever is still held,
/// but only if the runtime keeps running long enough; call
/// [`CacheLock::shutdown`] before exiting to be sure.
#[derive(Debug, Clone)]
pub struct CacheLock {
    requests: mpsc::UnboundedSender<Request>,
}

/// Outcomes nobody asked for: a held lock whose touch failed.
#[derive(Debug)]
pub struct LockFaults {
    rx: mpsc::UnboundedReceiver<LockOutcome>,
}

impl LockFaults {
    pub async fn recv(&mut self) -> Option<LockOutcome> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LockOutcome> {
        self.rx.try_recv().ok()
    }
}

fn driver_gone(path: PathBuf) -> LockOutcome {
    LockOutcome::UnexpectedError {
        path,
        error: io::Error::other("cache lock driver has stopped"),
    }
}

impl CacheLock {
    /// Start a driver on the real filesystem. Must be called inside a tokio runtime.
    pub fn spawn(retry: Option<RetryPolicy>) -> (Self, LockFaults) {
        Self::spawn_with(StdLockFs, retry)
    }

    pub fn spawn_with<F: LockFs>(fs: F, retry: Option<RetryPolicy>) -> (Self, LockFaults) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        let (faults_tx, faults_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            state: LockState::new(retry),
            fs,
            timers: timers_tx,
            faults: faults_tx,
            acquiring: HashMap::new(),
        };
        tokio::spawn(driver.run(requests_rx, timers_rx));

        (
            Self {
                requests: requests_tx,
            },
            LockFaults { rx: faults_rx },
        )
    }

    /// Take the lock on `path`, retrying per the policy. Resolves to
    /// `Acquired`, `AlreadyLocked` or `UnexpectedError`.
    pub async fn acquire(&self, path: impl Into<PathBuf>) -> LockOutcome {
        let path = path.into();
        let (reply, rx) = oneshot::channel();
        let request = Request::Acquire {
            path: path.clone(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return driver_gone(path);
        }
        rx.await.unwrap_or_else(|_| driver_gone(path))
    }

    /// Release `path`. `None` when this process did not hold it.
    pub async fn release(&self, path: impl Into<PathBuf>) -> Option<LockOutcome> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Release {
            path: path.into(),
            reply,
        };
        self.requests.send(request).ok()?;
        rx.await.ok().flatten()
    }

    /// Release everything still held and stop the driver.
    pub async fn shutdown(self) {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

struct Driver<F> {
    state: LockState,
    fs: F,
    timers: mpsc::UnboundedSender<LockEvent>,
    faults: mpsc::UnboundedSender<LockOutcome>,
    acquiring: HashMap<PathBuf, oneshot::Sender<LockOutcome>>,
}

impl<F: LockFs> Driver<F> {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut timers: mpsc::UnboundedReceiver<LockEvent>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Shutdown { reply }) => {
                        self.release_all();
                        let _ = reply.send(());
                        return;
                    }
                    Some(Request::Acquire { path, reply }) => self.acquire(path, reply),
                    Some(Request::Release { path, reply }) => self.release(path, reply),
                    None => break,
                },
                Some(event) = timers.recv() => {
                    for outcome in self.dispatch(event) {
                        self.deliver(outcome);
                    }
                }
            }
        }
        self.release_all();
    }

    fn acquire(&mut self, path: PathBuf, reply: oneshot::Sender<LockOutcome>) {
        if self.acquiring.contains_key(&path) {
            tracing::warn!("{} is already being acquired", path.display());
            let _ = reply.send(LockOutcome::AlreadyLocked { path });
            return;
        }
        self.acquiring.insert(path.clone(), reply);
        for outcome in self.dispatch(LockEvent::Acquire { path }) {
            self.deliver(outcome);
        }
    }

    fn release(&mut self, path: PathBuf, reply: oneshot::Sender<Option<LockOutcome>>) {
        let mut released = None;
        for outcome in self.dispatch(LockEvent::Release { path }) {
            match outcome {
                LockOutcome::Released { .. } => released = Some(outcome),
                other => self.deliver(other),
            }
        }
        let _ = reply.send(released);
    }

    /// Step the machine until no effect yields a follow-up event.
    fn dispatch(&mut self, event: LockEvent) -> Vec<LockOutcome> {
        let mut queue = VecDeque::from([event]);
        let mut outcomes = Vec::new();
        while let Some(event) = queue.pop_front() {
            let Transition { outcome, effects } = self.state.step(event);
            for effect in effects {
                if let Some(next) = self.execute(effect) {
                    queue.push_back(next);
                }
            }
            outcomes.extend(outcome);
        }
        outcomes
    }

    fn execute(&mut self, effect: LockEffect) -> Option<LockEvent> {
        match effect {
            LockEffect::CreateMarker { path, attempt } => {
                let event = match self.fs.create_marker(&marker_path(&path)) {
                    Ok(()) => LockEvent::MarkerCreated { path, attempt },
                    Err(error) => LockEvent::MarkerCreateFailed {
                        path,
                        attempt,
                        error,
                    },
                };
                Some(event)
            }
            LockEffect::InspectMarker { path, attempt } => {
                let event = match self.fs.last_accessed(&marker_path(&path)) {
                    Ok(last_accessed) => LockEvent::MarkerInspected {
                        path,
                        attempt,
                        last_accessed,
                        now: self.fs.now(),
                    },
                    Err(error) => LockEvent::MarkerInspectFailed {
                        path,
                        attempt,
                        error,
                    },
                };
                Some(event)
            }
            LockEffect::RemoveMarker { path } => {
                let marker = marker_path(&path);
                match self.fs.remove_marker(&marker) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!("Failed to remove {}: {e}", marker.display()),
                }
                None
            }
            LockEffect::TouchMarker { path, lease } => {
                let now = self.fs.now();
                let event = match self.fs.touch(&marker_path(&path), now) {
                    Ok(()) => LockEvent::Touched { path, lease },
                    Err(error) => LockEvent::TouchFailed { path, lease, error },
                };
                Some(event)
            }
            LockEffect::Schedule { after, event } => {
                let timers = self.timers.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = timers.send(event);
                });
                None
            }
        }
    }

    /// Answer the pending acquisition for the outcome's path, or report it as a fault.
    fn deliver(&mut self, outcome: LockOutcome) {
        if !matches!(outcome, LockOutcome::Released { .. }) {
            if let Some(reply) = self.acquiring.remove(outcome.path()) {
                let _ = reply.send(outcome);
                return;
            }
        }
        if let LockOutcome::UnexpectedError { path, error } = &outcome {
            tracing::error!("lost the lock on {}: {error}", path.display());
        }
        let _ = self.faults.send(outcome);
    }

    fn release_all(&mut self) {
        let held: Vec<PathBuf> = self.state.held().map(PathBuf::from).collect();
        for path in held {
            self.dispatch(LockEvent::Release { path });
        }
    }
}
