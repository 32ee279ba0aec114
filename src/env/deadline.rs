use ndarray::Array1;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AqmError, Result};

use super::{Environment, Step, StepInfo};

enum Request {
    Reset,
    Step(usize),
}

enum Response {
    Reset(Result<(Array1<f32>, StepInfo)>),
    Step(Result<Step>),
}

struct Worker {
    requests: Sender<Request>,
    responses: Receiver<Response>,
}

// Decrements the live-thread count when a worker thread exits, panics included.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Worker {
    fn spawn<E: Environment + Send + 'static>(mut env: E, live: &Arc<AtomicUsize>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (response_tx, response_rx) = mpsc::channel::<Response>();

        live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(live));
        thread::Builder::new()
            .name("env-worker".to_string())
            .spawn(move || {
                let _guard = guard;
                for request in request_rx {
                    let response = match request {
                        Request::Reset => Response::Reset(env.reset()),
                        Request::Step(action) => Response::Step(env.step(action)),
                    };
                    if response_tx.send(response).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Worker {
            requests: request_tx,
            responses: response_rx,
        })
    }
}

/// Bounds every call into an environment with a deadline.
///
/// The wrapped environment lives on a worker thread. A call that misses its
/// deadline returns [`AqmError::Timeout`] and the worker is abandoned together with
/// whatever state the environment was in; the next `reset` builds a fresh
/// environment from `factory`. Until then `step` fails with
/// [`AqmError::Environment`].
///
/// An abandoned worker cannot be killed; its thread lingers until the stuck call
/// returns, and forever if it never does. [`DeadlineEnv::stuck_workers`] counts
/// those threads, and with [`DeadlineEnv::with_max_stuck_workers`] a `reset` that
/// would start another worker while more than the cap are stuck fails with
/// [`AqmError::Environment`] instead.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use rl_aqm::env::{AqmEnv, AqmEnvConfig, DeadlineEnv, Environment};
///
/// let mut env = DeadlineEnv::new(
///     || AqmEnv::new(AqmEnvConfig::default()),
///     Duration::from_secs(10),
/// ).unwrap();
/// let (state, _info) = env.reset().unwrap();
/// let step = env.step_within(0, Duration::from_millis(500)).unwrap();
/// ```
pub struct DeadlineEnv<E, F> {
    factory: F,
    worker: Option<Worker>,
    timeout: Duration,
    observation_size: usize,
    action_count: usize,
    needs_reset: bool,
    live_workers: Arc<AtomicUsize>,
    max_stuck_workers: Option<usize>,
    _env: std::marker::PhantomData<fn() -> E>,
}

impl<E, F> DeadlineEnv<E, F>
where
    E: Environment + Send + 'static,
    F: FnMut() -> Result<E>,
{
    /// Build the first environment and start its worker. `timeout` is the deadline
    /// used by the [`Environment`] methods.
    pub fn new(mut factory: F, timeout: Duration) -> Result<Self> {
        let env = factory()?;
        let observation_size = env.observation_size();
        let action_count = env.action_count();
        let live_workers = Arc::new(AtomicUsize::new(0));
        let worker = Worker::spawn(env, &live_workers)?;

        Ok(DeadlineEnv {
            factory,
            worker: Some(worker),
            timeout,
            observation_size,
            action_count,
            needs_reset: true,
            live_workers,
            max_stuck_workers: None,
            _env: std::marker::PhantomData,
        })
    }

    /// Refuse to start a fresh worker while more than `cap` abandoned ones are
    /// still running.
    pub fn with_max_stuck_workers(mut self, cap: usize) -> Self {
        self.max_stuck_workers = Some(cap);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Abandoned worker threads that have not exited yet.
    pub fn stuck_workers(&self) -> usize {
        let live = self.live_workers.load(Ordering::SeqCst);
        if self.worker.is_some() {
            live.saturating_sub(1)
        } else {
            live
        }
    }

    /// Reset, waiting at most `timeout` for the environment to answer.
    pub fn reset_within(&mut self, timeout: Duration) -> Result<(Array1<f32>, StepInfo)> {
        if self.worker.is_none() {
            self.respawn()?;
        }
        match self.call(Request::Reset, "reset", timeout)? {
            Response::Reset(result) => {
                self.needs_reset = result.is_err();
                result
            }
            Response::Step(_) => Err(self.protocol_error("reset")),
        }
    }

    /// Step, waiting at most `timeout` for the environment to answer.
    pub fn step_within(&mut self, action: usize, timeout: Duration) -> Result<Step> {
        if self.needs_reset || self.worker.is_none() {
            return Err(AqmError::Environment(
                "environment must be reset after a failed call".to_string(),
            ));
        }
        match self.call(Request::Step(action), "step", timeout)? {
            Response::Step(result) => result,
            Response::Reset(_) => Err(self.protocol_error("step")),
        }
    }

    fn call(&mut self, request: Request, operation: &str, timeout: Duration) -> Result<Response> {
        let worker = match &self.worker {
            Some(worker) => worker,
            None => return Err(AqmError::Environment("no environment worker".to_string())),
        };

        if worker.requests.send(request).is_err() {
            self.abandon_worker();
            return Err(AqmError::Environment(format!("environment worker exited before {}", operation)));
        }

        match worker.responses.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => {
                warn!(operation, ?timeout, "environment call missed its deadline; abandoning worker");
                self.abandon_worker();
                Err(AqmError::Timeout {
                    operation: operation.to_string(),
                    after: timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.abandon_worker();
                Err(AqmError::Environment(format!("environment worker exited during {}", operation)))
            }
        }
    }

    fn respawn(&mut self) -> Result<()> {
        let stuck = self.stuck_workers();
        if let Some(cap) = self.max_stuck_workers {
            if stuck > cap {
                return Err(AqmError::Environment(format!(
                    "{} abandoned environment workers still running (limit {})",
                    stuck, cap
                )));
            }
        }
        let env = (self.factory)()?;
        if env.observation_size() != self.observation_size || env.action_count() != self.action_count {
            return Err(AqmError::dimension_mismatch(
                format!("{} observations / {} actions", self.observation_size, self.action_count),
                format!("{} observations / {} actions", env.observation_size(), env.action_count()),
            ));
        }
        debug!(stuck, "starting a fresh environment worker");
        self.worker = Some(Worker::spawn(env, &self.live_workers)?);
        Ok(())
    }

    // The thread is detached: it exits on its own once the stuck call returns and
    // finds the channels closed.
    fn abandon_worker(&mut self) {
        self.worker = None;
        self.needs_reset = true;
    }

    fn protocol_error(&mut self, operation: &str) -> AqmError {
        self.abandon_worker();
        AqmError::Environment(format!("unexpected response to {}", operation))
    }
}

impl<E, F> Environment for DeadlineEnv<E, F>
where
    E: Environment + Send + 'static,
    F: FnMut() -> Result<E>,
{
    fn observation_size(&self) -> usize {
        self.observation_size
    }

    fn action_count(&self) -> usize {
        self.action_count
    }

    fn reset(&mut self) -> Result<(Array1<f32>, StepInfo)> {
        self.reset_within(self.timeout)
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        self.step_within(action, self.timeout)
    }
}
