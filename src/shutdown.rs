// src/shutdown.rs
//! # Shutdown Coordinator
//!
//! Turns the two conventional termination signals (SIGINT, SIGTERM; Ctrl+C on
//! non-unix targets) into a single one-shot "stop" event.
//!
//! - The first signal closes the [`StopGate`]: every current and future waiter
//!   proceeds. Which signal it was is not part of the contract.
//! - A second signal exits the process immediately with status 1, skipping any
//!   cleanup still in flight.
//!
//! A coordinator can be installed exactly once. Installing it again is a wiring
//! mistake and panics.
//!
//! ```ignore
//! let coordinator = ShutdownCoordinator::new();
//! let stop = coordinator.install()?;
//!
//! while !stop.is_closed() {
//!     do_some_work();
//! }
//! ```

use crate::{
    constants::{FORCED_EXIT_CODE, SIGNAL_QUEUE_CAPACITY},
    error::ShutdownError,
};
use std::{
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, watch};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Called with the exit status when a second signal arrives.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// A termination request, real or synthetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupt"),
            Self::Terminate => write!(f, "terminate"),
        }
    }
}

/// Read-only view of the stop event.
///
/// Cheap to clone; every clone observes the same one-way open → closed
/// transition.
#[derive(Debug, Clone)]
pub struct StopGate {
    rx: watch::Receiver<bool>,
}

impl StopGate {
    /// True once a termination request has been received.
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the gate closes; immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|closed| *closed).await.is_err() {
            // The coordinator is gone without ever closing the gate.
            std::future::pending::<()>().await;
        }
    }

    /// Blocks the calling thread until the gate closes.
    pub fn wait_blocking(&self) {
        while !self.is_closed() {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocks until the gate closes or `timeout` elapses. Returns whether the
    /// gate is closed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_closed() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        true
    }
}

/// Process-wide owner of the signal queue and the stop gate.
pub struct ShutdownCoordinator {
    installed: AtomicBool,
    queue: OnceLock<mpsc::Sender<ShutdownSignal>>,
    gate: Arc<watch::Sender<bool>>,
    exit: ExitHook,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("installed", &self.installed.load(Ordering::Acquire))
            .field("closed", &*self.gate.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// Creates an uninstalled coordinator whose forced exit is
    /// `std::process::exit`.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            installed: AtomicBool::new(false),
            queue: OnceLock::new(),
            gate: Arc::new(gate),
            exit: Arc::new(process_exit),
        }
    }

    /// Replaces what happens on the second signal.
    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    /// A handle on the stop gate. Valid before and after installation.
    pub fn gate(&self) -> StopGate {
        StopGate {
            rx: self.gate.subscribe(),
        }
    }

    /// True once `install` or `try_install` has been called.
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Registers the signal handlers and starts the listener.
    ///
    /// # Panics
    ///
    /// Panics if the coordinator was already installed, whatever the outcome
    /// of the first installation.
    #[allow(clippy::panic)]
    pub fn install(&self) -> Result<StopGate, ShutdownError> {
        match self.try_install() {
            Err(ShutdownError::AlreadyInstalled) => panic!("{}", ShutdownError::AlreadyInstalled),
            other => other,
        }
    }

    /// Like [`install`](Self::install) but reports a repeat installation as
    /// `ShutdownError::AlreadyInstalled`.
    pub fn try_install(&self) -> Result<StopGate, ShutdownError> {
        if self
            .installed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ShutdownError::AlreadyInstalled);
        }

        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ShutdownError::Listener)?;
        let os_signals = {
            let _guard = runtime.enter();
            OsSignals::register().map_err(ShutdownError::Listener)?
        };

        let forward_tx = tx.clone();
        let gate = Arc::clone(&self.gate);
        let exit = Arc::clone(&self.exit);
        std::thread::Builder::new()
            .name("shutdown-listener".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    tokio::spawn(os_signals.forward(forward_tx));
                    listen(rx, gate, exit).await;
                });
            })
            .map_err(ShutdownError::Listener)?;

        // Only fails if set twice, which the installed flag rules out.
        let _ = self.queue.set(tx);
        log::debug!("shutdown coordinator installed");
        Ok(self.gate())
    }

    /// Enqueues a synthetic termination request without blocking.
    ///
    /// Returns `false` when the coordinator is not installed or the queue
    /// already holds two pending requests.
    pub fn request_shutdown(&self) -> bool {
        match self.queue.get() {
            Some(tx) => tx.try_send(ShutdownSignal::Interrupt).is_ok(),
            None => false,
        }
    }
}

fn process_exit(code: i32) {
    std::process::exit(code)
}

/// First request closes the gate, second one exits.
async fn listen(
    mut rx: mpsc::Receiver<ShutdownSignal>,
    gate: Arc<watch::Sender<bool>>,
    exit: ExitHook,
) {
    let Some(first) = rx.recv().await else {
        return;
    };
    log::info!("received {} signal, shutting down gracefully", first);
    gate.send_replace(true);

    if let Some(second) = rx.recv().await {
        log::error!("received second {} signal, exiting immediately", second);
        exit(FORCED_EXIT_CODE);
    }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn forward(mut self, tx: mpsc::Sender<ShutdownSignal>) {
        loop {
            let signal = tokio::select! {
                Some(()) = self.interrupt.recv() => ShutdownSignal::Interrupt,
                Some(()) = self.terminate.recv() => ShutdownSignal::Terminate,
                else => break,
            };
            if tx.try_send(signal).is_err() {
                log::warn!("shutdown queue is full, dropping {} signal", signal);
            }
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn forward(self, tx: mpsc::Sender<ShutdownSignal>) {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.try_send(ShutdownSignal::Interrupt).is_err() {
                log::warn!("shutdown queue is full, dropping interrupt signal");
            }
        }
    }
}

static GLOBAL: OnceLock<ShutdownCoordinator> = OnceLock::new();

/// The process-wide coordinator.
pub fn global() -> &'static ShutdownCoordinator {
    GLOBAL.get_or_init(ShutdownCoordinator::new)
}

/// Installs the process-wide coordinator. Panics on a second call.
pub fn install_global() -> Result<StopGate, ShutdownError> {
    global().install()
}

/// Synthetic termination request against the process-wide coordinator.
pub fn request_global_shutdown() -> bool {
    global().request_shutdown()
}
