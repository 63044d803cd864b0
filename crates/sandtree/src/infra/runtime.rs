//! Process-wide sandbox handle with a single-boot guard.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::domain::errors::SandboxError;
use crate::infra::sandbox::{Sandbox, SandboxBooter};

type BootOutcome = Option<Result<Arc<dyn Sandbox>, SandboxError>>;

enum Slot {
    Empty,
    Booting(watch::Receiver<BootOutcome>),
    Ready(Arc<dyn Sandbox>),
}

struct Shared {
    slot: Mutex<Slot>,
    last_error: Mutex<Option<SandboxError>>,
}

/// Owns the one sandbox of the process.
///
/// At most one boot is in flight. Concurrent [`acquire`](Self::acquire)
/// calls wait for that boot and all observe its outcome.
pub struct SandboxRuntime {
    booter: Arc<dyn SandboxBooter>,
    shared: Arc<Shared>,
}

impl SandboxRuntime {
    pub fn new(booter: Arc<dyn SandboxBooter>) -> Self {
        Self {
            booter,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Empty),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Return the running sandbox, booting it first if needed.
    pub async fn acquire(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let mut waiter = {
            let mut slot = self.shared.slot.lock();
            match &*slot {
                Slot::Ready(sandbox) => return Ok(Arc::clone(sandbox)),
                Slot::Booting(rx) => rx.clone(),
                Slot::Empty => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Slot::Booting(rx.clone());
                    self.spawn_boot(tx);
                    rx
                }
            }
        };

        let outcome = waiter
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SandboxError::Unavailable)?;
        match outcome.as_ref() {
            Some(result) => result.clone(),
            None => Err(SandboxError::Unavailable),
        }
    }

    /// The running sandbox, if a boot has completed.
    pub fn current(&self) -> Option<Arc<dyn Sandbox>> {
        match &*self.shared.slot.lock() {
            Slot::Ready(sandbox) => Some(Arc::clone(sandbox)),
            Slot::Empty | Slot::Booting(_) => None,
        }
    }

    pub fn is_booting(&self) -> bool {
        matches!(&*self.shared.slot.lock(), Slot::Booting(_))
    }

    /// Failure of the most recent boot, cleared by the next successful one.
    pub fn last_error(&self) -> Option<SandboxError> {
        self.shared.last_error.lock().clone()
    }

    /// Tear the running sandbox down so the next `acquire` boots fresh.
    pub async fn teardown(&self) {
        let sandbox = {
            let mut slot = self.shared.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Empty) {
                Slot::Ready(sandbox) => sandbox,
                Slot::Booting(rx) => {
                    tracing::warn!("teardown requested while the sandbox is booting; ignored");
                    *slot = Slot::Booting(rx);
                    return;
                }
                Slot::Empty => return,
            }
        };
        sandbox.teardown().await;
        tracing::info!("sandbox torn down");
    }

    pub async fn restart(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        self.teardown().await;
        self.acquire().await
    }

    /// The boot runs on its own task so a dropped caller cannot strand the
    /// other waiters.
    fn spawn_boot(&self, tx: watch::Sender<BootOutcome>) {
        let booter = Arc::clone(&self.booter);
        let shared = Arc::clone(&self.shared);
        tracing::info!("booting sandbox");
        tokio::spawn(async move {
            let result = booter.boot().await;
            {
                let mut slot = shared.slot.lock();
                let mut last_error = shared.last_error.lock();
                match &result {
                    Ok(sandbox) => {
                        *slot = Slot::Ready(Arc::clone(sandbox));
                        *last_error = None;
                        tracing::info!("sandbox ready");
                    }
                    Err(err) => {
                        *slot = Slot::Empty;
                        *last_error = Some(err.clone());
                        tracing::warn!(error = %err, "sandbox boot failed");
                    }
                }
            }
            tx.send_replace(Some(result));
        });
    }
}
