use tokio::sync::broadcast::{self, error::RecvError};

/// A handle that can be used to stop a running simulation.
///
/// Clones are connected: a status sent through any of them reaches every
/// clone that existed at the time it was sent.
#[derive(Debug)]
pub struct Shutdown {
    notify: broadcast::Sender<ExitStatus>,
    /// Subscribed at construction so a status sent before anyone waits is
    /// not lost.
    recv: broadcast::Receiver<ExitStatus>,
    /// Lets [`wait_for_shutdown`](Self::wait_for_shutdown) be called more than
    /// once.
    last_status: Option<ExitStatus>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, recv) = broadcast::channel(1);
        Self {
            notify,
            recv,
            last_status: None,
        }
    }

    /// Sends [`ExitStatus::Exited`] to every connected handle.
    pub fn shut_down(&self) {
        self.shut_down_with_status(ExitStatus::Exited)
    }

    /// Sends `status` to every connected handle.
    pub fn shut_down_with_status(&self, status: ExitStatus) {
        if let Err(e) = self.notify.send(status) {
            tracing::error!("Failed to initiate shutdown: {}", e);
        }
    }

    /// Waits to receive a shutdown status.
    pub async fn wait_for_shutdown(&mut self) -> ExitStatus {
        if let Some(status) = self.last_status {
            return status;
        }
        loop {
            match self.recv.recv().await {
                Ok(status) => {
                    self.last_status = Some(status);
                    return status;
                }
                // Our own sender keeps the channel open.
                Err(RecvError::Closed) => unreachable!(),
                Err(RecvError::Lagged(_)) => (),
            }
        }
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self {
            notify: self.notify.clone(),
            recv: self.notify.subscribe(),
            last_status: self.last_status,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a simulation stopped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ExitStatus {
    /// Every round ran to completion.
    Exited,
    /// The simulation was stopped from outside, e.g. by Ctrl-C.
    Interrupted,
}
