use engine_core::shutdown::CancellationController;
use engine_runtime::execution::summary::ImportStatus;
use tokio::signal;
use tracing::{info, warn};

/// Listens for SIGINT and SIGTERM and interrupts the running import.
///
/// Workers are never killed; the controller stops readers and writers at
/// their next suspension point and the run ends as interrupted.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    controller: CancellationController,
}

impl ShutdownCoordinator {
    pub fn new(controller: CancellationController) -> Self {
        Self { controller }
    }

    pub fn register_handlers(&self) {
        let controller = self.controller.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(err) = signal::ctrl_c().await {
                    warn!(error = %err, "Failed to install SIGINT handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(err) => {
                        warn!(error = %err, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C), interrupting import");
                }
                _ = terminate => {
                    info!("Received SIGTERM, interrupting import");
                }
            }

            if controller.interrupt() {
                info!(writers = controller.alive_writers(), "Interrupt sent to all workers");
            }
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.controller.is_interrupted()
    }
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_status(status: ImportStatus) -> Self {
        match status {
            ImportStatus::Completed => ExitCode::Success,
            ImportStatus::Failed => ExitCode::GeneralError,
            ImportStatus::Interrupted => ExitCode::ShutdownRequested,
        }
    }
}
