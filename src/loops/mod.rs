//! Target Production Loops (§4.4, §4.5): SIMPLE and ADVANCE strategies
//! layered on the Model.
//!
//! Grounded on `pipeline/processing_loop.rs::ProcessingLoop<H>`: a
//! generic tick -> cycle -> reconcile skeleton, honoring one
//! `CancellationToken` and exiting cleanly on cancellation, propagating
//! the first fatal error as an `Err` for the caller to turn into a
//! FAULT transition (this crate's `state_machine::Csc::resume` spawns a
//! supervisor that awaits the loop's `JoinHandle` and promotes any
//! `Err` to FAULT).

pub mod advance;
pub mod simple;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::SchedulerError;

/// Shared tick loop: sleep, check cancellation, run one cycle. Returns
/// `Ok(())` on clean cancellation, `Err(e)` on the first cycle failure
/// (the caller promotes this to FAULT with `e.code(..)`).
pub(crate) async fn drive<F>(token: CancellationToken, tick: Duration, mut cycle: F) -> Result<(), SchedulerError>
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), SchedulerError>> + Send + '_>>,
{
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("production loop cancelled, exiting cleanly");
                return Ok(());
            }
            _ = tokio::time::sleep(tick) => {}
        }

        if token.is_cancelled() {
            info!("production loop cancelled, exiting cleanly");
            return Ok(());
        }

        cycle().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn drive_stops_on_cancellation_without_running_a_cycle_after() {
        let token = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let token_for_cycle = token.clone();
        let count_for_cycle = count.clone();

        let handle = tokio::spawn(drive(token.clone(), Duration::from_millis(5), move || {
            let count = count_for_cycle.clone();
            let token = token_for_cycle.clone();
            Box::pin(async move {
                let n = count.fetch_add(1, Ordering::SeqCst);
                if n >= 2 {
                    token.cancel();
                }
                Ok(())
            })
        }));

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn drive_propagates_cycle_error() {
        use crate::errors::{ConfigError, SchedulerError};

        let token = CancellationToken::new();
        let result = drive(token, Duration::from_millis(1), || {
            Box::pin(async { Err(SchedulerError::Config(ConfigError::Schema("boom".to_string()))) })
        })
        .await;
        assert!(result.is_err());
    }
}
