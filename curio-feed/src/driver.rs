//! Background driver: continuation and failure retry timers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use curio_core::error::{CurioError, Result};

use crate::aggregator::FeedAggregator;

const SIGNAL_BUFFER: usize = 16;

/// Signals from the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedSignal {
    /// The reader is close to the end of the displayed items
    NearEnd,
    /// Stop the driver
    Shutdown,
}

/// Handle to a running feed driver.
///
/// The driver hydrates the feed, loads the first window, then keeps going:
/// after each load it waits for the continuation delay (or a
/// [`FeedSignal::NearEnd`]) before loading the next window, and drains the
/// failure queue whenever it comes due.
pub struct FeedHandle {
    signals: mpsc::Sender<FeedSignal>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Spawns a driver for `feed`.
    pub fn spawn(feed: Arc<FeedAggregator>) -> Self {
        let (signals, rx) = mpsc::channel(SIGNAL_BUFFER);
        let task = tokio::spawn(drive(feed, rx));
        Self { signals, task }
    }

    /// Asks for the next window now.
    pub async fn near_end(&self) -> Result<()> {
        self.signals
            .send(FeedSignal::NearEnd)
            .await
            .map_err(|_| CurioError::InternalError("feed driver stopped".into()))
    }

    /// Returns true if the driver task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the driver and waits for it to finish the current step.
    pub async fn shutdown(self) {
        // a closed channel means the driver is already gone
        let _ = self.signals.send(FeedSignal::Shutdown).await;
        if let Err(e) = self.task.await {
            debug!(error = %e, "Feed driver ended abnormally");
        }
    }
}

async fn drive(feed: Arc<FeedAggregator>, mut signals: mpsc::Receiver<FeedSignal>) {
    feed.hydrate().await;
    feed.load_more().await;

    loop {
        let continue_loading = feed.has_more();
        let retry_in = feed.retry_due_in();

        tokio::select! {
            signal = signals.recv() => match signal {
                Some(FeedSignal::NearEnd) => {
                    feed.load_more().await;
                }
                Some(FeedSignal::Shutdown) | None => break,
            },
            _ = tokio::time::sleep(feed.config().continuation_delay), if continue_loading => {
                feed.load_more().await;
            }
            _ = tokio::time::sleep(retry_in.unwrap_or_default()), if retry_in.is_some() => {
                feed.process_failures().await;
            }
        }
    }

    feed.flush().await;
    info!("Feed driver stopped");
}
