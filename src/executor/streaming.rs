use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::SqlTemplateError;
use crate::results::CustomDbRow;

/// Consumer of a streamed result.
///
/// Every row comes with a [`RowAck`]. While the configured number of rows is unacknowledged the
/// engine stops pulling rows from the database. Acknowledge by calling [`RowAck::ack`] or by
/// dropping the ack, possibly from another task.
///
/// Closures taking `(CustomDbRow, RowAck)` implement this trait with a no-op `on_end`.
pub trait RowHandler {
    fn on_row(&mut self, row: CustomDbRow, ack: RowAck);

    /// Called once after the last row, when every row has been acknowledged.
    fn on_end(&mut self) {}
}

impl<F> RowHandler for F
where
    F: FnMut(CustomDbRow, RowAck),
{
    fn on_row(&mut self, row: CustomDbRow, ack: RowAck) {
        self(row, ack);
    }
}

/// Acknowledgment for one delivered row. Releases its slot exactly once: on [`RowAck::ack`] or on
/// drop, whichever comes first.
#[derive(Debug)]
pub struct RowAck {
    in_flight: Arc<watch::Sender<usize>>,
}

impl RowAck {
    pub fn ack(self) {
        drop(self);
    }
}

impl Drop for RowAck {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Per-call streaming knobs.
///
/// ```rust
/// use std::time::Duration;
/// use sql_templates::prelude::*;
///
/// let options = StreamOptions::default()
///     .with_max_concurrency(4)
///     .with_ack_timeout(Duration::from_secs(5));
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Unacknowledged rows allowed before the cursor pauses. `None` never pauses.
    pub max_concurrency: Option<NonZeroUsize>,
    /// Longest wait for an acknowledgment, while paused or while draining at the end.
    pub ack_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl StreamOptions {
    /// `0` means unbounded.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = NonZeroUsize::new(max);
        self
    }

    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Outcome of a completed streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    pub rows_delivered: usize,
    /// Times the cursor waited for acknowledgments before pulling the next row.
    pub pauses: usize,
}

/// State of one streaming request.
pub(crate) struct StreamingSession {
    in_flight: Arc<watch::Sender<usize>>,
    acks: watch::Receiver<usize>,
    max: Option<NonZeroUsize>,
    ack_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    summary: StreamSummary,
}

impl StreamingSession {
    pub(crate) fn new(options: &StreamOptions) -> Self {
        let (tx, rx) = watch::channel(0usize);
        Self {
            in_flight: Arc::new(tx),
            acks: rx,
            max: options.max_concurrency,
            ack_timeout: options.ack_timeout,
            cancel: options.cancel.clone(),
            summary: StreamSummary::default(),
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        *self.acks.borrow()
    }

    pub(crate) fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub(crate) fn deliver<H: RowHandler + ?Sized>(&mut self, handler: &mut H, row: CustomDbRow) {
        self.in_flight.send_modify(|n| *n += 1);
        self.summary.rows_delivered += 1;
        handler.on_row(
            row,
            RowAck {
                in_flight: Arc::clone(&self.in_flight),
            },
        );
    }

    /// Pause while the unacknowledged count is at the limit.
    pub(crate) async fn wait_for_capacity(&mut self) -> Result<(), SqlTemplateError> {
        let Some(max) = self.max else {
            return Ok(());
        };
        if self.in_flight() < max.get() {
            return Ok(());
        }
        self.summary.pauses += 1;
        tracing::trace!(
            in_flight = self.in_flight(),
            max = max.get(),
            "pausing row production"
        );
        self.wait_until(|n| *n < max.get()).await
    }

    /// Wait until every delivered row has been acknowledged.
    pub(crate) async fn drain(&mut self) -> Result<(), SqlTemplateError> {
        self.wait_until(|n| *n == 0).await
    }

    pub(crate) fn summary(&self) -> StreamSummary {
        self.summary
    }

    async fn wait_until(
        &mut self,
        ready: impl FnMut(&usize) -> bool,
    ) -> Result<(), SqlTemplateError> {
        let ack_timeout = self.ack_timeout;
        let cancel = self.cancel.clone();
        let acks = &mut self.acks;

        let bounded = async move {
            // The session owns a sender, so the channel cannot close underneath us.
            let wait = async {
                let _ = acks.wait_for(ready).await;
            };
            match ack_timeout {
                Some(limit) => tokio::time::timeout(limit, wait)
                    .await
                    .map_err(|_| SqlTemplateError::AckTimeout(limit)),
                None => {
                    wait.await;
                    Ok(())
                }
            }
        };

        match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(SqlTemplateError::Cancelled),
                res = bounded => res,
            },
            None => bounded.await,
        }
    }
}
