use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{Instrument as _, debug, error, info, warn};

use crate::errors::StreamFailure;
use crate::metrics::RelayMetrics;
use crate::model::{ModelRef, RelayOptions};
use crate::provider::{ProviderAdapter, ProviderEvent, ProviderEventStream, ProviderRequest};
use crate::stream::OutputEvent;

/// How long a stalled consumer gets to take the sentinel once the request
/// deadline has passed.
const DONE_GRACE: Duration = Duration::from_secs(1);

/// Handle used to request cancellation of a running transcode.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The upstream connection is closed and the stream ends with
    /// `OutputEvent::Done`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Lazy sequence of `OutputEvent`s for one chat request.
///
/// Yields text deltas in upstream order followed by exactly one
/// `OutputEvent::Done`. Dropping the stream cancels the upstream call.
pub struct TranscodeStream {
    request_id: uuid::Uuid,
    model: ModelRef,
    rx: mpsc::Receiver<OutputEvent>,
    abort_handle: AbortHandle,
    finished: bool,
}

impl TranscodeStream {
    pub(crate) fn spawn(
        provider: Arc<dyn ProviderAdapter>,
        request: ProviderRequest,
        options: RelayOptions,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.stream_buffer_capacity);
        let (abort_tx, abort_rx) = watch::channel(false);
        let request_id = request.request_id;
        let model = request.model.clone();
        let span = tracing::info_span!(
            "transcode",
            request_id = %request_id,
            provider = %model.provider,
            model = %model.model,
        );
        tokio::spawn(
            transcode_task(provider, request, options, metrics, tx, abort_rx).instrument(span),
        );

        Self {
            request_id,
            model,
            rx,
            abort_handle: AbortHandle { tx: abort_tx },
            finished: false,
        }
    }

    /// Returns the id used in logs for this request.
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Returns the upstream model the request resolved to.
    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Returns a handle that can cancel the transcode.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for and returns the next event; `None` after `Done` was yielded.
    pub async fn next_event(&mut self) -> Option<OutputEvent> {
        self.next().await
    }

    /// Drains the stream and returns the concatenated reply text.
    pub async fn collect_text(mut self) -> String {
        let mut out = String::new();
        while let Some(event) = self.next_event().await {
            if let OutputEvent::Text { text } = event {
                out.push_str(&text);
            }
        }
        out
    }
}

impl futures::Stream for TranscodeStream {
    type Item = OutputEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<OutputEvent>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            // The task went away without a sentinel (cancelled or panicked).
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(OutputEvent::Done))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

async fn transcode_task(
    provider: Arc<dyn ProviderAdapter>,
    request: ProviderRequest,
    options: RelayOptions,
    metrics: Arc<RelayMetrics>,
    tx: mpsc::Sender<OutputEvent>,
    mut abort_rx: watch::Receiver<bool>,
) {
    metrics.record_started();
    let deadline = Instant::now() + options.request_timeout;

    match pump(
        provider,
        request,
        options.idle_timeout,
        deadline,
        &metrics,
        &tx,
        &mut abort_rx,
    )
    .await
    {
        Ok(text_events) => {
            metrics.record_completed();
            info!(text_events, "stream completed");
        }
        Err(StreamFailure::Cancelled) => {
            metrics.record_failure(StreamFailure::Cancelled);
            info!("stream cancelled by consumer");
        }
        Err(failure) => {
            metrics.record_failure(failure);
        }
    }

    let give_up = deadline.max(Instant::now() + DONE_GRACE);
    if !send_done(&tx, give_up).await {
        debug!("consumer did not take the sentinel; closing the channel instead");
    }
}

/// Queues the sentinel unless the consumer stays stalled past `give_up`.
///
/// Returns `false` when it was not queued. The channel then closes with the
/// task and `TranscodeStream` yields the sentinel itself.
async fn send_done(tx: &mpsc::Sender<OutputEvent>, give_up: Instant) -> bool {
    matches!(
        tokio::time::timeout_at(give_up, tx.send(OutputEvent::Done)).await,
        Ok(Ok(()))
    )
}

/// Relays increments until the upstream finishes. Returns the number of text
/// events sent. The upstream stream is dropped, closing its connection, on
/// every return path.
async fn pump(
    provider: Arc<dyn ProviderAdapter>,
    request: ProviderRequest,
    idle_timeout: Option<Duration>,
    deadline: Instant,
    metrics: &RelayMetrics,
    tx: &mpsc::Sender<OutputEvent>,
    abort_rx: &mut watch::Receiver<bool>,
) -> Result<u64, StreamFailure> {
    let started = tokio::select! {
        biased;
        _ = tx.closed() => return Err(StreamFailure::Cancelled),
        _ = aborted(abort_rx) => return Err(StreamFailure::Cancelled),
        started = tokio::time::timeout_at(deadline, provider.start_stream(request)) => started,
    };
    let mut handle = match started {
        Ok(Ok(handle)) => handle,
        Ok(Err(err)) => {
            let failure = StreamFailure::from(&err);
            log_failure(failure, &err);
            return Err(failure);
        }
        Err(_) => {
            warn!("upstream did not accept the request before the deadline");
            return Err(StreamFailure::UpstreamTimeout);
        }
    };

    let mut text_events = 0_u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => return Err(StreamFailure::Cancelled),
            _ = aborted(abort_rx) => return Err(StreamFailure::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                warn!("upstream stream exceeded the request deadline");
                return Err(StreamFailure::UpstreamTimeout);
            }
            next = next_increment(&mut handle.stream, idle_timeout) => next,
        };

        let Some(next) = next else {
            warn!("upstream stream went idle");
            return Err(StreamFailure::UpstreamTimeout);
        };
        match next {
            Some(Ok(ProviderEvent::TextDelta { text })) => {
                if text.is_empty() {
                    continue;
                }
                debug!(seq = text_events, "relaying text delta");
                tokio::select! {
                    biased;
                    _ = aborted(abort_rx) => return Err(StreamFailure::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!("consumer did not drain the stream before the deadline");
                        return Err(StreamFailure::UpstreamTimeout);
                    }
                    sent = tx.send(OutputEvent::text(text)) => {
                        if sent.is_err() {
                            return Err(StreamFailure::Cancelled);
                        }
                    }
                }
                metrics.record_text_event();
                text_events += 1;
            }
            Some(Ok(ProviderEvent::Malformed { reason })) => {
                metrics.record_malformed();
                warn!(%reason, "skipping malformed upstream increment");
            }
            Some(Ok(ProviderEvent::Completed)) => return Ok(text_events),
            Some(Err(err)) => {
                let failure = StreamFailure::from(&err);
                log_failure(failure, &err);
                return Err(failure);
            }
            None => {
                debug!("upstream closed without a termination marker");
                return Ok(text_events);
            }
        }
    }
}

/// `None` when the idle window elapsed before the next increment.
async fn next_increment(
    stream: &mut ProviderEventStream,
    idle_timeout: Option<Duration>,
) -> Option<Option<Result<ProviderEvent, crate::ProviderError>>> {
    match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, stream.next()).await.ok(),
        None => Some(stream.next().await),
    }
}

/// Resolves once an abort was requested; never if the handle is gone.
async fn aborted(abort_rx: &mut watch::Receiver<bool>) {
    if abort_rx.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn log_failure(failure: StreamFailure, err: &crate::ProviderError) {
    match failure {
        StreamFailure::UpstreamTimeout => warn!(?failure, error = %err, "upstream timed out"),
        _ => error!(?failure, error = %err, "upstream failed"),
    }
}
