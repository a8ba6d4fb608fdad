use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::grouping::ConsolidatedItem;
use crate::processor::{self, ProcessError};

/// Work executed on the relay loop. Every outbound channel send goes through
/// one of these, no matter where it originated.
#[derive(Debug)]
pub enum RelayJob {
    /// A consolidated photo from the inbound message pipeline.
    Consolidated(ConsolidatedItem),
    /// A pre-resolved send scheduled by the webhook ingest server. The
    /// oneshot carries the outcome back to the blocked HTTP handler.
    WebhookSend {
        file_url: String,
        caption: String,
        reply: oneshot::Sender<Result<(), ProcessError>>,
    },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("relay queue is full or closed")]
    QueueUnavailable,
    #[error("timed out waiting for the relay loop")]
    Timeout,
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Cloneable producer side of the relay loop.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayJob>,
}

pub fn channel(capacity: usize) -> (RelayHandle, mpsc::Receiver<RelayJob>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RelayHandle { tx }, rx)
}

impl RelayHandle {
    pub async fn submit_consolidated(&self, item: ConsolidatedItem) -> bool {
        self.tx.send(RelayJob::Consolidated(item)).await.is_ok()
    }

    /// Submit-and-await handoff for HTTP handler tasks.
    ///
    /// Both the enqueue and the wait for the outcome are bounded by `timeout`
    /// so a wedged relay loop cannot pin request handlers forever.
    pub async fn submit_webhook_send(
        &self,
        file_url: String,
        caption: String,
        timeout: Duration,
    ) -> Result<(), SubmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send_timeout(
                RelayJob::WebhookSend {
                    file_url,
                    caption,
                    reply: reply_tx,
                },
                timeout,
            )
            .await
            .map_err(|_| SubmitError::QueueUnavailable)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome.map_err(SubmitError::from),
            Ok(Err(_)) => Err(SubmitError::QueueUnavailable),
            Err(_) => Err(SubmitError::Timeout),
        }
    }
}

/// The single consumer over the job queue. Owns all channel posts, so sends
/// triggered by inbound messages and by webhook calls are serialized and
/// never run concurrently with each other.
pub async fn run(bot: Bot, mut jobs: mpsc::Receiver<RelayJob>) {
    while let Some(job) = jobs.recv().await {
        match job {
            RelayJob::Consolidated(item) => {
                let chat_id = item.chat_id;
                let message_id = item.message_id;
                let ack = match processor::process(&bot, &item).await {
                    Ok(ack) => ack,
                    Err(err) => {
                        error!("failed to relay consolidated photo: {err}");
                        format!("Failed to relay: {err}")
                    }
                };
                if let Err(err) = bot
                    .send_message(chat_id, ack)
                    .reply_parameters(ReplyParameters::new(message_id))
                    .await
                {
                    warn!("failed to acknowledge sender: {err}");
                }
            }
            RelayJob::WebhookSend {
                file_url,
                caption,
                reply,
            } => {
                let outcome = processor::send_photo_url(&bot, &file_url, &caption).await;
                if let Err(err) = &outcome {
                    error!("webhook-scheduled send failed: {err}");
                }
                let _ = reply.send(outcome);
            }
        }
    }
    info!("relay loop stopped: job queue closed");
}
