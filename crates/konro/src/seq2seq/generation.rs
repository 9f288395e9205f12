//! The queued, single-flight generation front end.

use super::core_trait::Seq2SeqModel;
use super::decoding::{GenerationConfig, run_decoding};
use super::queue_item::QueueItem;
use super::sampler::Sampler;
use super::stream::{OutputStream, TokenStream};
use crate::core::{Pill, WorkerHandle};
use crate::error::Result;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::debug;

type Request = QueueItem<Vec<i64>, Result<i64>>;

/// Composes a [`Seq2SeqModel`] and a [`Sampler`] into a generation service.
///
/// One orchestrator owns exactly one in-flight generation and exactly one
/// key/value cache at a time. Submissions beyond the one in flight are
/// queued and served strictly in order by a background worker; they are
/// never interleaved. Dropping the orchestrator shuts the worker down.
pub struct Seq2SeqOrchestrator {
    waiting: Arc<Mutex<VecDeque<Request>>>,
    handle: WorkerHandle,
}

impl Seq2SeqOrchestrator {
    /// Builds the orchestrator and spawns its generation worker.
    ///
    /// Must be called within a tokio runtime. The model, sampler, and
    /// generation limits are fixed for the orchestrator's lifetime.
    pub fn new<M, S>(model: M, sampler: S, config: GenerationConfig) -> Self
    where
        M: Seq2SeqModel + 'static,
        S: Sampler + 'static,
    {
        let waiting: Arc<Mutex<VecDeque<Request>>> = Default::default();

        let pill = Pill::new();
        let handle = WorkerHandle::new({
            let waiting = waiting.clone();
            move |running, notifier| {
                tokio::spawn(async move {
                    let _pill = pill;
                    generation_loop(model, sampler, config, running, notifier, waiting).await;
                })
            }
        });

        Self { waiting, handle }
    }

    /// Queues one generation request and returns its token stream.
    ///
    /// The call returns immediately; decoding happens on the worker and
    /// tokens arrive on the stream as they are selected. Dropping the
    /// stream cancels the generation at its next step.
    pub async fn submit(&self, input_ids: Vec<i64>) -> TokenStream {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut waiting = self.waiting.lock().await;
            waiting.push_back(QueueItem::new(input_ids, tx));
        }
        self.handle.notify();
        OutputStream::new(rx)
    }

    /// Runs one generation to completion and returns all tokens.
    pub async fn generate(&self, input_ids: Vec<i64>) -> Result<Vec<i64>> {
        let mut stream = self.submit(input_ids).await;
        let mut tokens = Vec::new();
        while let Some(item) = stream.next().await {
            tokens.push(item?);
        }
        Ok(tokens)
    }
}

/// Drains the queue one request at a time.
///
/// The cache for a request lives entirely inside its `run_decoding` call
/// frame, so there is nothing to roll back when a request is cancelled or
/// fails; the next request starts from a clean state.
async fn generation_loop<M, S>(
    model: M,
    sampler: S,
    config: GenerationConfig,
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
    waiting: Arc<Mutex<VecDeque<Request>>>,
) where
    M: Seq2SeqModel,
    S: Sampler,
{
    while running.load(Ordering::SeqCst) {
        let next = {
            let mut waiting = waiting.lock().await;
            waiting.pop_front()
        };

        match next {
            None => {
                // nothing queued; wake on notify or re-check periodically
                let _ = tokio::time::timeout(Duration::from_millis(100), notifier.notified()).await;
            }
            Some(item) => {
                let (input_ids, sender) = item.into_parts();
                debug!(input_len = input_ids.len(), "generation dequeued");
                let outcome =
                    run_decoding(&model, &sampler, &config, &input_ids, |token| sender.send(Ok(token)).is_ok())
                        .await;
                if let Err(err) = outcome {
                    let _ = sender.send(Err(err));
                }
            }
        }
    }
}
