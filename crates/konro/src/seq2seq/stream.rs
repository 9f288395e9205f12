//! Streaming results back to requesters.

use crate::error::Result;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// An asynchronous stream over the outputs of one queued request.
///
/// Backed by an unbounded channel receiver: polling never blocks the
/// producer, and the stream ends when the producing side drops its sender.
/// Dropping the stream is how a caller abandons a generation mid-loop;
/// the worker notices the closed channel at its next send.
pub struct OutputStream<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> OutputStream<T> {
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self { receiver }
    }
}

impl<T> Stream for OutputStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_recv(cx)
    }
}

/// Generated tokens as they are produced. A failed generation yields one
/// final `Err` item before the stream ends.
pub type TokenStream = OutputStream<Result<i64>>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_sent_items() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = OutputStream::new(rx);

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_stream_ends_when_sender_drops() {
        let (tx, rx) = mpsc::unbounded_channel::<i64>();
        let mut stream = OutputStream::new(rx);
        drop(tx);
        assert_eq!(stream.next().await, None);
    }
}
