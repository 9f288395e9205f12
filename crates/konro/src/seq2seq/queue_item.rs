//! Queued generation requests and their result channels.

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// One queued request: the input to process plus the channel results flow
/// back through.
///
/// Items are identified by a UUID so queue bookkeeping never depends on
/// the input payload.
#[derive(Debug)]
pub(crate) struct QueueItem<I, O> {
    id: Uuid,
    input: I,
    sender: UnboundedSender<O>,
}

impl<I, O> QueueItem<I, O> {
    pub fn new(input: I, sender: UnboundedSender<O>) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            sender,
        }
    }

    #[allow(dead_code)]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Splits the item into the input and its result channel.
    pub fn into_parts(self) -> (I, UnboundedSender<O>) {
        (self.input, self.sender)
    }
}

impl<I, O> PartialEq for QueueItem<I, O> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<I, O> Eq for QueueItem<I, O> {}
