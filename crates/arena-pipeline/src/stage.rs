//! The `Stage` trait and the channel plumbing every stage reads/writes
//! through.

use arena_domain::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::context::SharedContext;
use crate::element::StreamElement;

pub type ElementReceiver = mpsc::Receiver<StreamElement>;
pub type ElementSender = mpsc::Sender<StreamElement>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Transform,
    Accumulate,
    Generate,
    Sink,
    Bidirectional,
}

/// A unit of pipeline computation. Implementations MUST close their
/// output channel on every exit path (dropping `output` does this
/// automatically once `process` returns) and MUST respect cancellation
/// on any blocking send/receive.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> StageKind;
    async fn process(&self, ctx: &SharedContext, input: &mut ElementReceiver, output: &ElementSender) -> Result<()>;
}

/// Receive the next element, returning `Ok(None)` on a closed upstream
/// channel and `Err(Cancelled)` if the cancellation signal fires first.
pub async fn recv_checked(receiver: &mut ElementReceiver, cancel: &CancelToken) -> Result<Option<StreamElement>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(arena_domain::Error::Cancelled("stage receive cancelled".into())),
        element = receiver.recv() => Ok(element),
    }
}

/// Send an element downstream, returning `Err(Cancelled)` if the
/// cancellation signal fires before the send completes, or a soft
/// internal error if the downstream stage has already closed its input.
pub async fn send_checked(sender: &ElementSender, element: StreamElement, cancel: &CancelToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(arena_domain::Error::Cancelled("stage send cancelled".into())),
        result = sender.send(element) => result.map_err(|_| arena_domain::Error::Internal("downstream stage closed its input".into())),
    }
}

/// Drain and forward every remaining input element to `output`
/// unchanged — the common "pass the seed element through" behavior for
/// stages whose real work is mutating the shared `ExecutionContext`
/// rather than transforming stream content.
pub async fn passthrough(input: &mut ElementReceiver, output: &ElementSender, cancel: &CancelToken) -> Result<()> {
    while let Some(element) = recv_checked(input, cancel).await? {
        send_checked(output, element, cancel).await?;
    }
    Ok(())
}
