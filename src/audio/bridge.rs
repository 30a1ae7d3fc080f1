//! Playback completion bridge.
//!
//! The voice transport reports the end of a render from its own event
//! threads. Those callbacks only push a [`RenderFinished`] message into the
//! owning session's channel; a single pump task per session drains the
//! channel and feeds the messages to the state machine one at a time, under
//! the session lock.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::debug;

use super::session::GuildSession;

/// Identifies one render of one track. A new id is allocated for every
/// render, including a restart of the same track.
pub type RenderId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFinished {
    pub render_id: RenderId,
    /// Set when the transport ended the render because of a failure.
    pub error: Option<String>,
}

/// Handed to the transport together with a render request.
///
/// Clones share the delivery flag, so a render reported both as "errored"
/// and as "ended" still produces a single message.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    render_id: RenderId,
    sender: UnboundedSender<RenderFinished>,
    delivered: Arc<AtomicBool>,
}

impl CompletionNotifier {
    pub(crate) fn new(render_id: RenderId, sender: UnboundedSender<RenderFinished>) -> Self {
        Self {
            render_id,
            sender,
            delivered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn render_id(&self) -> RenderId {
        self.render_id
    }

    /// Never blocks and may be called from any thread.
    pub fn notify(&self, error: Option<String>) {
        if self.delivered.swap(true, Ordering::AcqRel) {
            return;
        }

        let message = RenderFinished {
            render_id: self.render_id,
            error,
        };
        if self.sender.send(message).is_err() {
            debug!("Render {} finished after its session was dropped", self.render_id);
        }
    }
}

pub(crate) fn completion_channel() -> (UnboundedSender<RenderFinished>, UnboundedReceiver<RenderFinished>) {
    mpsc::unbounded_channel()
}

/// Drains completion messages into the session until it is dropped.
pub(crate) fn spawn_pump(
    session: Weak<GuildSession>,
    mut completions: UnboundedReceiver<RenderFinished>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(finished) = completions.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            session.on_render_finished(finished).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifies_once_across_clones() {
        let (tx, mut rx) = completion_channel();
        let notifier = CompletionNotifier::new(7, tx);
        let on_error = notifier.clone();

        on_error.notify(Some("stream reset".into()));
        notifier.notify(None);

        assert_eq!(
            rx.recv().await,
            Some(RenderFinished {
                render_id: 7,
                error: Some("stream reset".into()),
            })
        );
        drop(notifier);
        drop(on_error);
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn notify_without_receiver_is_silent() {
        let (tx, rx) = completion_channel();
        drop(rx);
        CompletionNotifier::new(1, tx).notify(None);
    }
}
