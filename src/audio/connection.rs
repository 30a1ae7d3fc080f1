use serenity::model::id::ChannelId;

use crate::{error::PlayerError, voice::VoiceLink};

/// Observable voice state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    Disconnected,
    Connected(ChannelId),
    /// A connect or relocation is in flight. `from` is `None` for a first connect.
    Moving {
        from: Option<ChannelId>,
        to: ChannelId,
    },
}

/// Identifies one uninterrupted stretch of connection. Every disconnect
/// starts a new one; relocations keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEpoch(u64);

/// An in-flight connect/move, created by [`VoiceSlot::begin`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transition {
    ticket: u64,
    epoch: u64,
    pub from: Option<ChannelId>,
    pub to: ChannelId,
}

/// Owns a session's voice link and its connection lifecycle.
///
/// While a transition is in flight the link is held by whoever started it,
/// outside the session lock. `epoch` is bumped by every disconnect, so a
/// transition that completes after a disconnect can tell it lost the race.
pub(crate) struct VoiceSlot {
    link: Option<Box<dyn VoiceLink>>,
    transition: Option<Transition>,
    epoch: u64,
    next_ticket: u64,
}

impl VoiceSlot {
    pub fn new() -> Self {
        Self {
            link: None,
            transition: None,
            epoch: 0,
            next_ticket: 0,
        }
    }

    pub fn status(&self) -> VoiceStatus {
        match (&self.transition, &self.link) {
            (Some(t), _) => VoiceStatus::Moving {
                from: t.from,
                to: t.to,
            },
            (None, Some(link)) => VoiceStatus::Connected(link.channel_id()),
            (None, None) => VoiceStatus::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status(), VoiceStatus::Connected(_))
    }

    pub fn epoch(&self) -> ConnectionEpoch {
        ConnectionEpoch(self.epoch)
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.link.as_ref().map(|link| link.channel_id())
    }

    /// The live link, or why there is none.
    pub fn require(&self) -> Result<&dyn VoiceLink, PlayerError> {
        if self.transition.is_some() {
            return Err(PlayerError::Relocating);
        }
        self.link.as_deref().ok_or(PlayerError::NotConnected)
    }

    pub fn link_mut(&mut self) -> Option<&mut (dyn VoiceLink + 'static)> {
        self.link.as_deref_mut()
    }

    /// Enters `MOVING` and hands out the current link, if any.
    pub fn begin(
        &mut self,
        to: ChannelId,
    ) -> Result<(Transition, Option<Box<dyn VoiceLink>>), PlayerError> {
        if self.transition.is_some() {
            return Err(PlayerError::Relocating);
        }

        self.next_ticket += 1;
        let transition = Transition {
            ticket: self.next_ticket,
            epoch: self.epoch,
            from: self.channel_id(),
            to,
        };
        self.transition = Some(transition);
        Ok((transition, self.link.take()))
    }

    /// Installs the link produced by a successful transition. Gives the link
    /// back if a disconnect happened in the meantime; the caller must close it.
    pub fn complete(
        &mut self,
        transition: Transition,
        link: Box<dyn VoiceLink>,
    ) -> Result<(), Box<dyn VoiceLink>> {
        self.end(transition);
        if transition.epoch != self.epoch {
            return Err(link);
        }
        self.link = Some(link);
        Ok(())
    }

    /// Leaves `MOVING` after a failed transition, restoring the prior link.
    /// Returns a link the caller must close when a disconnect won the race.
    pub fn abort(
        &mut self,
        transition: Transition,
        prior: Option<Box<dyn VoiceLink>>,
    ) -> Option<Box<dyn VoiceLink>> {
        self.end(transition);
        if transition.epoch != self.epoch {
            return prior;
        }
        self.link = prior;
        None
    }

    /// Drops the link and cancels any transition. Returns the link to close
    /// and whether a transition was cancelled.
    pub fn detach(&mut self) -> (Option<Box<dyn VoiceLink>>, bool) {
        self.epoch += 1;
        let cancelled = self.transition.take().is_some();
        (self.link.take(), cancelled)
    }

    fn end(&mut self, transition: Transition) {
        if self.transition.is_some_and(|t| t.ticket == transition.ticket) {
            self.transition = None;
        }
    }
}
