use std::time::Duration;

use crate::error::SourceError;
use crate::relay::Packet;
use crate::session::Session;
use crate::supervisor::{ReconnectState, State};

/// Receiver of everything a [`Source`](crate::Source) produces.
///
/// Callbacks run on the source's worker threads and must not block for
/// long: `on_packet` runs on the delivery thread, so a slow implementation
/// fills the queue and causes drops, never back-pressure on the network.
pub trait Parent: Send + Sync + 'static {
    /// A relayed RTP or RTCP packet, in arrival order per receive path.
    fn on_packet(&self, packet: Packet);

    /// PLAY succeeded; media is about to flow.
    fn on_ready(&self, _session: &Session) {}

    /// The session that was announced by `on_ready` has ended.
    fn on_not_ready(&self) {}

    /// Every lifecycle transition, starting with `Connecting`.
    fn on_state(&self, _state: State) {}

    /// A terminal error. Called at most once, right before `Terminated`.
    fn on_error(&self, _error: &SourceError) {}

    /// Pause before the next connection attempt; `None` stops the source.
    ///
    /// `default` is the configured retry pause.
    fn reconnect_delay(&self, _reconnect: &ReconnectState, default: Duration) -> Option<Duration> {
        Some(default)
    }
}
