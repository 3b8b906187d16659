//! Packet relay between the receive paths and the parent.
//!
//! Receive threads (the control-connection reader for TCP, one reader per
//! socket for UDP) push into a bounded queue; a single delivery thread
//! drains it into [`Parent::on_packet`]. When the queue is full the newest
//! packet is dropped and counted, so a slow parent never stalls the
//! network side.
//!
//! ```text
//! UDP/TCP readers ──try_send──▶ [ bounded queue ] ──▶ delivery ──▶ Parent
//!                      │ full
//!                      ▼
//!                 dropped += 1
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::media::rtp::RtpHeader;
use crate::parent::Parent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Rtp,
    Rtcp,
}

/// One received RTP or RTCP packet, relayed verbatim.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Index into [`Session::medias`](crate::Session::medias).
    pub media: usize,
    pub kind: PacketKind,
    pub payload: Vec<u8>,
    pub received_at: Instant,
}

impl Packet {
    pub fn new(media: usize, kind: PacketKind, payload: Vec<u8>) -> Self {
        Self {
            media,
            kind,
            payload,
            received_at: Instant::now(),
        }
    }

    /// RTP header view; `None` for RTCP or malformed packets.
    pub fn rtp_header(&self) -> Option<RtpHeader> {
        match self.kind {
            PacketKind::Rtp => RtpHeader::parse(&self.payload),
            PacketKind::Rtcp => None,
        }
    }
}

/// Counters that outlive individual sessions.
#[derive(Debug, Default)]
pub struct RelayCounters {
    relayed: AtomicU64,
    dropped: AtomicU64,
}

impl RelayCounters {
    /// Packets handed to the parent.
    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }

    /// Packets discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Time of the last received media packet.
#[derive(Debug)]
pub struct Activity {
    last: Mutex<Instant>,
    received: AtomicBool,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
            received: AtomicBool::new(false),
        }
    }

    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
        self.received.store(true, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        self.last.lock().elapsed()
    }

    /// Whether anything arrived since the session started.
    pub fn received_any(&self) -> bool {
        self.received.load(Ordering::Relaxed)
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle, cloned into every receive path.
#[derive(Clone)]
pub struct Relay {
    tx: Sender<Packet>,
    counters: Arc<RelayCounters>,
    activity: Arc<Activity>,
}

impl Relay {
    /// Enqueue without blocking; drops the packet if the queue is full.
    pub fn push(&self, packet: Packet) {
        self.activity.touch();
        match self.tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!(dropped, "outgoing queue full, dropping packets");
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }
}

/// The delivery thread; ends once every [`Relay`] clone is dropped.
pub struct Delivery {
    handle: JoinHandle<()>,
}

impl Delivery {
    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("packet delivery thread panicked");
        }
    }
}

/// Create the queue and start delivering into `parent`.
///
/// Packets still queued when the session closes are delivered, unless
/// `cancel` has fired, in which case they are discarded.
pub fn spawn(
    capacity: usize,
    parent: Arc<dyn Parent>,
    counters: Arc<RelayCounters>,
    cancel: CancelToken,
) -> (Relay, Delivery) {
    let (tx, rx) = channel::bounded::<Packet>(capacity);
    let delivery_counters = counters.clone();

    let handle = thread::spawn(move || {
        for packet in rx.iter() {
            if cancel.is_cancelled() {
                continue;
            }
            parent.on_packet(packet);
            delivery_counters.relayed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!("packet delivery exited");
    });

    let relay = Relay {
        tx,
        counters,
        activity: Arc::new(Activity::new()),
    };
    (relay, Delivery { handle })
}
