//! RTSP pull source: connects to a remote camera or server, negotiates a
//! session and relays the received RTP/RTCP packets to a [`Parent`].

pub mod auth;
pub mod cancel;
pub mod config;
pub mod error;
pub mod handshake;
pub mod media;
pub mod parent;
pub mod protocol;
pub mod range;
pub mod relay;
pub mod resolver;
pub mod session;
pub mod source;
pub mod supervisor;
pub mod transport;

pub use config::{SourceConfig, SourceConfigBuilder, TransportPreference};
pub use error::{ErrorKind, Result, SourceError, TimeoutKind};
pub use parent::Parent;
pub use range::{RangeType, build_range};
pub use relay::{Packet, PacketKind};
pub use resolver::{Credentials, SourceUrl};
pub use session::{Session, SessionMedia};
pub use source::{Source, SourceStats};
pub use supervisor::{ReconnectState, State};
