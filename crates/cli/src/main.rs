use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::Parser;
use rtsp_source::range::parse_duration;
use rtsp_source::{
    Packet, PacketKind, Parent, RangeType, Session, Source, SourceConfig, SourceError, State,
    TransportPreference,
};

#[derive(Parser)]
#[command(
    name = "rtsp-pull",
    about = "Pull an RTSP stream and log the packets it relays"
)]
struct Args {
    /// Source URL (rtsp:// or rtsps://), credentials may be embedded
    url: String,

    /// Lower transport: udp, tcp or auto
    #[arg(long, short, default_value = "auto")]
    transport: TransportPreference,

    /// Maximum silence on the data path before reconnecting
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    read_timeout: Duration,

    /// Maximum stall writing control or keepalive data
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    write_timeout: Duration,

    /// Capacity of the outgoing packet queue
    #[arg(long, default_value_t = 512)]
    queue_size: usize,

    /// Range type sent with PLAY: none, clock, npt or smpte
    #[arg(long, default_value = "none")]
    range_type: RangeType,

    /// Range start, e.g. 20230812T120000Z (clock) or 350ms (npt, smpte)
    #[arg(long, default_value = "")]
    range_start: String,

    /// SHA-256 fingerprint of the server certificate to pin (rtsps)
    #[arg(long)]
    fingerprint: Option<String>,

    /// Pause between reconnect attempts
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    retry_pause: Duration,
}

/// Logs what the source reports; every 100th RTP packet is logged.
#[derive(Default)]
struct LogParent {
    packets: AtomicU64,
}

impl Parent for LogParent {
    fn on_packet(&self, packet: Packet) {
        let count = self.packets.fetch_add(1, Ordering::Relaxed) + 1;
        if packet.kind != PacketKind::Rtp || count % 100 != 1 {
            return;
        }
        if let Some(header) = packet.rtp_header() {
            tracing::info!(
                media = packet.media,
                count,
                seq = header.sequence_number,
                ts = header.timestamp,
                pt = header.payload_type,
                len = packet.payload.len(),
                "rtp"
            );
        }
    }

    fn on_ready(&self, session: &Session) {
        for (index, media) in session.medias.iter().enumerate() {
            tracing::info!(
                index,
                kind = %media.media.kind,
                codecs = %media.media.codecs(),
                control = %media.control_url,
                "medium"
            );
        }
    }

    fn on_state(&self, state: State) {
        tracing::info!(%state, "state");
    }

    fn on_error(&self, error: &SourceError) {
        tracing::error!(%error, "source stopped");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut builder = SourceConfig::builder(&args.url)
        .transport(args.transport)
        .read_timeout(args.read_timeout)
        .write_timeout(args.write_timeout)
        .queue_size(args.queue_size)
        .range(args.range_type, &args.range_start)
        .retry_pause(args.retry_pause);
    if let Some(fingerprint) = &args.fingerprint {
        builder = builder.fingerprint(fingerprint);
    }
    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    let mut source = Source::new(config, Arc::new(LogParent::default()));
    if let Err(e) = source.start() {
        eprintln!("Failed to start source: {e}");
        std::process::exit(1);
    }

    println!("Pulling {} - press Enter to stop", source.config().url);
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        eprintln!("Failed to read stdin: {e}");
    }

    source.stop();
    let stats = source.stats();
    println!(
        "relayed {} packets, dropped {}",
        stats.packets_relayed, stats.packets_dropped
    );
}
