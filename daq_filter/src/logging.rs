use std::io::{self, Write};
use std::str::FromStr;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

struct ChannelWriter {
    tx: UnboundedSender<String>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf).into_owned();
        // The receiving side may already be gone during shutdown.
        let _ = self.tx.send(line);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Parse a configured level name, falling back to `info` for anything unknown.
pub fn parse_level(level: &str) -> Level {
    Level::from_str(level.trim()).unwrap_or(Level::INFO)
}

/// Initialize logging at the configured level. If a channel is provided, log output is
/// forwarded to the channel instead of standard output, so the surrounding DAQ process can ship
/// it with its other messages.
///
/// Returns false when a global subscriber was already installed.
pub fn init_logging(level: &str, forward: Option<UnboundedSender<String>>) -> bool {
    let max_level = LevelFilter::from_level(parse_level(level));
    let installed = if let Some(tx) = forward {
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || ChannelWriter { tx: tx.clone() });
        tracing_subscriber::registry()
            .with(layer)
            .with(max_level)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(max_level)
            .try_init()
    };
    installed.is_ok()
}
