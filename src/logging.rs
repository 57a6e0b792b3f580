// Logging setup for p2shuffle
// Info and up goes to stderr; --debug sends everything to a log file instead

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::Level;

pub const LOG_FILE_PATH: &str = "/tmp/p2shuffle-debug.log";

/// Install the global subscriber
///
/// With `debug` the log file is truncated and a header written, so
/// `tail -f` shows one session at a time.
pub fn init(debug: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_target(false);

    if !debug {
        builder
            .with_max_level(Level::INFO)
            .with_writer(io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(LOG_FILE_PATH)?;

    writeln!(file, "=== p2shuffle debug log ===")?;
    writeln!(file, "Session started: {:?}", SystemTime::now())?;
    writeln!(file, "To monitor: tail -f {}", LOG_FILE_PATH)?;
    writeln!(file, "===========================\n")?;

    builder
        .with_max_level(Level::DEBUG)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
