//! Operator console input
//!
//! Reads stdin line by line on its own task and forwards non-blank lines to
//! the lifecycle loop exactly as typed, minus the line terminator.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Start reading stdin; the receiver closes on EOF
pub fn spawn_stdin_reader(buffer: usize) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(buffer);
    tokio::spawn(async move {
        if let Err(e) = read_lines(tokio::io::stdin(), tx).await {
            error!("Console read failed: {}", e);
        }
    });
    rx
}

/// Forward lines from `reader` until EOF or until the receiver goes away
pub async fn read_lines<R>(reader: R, tx: mpsc::Sender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        debug!("← {}", line);
        if tx.send(line).await.is_err() {
            debug!("Console receiver dropped");
            return Ok(());
        }
    }

    info!("Console reached EOF");
    Ok(())
}
