//! Virtual-clock output pacing (§4.3 "Rate-limited output").
//!
//! Grounded directly on `original_source/opm/ircpresence.py`'s
//! `sendLine`/`_sendLines`: a `messageTimer` advances by `messagePenalty`
//! per line sent, lines drain while `messageTimer <= now + messageBurst`,
//! and a single deferred wakeup is scheduled for whatever's left. Twisted's
//! `callLater` becomes a `tokio::time::sleep` raced against new arrivals.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Handle used by the rest of the presence to queue outgoing lines without
/// caring about pacing; the drain loop runs on its own task.
#[derive(Clone)]
pub struct OutputQueue {
    tx: mpsc::UnboundedSender<String>,
    penalty_millis: Arc<AtomicU64>,
}

impl OutputQueue {
    /// Spawn the drain loop writing to `writer`, and return a handle to
    /// queue lines on it. `penalty`/`burst` are the network's configured
    /// `messagePenalty`/`messageBurst` (seconds in the original; kept here
    /// as `Duration`s).
    pub fn spawn<W: AsyncWrite + Unpin + Send + 'static>(
        writer: W,
        penalty: Duration,
        burst: Duration,
        verbose: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let penalty_millis = Arc::new(AtomicU64::new(penalty.as_millis() as u64));
        tokio::spawn(drain_loop(rx, writer, Arc::clone(&penalty_millis), burst, verbose));
        Self { tx, penalty_millis }
    }

    /// Queue a raw line (no trailing `\r\n` — the drain loop adds it).
    pub fn send(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into());
    }

    /// Flood-exempt operators pay no penalty (`irc_RPL_YOUREOPER`, §4.3).
    pub fn set_flood_exempt(&self) {
        self.penalty_millis.store(0, Ordering::Relaxed);
    }
}

async fn drain_loop<W: AsyncWrite + Unpin + Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut writer: W,
    penalty_millis: Arc<AtomicU64>,
    burst: Duration,
    verbose: bool,
) {
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut timer = Instant::now();

    loop {
        if queue.is_empty() {
            match rx.recv().await {
                Some(line) => queue.push_back(line),
                None => return,
            }
        }

        let now = Instant::now();
        if timer < now {
            timer = now;
        }

        while let Some(line) = queue.front() {
            if timer > now + burst {
                break;
            }
            if verbose {
                tracing::debug!(line = %line, "irc out");
            }
            if writer.write_all(line.as_bytes()).await.is_err() {
                return;
            }
            if writer.write_all(b"\r\n").await.is_err() {
                return;
            }
            queue.pop_front();
            let penalty = Duration::from_millis(penalty_millis.load(Ordering::Relaxed));
            timer += penalty;
        }

        if !queue.is_empty() {
            let now = Instant::now();
            let wake_at = timer.checked_sub(burst).unwrap_or(now);
            if wake_at > now {
                tokio::select! {
                    _ = tokio::time::sleep(wake_at - now) => {}
                    maybe = rx.recv() => {
                        match maybe {
                            Some(line) => queue.push_back(line),
                            None if queue.is_empty() => return,
                            None => {}
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn burst_allows_immediate_drain_then_paces_the_rest() {
        let (client, server) = duplex(4096);
        let mut server = server;
        let queue = OutputQueue::spawn(
            client,
            Duration::from_millis(50),
            Duration::from_millis(200),
            false,
        );

        for i in 0..3 {
            queue.send(format!("LINE {i}"));
        }

        let mut buf = [0u8; 4096];
        use tokio::io::AsyncReadExt;
        let n = tokio::time::timeout(Duration::from_millis(500), async {
            let mut total = 0;
            while total < "LINE 0\r\nLINE 1\r\nLINE 2\r\n".len() {
                total += server.read(&mut buf[total..]).await.unwrap();
            }
            total
        })
        .await
        .expect("drain loop did not deliver all lines in time");

        assert_eq!(&buf[..n], b"LINE 0\r\nLINE 1\r\nLINE 2\r\n");
    }
}
