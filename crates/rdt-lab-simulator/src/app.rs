//! Application side of the link: where the sender's lines come from and
//! where the receiver's data goes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::trace::Trace;

/// Lines waiting to be sent. Closed once the feed has nothing more to give.
pub type AppInput = mpsc::Receiver<String>;

/// Lines a feed may get ahead of the sender before it has to wait.
pub const INPUT_BACKLOG: usize = 16;

#[derive(Debug, Clone)]
pub enum InputFeed {
    /// Lines typed on standard input, until EOF.
    Stdin,
    /// Paced replay of a text file: the first pass waits `delay ± wiggle`
    /// between lines, then the file repeats forever at a fixed `delay`.
    File {
        path: PathBuf,
        delay: Duration,
        wiggle: Duration,
    },
    /// A fixed list of lines.
    Lines(Vec<String>),
}

impl InputFeed {
    /// Starts producing lines on a task of its own.
    pub fn spawn(self) -> (AppInput, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INPUT_BACKLOG);
        let task = tokio::spawn(async move {
            let outcome = match self {
                InputFeed::Stdin => read_stdin(tx).await,
                InputFeed::File {
                    path,
                    delay,
                    wiggle,
                } => pitch_file(path, delay, wiggle, tx).await,
                InputFeed::Lines(lines) => {
                    for line in lines {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                error!("input feed failed: {err}");
            }
        });
        (rx, task)
    }
}

async fn read_stdin(tx: mpsc::Sender<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if tx.send(line).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn pitch_file(
    path: PathBuf,
    delay: Duration,
    wiggle: Duration,
    tx: mpsc::Sender<String>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(&path).await?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        warn!("{} is empty, nothing to send", path.display());
        return Ok(());
    }

    let mut rng = StdRng::from_os_rng();
    for line in &lines {
        info!("{line}");
        if tx.send(line.to_string()).await.is_err() {
            return Ok(());
        }
        tokio::time::sleep(jitter(delay, wiggle, &mut rng)).await;
    }
    loop {
        for line in &lines {
            info!("{line}");
            if tx.send(line.to_string()).await.is_err() {
                return Ok(());
            }
            tokio::time::sleep(delay).await;
        }
    }
}

/// `delay` shifted by a uniform offset in `[-wiggle, wiggle)`, floored at zero.
fn jitter(delay: Duration, wiggle: Duration, rng: &mut impl Rng) -> Duration {
    let wiggle = wiggle.as_millis() as i64;
    if wiggle == 0 {
        return delay;
    }
    let offset = rng.random_range(-wiggle..wiggle);
    let millis = (delay.as_millis() as i64 + offset).max(0);
    Duration::from_millis(millis as u64)
}

/// Hands delivered data to the application without ever blocking the
/// receiver.
#[derive(Debug, Clone)]
pub struct DeliverySink {
    tx: mpsc::UnboundedSender<String>,
    trace: Trace,
}

impl DeliverySink {
    pub fn new(tx: mpsc::UnboundedSender<String>, trace: Trace) -> Self {
        Self { tx, trace }
    }

    pub fn deliver(&self, data: String) {
        info!("-->        {data}");
        self.trace.record_delivery(&data);
        // nobody listening is fine: the trace still has it
        let _ = self.tx.send(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn temp_file(tag: &str, content: &str) -> PathBuf {
        let name = format!("rdt-lab-{tag}-{}.txt", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn lines_feed_ends_after_last_line() {
        let (mut input, _task) = InputFeed::Lines(vec!["a".into(), "b".into()]).spawn();
        assert_eq!(input.recv().await.as_deref(), Some("a"));
        assert_eq!(input.recv().await.as_deref(), Some("b"));
        assert_eq!(input.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn file_replay_repeats_forever() {
        let path = temp_file("pitch", "first\nsecond\n");
        let feed = InputFeed::File {
            path: path.clone(),
            delay: ms(500),
            wiggle: ms(100),
        };
        let (mut input, task) = feed.spawn();

        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(input.recv().await.unwrap());
        }
        assert_eq!(got, ["first", "second", "first", "second", "first"]);

        task.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(start_paused = true)]
    async fn file_replay_waits_for_a_slow_sender() {
        let path = temp_file("backlog", "a\nb\nc\n");
        let feed = InputFeed::File {
            path: path.clone(),
            delay: Duration::ZERO,
            wiggle: Duration::ZERO,
        };
        let (mut input, task) = feed.spawn();

        tokio::time::sleep(ms(1000)).await;
        assert_eq!(input.len(), INPUT_BACKLOG);
        assert!(!task.is_finished());

        // draining one line lets exactly one more in
        assert_eq!(input.recv().await.as_deref(), Some("a"));
        tokio::time::sleep(ms(1000)).await;
        assert_eq!(input.len(), INPUT_BACKLOG);

        task.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_closes_the_feed() {
        let feed = InputFeed::File {
            path: PathBuf::from("/nonexistent/rdt-lab/input.txt"),
            delay: Duration::ZERO,
            wiggle: Duration::ZERO,
        };
        let (mut input, task) = feed.spawn();
        assert_eq!(input.recv().await, None);
        task.await.unwrap();
    }

    #[test]
    fn jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let d = jitter(ms(500), ms(100), &mut rng);
            assert!(d >= ms(400) && d < ms(600));
        }
        assert!(jitter(ms(50), ms(200), &mut rng) < ms(250));
        assert_eq!(jitter(ms(7), Duration::ZERO, &mut rng), ms(7));
    }

    #[tokio::test]
    async fn sink_records_even_without_listener() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let trace = Trace::new(10);
        DeliverySink::new(tx, trace.clone()).deliver("kept".into());
        assert_eq!(trace.delivered(), vec!["kept"]);
    }
}
