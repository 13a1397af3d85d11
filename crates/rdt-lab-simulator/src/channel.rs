//! One direction of an unreliable link.
//!
//! A channel is split into three parts: the [`ChannelSender`] owned by the
//! producing state machine, the [`ChannelReceiver`] owned by the consuming
//! one, and the [`ChannelRelay`] task in between that damages and drops
//! lines before republishing them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

use rdt_lab_abstract::{Direction, Fault, LinkConfig, Packet};

use crate::error::{RdtError, Result};
use crate::trace::{LinkEventKind, Trace};

/// Replacement characters are drawn from ASCII 32..=125.
const PRINTABLE: std::ops::Range<u8> = 32..126;

/// Opens a channel. The relay does nothing until it is spawned with
/// [`ChannelRelay::run`].
pub fn simulated_channel(
    direction: Direction,
    config: LinkConfig,
    trace: Trace,
) -> (ChannelSender, ChannelReceiver, ChannelRelay) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let sender = ChannelSender {
        direction,
        tx: inbound_tx,
    };
    let receiver = ChannelReceiver {
        direction,
        rx: outbound_rx,
    };
    let relay = ChannelRelay {
        direction,
        config,
        rng,
        inbound: inbound_rx,
        outbound: outbound_tx,
        script: VecDeque::new(),
        trace,
    };
    (sender, receiver, relay)
}

#[derive(Debug, Clone)]
pub struct ChannelSender {
    direction: Direction,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSender {
    /// Queues a line for transmission. Never blocks.
    pub fn send(&self, line: impl Into<String>) -> Result<()> {
        self.tx
            .send(line.into())
            .map_err(|_| RdtError::ChannelClosed(self.direction))
    }

    pub fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.send(packet.serialize())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[derive(Debug)]
pub struct ChannelReceiver {
    direction: Direction,
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelReceiver {
    /// Waits for the next line that survived the link.
    pub async fn receive(&mut self) -> Result<String> {
        self.rx
            .recv()
            .await
            .ok_or(RdtError::ChannelClosed(self.direction))
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

pub struct ChannelRelay {
    direction: Direction,
    config: LinkConfig,
    rng: StdRng,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    script: VecDeque<Fault>,
    trace: Trace,
}

impl ChannelRelay {
    /// Queues deterministic faults for the next lines, in order.
    pub fn with_script(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.script.extend(faults);
        self
    }

    /// Moves lines from the sending to the receiving endpoint until either
    /// endpoint goes away.
    pub async fn run(mut self) {
        debug!(
            "[{}] relay up (corrupt_rate={}, loss_rate={})",
            self.direction, self.config.corrupt_rate, self.config.loss_rate
        );
        while let Some(line) = self.inbound.recv().await {
            self.trace
                .record(self.direction, LinkEventKind::Sent, &line);
            let Some(line) = self.transmit(line) else {
                continue;
            };
            self.trace
                .record(self.direction, LinkEventKind::Delivered, &line);
            if self.outbound.send(line).is_err() {
                break;
            }
        }
        debug!("[{}] relay stopped", self.direction);
    }

    /// Applies the next scripted fault, or the random model when the script
    /// is empty. Returns `None` when the line is lost.
    fn transmit(&mut self, line: String) -> Option<String> {
        if let Some(fault) = self.script.pop_front() {
            debug!("[{}] scripted {:?}: {:?}", self.direction, fault, line);
            return match fault {
                Fault::Pass => Some(line),
                Fault::Corrupt => {
                    let damaged = damage(&line);
                    self.trace
                        .record(self.direction, LinkEventKind::Corrupted, &damaged);
                    Some(damaged)
                }
                Fault::Drop => {
                    self.trace
                        .record(self.direction, LinkEventKind::Dropped, &line);
                    None
                }
            };
        }

        let line = self.scramble(line);
        if self.rng.random::<f64>() < self.config.loss_rate {
            debug!("[{}] DROP {:?}", self.direction, line);
            self.trace
                .record(self.direction, LinkEventKind::Dropped, &line);
            return None;
        }
        Some(line)
    }

    /// Replaces each character independently with probability
    /// `corrupt_rate`. Length in characters never changes.
    fn scramble(&mut self, line: String) -> String {
        if self.config.corrupt_rate <= 0.0 {
            return line;
        }
        let rate = self.config.corrupt_rate;
        let rng = &mut self.rng;
        let scrambled: String = line
            .chars()
            .map(|c| {
                if rng.random::<f64>() < rate {
                    char::from(rng.random_range(PRINTABLE))
                } else {
                    c
                }
            })
            .collect();
        if scrambled != line {
            debug!("[{}] CORRUPT {:?} -> {:?}", self.direction, line, scrambled);
            self.trace
                .record(self.direction, LinkEventKind::Corrupted, &scrambled);
        }
        scrambled
    }
}

/// Deterministic damage: the first character becomes a non-hex character,
/// which no checksum field can contain.
fn damage(line: &str) -> String {
    let mut chars = line.chars();
    let replacement = match chars.next() {
        Some('#') => '%',
        _ => '#',
    };
    let mut damaged = String::with_capacity(line.len());
    damaged.push(replacement);
    damaged.push_str(chars.as_str());
    damaged
}
