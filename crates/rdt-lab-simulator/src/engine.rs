//! Wires one protocol revision into a running simulation: two relays, a
//! sender and a receiver.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rdt_lab_abstract::{Direction, Fault, RdtVersion, SimConfig};

use crate::app::{AppInput, DeliverySink};
use crate::channel::{ChannelReceiver, ChannelSender, simulated_channel};
use crate::error::Result;
use crate::fsm::MachineHandle;
use crate::protocol::{
    Receiver10, Receiver20, Receiver21, Receiver22, Receiver30, Sender10, Sender20, Sender21,
    Sender22, Sender30,
};
use crate::timer::TimedReceiver;
use crate::trace::{SimulationReport, Trace};

pub struct RdtEngine {
    version: RdtVersion,
    config: SimConfig,
    forward_script: Vec<Fault>,
    backward_script: Vec<Fault>,
}

impl RdtEngine {
    pub fn new(version: RdtVersion, config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            version,
            config,
            forward_script: Vec::new(),
            backward_script: Vec::new(),
        })
    }

    pub fn version(&self) -> RdtVersion {
        self.version
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Queues a deterministic fault for the next unscripted line on
    /// `direction`. Faults apply in the order they were queued.
    pub fn script_fault(&mut self, direction: Direction, fault: Fault) -> &mut Self {
        match direction {
            Direction::Forward => self.forward_script.push(fault),
            Direction::Backward => self.backward_script.push(fault),
        }
        self
    }

    /// Spawns the relays and both machines. Must be called inside a tokio
    /// runtime.
    pub fn start(self, input: AppInput) -> RunningEngine {
        info!(
            "starting {} (corrupt_rate={}, loss_rate={}, timeout={}ms)",
            self.version, self.config.corrupt_rate, self.config.loss_rate, self.config.timeout_ms
        );
        let trace = Trace::new(self.config.trace_capacity);
        let (deliveries_tx, deliveries) = mpsc::unbounded_channel();
        let sink = DeliverySink::new(deliveries_tx, trace.clone());
        let mut wiring = Wiring {
            config: &self.config,
            trace: trace.clone(),
            relays: Vec::new(),
            endpoints: Vec::new(),
        };

        let (data_out, data_in) = wiring.open(Direction::Forward, self.forward_script);
        let (sender, receiver) = match self.version {
            RdtVersion::Rdt10 => {
                if !self.backward_script.is_empty() {
                    warn!("rdt1.0 has no backward channel, ignoring its scripted faults");
                }
                (
                    MachineHandle::spawn(Sender10::new(input, data_out)),
                    MachineHandle::spawn(Receiver10::new(data_in, sink)),
                )
            }
            RdtVersion::Rdt20 => {
                let (ack_out, ack_in) = wiring.open(Direction::Backward, self.backward_script);
                (
                    MachineHandle::spawn(Sender20::new(input, data_out, ack_in)),
                    MachineHandle::spawn(Receiver20::new(data_in, ack_out, sink)),
                )
            }
            RdtVersion::Rdt21 => {
                let (ack_out, ack_in) = wiring.open(Direction::Backward, self.backward_script);
                (
                    MachineHandle::spawn(Sender21::new(input, data_out, ack_in)),
                    MachineHandle::spawn(Receiver21::new(data_in, ack_out, sink)),
                )
            }
            RdtVersion::Rdt22 => {
                let (ack_out, ack_in) = wiring.open(Direction::Backward, self.backward_script);
                (
                    MachineHandle::spawn(Sender22::new(input, data_out, ack_in)),
                    MachineHandle::spawn(Receiver22::new(data_in, ack_out, sink)),
                )
            }
            RdtVersion::Rdt30 => {
                let (ack_out, ack_in) = wiring.open(Direction::Backward, self.backward_script);
                let timeout = Duration::from_millis(self.config.timeout_ms);
                let replies = TimedReceiver::new(ack_in, trace.clone());
                (
                    MachineHandle::spawn(Sender30::new(input, data_out, replies, timeout)),
                    MachineHandle::spawn(Receiver30::new(data_in, ack_out, sink)),
                )
            }
        };
        let Wiring {
            relays, endpoints, ..
        } = wiring;

        RunningEngine {
            version: self.version,
            config: self.config,
            trace,
            sender,
            receiver,
            deliveries,
            relays,
            _endpoints: endpoints,
        }
    }
}

/// Channels opened so far, and the relay tasks behind them.
struct Wiring<'a> {
    config: &'a SimConfig,
    trace: Trace,
    relays: Vec<JoinHandle<()>>,
    endpoints: Vec<ChannelSender>,
}

impl Wiring<'_> {
    fn open(
        &mut self,
        direction: Direction,
        script: Vec<Fault>,
    ) -> (ChannelSender, ChannelReceiver) {
        let (tx, rx, relay) =
            simulated_channel(direction, self.config.link(direction), self.trace.clone());
        let relay = tokio::spawn(relay.with_script(script).run());
        self.relays.push(relay);
        // relays live as long as the engine, not as long as their producer
        self.endpoints.push(tx.clone());
        (tx, rx)
    }
}

/// A started simulation. Dropping it aborts every task it owns.
pub struct RunningEngine {
    version: RdtVersion,
    config: SimConfig,
    trace: Trace,
    sender: MachineHandle,
    receiver: MachineHandle,
    deliveries: mpsc::UnboundedReceiver<String>,
    relays: Vec<JoinHandle<()>>,
    _endpoints: Vec<ChannelSender>,
}

impl RunningEngine {
    pub fn version(&self) -> RdtVersion {
        self.version
    }

    /// Next piece of data the receiver handed up, in delivery order. `None`
    /// once the receiver has stopped.
    pub async fn next_delivery(&mut self) -> Option<String> {
        self.deliveries.recv().await
    }

    /// Stops queueing deliveries for [`next_delivery`](Self::next_delivery).
    /// They are still logged and recorded in the trace.
    pub fn close_deliveries(&mut self) {
        self.deliveries.close();
    }

    /// Waits until the sender stops, which it does cleanly once the input is
    /// exhausted and the last line has been acknowledged.
    pub async fn sender_finished(&mut self) -> Result<()> {
        self.sender.finished().await
    }

    pub fn sender_state(&self) -> u8 {
        self.sender.state()
    }

    pub fn receiver_state(&self) -> u8 {
        self.receiver.state()
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn report(&self) -> SimulationReport {
        self.trace.report(self.version, &self.config)
    }

    /// Stops every task and returns the final report.
    pub fn shutdown(self) -> SimulationReport {
        self.abort_all();
        let report = self.report();
        info!(
            "{} stopped after {} ms, {} lines delivered",
            self.version,
            report.duration_ms,
            report.delivered_data.len()
        );
        report
    }

    fn abort_all(&self) {
        self.sender.abort();
        self.receiver.abort();
        for relay in &self.relays {
            relay.abort();
        }
    }
}

impl Drop for RunningEngine {
    fn drop(&mut self) {
        self.abort_all();
    }
}
