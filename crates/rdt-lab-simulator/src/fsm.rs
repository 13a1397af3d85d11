//! Finite-state-machine driver shared by every sender and receiver.
//!
//! A machine only knows how to take one step from a state; the driver runs
//! `state = step(state)` on its own task until the step fails.

use std::fmt;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use rdt_lab_abstract::Packet;

use crate::error::{RdtError, Result};

pub trait FsmState: fmt::Debug + Send + 'static {
    /// Position in the protocol's state diagram, as drawn in the textbook
    /// (e.g. 0..=3 for the rdt2.1 sender).
    fn index(&self) -> u8;
}

/// Outcome of one event in one state: where to go and what to do on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S> {
    pub next: S,
    /// Packet to put on the machine's outgoing channel.
    pub send: Option<Packet>,
    /// Data to hand to the application (receivers only).
    pub deliver: Option<String>,
    pub reason: &'static str,
}

impl<S: FsmState> Transition<S> {
    pub fn to(next: S, reason: &'static str) -> Self {
        Self {
            next,
            send: None,
            deliver: None,
            reason,
        }
    }

    pub fn sending(mut self, packet: Packet) -> Self {
        self.send = Some(packet);
        self
    }

    pub fn delivering(mut self, data: impl Into<String>) -> Self {
        self.deliver = Some(data.into());
        self
    }

    pub(crate) fn log(&self, role: &str, from: u8) {
        debug!("{role}({from}->{}): {}", self.next.index(), self.reason);
    }
}

pub trait StateMachine: Send + 'static {
    type State: FsmState;

    /// "Sender" or "Receiver", used in logs.
    fn role(&self) -> &'static str;

    fn initial_state(&self) -> Self::State;

    /// Waits for whatever event `state` needs, then performs the transition.
    fn step(&mut self, state: Self::State) -> impl Future<Output = Result<Self::State>> + Send;
}

/// Runs `machine` until a step fails. Running out of application input is a
/// clean stop; any other failure is logged and returned.
pub async fn drive<M: StateMachine>(mut machine: M, status: watch::Sender<u8>) -> Result<()> {
    let role = machine.role();
    let mut state = machine.initial_state();
    loop {
        status.send_replace(state.index());
        match machine.step(state).await {
            Ok(next) => state = next,
            Err(RdtError::InputClosed) => {
                info!("{role}: application input exhausted, stopping");
                return Ok(());
            }
            Err(err) => {
                error!("{role}: stopped: {err}");
                return Err(err);
            }
        }
    }
}

/// A state machine running on its own task.
#[derive(Debug)]
pub struct MachineHandle {
    role: &'static str,
    state: watch::Receiver<u8>,
    join: Option<JoinHandle<Result<()>>>,
}

impl MachineHandle {
    pub fn spawn<M: StateMachine>(machine: M) -> Self {
        let role = machine.role();
        let initial = machine.initial_state().index();
        let (status, state) = watch::channel(initial);
        let join = tokio::spawn(drive(machine, status));
        Self {
            role,
            state,
            join: Some(join),
        }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    /// Index of the state the machine is currently in (or stopped in).
    pub fn state(&self) -> u8 {
        *self.state.borrow()
    }

    /// Waits until the machine enters state `index`; false if it stopped first.
    pub async fn wait_for_state(&mut self, index: u8) -> bool {
        self.state.wait_for(|s| *s == index).await.is_ok()
    }

    /// Waits for the machine's task to end. Later calls return `Ok` at once.
    pub async fn finished(&mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join.await?,
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn abort(&self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}
