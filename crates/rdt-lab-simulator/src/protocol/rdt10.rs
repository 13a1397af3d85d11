//! rdt1.0: the channel is assumed perfect. No checksum check, no feedback.

use rdt_lab_abstract::{Packet, PacketFormat};
use tracing::{debug, warn};

use super::{RECEIVER, SENDER, commit, next_app_line};
use crate::app::{AppInput, DeliverySink};
use crate::channel::{ChannelReceiver, ChannelSender};
use crate::error::Result;
use crate::fsm::{FsmState, StateMachine, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    WaitForCall,
}

impl FsmState for SenderState {
    fn index(&self) -> u8 {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    WaitFromBelow,
}

impl FsmState for ReceiverState {
    fn index(&self) -> u8 {
        0
    }
}

pub fn on_app_data(data: String) -> Transition<SenderState> {
    Transition::to(SenderState::WaitForCall, "rdt_send").sending(Packet::new(data))
}

/// Delivers whatever follows the checksum field, damaged or not.
pub fn on_line(line: &str) -> Transition<ReceiverState> {
    match Packet::parse(PacketFormat::Checksummed, line) {
        Ok(packet) => {
            Transition::to(ReceiverState::WaitFromBelow, "rdt_rcv").delivering(packet.into_data())
        }
        Err(err) => {
            warn!("{RECEIVER}: skipping unparsable line {line:?}: {err}");
            Transition::to(ReceiverState::WaitFromBelow, "unparsable")
        }
    }
}

pub struct Sender10 {
    input: AppInput,
    out: ChannelSender,
}

impl Sender10 {
    pub fn new(input: AppInput, out: ChannelSender) -> Self {
        Self { input, out }
    }
}

impl StateMachine for Sender10 {
    type State = SenderState;

    fn role(&self) -> &'static str {
        SENDER
    }

    fn initial_state(&self) -> SenderState {
        SenderState::WaitForCall
    }

    async fn step(&mut self, state: SenderState) -> Result<SenderState> {
        let data = next_app_line(&mut self.input).await?;
        commit(
            SENDER,
            state.index(),
            on_app_data(data),
            Some(&self.out),
            None,
        )
    }
}

pub struct Receiver10 {
    line: ChannelReceiver,
    sink: DeliverySink,
}

impl Receiver10 {
    pub fn new(line: ChannelReceiver, sink: DeliverySink) -> Self {
        Self { line, sink }
    }
}

impl StateMachine for Receiver10 {
    type State = ReceiverState;

    fn role(&self) -> &'static str {
        RECEIVER
    }

    fn initial_state(&self) -> ReceiverState {
        ReceiverState::WaitFromBelow
    }

    async fn step(&mut self, state: ReceiverState) -> Result<ReceiverState> {
        let line = self.line.receive().await?;
        debug!("{RECEIVER}: got {line:?}");
        commit(
            RECEIVER,
            state.index(),
            on_line(&line),
            None,
            Some(&self.sink),
        )
    }
}
