//! rdt2.2: NAK-free. The receiver answers everything it cannot accept with
//! an ACK for the last packet it did accept, and the sender only moves on
//! when the ACK names the packet it is waiting on.

use rdt_lab_abstract::{Packet, PacketFormat, Received, SeqNum};
use tracing::debug;

use super::alternating::{self, ReceiverState, SenderState};
use super::{RECEIVER, SENDER, commit, next_app_line};
use crate::app::{AppInput, DeliverySink};
use crate::channel::{ChannelReceiver, ChannelSender};
use crate::error::Result;
use crate::fsm::{FsmState, StateMachine, Transition};

/// True when `reply` is an intact ACK for `seq`.
pub fn acknowledges(reply: &Received, seq: SeqNum) -> bool {
    reply.intact().and_then(Packet::ack_num) == Some(seq)
}

pub fn on_reply(seq: SeqNum, packet: Packet, reply: &Received) -> Transition<SenderState> {
    if acknowledges(reply, seq) {
        alternating::advance(seq, "ACK")
    } else if reply.intact().is_some() {
        alternating::resend(seq, packet, "wrong ACK")
    } else {
        alternating::resend(seq, packet, "corrupt reply")
    }
}

pub fn on_packet(expected: SeqNum, received: Received) -> Transition<ReceiverState> {
    let stay = ReceiverState::WaitFromBelow(expected);
    let last_accepted = Packet::ack_for(expected.flip());
    match received {
        Received::Intact(packet) if packet.seq() == Some(expected) => {
            Transition::to(ReceiverState::WaitFromBelow(expected.flip()), "notcorrupt")
                .delivering(packet.into_data())
                .sending(Packet::ack_for(expected))
        }
        Received::Intact(_) => Transition::to(stay, "duplicate").sending(last_accepted),
        Received::Corrupt(_) => Transition::to(stay, "corrupt").sending(last_accepted),
    }
}

pub struct Sender22 {
    input: AppInput,
    out: ChannelSender,
    replies: ChannelReceiver,
}

impl Sender22 {
    pub fn new(input: AppInput, out: ChannelSender, replies: ChannelReceiver) -> Self {
        Self {
            input,
            out,
            replies,
        }
    }
}

impl StateMachine for Sender22 {
    type State = SenderState;

    fn role(&self) -> &'static str {
        SENDER
    }

    fn initial_state(&self) -> SenderState {
        SenderState::WaitForCall(SeqNum::Zero)
    }

    async fn step(&mut self, state: SenderState) -> Result<SenderState> {
        let from = state.index();
        let transition = match state {
            SenderState::WaitForCall(seq) => {
                alternating::on_app_data(seq, next_app_line(&mut self.input).await?)
            }
            SenderState::WaitForAck(seq, packet) => {
                let line = self.replies.receive().await?;
                let reply = Received::classify(PacketFormat::Sequenced, &line);
                debug!("{SENDER}: got {reply}");
                on_reply(seq, packet, &reply)
            }
        };
        commit(SENDER, from, transition, Some(&self.out), None)
    }
}

/// Receiver shared by rdt2.2 and rdt3.0.
pub struct Receiver22 {
    line: ChannelReceiver,
    feedback: ChannelSender,
    sink: DeliverySink,
}

impl Receiver22 {
    pub fn new(line: ChannelReceiver, feedback: ChannelSender, sink: DeliverySink) -> Self {
        Self {
            line,
            feedback,
            sink,
        }
    }
}

impl StateMachine for Receiver22 {
    type State = ReceiverState;

    fn role(&self) -> &'static str {
        RECEIVER
    }

    fn initial_state(&self) -> ReceiverState {
        ReceiverState::WaitFromBelow(SeqNum::Zero)
    }

    async fn step(&mut self, state: ReceiverState) -> Result<ReceiverState> {
        let ReceiverState::WaitFromBelow(expected) = state;
        let line = self.line.receive().await?;
        let received = Received::classify(PacketFormat::Sequenced, &line);
        debug!("{RECEIVER}: got {received}");
        commit(
            RECEIVER,
            state.index(),
            on_packet(expected, received),
            Some(&self.feedback),
            Some(&self.sink),
        )
    }
}
