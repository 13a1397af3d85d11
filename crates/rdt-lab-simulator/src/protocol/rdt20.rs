//! rdt2.0: stop-and-wait over a channel with bit errors, using ACK/NAK.
//! Packets carry no sequence number, so a damaged ACK can cause a
//! duplicate delivery.

use rdt_lab_abstract::{Packet, PacketFormat, Received};
use tracing::debug;

use super::{RECEIVER, SENDER, commit, next_app_line};
use crate::app::{AppInput, DeliverySink};
use crate::channel::{ChannelReceiver, ChannelSender};
use crate::error::Result;
use crate::fsm::{FsmState, StateMachine, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderState {
    WaitForCall,
    WaitForAckOrNak(Packet),
}

impl FsmState for SenderState {
    fn index(&self) -> u8 {
        match self {
            SenderState::WaitForCall => 0,
            SenderState::WaitForAckOrNak(_) => 1,
        }
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
    let packet = Packet::new(data);
    Transition::to(SenderState::WaitForAckOrNak(packet.clone()), "rdt_send").sending(packet)
}

/// Only an intact ACK releases the packet; a NAK or a damaged reply resends it.
pub fn on_reply(packet: Packet, reply: &Received) -> Transition<SenderState> {
    let reason = match reply.intact() {
        Some(reply) if reply.is_ack() => return Transition::to(SenderState::WaitForCall, "ACK"),
        Some(_) => "NAK",
        None => "corrupt reply",
    };
    Transition::to(SenderState::WaitForAckOrNak(packet.clone()), reason).sending(packet)
}

pub fn on_packet(received: Received) -> Transition<ReceiverState> {
    match received {
        Received::Intact(packet) => Transition::to(ReceiverState::WaitFromBelow, "notcorrupt")
            .delivering(packet.into_data())
            .sending(Packet::ack()),
        Received::Corrupt(_) => {
            Transition::to(ReceiverState::WaitFromBelow, "corrupt").sending(Packet::nak())
        }
    }
}

pub struct Sender20 {
    input: AppInput,
    out: ChannelSender,
    replies: ChannelReceiver,
}

impl Sender20 {
    pub fn new(input: AppInput, out: ChannelSender, replies: ChannelReceiver) -> Self {
        Self {
            input,
            out,
            replies,
        }
    }
}

impl StateMachine for Sender20 {
    type State = SenderState;

    fn role(&self) -> &'static str {
        SENDER
    }

    fn initial_state(&self) -> SenderState {
        SenderState::WaitForCall
    }

    async fn step(&mut self, state: SenderState) -> Result<SenderState> {
        let from = state.index();
        let transition = match state {
            SenderState::WaitForCall => on_app_data(next_app_line(&mut self.input).await?),
            SenderState::WaitForAckOrNak(packet) => {
                let line = self.replies.receive().await?;
                let reply = Received::classify(PacketFormat::Checksummed, &line);
                debug!("{SENDER}: got {reply}");
                on_reply(packet, &reply)
            }
        };
        commit(SENDER, from, transition, Some(&self.out), None)
    }
}

pub struct Receiver20 {
    line: ChannelReceiver,
    feedback: ChannelSender,
    sink: DeliverySink,
}

impl Receiver20 {
    pub fn new(line: ChannelReceiver, feedback: ChannelSender, sink: DeliverySink) -> Self {
        Self {
            line,
            feedback,
            sink,
        }
    }
}

impl StateMachine for Receiver20 {
    type State = ReceiverState;

    fn role(&self) -> &'static str {
        RECEIVER
    }

    fn initial_state(&self) -> ReceiverState {
        ReceiverState::WaitFromBelow
    }

    async fn step(&mut self, state: ReceiverState) -> Result<ReceiverState> {
        let line = self.line.receive().await?;
        let received = Received::classify(PacketFormat::Checksummed, &line);
        debug!("{RECEIVER}: got {received}");
        commit(
            RECEIVER,
            state.index(),
            on_packet(received),
            Some(&self.feedback),
            Some(&self.sink),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intact(packet: Packet) -> Received {
        Received::classify(PacketFormat::Checksummed, &packet.serialize())
    }

    #[test]
    fn ack_releases_the_packet() {
        let t = on_reply(Packet::new("a"), &intact(Packet::ack()));
        assert_eq!(t.next, SenderState::WaitForCall);
        assert_eq!(t.send, None);
    }

    #[test]
    fn nak_and_damage_resend_the_same_packet() {
        let packet = Packet::new("a");
        for reply in [intact(Packet::nak()), Received::Corrupt("####ACK".into())] {
            let t = on_reply(packet.clone(), &reply);
            assert_eq!(t.next, SenderState::WaitForAckOrNak(packet.clone()));
            assert_eq!(t.send, Some(packet.clone()));
        }
    }

    #[test]
    fn receiver_naks_damage_and_acks_the_rest() {
        let t = on_packet(Received::Corrupt("####x".into()));
        assert_eq!(t.send, Some(Packet::nak()));
        assert_eq!(t.deliver, None);

        let t = on_packet(intact(Packet::new("x")));
        assert_eq!(t.send, Some(Packet::ack()));
        assert_eq!(t.deliver.as_deref(), Some("x"));
    }
}
