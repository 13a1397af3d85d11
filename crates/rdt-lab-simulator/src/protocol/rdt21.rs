//! rdt2.1: rdt2.0 plus a one-bit sequence number, so the receiver can tell a
//! retransmission from new data.

use rdt_lab_abstract::{Packet, PacketFormat, Received, SeqNum};
use tracing::debug;

use super::alternating::{self, ReceiverState, SenderState};
use super::{RECEIVER, SENDER, commit, next_app_line};
use crate::app::{AppInput, DeliverySink};
use crate::channel::{ChannelReceiver, ChannelSender};
use crate::error::Result;
use crate::fsm::{FsmState, StateMachine, Transition};

/// Any intact ACK releases the packet. Acknowledgments are not matched
/// against the sequence number in this revision.
pub fn on_reply(seq: SeqNum, packet: Packet, reply: &Received) -> Transition<SenderState> {
    match reply.intact() {
        Some(reply) if reply.is_ack() => alternating::advance(seq, "ACK"),
        Some(_) => alternating::resend(seq, packet, "NAK"),
        None => alternating::resend(seq, packet, "corrupt reply"),
    }
}

pub fn on_packet(expected: SeqNum, received: Received) -> Transition<ReceiverState> {
    let stay = ReceiverState::WaitFromBelow(expected);
    let packet = match received {
        Received::Intact(packet) => packet,
        Received::Corrupt(_) => {
            return Transition::to(stay, "corrupt").sending(Packet::nak_for(expected));
        }
    };
    match packet.seq() {
        Some(seq) if seq == expected => {
            Transition::to(ReceiverState::WaitFromBelow(expected.flip()), "notcorrupt")
                .delivering(packet.into_data())
                .sending(Packet::ack_for(expected))
        }
        // retransmission of data already delivered: our ACK was damaged
        other => {
            let duplicate = other.unwrap_or(expected.flip());
            Transition::to(stay, "duplicate").sending(Packet::ack_for(duplicate))
        }
    }
}

pub struct Sender21 {
    input: AppInput,
    out: ChannelSender,
    replies: ChannelReceiver,
}

impl Sender21 {
    pub fn new(input: AppInput, out: ChannelSender, replies: ChannelReceiver) -> Self {
        Self {
            input,
            out,
            replies,
        }
    }
}

impl StateMachine for Sender21 {
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

pub struct Receiver21 {
    line: ChannelReceiver,
    feedback: ChannelSender,
    sink: DeliverySink,
}

impl Receiver21 {
    pub fn new(line: ChannelReceiver, feedback: ChannelSender, sink: DeliverySink) -> Self {
        Self {
            line,
            feedback,
            sink,
        }
    }
}

impl StateMachine for Receiver21 {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn intact(packet: &Packet) -> Received {
        Received::classify(PacketFormat::Sequenced, &packet.serialize())
    }

    #[test]
    fn sender_advances_on_any_intact_ack() {
        let packet = Packet::sequenced("a", SeqNum::One);
        for ack in [Packet::ack_for(SeqNum::One), Packet::ack_for(SeqNum::Zero)] {
            let t = on_reply(SeqNum::One, packet.clone(), &intact(&ack));
            assert_eq!(t.next, SenderState::WaitForCall(SeqNum::Zero));
            assert_eq!(t.send, None);
        }
    }

    #[test]
    fn sender_resends_on_nak_or_damage() {
        let packet = Packet::sequenced("a", SeqNum::Zero);
        for reply in [
            intact(&Packet::nak_for(SeqNum::Zero)),
            Received::Corrupt("#0000ACK".into()),
        ] {
            let t = on_reply(SeqNum::Zero, packet.clone(), &reply);
            assert_eq!(t.next.index(), 1);
            assert_eq!(t.send, Some(packet.clone()));
        }
    }

    #[test]
    fn receiver_delivers_expected_packet_once() {
        let t = on_packet(SeqNum::Zero, intact(&Packet::sequenced("a", SeqNum::Zero)));
        assert_eq!(t.next, ReceiverState::WaitFromBelow(SeqNum::One));
        assert_eq!(t.deliver.as_deref(), Some("a"));
        assert_eq!(t.send, Some(Packet::ack_for(SeqNum::Zero)));

        // same packet again after the ACK was lost to damage
        let t = on_packet(SeqNum::One, intact(&Packet::sequenced("a", SeqNum::Zero)));
        assert_eq!(t.next, ReceiverState::WaitFromBelow(SeqNum::One));
        assert_eq!(t.deliver, None);
        assert_eq!(t.send, Some(Packet::ack_for(SeqNum::Zero)));
    }

    #[test]
    fn receiver_naks_damage_without_moving() {
        let t = on_packet(SeqNum::One, Received::Corrupt("####1a".into()));
        assert_eq!(t.next, ReceiverState::WaitFromBelow(SeqNum::One));
        assert_eq!(t.send, Some(Packet::nak_for(SeqNum::One)));
        assert_eq!(t.deliver, None);
    }
}
