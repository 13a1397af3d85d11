//! States and moves shared by the alternating-bit revisions (rdt2.1, rdt2.2
//! and rdt3.0).

use rdt_lab_abstract::{Packet, SeqNum};

use crate::fsm::{FsmState, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderState {
    /// Waiting for the application to hand over the next line.
    WaitForCall(SeqNum),
    /// `Packet` is in flight and kept for retransmission.
    WaitForAck(SeqNum, Packet),
}

impl FsmState for SenderState {
    fn index(&self) -> u8 {
        match self {
            SenderState::WaitForCall(SeqNum::Zero) => 0,
            SenderState::WaitForAck(SeqNum::Zero, _) => 1,
            SenderState::WaitForCall(SeqNum::One) => 2,
            SenderState::WaitForAck(SeqNum::One, _) => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Expecting the packet with this sequence number.
    WaitFromBelow(SeqNum),
}

impl FsmState for ReceiverState {
    fn index(&self) -> u8 {
        match self {
            ReceiverState::WaitFromBelow(SeqNum::Zero) => 0,
            ReceiverState::WaitFromBelow(SeqNum::One) => 1,
        }
    }
}

/// New line from the application: number it and send it.
pub fn on_app_data(seq: SeqNum, data: String) -> Transition<SenderState> {
    let packet = Packet::sequenced(data, seq);
    Transition::to(SenderState::WaitForAck(seq, packet.clone()), "rdt_send").sending(packet)
}

/// Send the stored packet again and keep waiting.
pub(crate) fn resend(seq: SeqNum, packet: Packet, reason: &'static str) -> Transition<SenderState> {
    Transition::to(SenderState::WaitForAck(seq, packet.clone()), reason).sending(packet)
}

/// Current packet acknowledged: move to the other sequence number.
pub(crate) fn advance(seq: SeqNum, reason: &'static str) -> Transition<SenderState> {
    Transition::to(SenderState::WaitForCall(seq.flip()), reason)
}
