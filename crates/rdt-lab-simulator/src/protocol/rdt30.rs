//! rdt3.0: rdt2.2 plus a retransmission timer, for channels that also lose
//! packets. The receiver is unchanged.

use rdt_lab_abstract::{Packet, PacketFormat, Received, SeqNum};
use std::time::Duration;
use tracing::debug;

use super::alternating::{self, SenderState};
use super::{SENDER, commit, next_app_line, rdt22};
use crate::app::AppInput;
use crate::channel::ChannelSender;
use crate::error::{RdtError, Result};
use crate::fsm::{FsmState, StateMachine, Transition};
use crate::timer::TimedReceiver;

pub use rdt22::Receiver22 as Receiver30;

pub fn on_reply(seq: SeqNum, packet: Packet, reply: &Received) -> Transition<SenderState> {
    rdt22::on_reply(seq, packet, reply)
}

pub fn on_timeout(seq: SeqNum, packet: Packet) -> Transition<SenderState> {
    alternating::resend(seq, packet, "timeout")
}

pub struct Sender30 {
    input: AppInput,
    out: ChannelSender,
    replies: TimedReceiver,
    timeout: Duration,
}

impl Sender30 {
    pub fn new(
        input: AppInput,
        out: ChannelSender,
        replies: TimedReceiver,
        timeout: Duration,
    ) -> Self {
        Self {
            input,
            out,
            replies,
            timeout,
        }
    }
}

impl StateMachine for Sender30 {
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
                // the packet for this state was just (re)sent
                self.replies.start_timer(self.timeout);
                match self.replies.receive().await {
                    Ok(line) => {
                        self.replies.stop_timer();
                        let reply = Received::classify(PacketFormat::Sequenced, &line);
                        debug!("{SENDER}: got {reply}");
                        on_reply(seq, packet, &reply)
                    }
                    Err(RdtError::TimedOut) => on_timeout(seq, packet),
                    Err(err) => return Err(err),
                }
            }
        };
        commit(SENDER, from, transition, Some(&self.out), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_resends_and_stays() {
        let packet = Packet::sequenced("a", SeqNum::One);
        let t = on_timeout(SeqNum::One, packet.clone());
        assert_eq!(t.next, SenderState::WaitForAck(SeqNum::One, packet.clone()));
        assert_eq!(t.send, Some(packet));
        assert_eq!(t.reason, "timeout");
    }

    #[test]
    fn replies_are_judged_like_rdt22() {
        let packet = Packet::sequenced("a", SeqNum::One);
        let ack = Packet::ack_for(SeqNum::One);
        let reply = Received::classify(PacketFormat::Sequenced, &ack.serialize());
        assert_eq!(
            on_reply(SeqNum::One, packet, &reply).next,
            SenderState::WaitForCall(SeqNum::Zero)
        );
    }
}
