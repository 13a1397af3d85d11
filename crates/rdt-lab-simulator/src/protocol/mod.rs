//! Sender and receiver state machines for each protocol revision.
//!
//! Every module keeps its transitions as plain functions over
//! `(state, event)`; the `StateMachine` impls only wait for the event and
//! commit what the transition asks for.

pub mod alternating;
pub mod rdt10;
pub mod rdt20;
pub mod rdt21;
pub mod rdt22;
pub mod rdt30;

use tracing::warn;

use crate::app::{AppInput, DeliverySink};
use crate::channel::ChannelSender;
use crate::error::{RdtError, Result};
use crate::fsm::{FsmState, Transition};

pub use rdt10::{Receiver10, Sender10};
pub use rdt20::{Receiver20, Sender20};
pub use rdt21::{Receiver21, Sender21};
pub use rdt22::{Receiver22, Sender22};
pub use rdt30::{Receiver30, Sender30};

pub(crate) const SENDER: &str = "Sender";
pub(crate) const RECEIVER: &str = "Receiver";

/// Next line from the application; running dry stops the sender.
pub(crate) async fn next_app_line(input: &mut AppInput) -> Result<String> {
    input.recv().await.ok_or(RdtError::InputClosed)
}

/// Carries out a transition: hands data up first, then puts the packet on
/// the outgoing channel.
pub(crate) fn commit<S: FsmState>(
    role: &str,
    from: u8,
    transition: Transition<S>,
    out: Option<&ChannelSender>,
    sink: Option<&DeliverySink>,
) -> Result<S> {
    transition.log(role, from);
    let Transition {
        next,
        send,
        deliver,
        ..
    } = transition;

    if let Some(data) = deliver {
        match sink {
            Some(sink) => sink.deliver(data),
            None => warn!("{role}: nowhere to deliver {data:?}"),
        }
    }
    if let Some(packet) = send {
        match out {
            Some(out) => out.send_packet(&packet)?,
            None => warn!("{role}: no outgoing channel for {packet}"),
        }
    }
    Ok(next)
}
