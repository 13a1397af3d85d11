//! Reliable data transfer over a simulated unreliable link.
//!
//! Each protocol revision runs as a sender and a receiver state machine on
//! their own tasks, talking through a pair of lossy, corrupting channels.

pub mod app;
pub mod channel;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod protocol;
pub mod scenario_runner;
pub mod timer;
pub mod trace;

pub use app::{AppInput, DeliverySink, InputFeed};
pub use channel::{ChannelReceiver, ChannelRelay, ChannelSender, simulated_channel};
pub use engine::{RdtEngine, RunningEngine};
pub use error::{RdtError, Result};
pub use fsm::{FsmState, MachineHandle, StateMachine, Transition};
pub use timer::{TimedReceiver, TimerHandle};
pub use trace::{LinkEvent, LinkEventKind, LinkStats, SimulationReport, Trace};
