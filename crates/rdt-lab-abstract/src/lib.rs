pub mod checksum;
pub mod config;
pub mod packet;
pub mod scenario;

pub use config::{ConfigError, Direction, LinkConfig, LinkOverride, RdtVersion, SimConfig};
pub use packet::{ACK, NAK, Packet, PacketError, PacketFormat, Received, SeqNum};
pub use scenario::{Fault, ScenarioAssertion, ScriptedFault, SimConfigOverride, TestScenario};
