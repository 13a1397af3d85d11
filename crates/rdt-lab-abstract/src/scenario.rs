use crate::config::{Direction, LinkOverride, RdtVersion, SimConfig};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub protocol: RdtVersion,
    #[serde(default)]
    pub config: SimConfigOverride,
    /// Lines handed to the sender, in order.
    pub input: Vec<String>,
    #[serde(default)]
    pub faults: Vec<ScriptedFault>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub corrupt_rate: Option<f64>,
    pub loss_rate: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub seed: Option<u64>,
    pub forward: Option<LinkOverride>,
    pub backward: Option<LinkOverride>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = self.forward {
            config.forward = v;
        }
        if let Some(v) = self.backward {
            config.backward = v;
        }
    }
}

/// Deterministic treatment of the next line crossing a channel. Scripted
/// faults are consumed in order before the random model applies.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// Deliver the line untouched.
    Pass,
    /// Damage the line so that it fails checksum verification.
    Corrupt,
    /// Silently drop the line.
    Drop,
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct ScriptedFault {
    pub direction: Direction,
    pub kind: Fault,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAssertion {
    /// Delivered data equals `data` exactly: same lines, same order, no duplicates.
    DeliveredExactly { data: Vec<String> },
    /// `data` was delivered at least once
    DataDelivered { data: String },
    /// Lines put on the forward channel by the sender, retransmissions included.
    SenderPacketCount { min: u64, max: Option<u64> },
    /// The retransmission timer never fired.
    NoTimeouts,
    /// Run must finish within this many milliseconds.
    MaxDuration { ms: u64 },
}
