use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::packet::PacketFormat;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("timeout must be at least 1 ms")]
    ZeroTimeout,
    #[error("unknown protocol '{0}', expected one of rdt10, rdt20, rdt21, rdt22, rdt30")]
    UnknownProtocol(String),
}

/// The protocol revisions of the rdt1.0 → rdt3.0 progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RdtVersion {
    Rdt10,
    Rdt20,
    Rdt21,
    Rdt22,
    Rdt30,
}

impl RdtVersion {
    pub const ALL: [RdtVersion; 5] = [
        RdtVersion::Rdt10,
        RdtVersion::Rdt20,
        RdtVersion::Rdt21,
        RdtVersion::Rdt22,
        RdtVersion::Rdt30,
    ];

    pub fn packet_format(self) -> PacketFormat {
        match self {
            RdtVersion::Rdt10 | RdtVersion::Rdt20 => PacketFormat::Checksummed,
            _ => PacketFormat::Sequenced,
        }
    }

    /// rdt1.0 never sends feedback, so it has no backward channel.
    pub fn has_backward_channel(self) -> bool {
        self != RdtVersion::Rdt10
    }

    pub fn uses_timer(self) -> bool {
        self == RdtVersion::Rdt30
    }
}

impl fmt::Display for RdtVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RdtVersion::Rdt10 => "rdt1.0",
            RdtVersion::Rdt20 => "rdt2.0",
            RdtVersion::Rdt21 => "rdt2.1",
            RdtVersion::Rdt22 => "rdt2.2",
            RdtVersion::Rdt30 => "rdt3.0",
        };
        f.write_str(name)
    }
}

impl FromStr for RdtVersion {
    type Err = ConfigError;

    /// Accepts `rdt22`, `rdt2.2` and `2.2` style names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .trim_start_matches("rdt")
            .chars()
            .filter(|c| *c != '.')
            .collect();
        match normalized.as_str() {
            "10" => Ok(RdtVersion::Rdt10),
            "20" => Ok(RdtVersion::Rdt20),
            "21" => Ok(RdtVersion::Rdt21),
            "22" => Ok(RdtVersion::Rdt22),
            "30" => Ok(RdtVersion::Rdt30),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

/// One direction of the simulated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sender to receiver: data packets.
    Forward,
    /// Receiver to sender: ACK/NAK packets.
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("Sender->Receiver"),
            Direction::Backward => f.write_str("Receiver->Sender"),
        }
    }
}

/// Per-direction replacement of the global rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkOverride {
    pub corrupt_rate: Option<f64>,
    pub loss_rate: Option<f64>,
}

/// Fault model of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Probability that each character of a line is replaced.
    pub corrupt_rate: f64,
    /// Probability that a whole line is dropped.
    pub loss_rate: f64,
    pub seed: Option<u64>,
}

impl LinkConfig {
    pub fn reliable() -> Self {
        Self {
            corrupt_rate: 0.0,
            loss_rate: 0.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub corrupt_rate: f64,
    pub loss_rate: f64,
    /// rdt3.0 retransmission timeout.
    pub timeout_ms: u64,
    /// Seeds the forward channel; the backward channel uses `seed + 1`.
    pub seed: Option<u64>,
    pub forward: LinkOverride,
    pub backward: LinkOverride,
    /// Maximum number of link events kept in the trace.
    pub trace_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            corrupt_rate: 0.0,
            loss_rate: 0.0,
            timeout_ms: 1000,
            seed: None,
            forward: LinkOverride::default(),
            backward: LinkOverride::default(),
            trace_capacity: 10_000,
        }
    }
}

impl SimConfig {
    /// Resolved fault model for one direction.
    pub fn link(&self, direction: Direction) -> LinkConfig {
        let (overrides, seed) = match direction {
            Direction::Forward => (&self.forward, self.seed),
            Direction::Backward => (&self.backward, self.seed.map(|s| s.wrapping_add(1))),
        };
        LinkConfig {
            corrupt_rate: overrides.corrupt_rate.unwrap_or(self.corrupt_rate),
            loss_rate: overrides.loss_rate.unwrap_or(self.loss_rate),
            seed,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("corrupt_rate", Some(self.corrupt_rate)),
            ("loss_rate", Some(self.loss_rate)),
            ("forward.corrupt_rate", self.forward.corrupt_rate),
            ("forward.loss_rate", self.forward.loss_rate),
            ("backward.corrupt_rate", self.backward.corrupt_rate),
            ("backward.loss_rate", self.backward.loss_rate),
        ];
        for (name, value) in rates {
            if let Some(value) = value
                && !(0.0..=1.0).contains(&value)
            {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_names() {
        assert_eq!("rdt22".parse::<RdtVersion>(), Ok(RdtVersion::Rdt22));
        assert_eq!("RDT3.0".parse::<RdtVersion>(), Ok(RdtVersion::Rdt30));
        assert_eq!("1.0".parse::<RdtVersion>(), Ok(RdtVersion::Rdt10));
        assert!("rdt4".parse::<RdtVersion>().is_err());
        for version in RdtVersion::ALL {
            assert_eq!(version.to_string().parse::<RdtVersion>(), Ok(version));
        }
    }

    #[test]
    fn link_overrides() {
        let config = SimConfig {
            corrupt_rate: 0.2,
            loss_rate: 0.1,
            seed: Some(7),
            backward: LinkOverride {
                corrupt_rate: Some(0.0),
                loss_rate: None,
            },
            ..Default::default()
        };
        let forward = config.link(Direction::Forward);
        let backward = config.link(Direction::Backward);
        assert_eq!(forward.corrupt_rate, 0.2);
        assert_eq!(forward.seed, Some(7));
        assert_eq!(backward.corrupt_rate, 0.0);
        assert_eq!(backward.loss_rate, 0.1);
        assert_eq!(backward.seed, Some(8));
    }

    #[test]
    fn validation() {
        assert!(SimConfig::default().validate().is_ok());

        let bad_rate = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert_eq!(
            bad_rate.validate(),
            Err(ConfigError::ProbabilityOutOfRange {
                name: "loss_rate",
                value: 1.5
            })
        );

        let bad_override = SimConfig {
            forward: LinkOverride {
                corrupt_rate: Some(-0.1),
                loss_rate: None,
            },
            ..Default::default()
        };
        assert!(bad_override.validate().is_err());

        let zero_timeout = SimConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(zero_timeout.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn loads_partial_toml() {
        let config: SimConfig = toml::from_str(
            r#"
            corrupt_rate = 0.3
            timeout_ms = 250

            [backward]
            loss_rate = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(config.corrupt_rate, 0.3);
        assert_eq!(config.loss_rate, 0.0);
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.backward.loss_rate, Some(0.0));
        assert_eq!(config.trace_capacity, 10_000);
    }
}
