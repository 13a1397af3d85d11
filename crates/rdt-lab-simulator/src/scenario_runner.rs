use anyhow::{Context, anyhow};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use rdt_lab_abstract::{RdtVersion, ScenarioAssertion, SimConfig, TestScenario};

use crate::app::InputFeed;
use crate::engine::{RdtEngine, RunningEngine};
use crate::trace::SimulationReport;

/// Default limit when a scenario has no `max_duration` assertion.
const DEFAULT_MAX_DURATION_MS: u64 = 10_000;
/// Quiet period after the sender stops before the run counts as settled.
const SETTLE: Duration = Duration::from_millis(200);

pub fn load_scenario(path: impl AsRef<Path>) -> anyhow::Result<TestScenario> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))
}

pub fn parse_scenario(content: &str) -> anyhow::Result<TestScenario> {
    let scenario: TestScenario = toml::from_str(content).context("Invalid scenario TOML")?;
    Ok(scenario)
}

pub async fn run_scenario_file(path: impl AsRef<Path>) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run_scenario(&scenario).await
}

/// Runs `scenario` to completion and checks its assertions. Returns the
/// report of the run, or the first failed assertion.
pub async fn run_scenario(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);

    let mut engine =
        RdtEngine::new(scenario.protocol, config).context("Invalid scenario configuration")?;
    for fault in &scenario.faults {
        engine.script_fault(fault.direction, fault.kind);
    }

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| {
            if let ScenarioAssertion::MaxDuration { ms } = a {
                Some(*ms)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_MAX_DURATION_MS);

    let (input, feed) = InputFeed::Lines(scenario.input.clone()).spawn();
    let mut running = engine.start(input);

    let limit = Duration::from_millis(max_duration);
    let outcome = tokio::time::timeout(limit, settle(&mut running)).await;
    feed.abort();
    let report = running.shutdown();
    match outcome {
        Err(_) => {
            return Err(anyhow!(
                "Test timed out after {} ms ({} of {} lines delivered)",
                max_duration,
                report.delivered_data.len(),
                scenario.input.len()
            ));
        }
        Ok(result) => result.context("Sender stopped with an error")?,
    }

    check_assertions(&scenario.assertions, &report)?;
    info!("Test Scenario Passed!");
    Ok(report)
}

/// Waits for the sender to stop, then for deliveries to go quiet. rdt1.0's
/// sender stops while its last lines are still on the link.
async fn settle(running: &mut RunningEngine) -> crate::Result<()> {
    running.sender_finished().await?;
    if running.version() == RdtVersion::Rdt10 {
        while let Ok(Some(_)) = tokio::time::timeout(SETTLE, running.next_delivery()).await {}
    }
    Ok(())
}

pub fn check_assertions(
    assertions: &[ScenarioAssertion],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            ScenarioAssertion::DeliveredExactly { data } => {
                if report.delivered_data != *data {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {:?}, expected exactly {:?}",
                        report.delivered_data,
                        data
                    ));
                }
            }
            ScenarioAssertion::DataDelivered { data } => {
                if !report.delivered_data.iter().any(|d| d == data) {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            ScenarioAssertion::SenderPacketCount { min, max } => {
                let sent = report.forward.sent;
                if sent < *min {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected min {}",
                        sent,
                        min
                    ));
                }
                if let Some(max) = max
                    && sent > *max
                {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected max {}",
                        sent,
                        max
                    ));
                }
            }
            ScenarioAssertion::NoTimeouts => {
                if report.timeouts > 0 {
                    return Err(anyhow!(
                        "Assertion Failed: retransmission timer fired {} times",
                        report.timeouts
                    ));
                }
            }
            ScenarioAssertion::MaxDuration { ms } => {
                if report.duration_ms > *ms {
                    return Err(anyhow!(
                        "Assertion Failed: run took {} ms, limit {} ms",
                        report.duration_ms,
                        ms
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::LinkStats;

    fn report(delivered: &[&str], sent: u64, timeouts: u64) -> SimulationReport {
        SimulationReport {
            protocol: RdtVersion::Rdt30,
            config: SimConfig::default(),
            duration_ms: 50,
            delivered_data: delivered.iter().map(|s| s.to_string()).collect(),
            forward: LinkStats {
                sent,
                ..LinkStats::default()
            },
            backward: LinkStats::default(),
            timeouts,
            link_events: Vec::new(),
            events_truncated: 0,
            deliveries_truncated: 0,
        }
    }

    #[test]
    fn failed_assertions_say_what_went_wrong() {
        let report = report(&["a", "a"], 4, 2);

        let err = check_assertions(
            &[ScenarioAssertion::DeliveredExactly {
                data: vec!["a".into()],
            }],
            &report,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected exactly"));

        let err = check_assertions(
            &[ScenarioAssertion::SenderPacketCount {
                min: 1,
                max: Some(3),
            }],
            &report,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected max 3"));

        let err = check_assertions(&[ScenarioAssertion::NoTimeouts], &report).unwrap_err();
        assert!(err.to_string().contains("2 times"));

        let err = check_assertions(
            &[ScenarioAssertion::DataDelivered { data: "b".into() }],
            &report,
        )
        .unwrap_err();
        assert!(err.to_string().contains("\"b\""));
    }

    #[test]
    fn passing_assertions() {
        let report = report(&["a", "b"], 2, 0);
        check_assertions(
            &[
                ScenarioAssertion::DeliveredExactly {
                    data: vec!["a".into(), "b".into()],
                },
                ScenarioAssertion::DataDelivered { data: "b".into() },
                ScenarioAssertion::SenderPacketCount { min: 2, max: None },
                ScenarioAssertion::NoTimeouts,
                ScenarioAssertion::MaxDuration { ms: 50 },
            ],
            &report,
        )
        .unwrap();
    }

    #[test]
    fn unreadable_scenario_names_the_file() {
        let err = load_scenario("/nonexistent/scenario.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/scenario.toml"));
    }
}
