use std::path::PathBuf;

use rdt_lab_simulator::scenario_runner::{parse_scenario, run_scenario, run_scenario_file};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(name)
}

#[tokio::test(start_paused = true)]
async fn bundled_scenarios_pass() {
    for name in [
        "rdt21_corrupted_ack.toml",
        "rdt22_hello.toml",
        "rdt30_dropped_packet.toml",
        "rdt30_lossy.toml",
    ] {
        let report = run_scenario_file(scenario_path(name))
            .await
            .unwrap_or_else(|err| panic!("{name}: {err:#}"));
        assert!(!report.delivered_data.is_empty(), "{name}");
    }
}

#[tokio::test(start_paused = true)]
async fn rdt10_scenario_waits_for_in_flight_lines() {
    let scenario = parse_scenario(
        r#"
        name = "rdt1.0 clean"
        protocol = "rdt10"
        input = ["one", "two", "three"]

        [[assertions]]
        type = "delivered_exactly"
        data = ["one", "two", "three"]
        "#,
    )
    .unwrap();
    let report = run_scenario(&scenario).await.unwrap();
    assert_eq!(report.backward.sent, 0);
}

#[tokio::test(start_paused = true)]
async fn failing_assertion_is_reported() {
    let scenario = parse_scenario(
        r#"
        name = "rdt2.0 double delivery"
        protocol = "rdt20"
        input = ["hello"]

        [[faults]]
        direction = "backward"
        kind = "corrupt"

        [[assertions]]
        type = "delivered_exactly"
        data = ["hello"]
        "#,
    )
    .unwrap();
    let err = run_scenario(&scenario).await.unwrap_err();
    assert!(err.to_string().contains("Assertion Failed"), "{err:#}");
}

#[tokio::test(start_paused = true)]
async fn stuck_run_hits_max_duration() {
    // everything is lost and rdt2.2 has no timer to recover
    let scenario = parse_scenario(
        r#"
        name = "rdt2.2 on a dead link"
        protocol = "rdt22"
        input = ["hello"]

        [config]
        loss_rate = 1.0

        [[assertions]]
        type = "max_duration"
        ms = 500
        "#,
    )
    .unwrap();
    let err = run_scenario(&scenario).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("timed out after 500 ms"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected() {
    let scenario = parse_scenario(
        r#"
        name = "bad rate"
        protocol = "rdt30"
        input = ["x"]

        [config]
        corrupt_rate = 2.0
        "#,
    )
    .unwrap();
    let err = run_scenario(&scenario).await.unwrap_err();
    assert!(format!("{err:#}").contains("corrupt_rate"));
}

#[test]
fn unknown_assertion_type_fails_to_parse() {
    let err = parse_scenario(
        r#"
        name = "typo"
        protocol = "rdt22"
        input = []

        [[assertions]]
        type = "delivered_eventually"
        "#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("Invalid scenario TOML"));
}
