#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests driving a real [`catenary_bridge::Bridge`] against the
//! `mock_analyzer` binary over actual pipes.

use std::collections::HashMap;
use std::time::Duration;

use catenary_bridge::api;
use catenary_bridge::config::RateLimiterConfig;
use catenary_bridge::validator::{ExpectedShape, FieldAssertion, Validator};
use catenary_bridge::{Bridge, BridgeConfig, BridgeError, BridgeEvent, BridgeResult};

fn mock_analyzer_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_mock_analyzer"))
}

/// Builds a config pointed at the `mock_analyzer` binary. `Bridge::start`
/// always invokes the executable with exactly one positional argument (the
/// entry script path), so per-scenario behavior is driven through
/// `env_overlay`'s `MOCK_ANALYZER_*` variables rather than CLI flags.
fn base_config(env_overlay: HashMap<String, String>) -> BridgeConfig {
    BridgeConfig {
        executable_path: mock_analyzer_path().to_string_lossy().into_owned(),
        script_path: Some(std::path::PathBuf::from("unused")),
        timeout: Duration::from_secs(5),
        env_overlay,
        startup_delay: Duration::from_millis(20),
        shutdown_delay: Duration::from_millis(20),
        kill_grace_period: Duration::from_millis(200),
        ..BridgeConfig::default()
    }
}

fn default_config() -> BridgeConfig {
    base_config(HashMap::new())
}

fn config_with_env(pairs: &[(&str, &str)]) -> BridgeConfig {
    let env = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    base_config(env)
}

#[tokio::test]
async fn happy_path_tokenize_round_trip() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());
    let result = api::tokenize(&bridge, "int x = 1;").await?;
    assert_eq!(result.tokens, vec!["int", "x", "=", "1;"]);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn happy_path_parse_extracts_symbols() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());
    let result = api::parse(&bridge, "void main() {}\n", "a.pike").await?;
    assert_eq!(result.symbols.len(), 1);
    assert_eq!(result.symbols[0].name, "main");
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_identical_requests_are_deduplicated() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());

    let (a, b, c) = tokio::join!(
        api::tokenize(&bridge, "a b c"),
        api::tokenize(&bridge, "a b c"),
        api::tokenize(&bridge, "a b c"),
    );

    assert_eq!(a?.tokens, vec!["a", "b", "c"]);
    assert_eq!(b?.tokens, vec!["a", "b", "c"]);
    assert_eq!(c?.tokens, vec!["a", "b", "c"]);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn request_times_out_against_a_hanging_analyzer() {
    let mut config = config_with_env(&[("MOCK_ANALYZER_HANG_ON", "tokenize")]);
    config.timeout = Duration::from_millis(150);
    let bridge = Bridge::new(config);

    let err = api::tokenize(&bridge, "anything").await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { method, .. } if method == "tokenize"));
    bridge.stop().await;
}

#[tokio::test]
async fn process_exit_rejects_pending_requests_with_process_exited() {
    let mut config = config_with_env(&[
        ("MOCK_ANALYZER_HANG_ON", "tokenize"),
        ("MOCK_ANALYZER_EXIT_AFTER_MS", "100"),
    ]);
    config.timeout = Duration::from_secs(2);
    let bridge = Bridge::new(config);

    let err = api::tokenize(&bridge, "x").await.unwrap_err();
    assert!(matches!(err, BridgeError::ProcessExited { .. }));
}

#[tokio::test]
async fn explicit_failure_surfaces_as_request_failed() {
    let bridge = Bridge::new(config_with_env(&[("MOCK_ANALYZER_FAIL_ON", "tokenize")]));
    let err = api::tokenize(&bridge, "x").await.unwrap_err();
    assert!(matches!(err, BridgeError::RequestFailed { method, .. } if method == "tokenize"));
    bridge.stop().await;
}

#[tokio::test]
async fn validator_catches_shape_drift_in_get_pike_paths() {
    // The mock always returns well-shaped arrays; this exercises the
    // validator directly against a malformed stand-in response, the
    // failure mode the real analyzer has historically hit (an empty array
    // reported as the bare number 0).
    let validator = Validator::new(
        "get_pike_paths",
        vec![
            FieldAssertion {
                field: "include_paths",
                expected: ExpectedShape::StringArray,
            },
            FieldAssertion {
                field: "module_paths",
                expected: ExpectedShape::StringArray,
            },
        ],
    );
    let malformed = serde_json::json!({"include_paths": 0, "module_paths": []});
    let err = validator.validate(&malformed).unwrap_err();
    assert!(matches!(err, BridgeError::BridgeResponseError { field, .. } if field == "include_paths"));
}

#[tokio::test]
async fn get_pike_paths_round_trips_through_the_real_analyzer() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());
    let paths = api::get_pike_paths(&bridge).await?;
    assert_eq!(paths.include_paths, vec!["/usr/share/pike/include"]);
    assert_eq!(paths.module_paths, vec!["/usr/share/pike/modules"]);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn rate_limiter_denies_requests_beyond_burst_capacity() {
    let mut config = default_config();
    config.rate_limit = Some(RateLimiterConfig {
        max_requests: 2,
        window_seconds: 3600,
    });
    let bridge = Bridge::new(config);

    let first = api::tokenize(&bridge, "a").await;
    let second = api::tokenize(&bridge, "b").await;
    let third = api::tokenize(&bridge, "c").await;

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(matches!(third.unwrap_err(), BridgeError::RateLimitExceeded));
    bridge.stop().await;
}

#[tokio::test]
async fn completion_context_falls_back_to_full_tokenization_on_cache_miss() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());
    let context =
        api::get_completion_context_cached(&bridge, "file:///a.pike", 1, "a b c", 5).await?;
    assert_eq!(context.split_tokens, vec!["a", "b", "c"]);

    let stats = api::get_cache_stats(&bridge).await;
    assert_eq!(stats.entries, 1);

    api::invalidate_cache(&bridge, "file:///a.pike").await;
    let stats = api::get_cache_stats(&bridge).await;
    assert_eq!(stats.entries, 0);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn batch_parse_splits_into_configured_chunk_sizes() -> BridgeResult<()> {
    let mut config = default_config();
    config.batch_chunk_size = 2;
    let bridge = Bridge::new(config);

    let files = vec![
        api::BatchFile {
            filename: "a.pike".to_string(),
            code: "void a() {}".to_string(),
        },
        api::BatchFile {
            filename: "b.pike".to_string(),
            code: "void b() {}".to_string(),
        },
        api::BatchFile {
            filename: "c.pike".to_string(),
            code: "void c() {}".to_string(),
        },
    ];

    let results = api::batch_parse(&bridge, files).await?;
    assert_eq!(results.len(), 3);

    let metrics = bridge.drain_batch_metrics().await;
    assert_eq!(metrics.chunk_count, 2);
    assert_eq!(metrics.file_count, 3);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn start_is_idempotent() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());
    bridge.start().await?;
    bridge.start().await?;
    assert!(bridge.is_running().await);
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_on_a_never_started_bridge_is_a_no_op() {
    let bridge = Bridge::new(default_config());
    bridge.stop().await;
    assert!(!bridge.is_running().await);
}

#[tokio::test]
async fn set_debug_round_trips() -> BridgeResult<()> {
    let bridge = Bridge::new(default_config());
    api::set_debug(&bridge, true).await?;
    api::set_debug(&bridge, false).await?;
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn health_check_reports_executable_version() {
    let bridge = Bridge::new(default_config());
    let status = bridge.health_check().await;
    assert!(status.executable_version.is_some());
}

#[tokio::test]
async fn stderr_matching_suppression_pattern_is_not_broadcast() -> BridgeResult<()> {
    let mut config = config_with_env(&[(
        "MOCK_ANALYZER_STDERR_LINES",
        "benign parser warning: self-parse skip,real problem: disk full",
    )]);
    config.stderr_suppress_patterns = vec!["benign parser warning".to_string()];
    let bridge = Bridge::new(config);
    let mut events = bridge.subscribe();

    bridge.start().await?;

    let mut stderr_lines = Vec::new();
    for _ in 0..4 {
        match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            Ok(Ok(BridgeEvent::Stderr(text))) => stderr_lines.push(text),
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }

    assert!(stderr_lines.iter().any(|line| line.contains("real problem")));
    assert!(!stderr_lines.iter().any(|line| line.contains("benign parser warning")));
    bridge.stop().await;
    Ok(())
}

#[tokio::test]
async fn health_check_fails_after_a_recorded_process_exit() {
    let mut config = config_with_env(&[
        ("MOCK_ANALYZER_HANG_ON", "tokenize"),
        ("MOCK_ANALYZER_EXIT_AFTER_MS", "50"),
    ]);
    // Point `script_path` at a file that actually exists so this test
    // isolates condition (c) ("no prior failure") rather than (b).
    config.script_path = Some(mock_analyzer_path());
    let bridge = Bridge::new(config);
    let _ = api::tokenize(&bridge, "x").await;

    // Give the dispatch loop a moment to observe the process exit and
    // record the failure.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = bridge.health_check().await;
    assert!(!status.healthy);
    assert!(status.error.is_some_and(|e| e.contains("prior analyzer failure")));
}
