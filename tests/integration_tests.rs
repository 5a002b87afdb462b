//! Integration tests for HBFW
//!
//! These tests drive the public API end to end: rule files on disk are
//! loaded, fingerprinted and used to decide packet batches.
//!
//! ```bash
//! cargo test --test integration_tests
//! ```

#![allow(clippy::uninlined_format_args)]

use hbfw::audit::{AuditEvent, AuditLog, EventType};
use hbfw::config::{self, AppConfig};
use hbfw::core::error::{Error, Field};
use hbfw::core::loader;
use hbfw::{QueryPolicy, RuleEngine, Strictness};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const RULES: &str = "\
# direction,protocol,port,address
inbound,tcp,80,192.168.1.2
outbound,tcp,10000-20000,192.168.10.11
inbound,udp,53,192.168.1.1-192.168.2.5
inbound,tcp,443,10.0.0.0/8
";

const PACKETS: &str = "\
inbound,tcp,80,192.168.1.2
inbound,tcp,81,192.168.1.2
outbound,tcp,9,192.168.10.11
outbound,tcp,15000,192.168.10.11
inbound,udp,53,192.168.2.5
inbound,tcp,443,10.200.3.4
inbound,tcp,0,192.168.1.2
";

/// Writes `content` to `name` inside `dir`
fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn load(path: &Path, strictness: Strictness) -> RuleEngine {
    loader::load_engine(path, strictness).await.unwrap().engine
}

#[tokio::test]
async fn test_load_engine_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "rules.csv", RULES);

    let loaded = loader::load_engine(&path, Strictness::Strict).await.unwrap();

    assert_eq!(loaded.engine.len(), 4);
    assert_eq!(loaded.path, path);
    assert_eq!(loaded.fingerprint.as_str().len(), 64);
    assert!(loaded.engine.accept_packet("inbound", "tcp", 80, "192.168.1.2"));
    assert!(loaded.engine.accept_packet("inbound", "tcp", 443, "10.1.2.3"));
    assert!(!loaded.engine.accept_packet("inbound", "tcp", 443, "11.0.0.1"));
}

#[tokio::test]
async fn test_fingerprint_tracks_content() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a.csv", RULES);
    let b = write_file(&dir, "b.csv", RULES);
    let c = write_file(&dir, "c.csv", &format!("{RULES}outbound,udp,123,1.1.1.1\n"));

    let fa = loader::load_engine(&a, Strictness::Strict).await.unwrap();
    let fb = loader::load_engine(&b, Strictness::Strict).await.unwrap();
    let fc = loader::load_engine(&c, Strictness::Strict).await.unwrap();

    assert_eq!(fa.fingerprint, fb.fingerprint);
    assert_ne!(fa.fingerprint, fc.fingerprint);
}

#[tokio::test]
async fn test_strict_load_fails_on_first_bad_line() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "rules.csv",
        "inbound,tcp,80,1.2.3.4\n\n# comment\ninbound,tcp,65536,1.2.3.4\nsideways,tcp,1,1.2.3.4\n",
    );

    let err = loader::load_engine(&path, Strictness::Strict)
        .await
        .unwrap_err();

    assert!(err.is_malformed_rule());
    assert!(matches!(
        err,
        Error::MalformedRule {
            index: Some(4),
            field: Field::Port,
            ..
        }
    ));
}

#[tokio::test]
async fn test_trusting_load_skips_bad_lines() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "rules.csv",
        "inbound,tcp,80,1.2.3.4\ninbound,tcp,abc,1.2.3.4\ninbound,udp,53,1.2.3.4\n",
    );

    let engine = load(&path, Strictness::Trusting).await;

    assert_eq!(engine.len(), 2);
    assert!(engine.accept_packet("inbound", "udp", 53, "1.2.3.4"));
}

#[tokio::test]
async fn test_missing_rule_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nope.csv");

    let err = loader::load_engine(&path, Strictness::Strict)
        .await
        .unwrap_err();

    match err {
        Error::Io(e) => {
            assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
            assert!(e.to_string().contains("nope.csv"));
        }
        other => panic!("expected Io error, got {other}"),
    }
}

#[tokio::test]
async fn test_batch_decisions_under_each_policy() {
    let dir = TempDir::new().unwrap();
    let rules = write_file(&dir, "rules.csv", RULES);
    let packets = write_file(&dir, "packets.csv", PACKETS);

    let engine = load(&rules, Strictness::Strict).await;
    let packets = loader::load_packets(&packets).await.unwrap();
    assert_eq!(packets.len(), 7);

    let denied: Vec<bool> = packets
        .iter()
        .map(|p| p.decide(&engine, QueryPolicy::Deny).unwrap())
        .collect();
    assert_eq!(denied, vec![true, false, false, true, true, true, false]);

    let rejected: Vec<_> = packets
        .iter()
        .map(|p| p.decide(&engine, QueryPolicy::Reject))
        .collect();
    assert!(rejected[..6].iter().all(Result::is_ok));
    assert!(rejected[6].as_ref().unwrap_err().is_invalid_query());
}

#[tokio::test]
async fn test_lint_file_reports_every_line() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "rules.csv",
        "inbound,tcp,80,1.2.3.4\ninbound,tcp,80,1.2.3\ninbound,icmp,80,1.2.3.4\ninbound,tcp,80,1.2.3.4\n",
    );

    let errors = loader::lint_file(&path).await.unwrap();

    assert_eq!(errors.len(), 2);
    assert!(errors[0].to_string().contains("#2"));
    assert!(errors[1].to_string().contains("#3"));
}

#[tokio::test]
async fn test_config_points_at_rule_file() {
    let dir = TempDir::new().unwrap();
    let rules = write_file(&dir, "rules.csv", RULES);
    let config_path = dir.path().join(config::CONFIG_FILE_NAME);

    let config = AppConfig {
        rules_path: Some(rules.clone()),
        query_policy: QueryPolicy::Reject,
        ..AppConfig::default()
    };
    config::save_config_to(&config_path, &config).await.unwrap();

    let config = config::load_config_from(&config_path).await;
    let path = config.resolve_rules_path(None).unwrap();
    let engine = load(&path, config.strictness).await;

    assert!(
        engine
            .decide("inbound", "tcp", 80, "192.168.1.2", config.query_policy)
            .unwrap()
    );
    assert!(
        engine
            .decide("inbound", "tcp", 80, "192.168.1.256", config.query_policy)
            .is_err()
    );
}

#[tokio::test]
async fn test_audit_log_records_load() {
    let dir = TempDir::new().unwrap();
    let rules = write_file(&dir, "rules.csv", RULES);
    let audit = AuditLog::at(dir.path().join("audit.log"));

    let loaded = loader::load_engine(&rules, Strictness::Strict).await.unwrap();
    audit
        .log(AuditEvent::new(
            EventType::LoadRules,
            true,
            serde_json::json!({
                "rule_count": loaded.engine.len(),
                "fingerprint": loaded.fingerprint,
            }),
            None,
        ))
        .await
        .unwrap();

    let events = audit.read_recent(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::LoadRules);
    assert_eq!(events[0].details["rule_count"], 4);
    assert_eq!(
        events[0].details["fingerprint"],
        loaded.fingerprint.as_str()
    );
}
