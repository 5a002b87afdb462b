//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::firewall::{RuleEngine, RuleRecord};

/// The three-rule set used by the concrete decision scenarios.
pub const SCENARIO_RULES: [[&str; 4]; 3] = [
    ["inbound", "tcp", "80", "192.168.1.2"],
    ["outbound", "tcp", "10000-20000", "192.168.10.11"],
    ["inbound", "udp", "1-65535", "0.0.0.0-0.255.255.255"],
];

/// A wider rule set covering single values, ranges and edge bounds.
pub const SAMPLE_RULES: [[&str; 4]; 10] = [
    ["inbound", "tcp", "80", "192.168.1.2"],
    ["outbound", "tcp", "10000-20000", "192.168.10.11"],
    ["inbound", "udp", "53", "192.168.1.1-192.168.2.5"],
    ["outbound", "udp", "1000-2000", "52.12.48.92"],
    ["inbound", "tcp", "1", "192.168.1.2"],
    ["outbound", "tcp", "65535", "192.168.10.11"],
    ["outbound", "tcp", "65534-65535", "255.0.0.0-255.255.255.255"],
    ["inbound", "udp", "1-2", "0.0.0.0-0.0.0.1"],
    ["inbound", "udp", "2", "0.255.0.0-0.255.255.255"],
    ["outbound", "udp", "30000", "123.123.123.123"],
];

/// Converts a rule table into records.
pub fn records<const N: usize>(rules: [[&str; 4]; N]) -> Vec<RuleRecord> {
    rules.into_iter().map(RuleRecord::from).collect()
}

/// Creates the engine used by the concrete decision scenarios.
///
/// This is the canonical helper for creating test engines. Tests build their
/// engine from literal records rather than from a file.
pub fn scenario_engine() -> RuleEngine {
    RuleEngine::new(records(SCENARIO_RULES)).expect("scenario rules are well-formed")
}

/// Creates an engine from [`SAMPLE_RULES`].
pub fn sample_engine() -> RuleEngine {
    RuleEngine::new(records(SAMPLE_RULES)).expect("sample rules are well-formed")
}
