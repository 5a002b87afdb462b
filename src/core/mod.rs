//! Core rule-matching functionality
//!
//! This module contains the core types and logic for deciding packets against
//! a static rule set. It provides:
//!
//! - [`firewall`]: Rule data structures, field matchers, and the [`firewall::RuleEngine`]
//! - [`loader`]: Reading rule and packet files into records and engines
//! - [`error`]: Error types for construction and queries

pub mod error;
pub mod firewall;
pub mod loader;

#[cfg(test)]
pub mod test_helpers;
