//! HBFW - Host-Based FireWall rule engine
//!
//! Decides whether a packet, described by direction, protocol, port and IPv4
//! address, is permitted by a static list of rules.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, field matchers, the decision engine, and rule file loading
//! - [`validators`] - Port and IPv4 token validation
//! - [`config`] - Configuration persistence
//! - [`audit`] - Opt-in audit log of loads and decisions
//! - [`utils`] - Utility functions (XDG directories)
//!
//! # Example
//!
//! ```
//! use hbfw::RuleEngine;
//!
//! let engine = RuleEngine::new([("inbound", "udp", "53", "192.168.1.1-192.168.2.5")])?;
//! assert!(engine.accept_packet("inbound", "udp", 53, "192.168.2.0"));
//! assert!(!engine.accept_packet("inbound", "tcp", 53, "192.168.2.0"));
//! # Ok::<(), hbfw::Error>(())
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::firewall::{Packet, QueryPolicy, Rule, RuleEngine, RuleRecord, Strictness};
