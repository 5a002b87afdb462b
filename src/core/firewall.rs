//! Firewall rule data structures and the packet decision engine
//!
//! This module defines the structured form of a firewall rule and the
//! [`RuleEngine`] that decides whether a packet is permitted.
//!
//! # Rule Structure
//!
//! A [`Rule`] is one permitted traffic pattern:
//! - [`Direction`]: inbound or outbound
//! - [`Protocol`]: tcp or udp
//! - [`PortSpec`]: a single port or an inclusive port range
//! - [`AddressSpec`]: a single IPv4 address, an inclusive address range, or a CIDR network
//!
//! Rules are parsed once from a [`RuleRecord`] (the four raw fields of a rule
//! file line). The single/range choice is made when the record is parsed, so
//! matching never re-inspects the original text.
//!
//! # Decision
//!
//! A packet is accepted if at least one rule matches it on all four fields.
//! There is no precedence and no deny rule: the rule set is a pure OR.
//!
//! # Example
//!
//! ```
//! use hbfw::core::firewall::RuleEngine;
//!
//! let engine = RuleEngine::new([
//!     ("inbound", "tcp", "80", "192.168.1.2"),
//!     ("outbound", "tcp", "10000-20000", "192.168.10.11"),
//!     ("inbound", "udp", "1-65535", "0.0.0.0-0.255.255.255"),
//! ])
//! .unwrap();
//!
//! assert!(engine.accept_packet("inbound", "tcp", 80, "192.168.1.2"));
//! assert!(engine.accept_packet("outbound", "tcp", 15000, "192.168.10.11"));
//! assert!(!engine.accept_packet("outbound", "tcp", 65534, "192.168.10.11"));
//! ```

use crate::core::error::{Error, Field, Result};
use crate::validators;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Separator between the two bounds of a port or address range
pub const RANGE_SEPARATOR: char = '-';

/// Separator between a network address and its prefix length
pub const PREFIX_SEPARATOR: char = '/';

/// Traffic direction relative to the host
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Traffic entering the machine
    #[strum(serialize = "inbound")]
    Inbound,
    /// Traffic leaving the machine
    #[strum(serialize = "outbound")]
    Outbound,
}

/// Transport protocol
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
}

/// How rule records are checked while building a [`RuleEngine`]
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Any malformed record fails construction; no partial engine is built
    #[default]
    #[strum(serialize = "strict")]
    Strict,
    /// Records are assumed well-formed: range ordering is not checked and
    /// unparseable records are skipped with a warning
    #[strum(serialize = "trusting")]
    Trusting,
}

/// What a decision does with a query no rule could ever describe
/// (port outside [1, 65535], malformed address, unknown token)
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum QueryPolicy {
    /// Treat the packet as unmatched (decision is `false`)
    #[default]
    #[strum(serialize = "deny")]
    Deny,
    /// Report `Error::InvalidQuery` to the caller
    #[strum(serialize = "reject")]
    Reject,
}

/// Port field of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSpec {
    Single(u16),
    /// Inclusive on both ends
    Range { low: u16, high: u16 },
}

impl PortSpec {
    /// Parses `"80"` or `"80-85"`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedRule` if a bound is not a port in [1, 65535],
    /// or (under [`Strictness::Strict`]) the range is not strictly increasing.
    pub fn parse(token: &str, strictness: Strictness) -> Result<Self> {
        let port = |t: &str| validators::parse_port(t).map_err(|e| Error::malformed(Field::Port, e));

        let Some((low, high)) = token.split_once(RANGE_SEPARATOR) else {
            return Ok(PortSpec::Single(port(token)?));
        };
        let (low, high) = (port(low)?, port(high)?);

        if strictness == Strictness::Strict {
            validators::validate_port_range(low, high).map_err(|e| Error::malformed(Field::Port, e))?;
        }
        Ok(PortSpec::Range { low, high })
    }

    /// Returns `true` if `port` is the single port or lies inside the range.
    pub const fn matches(&self, port: u16) -> bool {
        match *self {
            PortSpec::Single(p) => p == port,
            PortSpec::Range { low, high } => low <= port && port <= high,
        }
    }
}

impl FromStr for PortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, Strictness::Strict)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Single(port) => write!(f, "{port}"),
            PortSpec::Range { low, high } => write!(f, "{low}{RANGE_SEPARATOR}{high}"),
        }
    }
}

/// Address field of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpec {
    Single(Ipv4Addr),
    /// Inclusive on both ends, ordered as 32-bit integers
    Range { low: Ipv4Addr, high: Ipv4Addr },
    /// CIDR block, e.g. `10.0.0.0/24`
    Network(Ipv4Network),
}

impl AddressSpec {
    /// Parses `"10.0.0.1"`, `"10.0.0.0-10.0.0.255"` or `"10.0.0.0/24"`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedRule` if an address is not a dotted-quad
    /// IPv4 address, the prefix is invalid, or (under
    /// [`Strictness::Strict`]) the range is not strictly increasing.
    pub fn parse(token: &str, strictness: Strictness) -> Result<Self> {
        let addr =
            |t: &str| validators::parse_ipv4(t).map_err(|e| Error::malformed(Field::Address, e));

        if token.contains(PREFIX_SEPARATOR) {
            return validators::parse_ipv4_network(token)
                .map(AddressSpec::Network)
                .map_err(|e| Error::malformed(Field::Address, e));
        }

        let Some((low, high)) = token.split_once(RANGE_SEPARATOR) else {
            return Ok(AddressSpec::Single(addr(token)?));
        };
        let (low, high) = (addr(low)?, addr(high)?);

        if strictness == Strictness::Strict {
            validators::validate_ipv4_range(low, high)
                .map_err(|e| Error::malformed(Field::Address, e))?;
        }
        Ok(AddressSpec::Range { low, high })
    }

    /// Returns `true` if `addr` equals the single address or lies inside the
    /// range or network.
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        match *self {
            AddressSpec::Single(a) => a == addr,
            AddressSpec::Range { low, high } => {
                (u32::from(low)..=u32::from(high)).contains(&u32::from(addr))
            }
            AddressSpec::Network(net) => net.contains(addr),
        }
    }
}

impl FromStr for AddressSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, Strictness::Strict)
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpec::Single(addr) => write!(f, "{addr}"),
            AddressSpec::Range { low, high } => write!(f, "{low}{RANGE_SEPARATOR}{high}"),
            AddressSpec::Network(net) => write!(f, "{net}"),
        }
    }
}

/// The four raw fields of a rule, as a loader reads them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub direction: String,
    pub protocol: String,
    pub port: String,
    pub address: String,
}

impl RuleRecord {
    pub fn new(
        direction: impl Into<String>,
        protocol: impl Into<String>,
        port: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            direction: direction.into(),
            protocol: protocol.into(),
            port: port.into(),
            address: address.into(),
        }
    }
}

impl From<(&str, &str, &str, &str)> for RuleRecord {
    fn from((direction, protocol, port, address): (&str, &str, &str, &str)) -> Self {
        Self::new(direction, protocol, port, address)
    }
}

impl From<[&str; 4]> for RuleRecord {
    fn from([direction, protocol, port, address]: [&str; 4]) -> Self {
        Self::new(direction, protocol, port, address)
    }
}

impl From<&Rule> for RuleRecord {
    fn from(rule: &Rule) -> Self {
        Self::new(
            rule.direction.as_ref(),
            rule.protocol.as_ref(),
            rule.ports.to_string(),
            rule.addresses.to_string(),
        )
    }
}

/// One permitted traffic pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rule {
    pub direction: Direction,
    pub protocol: Protocol,
    pub ports: PortSpec,
    pub addresses: AddressSpec,
}

impl Rule {
    /// Parses a record, rejecting anything malformed.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedRule` naming the first bad field.
    pub fn parse(record: &RuleRecord) -> Result<Self> {
        Self::parse_with(record, Strictness::Strict)
    }

    /// Parses a record under the given strictness.
    ///
    /// Direction and protocol tokens are case-sensitive lowercase in both
    /// modes; strictness only affects range ordering checks.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedRule` naming the first bad field.
    pub fn parse_with(record: &RuleRecord, strictness: Strictness) -> Result<Self> {
        let direction = record.direction.parse::<Direction>().map_err(|_| {
            Error::malformed(
                Field::Direction,
                format!("'{}' is not 'inbound' or 'outbound'", record.direction),
            )
        })?;
        let protocol = record.protocol.parse::<Protocol>().map_err(|_| {
            Error::malformed(
                Field::Protocol,
                format!("'{}' is not 'tcp' or 'udp'", record.protocol),
            )
        })?;

        Ok(Self {
            direction,
            protocol,
            ports: PortSpec::parse(&record.port, strictness)?,
            addresses: AddressSpec::parse(&record.address, strictness)?,
        })
    }

    /// Returns `true` only if all four fields match the packet.
    pub fn matches(&self, packet: &Packet) -> bool {
        self.direction == packet.direction
            && self.protocol == packet.protocol
            && self.ports.matches(packet.port)
            && self.addresses.matches(packet.address)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.direction, self.protocol, self.ports, self.addresses
        )
    }
}

/// A packet query, validated once before matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Packet {
    pub direction: Direction,
    pub protocol: Protocol,
    pub port: u16,
    pub address: Ipv4Addr,
}

impl Packet {
    pub const fn new(direction: Direction, protocol: Protocol, port: u16, address: Ipv4Addr) -> Self {
        Self {
            direction,
            protocol,
            port,
            address,
        }
    }

    /// Builds a packet from the raw query values.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` for an unknown direction or protocol,
    /// a port outside [1, 65535], or an address that is not dotted-quad IPv4.
    pub fn parse(direction: &str, protocol: &str, port: u32, ip_address: &str) -> Result<Self> {
        let direction = direction.parse::<Direction>().map_err(|_| {
            Error::invalid_query(Field::Direction, format!("unknown direction '{direction}'"))
        })?;
        let protocol = protocol.parse::<Protocol>().map_err(|_| {
            Error::invalid_query(Field::Protocol, format!("unknown protocol '{protocol}'"))
        })?;
        let port =
            validators::validate_query_port(port).map_err(|e| Error::invalid_query(Field::Port, e))?;
        let address = validators::parse_ipv4(ip_address)
            .map_err(|e| Error::invalid_query(Field::Address, e))?;

        Ok(Self::new(direction, protocol, port, address))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.direction, self.protocol, self.port, self.address
        )
    }
}

/// An immutable, ordered rule set and its accept/reject decision
///
/// The engine never changes after construction, so a shared reference can be
/// queried from any number of threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Builds an engine from raw records, rejecting any malformed record.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedRule` for the first bad record (1-based index);
    /// no engine is built.
    pub fn new<I>(records: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<RuleRecord>,
    {
        Self::with_strictness(records, Strictness::Strict)
    }

    /// Builds an engine from raw records under the given strictness.
    ///
    /// # Errors
    ///
    /// Under [`Strictness::Strict`], returns `Error::MalformedRule` for the
    /// first bad record. Under [`Strictness::Trusting`] bad records are
    /// skipped and this never fails.
    pub fn with_strictness<I>(records: I, strictness: Strictness) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<RuleRecord>,
    {
        let numbered = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| (i + 1, Ok(record.into())));
        Ok(Self {
            rules: collect_rules(numbered, strictness)?,
        })
    }

    /// Builds an engine from already-parsed rules.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Rules in storage order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns `true` if any rule permits the packet.
    ///
    /// Queries that no rule could describe (unknown direction/protocol, port
    /// outside [1, 65535], malformed address) are simply not accepted. Use
    /// [`RuleEngine::try_accept_packet`] to have them reported instead.
    pub fn accept_packet(&self, direction: &str, protocol: &str, port: u32, ip_address: &str) -> bool {
        match self.try_accept_packet(direction, protocol, port, ip_address) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::debug!("Rejecting degenerate query: {}", e);
                false
            }
        }
    }

    /// Same decision as [`RuleEngine::accept_packet`], but degenerate
    /// queries are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` if the query cannot be parsed into a
    /// [`Packet`].
    pub fn try_accept_packet(
        &self,
        direction: &str,
        protocol: &str,
        port: u32,
        ip_address: &str,
    ) -> Result<bool> {
        let packet = Packet::parse(direction, protocol, port, ip_address)?;
        Ok(self.accepts(&packet))
    }

    /// Decides a raw query according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` only under [`QueryPolicy::Reject`].
    pub fn decide(
        &self,
        direction: &str,
        protocol: &str,
        port: u32,
        ip_address: &str,
        policy: QueryPolicy,
    ) -> Result<bool> {
        match policy {
            QueryPolicy::Deny => Ok(self.accept_packet(direction, protocol, port, ip_address)),
            QueryPolicy::Reject => self.try_accept_packet(direction, protocol, port, ip_address),
        }
    }

    /// Returns `true` if any rule permits an already-parsed packet.
    pub fn accepts(&self, packet: &Packet) -> bool {
        self.matching_rule(packet).is_some()
    }

    /// First rule (and its 0-based position) that permits the packet.
    pub fn matching_rule(&self, packet: &Packet) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(packet))
    }
}

/// Parses numbered records into rules.
///
/// Each item carries the number used in error messages (record index or file
/// line) and either a record or the error hit while reading it. Strict mode
/// stops at the first error; trusting mode logs and skips it.
pub(crate) fn collect_rules<I>(numbered: I, strictness: Strictness) -> Result<Vec<Rule>>
where
    I: IntoIterator<Item = (usize, Result<RuleRecord>)>,
{
    let mut rules = Vec::new();
    let mut skipped = 0usize;

    for (n, record) in numbered {
        match record.and_then(|r| Rule::parse_with(&r, strictness)) {
            Ok(rule) => rules.push(rule),
            Err(e) if strictness == Strictness::Strict => return Err(e.at_index(n)),
            Err(e) => {
                tracing::warn!("Skipping rule #{}: {}", n, e);
                skipped += 1;
            }
        }
    }

    tracing::debug!(
        rules = rules.len(),
        skipped,
        %strictness,
        "Built rule engine"
    );
    Ok(rules)
}

impl FromIterator<Rule> for RuleEngine {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self::from_rules(iter)
    }
}
