//! Rule and packet file loading
//!
//! Rule files hold one rule per line as four comma-separated fields:
//!
//! ```text
//! # direction,protocol,port_or_range,address_or_range
//! inbound,tcp,80,192.168.1.2
//! outbound,tcp,10000-20000,192.168.10.11
//! inbound,udp,53,192.168.1.1-192.168.2.5
//! ```
//!
//! Blank lines and lines starting with `#` are ignored, and whitespace around
//! each field is trimmed. Batch packet files use the same shape with a plain
//! port number in the third field.
//!
//! Errors name the 1-based line they came from.

use crate::core::error::{Error, Field, Result};
use crate::core::firewall::{self, Packet, QueryPolicy, Rule, RuleEngine, RuleRecord, Strictness};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lines starting with this character are comments
pub const COMMENT_PREFIX: char = '#';

/// Separator between the four fields of a record
pub const FIELD_SEPARATOR: char = ',';

/// Number of fields in a rule or packet record
pub const FIELD_COUNT: usize = 4;

/// Hex digits shown by [`RuleSetFingerprint::short`]
const SHORT_FINGERPRINT_LEN: usize = 12;

/// SHA-256 digest of a rule file's bytes, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSetFingerprint(String);

impl RuleSetFingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_FINGERPRINT_LEN).unwrap_or(&self.0)
    }
}

impl fmt::Display for RuleSetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An engine together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedRules {
    pub engine: RuleEngine,
    pub fingerprint: RuleSetFingerprint,
    pub path: PathBuf,
}

/// A packet query read from a batch file, not yet validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    /// 1-based line in the source file
    pub line: usize,
    pub direction: String,
    pub protocol: String,
    pub port: u32,
    pub address: String,
}

impl PacketRecord {
    /// Decides this query against `engine` under `policy`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` only under [`QueryPolicy::Reject`].
    pub fn decide(&self, engine: &RuleEngine, policy: QueryPolicy) -> Result<bool> {
        engine.decide(
            &self.direction,
            &self.protocol,
            self.port,
            &self.address,
            policy,
        )
    }

    /// Validates the query into a typed packet.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidQuery` if any field is out of domain.
    pub fn to_packet(&self) -> Result<Packet> {
        Packet::parse(&self.direction, &self.protocol, self.port, &self.address)
    }
}

/// Splits a text into `(line number, fields)` for every non-comment line.
fn numbered_fields(text: &str) -> impl Iterator<Item = (usize, Result<[&str; FIELD_COUNT]>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            return None;
        }

        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
        let fields = <[&str; FIELD_COUNT]>::try_from(fields).map_err(|fields| {
            Error::malformed(
                Field::Record,
                format!(
                    "expected {FIELD_COUNT} comma-separated fields, found {}",
                    fields.len()
                ),
            )
            .at_index(i + 1)
        });
        Some((i + 1, fields))
    })
}

fn numbered_records(text: &str) -> impl Iterator<Item = (usize, Result<RuleRecord>)> {
    numbered_fields(text).map(|(n, fields)| (n, fields.map(RuleRecord::from)))
}

/// Reads rule records from text without interpreting the fields.
///
/// # Errors
///
/// Returns `Error::MalformedRule` for the first line that does not have
/// exactly four fields.
pub fn parse_records(text: &str) -> Result<Vec<RuleRecord>> {
    numbered_records(text).map(|(_, record)| record).collect()
}

/// Builds an engine from rule file text.
///
/// # Errors
///
/// Under [`Strictness::Strict`], returns `Error::MalformedRule` for the first
/// bad line. Under [`Strictness::Trusting`] bad lines are skipped.
pub fn engine_from_text(text: &str, strictness: Strictness) -> Result<RuleEngine> {
    let rules = firewall::collect_rules(numbered_records(text), strictness)?;
    Ok(RuleEngine::from_rules(rules))
}

/// Reports every malformed line in a rule file, rather than just the first.
pub fn lint(text: &str) -> Vec<Error> {
    numbered_records(text)
        .filter_map(|(n, record)| {
            record
                .and_then(|r| Rule::parse(&r))
                .err()
                .map(|e| e.at_index(n))
        })
        .collect()
}

/// Reads packet queries from batch file text.
///
/// Port range and token validity are left to the query policy; only the
/// record shape and an integer port are required here.
///
/// # Errors
///
/// Returns `Error::MalformedRule` for a line without four fields, or
/// `Error::InvalidQuery` for a port that is not a non-negative integer.
pub fn parse_packets(text: &str) -> Result<Vec<PacketRecord>> {
    numbered_fields(text)
        .map(|(line, fields)| -> Result<PacketRecord> {
            let [direction, protocol, port, address] = fields?;
            let port = port.parse::<u32>().map_err(|_| {
                Error::invalid_query(
                    Field::Port,
                    format!("line {line}: '{port}' is not an integer"),
                )
            })?;
            Ok(PacketRecord {
                line,
                direction: direction.to_string(),
                protocol: protocol.to_string(),
                port,
                address: address.to_string(),
            })
        })
        .collect()
}

async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
    let text = String::from_utf8(bytes).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: not UTF-8: {e}", path.display()),
        )
    })?;
    Ok(text)
}

/// Loads a rule file into an engine.
///
/// # Async
/// Uses `tokio::fs` for non-blocking file I/O.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read, or the errors of
/// [`engine_from_text`].
pub async fn load_engine(path: impl AsRef<Path>, strictness: Strictness) -> Result<LoadedRules> {
    let path = path.as_ref();
    let text = read_text(path).await?;
    let fingerprint = RuleSetFingerprint::of(text.as_bytes());

    let engine = engine_from_text(&text, strictness)?;
    tracing::info!(
        "Loaded {} rules from {} (sha256 {})",
        engine.len(),
        path.display(),
        fingerprint.short()
    );

    Ok(LoadedRules {
        engine,
        fingerprint,
        path: path.to_path_buf(),
    })
}

/// Reads a rule file and lints it.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read.
pub async fn lint_file(path: impl AsRef<Path>) -> Result<Vec<Error>> {
    let text = read_text(path.as_ref()).await?;
    Ok(lint(&text))
}

/// Reads a batch packet file.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read, or the errors of
/// [`parse_packets`].
pub async fn load_packets(path: impl AsRef<Path>) -> Result<Vec<PacketRecord>> {
    let path = path.as_ref();
    let text = read_text(path).await?;
    let packets = parse_packets(&text)?;
    tracing::debug!("Read {} packets from {}", packets.len(), path.display());
    Ok(packets)
}
