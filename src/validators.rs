//! Input validation functions for hbfw
//!
//! This module provides centralized token validation for rule records and
//! packet queries. Errors are plain messages; callers attach the field they
//! came from.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

/// Smallest port a rule or query may name (0 is reserved)
pub const MIN_PORT: u16 = 1;

/// Longest IPv4 network prefix
pub const MAX_PREFIX_LEN: u8 = 32;

/// Validates a port range.
///
/// Ranges in rule records are well-formed only when the start is strictly
/// below the end; a single port is written without a dash.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is not less than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    if start < MIN_PORT || end < MIN_PORT {
        Err("Port must be between 1 and 65535".to_string())
    } else if start >= end {
        Err(format!(
            "Range start {start} must be less than range end {end}"
        ))
    } else {
        Ok((start, end))
    }
}

/// Parses a decimal port token such as `"80"`.
///
/// Only ASCII digits are accepted: signs, whitespace and hex prefixes are
/// rejected rather than silently normalized.
///
/// # Errors
///
/// Returns `Err` if the token is empty, not numeric, or outside [1, 65535].
///
/// # Examples
///
/// ```
/// use hbfw::validators::parse_port;
///
/// assert_eq!(parse_port("443"), Ok(443));
/// assert!(parse_port("0").is_err());
/// assert!(parse_port("65536").is_err());
/// assert!(parse_port("8o").is_err());
/// ```
pub fn parse_port(token: &str) -> Result<u16, String> {
    if token.is_empty() {
        return Err("Port is empty".to_string());
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{token}' is not a port number"));
    }

    // Digits only, so the only possible failure is overflow
    let value: u32 = token
        .parse()
        .map_err(|_| format!("Port {token} is out of range (1-65535)"))?;
    validate_query_port(value)
}

/// Validates a port number supplied by a packet query.
///
/// Queries take a wider integer than rules so that out-of-range input can be
/// reported instead of truncated.
///
/// # Errors
///
/// Returns `Err` if the port is outside [1, 65535].
pub fn validate_query_port(port: u32) -> Result<u16, String> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p >= MIN_PORT)
        .ok_or_else(|| format!("Port {port} is out of range (1-65535)"))
}

/// Parses a dotted-quad IPv4 address token such as `"192.168.1.2"`.
///
/// # Errors
///
/// Returns `Err` unless the token is exactly four decimal octets in [0, 255].
///
/// # Examples
///
/// ```
/// use hbfw::validators::parse_ipv4;
/// use ipnetwork::Ipv4Network;
/// use std::net::Ipv4Addr;
///
/// assert_eq!(parse_ipv4("10.0.0.1"), Ok(Ipv4Addr::new(10, 0, 0, 1)));
/// assert!(parse_ipv4("10.0.0.256").is_err());
/// assert!(parse_ipv4("10.0.0").is_err());
/// ```
pub fn parse_ipv4(token: &str) -> Result<Ipv4Addr, String> {
    token
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("'{token}' is not a dotted-quad IPv4 address"))
}

/// Parses a CIDR token such as `"10.0.0.0/8"`.
///
/// The prefix is plain decimal: signs and leading zeros are rejected.
/// Host bits in the address are allowed.
///
/// # Errors
///
/// Returns `Err` if the address is not dotted-quad IPv4 or the prefix is not
/// a length in [0, 32].
///
/// # Examples
///
/// ```
/// use hbfw::validators::parse_ipv4_network;
///
/// assert_eq!(parse_ipv4_network("10.0.0.0/8").unwrap().prefix(), 8);
/// assert!(parse_ipv4_network("10.0.0.0/+8").is_err());
/// assert!(parse_ipv4_network("10.0.0.0/08").is_err());
/// ```
pub fn parse_ipv4_network(token: &str) -> Result<Ipv4Network, String> {
    let Some((addr, prefix)) = token.split_once('/') else {
        return Err(format!("'{token}' has no network prefix"));
    };
    let addr = parse_ipv4(addr)?;

    let decimal = !prefix.is_empty()
        && prefix.bytes().all(|b| b.is_ascii_digit())
        && (prefix == "0" || !prefix.starts_with('0'));
    let prefix = prefix
        .parse::<u8>()
        .ok()
        .filter(|p| decimal && *p <= MAX_PREFIX_LEN)
        .ok_or_else(|| format!("'{prefix}' is not a prefix length (0-32)"))?;

    Ipv4Network::new(addr, prefix).map_err(|e| format!("'{token}': {e}"))
}

/// Validates an IPv4 address range.
///
/// # Errors
///
/// Returns `Err` if the start address is not numerically below the end.
pub fn validate_ipv4_range(start: Ipv4Addr, end: Ipv4Addr) -> Result<(Ipv4Addr, Ipv4Addr), String> {
    if u32::from(start) >= u32::from(end) {
        Err(format!(
            "Range start {start} must be less than range end {end}"
        ))
    } else {
        Ok((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port_range_requires_strict_order() {
        assert!(validate_port_range(80, 85).is_ok());
        assert!(validate_port_range(80, 80).is_err());
        assert!(validate_port_range(85, 80).is_err());
        assert!(validate_port_range(0, 80).is_err());
        assert!(validate_port_range(1, 65535).is_ok());
    }

    #[test]
    fn test_parse_port_rejects_non_digits() {
        for token in ["", " 80", "80 ", "+80", "-1", "0x50", "eighty", "8.0"] {
            assert!(parse_port(token).is_err(), "accepted {token:?}");
        }
    }

    #[test]
    fn test_parse_port_bounds() {
        assert_eq!(parse_port("1"), Ok(1));
        assert_eq!(parse_port("65535"), Ok(65535));
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("99999999999999999999").is_err());
    }

    #[test]
    fn test_parse_port_leading_zeros_are_decimal() {
        assert_eq!(parse_port("080"), Ok(80));
    }

    #[test]
    fn test_validate_query_port() {
        assert!(validate_query_port(0).is_err());
        assert_eq!(validate_query_port(22), Ok(22));
        assert!(validate_query_port(65536).is_err());
        assert!(validate_query_port(u32::MAX).is_err());
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("0.0.0.0"), Ok(Ipv4Addr::UNSPECIFIED));
        assert_eq!(parse_ipv4("255.255.255.255"), Ok(Ipv4Addr::BROADCAST));
        for token in ["", "1.2.3", "1.2.3.4.5", "1.2.3.256", "a.b.c.d", "::1", " 1.2.3.4"] {
            assert!(parse_ipv4(token).is_err(), "accepted {token:?}");
        }
    }

    #[test]
    fn test_parse_ipv4_network() {
        let net = parse_ipv4_network("192.168.2.0/24").unwrap();
        assert_eq!(net.ip(), Ipv4Addr::new(192, 168, 2, 0));
        assert_eq!(net.prefix(), 24);
        assert_eq!(parse_ipv4_network("0.0.0.0/0").unwrap().prefix(), 0);
        assert_eq!(parse_ipv4_network("10.1.2.3/32").unwrap().prefix(), 32);
    }

    #[test]
    fn test_parse_ipv4_network_prefix_is_plain_decimal() {
        for token in [
            "10.0.0.0/+8",
            "10.0.0.0/08",
            "10.0.0.0/00",
            "10.0.0.0/-8",
            "10.0.0.0/ 8",
            "10.0.0.0/",
            "10.0.0.0/33",
            "10.0.0.0/256",
            "10.0.0/8",
            "10.0.0.0",
        ] {
            assert!(parse_ipv4_network(token).is_err(), "accepted {token:?}");
        }
    }

    #[test]
    fn test_validate_ipv4_range_is_numeric() {
        // "10.0.0.9" > "10.0.0.10" as strings, but not as addresses
        let low = Ipv4Addr::new(10, 0, 0, 9);
        let high = Ipv4Addr::new(10, 0, 0, 10);
        assert!(validate_ipv4_range(low, high).is_ok());
        assert!(validate_ipv4_range(high, low).is_err());
        assert!(validate_ipv4_range(low, low).is_err());
    }
}
