//! Field-name case conversion between attribute trees and native payloads.
//!
//! Attribute trees use `snake_case` names while the backend API speaks
//! `lowerCamelCase`. A plain mechanical conversion is not enough because the
//! API spells network acronyms in upper case (`vlanID`, `poolIPv4`) and a few
//! fields follow no rule at all (`label-selector`).
//!
//! [`CaseConverter`] holds the acronym table and the literal override tables.
//! [`CaseConverter::standard`] returns a shared instance with the tables used
//! by the backend.
//!
//! The two directions are not exact inverses for names made of adjacent
//! acronyms: `to_lower_camel("ip_mtu")` is `"ipMTU"`, and
//! `to_separated("ipMTU")` is `"ip_mtu"`, but `to_separated("IPMTU")` is
//! `"ipmtu"`. Override tables cover the names where this matters.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Separator used by attribute-tree names.
pub const SEPARATOR: char = '_';

static STANDARD: LazyLock<CaseConverter> = LazyLock::new(CaseConverter::default);

static CAMEL_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z0-9])([A-Z])").expect("camel boundary pattern is valid")
});

const DEFAULT_ACRONYMS: &[(&str, &str)] = &[
    ("arp", "ARP"),
    ("arpnd", "ARPND"),
    ("as", "AS"),
    ("asn", "ASN"),
    ("asvpn", "ASVPN"),
    ("bgp", "BGP"),
    ("dhcp", "DHCP"),
    ("dn", "DN"),
    ("ecmp", "ECMP"),
    ("evpn", "EVPN"),
    ("fib", "FIB"),
    ("fqdn", "FQDN"),
    ("icmp", "ICMP"),
    ("id", "ID"),
    ("ip", "IP"),
    ("ipv4", "IPv4"),
    ("ipv6", "IPv6"),
    ("irb", "IRB"),
    ("l2cp", "L2CP"),
    ("ldap", "LDAP"),
    ("mac", "MAC"),
    ("mtu", "MTU"),
    ("nd", "ND"),
    ("pdu", "PDU"),
    ("pfc", "PFC"),
    ("rr", "RR"),
    ("safi", "SAFI"),
    ("tls", "TLS"),
    ("uri", "URI"),
    ("url", "URL"),
    ("vlan", "VLAN"),
    ("vpn", "VPN"),
];

const DEFAULT_CAMEL_OVERRIDES: &[(&str, &str)] = &[
    ("external_id", "externalId"),
    ("label_selector", "label-selector"),
    ("vcsa_tls_verify", "vcsaTlsVerify"),
];

/// Translates field names between `snake_case` and `lowerCamelCase`.
///
/// # Example
///
/// ```
/// use attrforge_core::CaseConverter;
///
/// let case = CaseConverter::standard();
/// assert_eq!(case.to_lower_camel("vlan_id"), "vlanID");
/// assert_eq!(case.to_separated("poolIPv4"), "pool_ipv4");
/// ```
#[derive(Debug, Clone)]
pub struct CaseConverter {
    /// Lower-cased segment to its API spelling.
    acronyms: HashMap<String, String>,

    /// Literal `snake_case` to `lowerCamelCase` replacements.
    camel_overrides: HashMap<String, String>,

    /// Literal `lowerCamelCase` to `snake_case` replacements.
    separated_overrides: HashMap<String, String>,
}

impl CaseConverter {
    /// A converter with no acronyms and no overrides.
    pub fn empty() -> Self {
        Self {
            acronyms: HashMap::new(),
            camel_overrides: HashMap::new(),
            separated_overrides: HashMap::new(),
        }
    }

    /// Shared converter with the backend's acronym and override tables.
    pub fn standard() -> &'static CaseConverter {
        &STANDARD
    }

    /// Register an acronym. Matching is case-insensitive on the segment.
    pub fn with_acronym(mut self, segment: impl AsRef<str>, spelling: impl Into<String>) -> Self {
        self.acronyms
            .insert(segment.as_ref().to_lowercase(), spelling.into());
        self
    }

    /// Register a literal pair used in both directions.
    pub fn with_override(mut self, separated: impl Into<String>, camel: impl Into<String>) -> Self {
        let separated = separated.into();
        let camel = camel.into();
        self.camel_overrides
            .insert(separated.clone(), camel.clone());
        self.separated_overrides.insert(camel, separated);
        self
    }

    /// Convert a `snake_case` name to `lowerCamelCase`.
    ///
    /// | input          | output        |
    /// |----------------|---------------|
    /// | `api_version1` | `apiVersion1` |
    /// | `__lag`        | `lag`         |
    /// | `_members`     | `members`     |
    /// | `pool_ipv4`    | `poolIPv4`    |
    /// | `vlan_id`      | `vlanID`      |
    pub fn to_lower_camel(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        if let Some(camel) = self.camel_overrides.get(name) {
            return camel.clone();
        }

        let mut segments: Vec<String> = Vec::new();
        for (index, part) in name.split(SEPARATOR).enumerate() {
            // Repeated or leading separators produce empty parts.
            if part.is_empty() {
                continue;
            }
            let lower = part.to_lowercase();
            if let Some(acronym) = self.acronyms.get(&lower) {
                segments.push(acronym.clone());
            } else if index > 0 {
                segments.push(capitalize(&lower));
            } else {
                segments.push(lower);
            }
        }

        if let Some(first) = segments.first_mut() {
            *first = first.to_lowercase();
        }
        segments.concat()
    }

    /// Convert a `lowerCamelCase` name to `snake_case`.
    ///
    /// | input         | output         |
    /// |---------------|----------------|
    /// | `apiVersion1` | `api_version1` |
    /// | `__lag`       | `__lag`        |
    /// | `_MemberS`    | `_member_s`    |
    /// | `poolIPv4`    | `pool_ipv4`    |
    /// | `vlanID`      | `vlan_id`      |
    pub fn to_separated(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        if let Some(separated) = self.separated_overrides.get(name) {
            return separated.clone();
        }
        CAMEL_BOUNDARY
            .replace_all(name, format!("${{1}}{SEPARATOR}${{2}}").as_str())
            .to_lowercase()
    }
}

impl Default for CaseConverter {
    fn default() -> Self {
        let converter = DEFAULT_ACRONYMS
            .iter()
            .fold(Self::empty(), |c, (segment, spelling)| {
                c.with_acronym(segment, *spelling)
            });
        DEFAULT_CAMEL_OVERRIDES
            .iter()
            .fold(converter, |c, (separated, camel)| {
                c.with_override(*separated, *camel)
            })
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `snake_case` to `lowerCamelCase` with the standard tables.
pub fn snake_to_camel(name: &str) -> String {
    CaseConverter::standard().to_lower_camel(name)
}

/// `lowerCamelCase` to `snake_case` with the standard tables.
pub fn camel_to_snake(name: &str) -> String {
    CaseConverter::standard().to_separated(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_lower_camel() {
        let cases = [
            ("", ""),
            ("api_ver_1", "apiVer1"),
            ("api_version1", "apiVersion1"),
            ("__lag", "lag"),
            ("_members", "members"),
            ("test", "test"),
            ("hello___world", "helloWorld"),
            ("pool_ipv4", "poolIPv4"),
            ("ip_mtu", "ipMTU"),
            ("vlan_id", "vlanID"),
            ("id_pool", "idPool"),
        ];
        for (input, expected) in cases {
            assert_eq!(snake_to_camel(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_to_separated() {
        let cases = [
            ("", ""),
            ("apiVersion1", "api_version1"),
            ("__lag", "__lag"),
            ("_MemberS", "_member_s"),
            ("test", "test"),
            ("poolIPv4", "pool_ipv4"),
            ("ipMTU", "ip_mtu"),
            ("vlanID", "vlan_id"),
        ];
        for (input, expected) in cases {
            assert_eq!(camel_to_snake(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_overrides_apply_in_both_directions() {
        assert_eq!(snake_to_camel("label_selector"), "label-selector");
        assert_eq!(camel_to_snake("label-selector"), "label_selector");
        assert_eq!(snake_to_camel("external_id"), "externalId");
        assert_eq!(camel_to_snake("externalId"), "external_id");
    }

    #[test]
    fn test_ordinary_names_round_trip() {
        for name in ["vlan_id", "pool_ipv4", "api_version1", "ip_mtu", "mac_address"] {
            assert_eq!(camel_to_snake(&snake_to_camel(name)), name);
        }
    }

    #[test]
    fn test_adjacent_acronyms_are_not_a_bijection() {
        assert_eq!(snake_to_camel("ip_mtu"), "ipMTU");
        assert_eq!(camel_to_snake("IPMTU"), "ipmtu");
        assert_ne!(snake_to_camel(&camel_to_snake("IPMTU")), "IPMTU");
    }

    #[test]
    fn test_acronym_lookup_is_case_insensitive() {
        assert_eq!(snake_to_camel("mgmt_VLAN"), "mgmtVLAN");
        assert_eq!(snake_to_camel("Pool_IPV4"), "poolIPv4");
    }

    #[test]
    fn test_custom_tables() {
        let case = CaseConverter::empty()
            .with_acronym("Http", "HTTP")
            .with_override("weird_name", "weird.Name");
        assert_eq!(case.to_lower_camel("use_http"), "useHTTP");
        assert_eq!(case.to_lower_camel("vlan_id"), "vlanId");
        assert_eq!(case.to_lower_camel("weird_name"), "weird.Name");
        assert_eq!(case.to_separated("weird.Name"), "weird_name");
    }
}
