//! DHCPv6 option names and the per-direction option filter
//!
//! Config entries may name an option by code (`18`) or by name in any of the
//! spellings people use for it (`InterfaceId`, `interface-id`,
//! `interface-id-option`). Names are normalized to the dashed `-option` form
//! and resolved through `KNOWN_OPTIONS`; anything unresolvable is rejected
//! when the config is loaded.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use crate::error::GlassError;

/// Known option codes and their canonical dashed names.
const KNOWN_OPTIONS: &[(u16, &str)] = &[
    (1, "client-id-option"),
    (2, "server-id-option"),
    (3, "iana-option"),
    (4, "iata-option"),
    (5, "ia-address-option"),
    (6, "option-request-option"),
    (7, "preference-option"),
    (8, "elapsed-time-option"),
    (9, "relay-message-option"),
    (11, "authentication-option"),
    (12, "server-unicast-option"),
    (13, "status-code-option"),
    (14, "rapid-commit-option"),
    (15, "user-class-option"),
    (16, "vendor-class-option"),
    (17, "vendor-specific-information-option"),
    (18, "interface-id-option"),
    (19, "reconfigure-message-option"),
    (20, "reconfigure-accept-option"),
    (21, "sip-servers-domain-name-list-option"),
    (22, "sip-servers-address-list-option"),
    (23, "recursive-name-servers-option"),
    (24, "domain-search-list-option"),
    (25, "iapd-option"),
    (26, "ia-prefix-option"),
    (31, "sntp-servers-option"),
    (32, "information-refresh-time-option"),
    (37, "remote-id-option"),
    (38, "subscriber-id-option"),
    (39, "client-fqdn-option"),
    (56, "ntp-server-option"),
    (79, "client-link-layer-address-option"),
    (82, "sol-max-rt-option"),
    (83, "inf-max-rt-option"),
];

/// Canonical name for a code, if we know it.
pub fn option_name(code: u16) -> Option<&'static str> {
    KNOWN_OPTIONS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

fn option_code(name: &str) -> Option<u16> {
    KNOWN_OPTIONS
        .iter()
        .find(|(_, known)| *known == name)
        .map(|(code, _)| *code)
}

/// `IAPrefixOption` -> `ia-prefix-option`, `SolMaxRT` -> `sol-max-rt`.
pub fn camelcase_to_dash(camelcase: &str) -> String {
    static WORD: OnceLock<Regex> = OnceLock::new();
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();

    let word = WORD.get_or_init(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex"));
    let boundary =
        BOUNDARY.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));

    let split = word.replace_all(camelcase, "${1}-${2}");
    boundary.replace_all(&split, "${1}-${2}").to_lowercase()
}

/// One entry of `log_request_options` / `log_response_options`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OptionSpec {
    Code(u16),
    Name(String),
}

impl OptionSpec {
    pub fn resolve(&self) -> Result<u16, GlassError> {
        match self {
            OptionSpec::Code(code) => Ok(*code),
            OptionSpec::Name(name) => {
                let name = name.trim();
                if let Ok(code) = name.parse::<u16>() {
                    return Ok(code);
                }

                let mut dashed = camelcase_to_dash(name).replace('_', "-");
                if !dashed.ends_with("-option") {
                    dashed.push_str("-option");
                }

                option_code(&dashed).ok_or_else(|| GlassError::UnknownOption(name.to_string()))
            }
        }
    }
}

impl From<&str> for OptionSpec {
    fn from(name: &str) -> Self {
        OptionSpec::Name(name.to_string())
    }
}

impl From<u16> for OptionSpec {
    fn from(code: u16) -> Self {
        OptionSpec::Code(code)
    }
}

/// The set of option codes to keep in a stored payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionFilter {
    codes: BTreeSet<u16>,
}

impl OptionFilter {
    pub fn from_specs(specs: &[OptionSpec]) -> Result<Self, GlassError> {
        let codes = specs
            .iter()
            .map(OptionSpec::resolve)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { codes })
    }

    pub fn contains(&self, code: u16) -> bool {
        self.codes.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl fmt::Display for OptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .codes
            .iter()
            .map(|code| option_name(*code).map_or_else(|| code.to_string(), str::to_string))
            .collect();
        f.write_str(&names.join(", "))
    }
}
