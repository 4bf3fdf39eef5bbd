//! Firmware capabilities
//!
//! Collects what the firmware reports about itself in reply to `M115`: the
//! `FIRMWARE_NAME:...` line with its `KEY:value` pairs, and one
//! `Cap:NAME:0|1` line per optional feature.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Value reported for a firmware key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FirmwareValue {
    /// `Cap:` flag
    Flag(bool),
    /// Text value from the firmware name line
    Text(String),
}

impl fmt::Display for FirmwareValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(enabled) => write!(f, "{}", if *enabled { 1 } else { 0 }),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Firmware info and capability map
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FirmwareInfo {
    values: BTreeMap<String, FirmwareValue>,
}

impl FirmwareInfo {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a response line; returns `true` when the line carried firmware info
    pub fn merge_line(&mut self, line: &str) -> bool {
        if let Some((name, flag)) = parse_capability(line) {
            self.values.insert(name.to_string(), FirmwareValue::Flag(flag));
            return true;
        }

        // some firmwares prefix the report, e.g. `echo:` or a line number
        if let Some(start) = line.find("FIRMWARE_NAME:") {
            let mut merged = false;
            for (key, value) in parse_info_pairs(&line[start..]) {
                self.values
                    .insert(key.to_string(), FirmwareValue::Text(value.to_string()));
                merged = true;
            }
            return merged;
        }

        false
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&FirmwareValue> {
        self.values.get(key)
    }

    /// Check a capability flag; unknown capabilities are disabled
    pub fn has_capability(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(FirmwareValue::Flag(true)))
    }

    /// Firmware name, when reported
    pub fn firmware_name(&self) -> Option<&str> {
        match self.values.get("FIRMWARE_NAME") {
            Some(FirmwareValue::Text(name)) => Some(name),
            _ => None,
        }
    }

    /// Iterate over all keys in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FirmwareValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of known keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing has been reported
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forget everything (firmware rebooted)
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// `Cap:NAME:0|1`
fn parse_capability(line: &str) -> Option<(&str, bool)> {
    let rest = line.strip_prefix("Cap:")?;
    let (name, flag) = rest.split_once(':')?;
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_') {
        return None;
    }
    match flag {
        "0" => Some((name, false)),
        "1" => Some((name, true)),
        _ => None,
    }
}

/// Tokens of the form `KEY:value`, where KEY is uppercase letters and
/// underscores and value runs to the next space; split at the first colon.
fn parse_info_pairs(line: &str) -> impl Iterator<Item = (&str, &str)> {
    line.split(' ').filter_map(|token| {
        let (key, value) = token.split_once(':')?;
        let key_ok =
            !key.is_empty() && key.bytes().all(|b| b.is_ascii_uppercase() || b == b'_');
        (key_ok && !value.is_empty()).then_some((key, value))
    })
}
