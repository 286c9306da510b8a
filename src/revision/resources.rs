// ABOUTME: Resource limit parsing for revisions.
// ABOUTME: Turns "512m" / "0.5" style config strings into bytes and millicores.

use serde::Serialize;

use super::ConfigError;
use crate::config::ResourcesConfig;

/// Limits applied to every task of a revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// CPU quota in thousandths of a CPU (500 = half a CPU).
    pub cpu_millis: Option<u32>,
}

impl ResourceLimits {
    pub fn from_config(config: &ResourcesConfig) -> Result<Self, ConfigError> {
        let memory_bytes = config
            .memory
            .as_deref()
            .map(|m| parse_memory(m).ok_or_else(|| ConfigError::InvalidMemory(m.to_string())))
            .transpose()?;
        let cpu_millis = config
            .cpus
            .as_deref()
            .map(|c| parse_cpus(c).ok_or_else(|| ConfigError::InvalidCpus(c.to_string())))
            .transpose()?;

        Ok(Self {
            memory_bytes,
            cpu_millis,
        })
    }

    /// CPU quota in the engine's nano-CPU unit.
    pub fn nano_cpus(&self) -> Option<i64> {
        self.cpu_millis.map(|m| i64::from(m) * 1_000_000)
    }
}

/// Parse "512m", "1g", "64k" or a plain byte count.
fn parse_memory(spec: &str) -> Option<u64> {
    let spec = spec.trim().to_ascii_lowercase();
    let spec = spec.strip_suffix('b').unwrap_or(&spec);
    let (digits, multiplier) = match spec.char_indices().last()? {
        (idx, 'g') => (&spec[..idx], 1024 * 1024 * 1024),
        (idx, 'm') => (&spec[..idx], 1024 * 1024),
        (idx, 'k') => (&spec[..idx], 1024),
        _ => (spec, 1),
    };

    let value = digits.parse::<u64>().ok()?;
    if value == 0 {
        return None;
    }
    value.checked_mul(multiplier)
}

/// Parse fractional CPUs with at most three decimals.
fn parse_cpus(spec: &str) -> Option<u32> {
    let spec = spec.trim();
    let (whole, frac) = spec.split_once('.').unwrap_or((spec, ""));
    if frac.len() > 3 || (whole.is_empty() && frac.is_empty()) {
        return None;
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: u32 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_millis: u32 = if frac.is_empty() {
        0
    } else {
        format!("{:0<3}", frac).parse().ok()?
    };

    let millis = whole.checked_mul(1000)?.checked_add(frac_millis)?;
    (millis > 0).then_some(millis)
}
