use std::fmt;

use crate::error::ProbeError;

// Binary suffixes must be tried before their one-letter decimal counterparts.
const SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("K", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a Kubernetes resource quantity into base units (cores or bytes).
pub fn parse_quantity(q: &str) -> Option<f64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    for (suffix, factor) in SUFFIXES {
        if let Some(number) = q.strip_suffix(suffix) {
            return number
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v * factor);
        }
    }
    // plain number, possibly in exponent form ("1e3")
    q.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_cpu_millicores(q: &str) -> Option<f64> {
    parse_quantity(q).map(|cores| cores * 1000.0)
}

pub fn parse_memory_bytes(q: &str) -> Option<f64> {
    parse_quantity(q)
}

/// Share of capacity reserved by the system: 100 - allocatable/capacity*100.
pub fn allocated_percent(allocatable: f64, capacity: f64) -> Option<f64> {
    if capacity <= 0.0 {
        return None;
    }
    Some(100.0 - (allocatable * 100.0 / capacity))
}

pub fn utilization_percent(usage: f64, capacity: f64) -> Option<f64> {
    if capacity <= 0.0 {
        return None;
    }
    Some(usage * 100.0 / capacity)
}

/// Shorten a message for tabular display, appending "..." when cut.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let cut: String = message.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// An upgrade channel such as `stable-4.12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Channel<'a> {
    pub family: &'a str,
    pub major: u32,
    pub minor: u32,
}

impl<'a> Channel<'a> {
    /// Same family and major, `steps` minor releases later.
    pub fn ahead(&self, steps: u32) -> Result<Channel<'a>, ProbeError> {
        let minor = self
            .minor
            .checked_add(steps)
            .ok_or_else(|| ProbeError::Channel(format!("{} + {} minor releases", self, steps)))?;
        Ok(Channel { minor, ..*self })
    }

    /// Release number as `major.minor`, e.g. `4.10`.
    pub fn release(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for Channel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family, self.release())
    }
}

/// Parse `<family>-<major>.<minor>`; a bare `<major>.<minor>` is taken as `stable`.
pub fn parse_channel(raw: &str) -> Result<Channel<'_>, ProbeError> {
    let raw = raw.trim();
    let (family, version) = match raw.rsplit_once('-') {
        Some((family, version)) if !family.is_empty() => (family, version),
        Some(_) => return Err(ProbeError::Channel(raw.to_string())),
        None => ("stable", raw),
    };
    let (major, minor) = version
        .split_once('.')
        .ok_or_else(|| ProbeError::Channel(raw.to_string()))?;
    let major = major
        .parse::<u32>()
        .map_err(|_| ProbeError::Channel(raw.to_string()))?;
    let minor = minor
        .parse::<u32>()
        .map_err(|_| ProbeError::Channel(raw.to_string()))?;
    Ok(Channel { family, major, minor })
}
