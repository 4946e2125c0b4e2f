use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Which manager pool runs a unit of work.
///
/// - `Parallel`: independent work, bounded by `[engine].parallelism`.
/// - `Serial`: work that must never overlap with other serial work (for
///   example operations on a shared instrument). Runs one at a time, in
///   submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Parallel,
    Serial,
}

impl Default for PoolKind {
    fn default() -> Self {
        PoolKind::Parallel
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Ok(PoolKind::Parallel),
            "serial" => Ok(PoolKind::Serial),
            other => Err(format!(
                "invalid pool: {other} (expected \"parallel\" or \"serial\")"
            )),
        }
    }
}

/// Parse a duration such as `"250ms"`, `"3s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pool_kind() {
        assert_eq!("serial".parse::<PoolKind>().unwrap(), PoolKind::Serial);
        assert_eq!(" Parallel ".parse::<PoolKind>().unwrap(), PoolKind::Parallel);
        assert!("gpu".parse::<PoolKind>().is_err());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
