use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static INTERVAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)([smhd])$").unwrap());

/// Parses a refresh interval token such as `30s` or `5m`.
///
/// Returns `None` when periodic refresh is disabled: an empty token, a token
/// that does not match `<integer><s|m|h|d>`, a zero amount, or an amount too
/// large to represent.
pub fn parse_interval(token: &str) -> Option<Duration> {
    let captures = INTERVAL.captures(token)?;
    let amount: u64 = captures[1].parse().ok()?;
    let unit_ms: u64 = match &captures[2] {
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        "d" => 24 * 60 * 60 * 1_000,
        _ => return None,
    };

    match amount.checked_mul(unit_ms) {
        Some(0) | None => None,
        Some(ms) => Some(Duration::from_millis(ms)),
    }
}
