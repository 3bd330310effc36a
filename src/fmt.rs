//! Provides parsing and formatting helpers for lifespans.
use std::fmt::Write;
use std::time::Duration;

const UNITS: [(&str, u128); 5] = [
    ("d", 1000 * 60 * 60 * 24),
    ("h", 1000 * 60 * 60),
    ("m", 1000 * 60),
    ("s", 1000),
    ("ms", 1),
];

/// Parses a lifespan from a given string.
///
/// This string can have the following suffixes:
/// * **ms** or **MS**: treats the value as milliseconds
/// * **s** or **S**: treats the value as seconds
/// * **m** or **M**: treats the value as minutes
/// * **h** or **H**: treats the value as hours
/// * **d** or **D**: treats the value as days
///
/// A number without suffix is treated as milliseconds. Additionally, **eternal** and **never**
/// are accepted and yield a zero duration, which marks entries as non-expiring.
///
/// Returns an **Err** if either a non-integer value is given or if an unknown suffix was provided.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(cachetable::fmt::parse_duration("100 ms").unwrap(), Duration::from_millis(100));
/// assert_eq!(cachetable::fmt::parse_duration("12 s").unwrap(), Duration::from_secs(12));
/// assert_eq!(cachetable::fmt::parse_duration("3 M").unwrap(), Duration::from_secs(3 * 60));
/// assert_eq!(cachetable::fmt::parse_duration("2 H").unwrap(), Duration::from_secs(2 * 60 * 60));
/// assert_eq!(cachetable::fmt::parse_duration("5 d").unwrap(), Duration::from_secs(5 * 24 * 60 * 60));
/// assert_eq!(cachetable::fmt::parse_duration("eternal").unwrap(), Duration::ZERO);
///
/// // An invalid suffix results in an error...
/// assert_eq!(cachetable::fmt::parse_duration("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(cachetable::fmt::parse_duration("1.2s").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(cachetable::fmt::parse_duration("-1m").is_err(), true);
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *((ms|s|m|h|d|MS|S|M|H|D)?) *$").unwrap();
    }

    let input = str.as_ref();
    if matches!(input.trim(), "eternal" | "never") {
        return Ok(Duration::ZERO);
    }

    let captures = NUMBER_AND_SUFFIX.captures(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a lifespan. \
             Expected a positive number and optionally 'ms', 's', 'm', 'h' or 'd' as suffix.",
            input
        )
    })?;

    let number = captures[1]
        .parse::<u64>()
        .map_err(|error| anyhow::anyhow!("Cannot parse '{}' into a lifespan: {}", input, error))?;

    let seconds_per_unit = match &captures[2] {
        "s" | "S" => 1,
        "m" | "M" => 60,
        "h" | "H" => 60 * 60,
        "d" | "D" => 60 * 60 * 24,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("The lifespan '{}' is too large.", input))
}

/// Formats a lifespan into a string like "5d 3h 17m 2s 12ms".
///
/// A zero duration is reported as **eternal**, as this is what it means for a lifespan.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(cachetable::fmt::format_duration(Duration::from_millis(13)), "13ms");
/// assert_eq!(cachetable::fmt::format_duration(Duration::from_millis(1013)), "1s 13ms");
/// assert_eq!(cachetable::fmt::format_duration(Duration::from_millis(62_013)), "1m 2s 13ms");
/// assert_eq!(cachetable::fmt::format_duration(Duration::from_secs(60 * 61)), "1h 1m");
/// assert_eq!(cachetable::fmt::format_duration(Duration::from_secs(24 * 60 * 60 + 60 * 60 + 59)), "1d 1h 59s");
/// assert_eq!(cachetable::fmt::format_duration(Duration::ZERO), "eternal");
/// ```
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "eternal".to_owned();
    }

    let mut result = String::new();
    let mut value = duration.as_millis();
    for (suffix, millis) in UNITS {
        let amount = value / millis;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            value %= millis;
        }
    }

    // Sub millisecond durations would otherwise yield an empty string...
    if result.is_empty() {
        let _ = write!(result, "{}us", duration.as_micros());
    }

    result
}
