use std::time::Duration;

/// Parse duration string with units (e.g., "1.5s", "150ms", "2000us", "1h", "30m")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (num_str, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, "ms")
    } else if let Some(n) = s.strip_suffix("us") {
        (n, "us")
    } else if let Some(n) = s.strip_suffix('s') {
        (n, "s")
    } else if let Some(n) = s.strip_suffix('h') {
        (n, "h")
    } else if let Some(n) = s.strip_suffix('m') {
        (n, "m")
    } else {
        // Bare numbers are seconds
        (s, "s")
    };

    let value: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid numeric value: {num_str}"))?;

    if !value.is_finite() || value < 0.0 {
        return Err("Duration must be a non-negative number".to_string());
    }

    let duration = match unit {
        "us" => Duration::from_micros(value as u64),
        "ms" => Duration::from_millis(value as u64),
        "s" => Duration::from_secs_f64(value),
        "m" => Duration::from_secs_f64(value * 60.0),
        "h" => Duration::from_secs_f64(value * 3600.0),
        _ => return Err(format!("Unknown time unit: {unit}")),
    };

    Ok(duration)
}

/// Command-line duration such as `--deadline 2s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationArg(pub Duration);

impl std::str::FromStr for DurationArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(DurationArg)
    }
}

impl std::fmt::Display for DurationArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.0;
        let total_ms = duration.as_millis();

        if total_ms >= 1000 && total_ms % 1000 == 0 {
            write!(f, "{}s", total_ms / 1000)
        } else if total_ms >= 1000 {
            write!(f, "{:.3}s", duration.as_secs_f64())
        } else {
            write!(f, "{}ms", total_ms)
        }
    }
}

impl From<DurationArg> for Duration {
    fn from(arg: DurationArg) -> Self {
        arg.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("2000us").unwrap(), Duration::from_micros(2000));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(DurationArg(Duration::from_secs(2)).to_string(), "2s");
        assert_eq!(DurationArg(Duration::from_millis(1250)).to_string(), "1.250s");
        assert_eq!(DurationArg(Duration::from_millis(40)).to_string(), "40ms");
        assert_eq!("250ms".parse::<DurationArg>().unwrap().0, Duration::from_millis(250));
    }
}
