use std::str::FromStr;
use std::time::Duration;

use witrack_protocol::WitError;

/// How often a tracker query is re-run.
///
/// Accepted expressions: `@every <duration>` where the duration is a
/// sequence of `<n>h`, `<n>m` or `<n>s` parts (e.g. `@every 1h30m`),
/// `@hourly` and `@daily`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    period: Duration,
}

impl Schedule {
    pub fn every(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl FromStr for Schedule {
    type Err = WitError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            WitError::bad_parameter("schedule", expression)
                .expected("@every <n>[h|m|s], @hourly or @daily")
        };

        let trimmed = expression.trim();
        let period = match trimmed {
            "@hourly" => Duration::from_secs(60 * 60),
            "@daily" => Duration::from_secs(24 * 60 * 60),
            _ => {
                let duration = trimmed.strip_prefix("@every").ok_or_else(invalid)?.trim();
                parse_duration(duration).ok_or_else(invalid)?
            }
        };
        if period.is_zero() {
            return Err(invalid());
        }
        Ok(Self { period })
    }
}

fn parse_duration(raw: &str) -> Option<Duration> {
    if raw.is_empty() {
        return None;
    }
    let mut total = 0_u64;
    let mut digits = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'h' => 60 * 60,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let amount: u64 = digits.parse().ok()?;
        total = total.checked_add(amount.checked_mul(unit)?)?;
        digits.clear();
    }
    // trailing digits without a unit
    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_expressions() {
        let schedule: Schedule = "@every 5m".parse().unwrap();
        assert_eq!(schedule.period(), Duration::from_secs(300));

        let schedule: Schedule = "@every 1h30m15s".parse().unwrap();
        assert_eq!(schedule.period(), Duration::from_secs(5415));
    }

    #[test]
    fn parses_descriptors() {
        assert_eq!(
            "@hourly".parse::<Schedule>().unwrap(),
            Schedule::every(Duration::from_secs(3600))
        );
        assert_eq!(
            "@daily".parse::<Schedule>().unwrap().period(),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        for raw in ["", "5m", "@every", "@every 5", "@every 5d", "@every 0s", "*/5 * * * *"] {
            let err = raw.parse::<Schedule>().unwrap_err();
            assert!(err.is_bad_parameter(), "{raw} should be rejected");
        }
    }
}
