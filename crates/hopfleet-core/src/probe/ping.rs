//! Round-trip latency from each host to a fixed target.

use std::cmp::Ordering;

use super::{ParseError, Probe};
use crate::shell::quote;

pub const DEFAULT_PING_COUNT: u32 = 100;

/// Summary line of `ping -c`, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub mdev: f64,
}

impl PingStats {
    /// Order by average latency, highest first.
    pub fn cmp_avg_desc(a: &PingStats, b: &PingStats) -> Ordering {
        b.avg.total_cmp(&a.avg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingProbe {
    target: String,
    count: u32,
}

impl PingProbe {
    pub fn new(target: impl Into<String>, count: u32) -> Self {
        Self {
            target: target.into(),
            count: count.max(1),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Probe for PingProbe {
    type Record = PingStats;

    fn command(&self) -> String {
        format!("ping {} -c {}", quote(&self.target), self.count)
    }

    /// Expects the last non-empty line to be
    /// `rtt min/avg/max/mdev = 0.045/0.058/0.072/0.010 ms`.
    fn parse(&self, stdout: &str) -> Result<PingStats, ParseError> {
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| ParseError::new("empty output"))?;
        let values = decimals(line);
        match values[..] {
            [min, avg, max, mdev] => Ok(PingStats { min, avg, max, mdev }),
            _ => Err(ParseError::new(format!(
                "expected 4 values in summary, found {}: {line:?}",
                values.len()
            ))),
        }
    }
}

/// Every `<digits>.<digits>` token in `line`.
fn decimals(line: &str) -> Vec<f64> {
    line.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|tok| match tok.split_once('.') {
            Some((int, frac)) => !int.is_empty() && !frac.is_empty() && !frac.contains('.'),
            None => false,
        })
        .filter_map(|tok| tok.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
PING example.com (93.184.216.34) 56(84) bytes of data.
64 bytes from 93.184.216.34: icmp_seq=1 ttl=56 time=11.2 ms
64 bytes from 93.184.216.34: icmp_seq=2 ttl=56 time=11.5 ms

--- example.com ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
rtt min/avg/max/mdev = 11.203/11.351/11.500/0.148 ms
";

    #[test]
    fn command_line() {
        assert_eq!(PingProbe::new("example.com", 100).command(), "ping example.com -c 100");
        assert_eq!(PingProbe::new("a b", 0).command(), "ping 'a b' -c 1");
    }

    #[test]
    fn parses_summary_line() {
        let stats = PingProbe::new("example.com", 2).parse(OUTPUT).unwrap();
        assert_eq!(
            stats,
            PingStats {
                min: 11.203,
                avg: 11.351,
                max: 11.5,
                mdev: 0.148
            }
        );
    }

    #[test]
    fn total_loss_is_a_parse_error() {
        let out = "--- example.com ping statistics ---\n\
                   3 packets transmitted, 0 received, 100% packet loss, time 2043ms\n";
        assert!(PingProbe::new("example.com", 3).parse(out).is_err());
        assert!(PingProbe::new("example.com", 3).parse("").is_err());
    }

    #[test]
    fn descending_average_order() {
        let mut v = vec![
            PingStats { min: 1.0, avg: 2.0, max: 3.0, mdev: 0.1 },
            PingStats { min: 1.0, avg: 9.0, max: 12.0, mdev: 0.1 },
            PingStats { min: 1.0, avg: 5.0, max: 6.0, mdev: 0.1 },
        ];
        v.sort_by(PingStats::cmp_avg_desc);
        let avgs: Vec<f64> = v.iter().map(|s| s.avg).collect();
        assert_eq!(avgs, vec![9.0, 5.0, 2.0]);
    }
}
