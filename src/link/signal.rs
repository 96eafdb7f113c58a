/// Outcome of a burst of ICMP echo probes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingReport {
    pub alive: bool,
    pub avg_rtt_ms: f32,
    pub max_rtt_ms: f32,
    /// Lost fraction, 0.0 to 1.0.
    pub packet_loss: f32,
}

impl PingReport {
    pub fn unreachable() -> Self {
        PingReport {
            alive: false,
            avg_rtt_ms: 0.0,
            max_rtt_ms: 0.0,
            packet_loss: 1.0,
        }
    }
}

pub const MAX_STRENGTH: u8 = 5;

/// Bucket a ping report into a 0-5 signal strength.
pub fn signal_strength(report: &PingReport) -> u8 {
    // Three probes: one lost packet reads as 0.333..
    const ONE_THIRD_LOSS: f32 = 1.0 / 3.0 + 0.01;

    if !report.alive {
        0
    } else if report.packet_loss == 0.0 && report.max_rtt_ms <= 30.0 {
        5
    } else if report.packet_loss == 0.0 && report.avg_rtt_ms <= 30.0 {
        4
    } else if report.packet_loss <= ONE_THIRD_LOSS && report.avg_rtt_ms <= 120.0 {
        3
    } else if report.avg_rtt_ms <= 500.0 {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(avg: f32, max: f32, loss: f32) -> PingReport {
        PingReport {
            alive: true,
            avg_rtt_ms: avg,
            max_rtt_ms: max,
            packet_loss: loss,
        }
    }

    #[test]
    fn test_buckets() {
        assert_eq!(signal_strength(&report(20.0, 25.0, 0.0)), 5);
        assert_eq!(signal_strength(&report(25.0, 60.0, 0.0)), 4);
        assert_eq!(signal_strength(&report(100.0, 150.0, 0.33)), 3);
        assert_eq!(signal_strength(&report(300.0, 400.0, 0.66)), 2);
        assert_eq!(signal_strength(&report(800.0, 900.0, 0.0)), 1);
        assert_eq!(signal_strength(&PingReport::unreachable()), 0);
    }
}
