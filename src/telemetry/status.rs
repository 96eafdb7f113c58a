//! Status lines printed by the companion script on the robot.
//!
//! One reading per line, a single letter code followed by the value:
//!
//! | Code | Reading | Unit on the wire |
//! |------|---------|------------------|
//! | `A`  | program upload time | `%Y%m%d%H%M%S` |
//! | `V`  | main battery voltage | mV |
//! | `W`  | auxiliary voltage | mV |
//! | `C`  | current draw | as reported |
//! | `L`  | CPU load | as reported |

use chrono::NaiveDateTime;
use serde::Serialize;

const PROGRAM_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Scalar readings pulled over the command channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusReadings {
    pub voltage: f32,
    pub aux_voltage: f32,
    pub current: f32,
    pub cpu_load: f32,
    #[serde(skip)]
    pub program_date: Option<NaiveDateTime>,
}

impl StatusReadings {
    /// Parse a status report. Unknown codes and bad values are skipped.
    pub fn parse(report: &str) -> Self {
        let mut readings = StatusReadings::default();
        for line in report.lines() {
            let line = line.trim();
            let mut chars = line.chars();
            let Some(code) = chars.next() else {
                continue;
            };
            let content = chars.as_str().trim();
            match code {
                'A' => {
                    readings.program_date = NaiveDateTime::parse_from_str(content, PROGRAM_DATE_FORMAT).ok();
                }
                'V' => {
                    if let Ok(mv) = content.parse::<f32>() {
                        readings.voltage = mv / 1000.0;
                    }
                }
                'W' => {
                    if let Ok(mv) = content.parse::<f32>() {
                        readings.aux_voltage = mv / 1000.0;
                    }
                }
                'C' => {
                    if let Ok(v) = content.parse::<f32>() {
                        readings.current = v;
                    }
                }
                'L' => {
                    if let Ok(v) = content.parse::<f32>() {
                        readings.cpu_load = v;
                    }
                }
                _ => log::debug!("Unknown status line: {}", line),
            }
        }
        readings
    }
}

/// Render how long ago the robot program was uploaded.
pub fn describe_program_age(date: NaiveDateTime, now: NaiveDateTime) -> String {
    let age_s = (now - date).num_seconds();
    if age_s < 0 {
        "Invalid date".to_string()
    } else if age_s < 60 {
        format!("{} seconds ago", ((age_s as f64 / 10.0).round() * 10.0) as i64)
    } else if age_s < 3600 {
        format!("{} min ago", age_s / 60)
    } else if age_s < 86400 {
        date.format("Today %H:%M").to_string()
    } else {
        date.format("%d/%m/%y %H:%M").to_string()
    }
}
