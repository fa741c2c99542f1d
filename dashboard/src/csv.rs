use crate::errors::{Error, Result};
use crate::metrics::CSV_ROWS_SKIPPED_TOTAL;
use crate::model::Reading;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Parses an InfluxDB annotated-CSV payload into readings.
///
/// The payload always carries a datatype annotation line, then a header
/// line, then data rows. Anything shorter is malformed. Individual rows
/// that are incomplete or fail to parse are skipped, never fatal.
pub fn parse(raw: &str) -> Result<Vec<Reading>> {
    let lines: Vec<&str> = raw.trim().lines().map(|l| l.trim_end_matches('\r')).collect();
    if lines.len() < 3 {
        return Err(Error::MalformedResponse);
    }

    // Line 0 is the datatype annotation, line 1 the column header.
    let header = split_row(lines[1]);
    let time_idx = column_index(&header, "_time");
    let value_idx = column_index(&header, "_value");
    let measurement_idx = column_index(&header, "_measurement");
    let device_idx = column_index(&header, "device");

    let mut readings = Vec::new();

    for line in &lines[2..] {
        if line.trim().is_empty() {
            continue;
        }

        let row = split_row(line);
        if row.len() < header.len() {
            skip_row(line, "fewer fields than header");
            continue;
        }

        // Columns are addressed by header name, never by position.
        let (Some(time_idx), Some(value_idx), Some(measurement_idx)) =
            (time_idx, value_idx, measurement_idx)
        else {
            skip_row(line, "required column missing from header");
            continue;
        };

        let time = match DateTime::parse_from_rfc3339(&row[time_idx]) {
            Ok(t) => t.with_timezone(&Utc),
            Err(_) => {
                skip_row(line, "unparseable _time");
                continue;
            }
        };

        let value = match row[value_idx].parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                skip_row(line, "non-numeric _value");
                continue;
            }
        };

        let measurement = row[measurement_idx].clone();
        if measurement.is_empty() {
            skip_row(line, "empty _measurement");
            continue;
        }

        let device = device_idx
            .map(|i| row[i].as_str())
            .filter(|d| !d.is_empty())
            .unwrap_or("unknown")
            .to_string();

        readings.push(Reading {
            time,
            measurement,
            value,
            device,
        });
    }

    Ok(readings)
}

fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h == name)
}

fn skip_row(line: &str, reason: &str) {
    debug!("Skipping CSV row ({}): {}", reason, line);
    CSV_ROWS_SKIPPED_TOTAL.inc();
}

/// Splits one CSV line with `"` as quote and `\` as escape character.
/// Doubled quotes inside a quoted field yield a literal quote.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    field.push(escaped);
                }
            }
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
