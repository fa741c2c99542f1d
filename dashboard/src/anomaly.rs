use crate::metrics::ANOMALIES_FLAGGED_TOTAL;
use crate::model::Reading;
use chrono::{DateTime, Local, Timelike};
use std::collections::HashSet;
use tracing::warn;

// Fault policy: a luminance sensor reporting near darkness while the sun is
// up is broken, not reading a true value. Threshold and hour window are
// fixed contract values, not tunables.
const LUMINANCE_FAULT_THRESHOLD: f64 = 0.5;
const DAYTIME_START_HOUR: u32 = 7;
const DAYTIME_END_HOUR: u32 = 19;

/// Removes implausible readings from a snapshot and reports the affected
/// channels. The only rule today is the daytime-luminance fault.
pub fn reconcile(
    batch: Vec<Reading>,
    now: DateTime<Local>,
) -> (Vec<Reading>, HashSet<String>) {
    let hour = now.hour();
    let daytime = (DAYTIME_START_HOUR..=DAYTIME_END_HOUR).contains(&hour);

    let mut flagged = HashSet::new();
    let mut cleaned = Vec::with_capacity(batch.len());

    for reading in batch {
        if daytime
            && reading.measurement == "luminance"
            && reading.value < LUMINANCE_FAULT_THRESHOLD
        {
            warn!(
                "Dropping implausible luminance reading {} at local hour {}",
                reading.value, hour
            );
            ANOMALIES_FLAGGED_TOTAL.inc();
            flagged.insert(reading.measurement);
            continue;
        }
        cleaned.push(reading);
    }

    (cleaned, flagged)
}
