//! Execution-window definitions for the maintenance loops.
//!
//! A definition is a whitespace-separated list of `<day>[<range>,...]`
//! chunks, where `<day>` is one of `mo tu we th fr sa su` and each range is
//! `HH:MM..HH:MM` in local time, e.g.:
//!
//! ```text
//! mo[02:00..05:00] sa[00:00..08:30,22:00..24:00]
//! ```
//!
//! Chunks that fail to parse are skipped, matching the forgiving behavior
//! operators rely on when hand-editing schedules.

use std::collections::HashMap;
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

const DAYS: [&str; 7] = ["mo", "tu", "we", "th", "fr", "sa", "su"];

/// When a maintenance loop is allowed to run. Empty means never.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionWindows {
    /// Per weekday (Monday = 0): minute ranges `[start, end)` since
    /// midnight.
    days: HashMap<u8, Vec<(u16, u16)>>,
}

fn parse_minutes(text: &str) -> Option<u16> {
    let (hours, minutes) = text.split_once(':')?;
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    (minutes < 60).then_some(hours * 60 + minutes)
}

fn parse_chunk(chunk: &str) -> Option<(u8, Vec<(u16, u16)>)> {
    let day = DAYS.iter().position(|d| chunk.starts_with(d))? as u8;
    let ranges = chunk[2..].strip_prefix('[')?.strip_suffix(']')?;
    let mut parsed = Vec::new();
    for range in ranges.split(',') {
        let (start, end) = range.split_once("..")?;
        parsed.push((parse_minutes(start)?, parse_minutes(end)?));
    }
    Some((day, parsed))
}

impl ExecutionWindows {
    /// Interpret a window definition. `name` only labels the log line.
    #[must_use]
    pub fn parse(definition: &str, name: &str) -> Self {
        let mut days: HashMap<u8, Vec<(u16, u16)>> = HashMap::new();
        for chunk in definition.to_lowercase().split_whitespace() {
            if let Some((day, ranges)) = parse_chunk(chunk) {
                info!(maintainer = name, windows = chunk, "validated execution windows");
                days.entry(day).or_default().extend(ranges);
            }
        }
        Self { days }
    }

    /// Whether any window is defined at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// A definition that allows execution at any time; for tests and
    /// always-on deployments.
    #[must_use]
    pub fn always() -> Self {
        let days = (0..7).map(|day| (day, vec![(0, 24 * 60)])).collect();
        Self { days }
    }

    /// Whether `minutes` since local midnight on `weekday` (Monday = 0)
    /// falls inside a window. Range ends are exclusive.
    #[must_use]
    pub fn contains(&self, weekday: u8, minutes: u16) -> bool {
        self.days
            .get(&weekday)
            .is_some_and(|ranges| ranges.iter().any(|(start, end)| (*start..*end).contains(&minutes)))
    }

    /// Whether execution is allowed right now, in local time. Falls back to
    /// UTC when the local offset cannot be determined.
    #[must_use]
    pub fn contains_now(&self) -> bool {
        let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
        let local = OffsetDateTime::now_utc().to_offset(offset);
        let weekday = local.weekday().number_days_from_monday();
        let minutes = u16::from(local.hour()) * 60 + u16::from(local.minute());
        self.contains(weekday, minutes)
    }
}
