use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;

use crate::config::ScheduleConfig;

pub struct Scheduler {
    expr: String,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            expr: config.cron.clone(),
            schedule: parse(&config.cron)?,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(now).next()
    }

    /// Sleep until the next fire time. Returns `None` once the schedule has
    /// no future runs.
    pub async fn wait_for_tick(&self) -> Option<DateTime<Local>> {
        let now = Local::now();
        let next = self.next_after(&now)?;
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!("Next joke at {next} (in {}s)", wait.as_secs());
        tokio::time::sleep(wait).await;
        Some(next)
    }
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Accepts classic 5-field expressions as well as the `cron` crate's native
/// 6/7-field form (with seconds and optional year).
fn parse(expr: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if let [minute, hour, dom, month, dow] = fields[..] {
        let dow = day_of_week_names(dow)
            .map_err(|e| anyhow!("invalid cron expression '{expr}': {e}"))?;
        format!("0 {minute} {hour} {dom} {month} {dow} *")
    } else {
        expr.to_string()
    };
    normalized
        .parse::<Schedule>()
        .map_err(|e| anyhow!("invalid cron expression '{expr}': {e}"))
}

/// Rewrites a classic day-of-week field (0-7, Sunday is 0 or 7) as day
/// names. The `cron` crate numbers Sunday as 1.
fn day_of_week_names(field: &str) -> Result<String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (
                range,
                step.parse::<usize>()
                    .map_err(|_| anyhow!("bad step in '{item}'"))?,
            ),
            None => (item, 1),
        };
        if step == 0 {
            bail!("zero step in '{item}'");
        }
        let (start, end) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((start, end)) => (day_number(start)?, day_number(end)?),
            None if step > 1 => (day_number(range)?, 6),
            None => {
                let day = day_number(range)?;
                (day, day)
            }
        };
        if start > end {
            bail!("descending day range '{range}'");
        }
        days.extend((start..=end).step_by(step).map(|d| d % 7));
    }

    Ok(days
        .into_iter()
        .map(|d| DAY_NAMES[d])
        .collect::<Vec<_>>()
        .join(","))
}

fn day_number(s: &str) -> Result<usize> {
    if let Ok(n) = s.parse::<usize>() {
        if n > 7 {
            bail!("day {n} out of range");
        }
        return Ok(n);
    }
    DAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(s))
        .ok_or_else(|| anyhow!("unknown day '{s}'"))
}
