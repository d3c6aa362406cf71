use crate::analytics::{mean, round_to, DailyStat};
use chrono::{Datelike, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;

/// Rows per "week" in the growth comparison.
const WEEK: usize = 7;

/// Last week vs the week before, by record order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeeklyGrowth {
    pub current_week_visits: u64,
    pub previous_week_visits: u64,
    pub growth_rate_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResult {
    pub average_daily_visits: f64,
    pub average_daily_unique: f64,
    pub busiest_day_of_week: String,
    pub weekly_growth: WeeklyGrowth,
}

/// A summary, or the `{"error": ...}` payload when there is nothing to summarize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummaryOutcome {
    Summary(SummaryResult),
    Unavailable { error: String },
}

pub fn generate_summary(stats: &[DailyStat]) -> SummaryOutcome {
    let Some(busiest) = busiest_weekday(stats) else {
        return SummaryOutcome::Unavailable {
            error: "No data available".to_string(),
        };
    };

    #[allow(clippy::cast_precision_loss)]
    let average_daily_visits = round_to(mean(stats.iter().map(|s| s.total_visits as f64)), 1);
    #[allow(clippy::cast_precision_loss)]
    let average_daily_unique = round_to(mean(stats.iter().map(|s| s.unique_visitors as f64)), 1);

    SummaryOutcome::Summary(SummaryResult {
        average_daily_visits,
        average_daily_unique,
        busiest_day_of_week: busiest.to_string(),
        weekly_growth: weekly_growth(stats),
    })
}

const fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Weekday with the highest mean visits. Ties go to the alphabetically
/// first weekday name.
#[allow(clippy::cast_precision_loss)]
fn busiest_weekday(stats: &[DailyStat]) -> Option<&'static str> {
    let mut by_day: BTreeMap<&'static str, (u64, u64)> = BTreeMap::new();
    for stat in stats {
        let entry = by_day.entry(weekday_name(stat.date.weekday())).or_default();
        entry.0 += stat.total_visits;
        entry.1 += 1;
    }

    by_day
        .into_iter()
        .map(|(name, (sum, count))| (name, sum as f64 / count as f64))
        .fold(None, |best: Option<(&'static str, f64)>, (name, avg)| match best {
            Some((_, best_avg)) if best_avg >= avg => best,
            _ => Some((name, avg)),
        })
        .map(|(name, _)| name)
}

fn weekly_growth(stats: &[DailyStat]) -> WeeklyGrowth {
    if stats.len() < 2 * WEEK {
        return WeeklyGrowth::default();
    }

    let split = stats.len() - WEEK;
    let sum = |rows: &[DailyStat]| rows.iter().map(|s| s.total_visits).sum::<u64>();
    let current = sum(&stats[split..]);
    let previous = sum(&stats[split - WEEK..split]);

    #[allow(clippy::cast_precision_loss)]
    let growth = if previous > 0 {
        (current as f64 - previous as f64) / previous as f64 * 100.0
    } else {
        0.0
    };

    WeeklyGrowth {
        current_week_visits: current,
        previous_week_visits: previous,
        growth_rate_percent: round_to(growth, 1),
    }
}
