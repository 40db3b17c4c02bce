use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Days, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};
use crate::models::{HourPoint, ReadingEvent, TrendPoint};
use crate::terms::count_terms;

pub const DEFAULT_TOP_K_TERMS: usize = 12;
pub const MIN_TOP_K_TERMS: usize = 5;
pub const MAX_TOP_K_TERMS: usize = 25;
pub const DEFAULT_MIN_TERM_TOTAL: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGrain {
    Weekly,
    Monthly,
}

impl TimeGrain {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(AppError::Validation(
                "grain must be 'weekly' or 'monthly'".to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl GroupBy {
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(AppError::Validation(
                "group_by must be 'daily', 'weekly', 'monthly', or 'yearly'".to_string(),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// Weeks start on Monday.
pub fn period_start(date: NaiveDate, grain: TimeGrain) -> NaiveDate {
    match grain {
        TimeGrain::Weekly => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
        TimeGrain::Monthly => date.with_day(1).unwrap_or(date),
    }
}

pub fn group_label(date: NaiveDate, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Daily => date.format("%Y-%m-%d").to_string(),
        GroupBy::Weekly => period_start(date, TimeGrain::Weekly)
            .format("%Y-%m-%d")
            .to_string(),
        GroupBy::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
        GroupBy::Yearly => format!("{:04}", date.year()),
    }
}

/// Term usage over time from title + abstract. Terms seen fewer than
/// `min_term_total` times overall are dropped, then the `top_k` most frequent
/// survive. Rows are ordered by period, then by term rank.
pub fn compute_semantic_trends(
    events: &[ReadingEvent],
    grain: TimeGrain,
    tz: Tz,
    top_k: usize,
    min_term_total: i64,
) -> Vec<TrendPoint> {
    let mut by_period: BTreeMap<NaiveDate, HashMap<String, i64>> = BTreeMap::new();
    for event in events {
        let text = format!("{} {}", event.title, event.abstract_text);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let local_date = event.read_at.with_timezone(&tz).date_naive();
        let period = by_period.entry(period_start(local_date, grain)).or_default();
        for (term, count) in count_terms(text) {
            *period.entry(term).or_insert(0) += count;
        }
    }

    let mut totals: HashMap<&str, i64> = HashMap::new();
    for counts in by_period.values() {
        for (term, count) in counts {
            *totals.entry(term.as_str()).or_insert(0) += count;
        }
    }

    let mut ranked: Vec<(&str, i64)> = totals
        .into_iter()
        .filter(|(_, total)| *total >= min_term_total)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(top_k);

    let mut rows = Vec::new();
    for (period, counts) in &by_period {
        for (term, _) in &ranked {
            let count = counts.get(*term).copied().unwrap_or(0);
            if count > 0 {
                rows.push(TrendPoint {
                    period: *period,
                    term: (*term).to_string(),
                    count,
                });
            }
        }
    }
    rows
}

/// One `(group, hour)` row per reading event, in the viewer's timezone.
pub fn compute_time_of_day(events: &[ReadingEvent], group_by: GroupBy, tz: Tz) -> Vec<HourPoint> {
    events
        .iter()
        .map(|event| {
            let local = event.read_at.with_timezone(&tz);
            HourPoint {
                group: group_label(local.date_naive(), group_by),
                hour: local.hour(),
            }
        })
        .collect()
}

/// Consecutive local days with a read, ending today or yesterday.
pub fn calculate_streak(dates: &[DateTime<Utc>], tz: Tz, today: NaiveDate) -> u32 {
    let local_dates: BTreeSet<NaiveDate> = dates
        .iter()
        .map(|d| d.with_timezone(&tz).date_naive())
        .collect();

    let Some(&latest) = local_dates.iter().next_back() else {
        return 0;
    };
    let yesterday = today.pred_opt().unwrap_or(today);
    if latest != today && latest != yesterday {
        return 0;
    }

    let mut streak = 0;
    let mut expected = latest;
    for date in local_dates.iter().rev() {
        if *date != expected {
            break;
        }
        streak += 1;
        match expected.pred_opt() {
            Some(prev) => expected = prev,
            None => break,
        }
    }
    streak
}

pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}
