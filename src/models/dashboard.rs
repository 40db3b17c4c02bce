use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Personal,
    Team,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub period: NaiveDate,
    pub term: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourPoint {
    pub group: String,
    pub hour: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct TrendsQuery {
    pub scope: Option<Scope>,
    pub grain: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TimeOfDayQuery {
    pub scope: Option<Scope>,
    pub group_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub scope: Scope,
    pub grain: String,
    pub timezone: String,
    pub data: Vec<TrendPoint>,
}

#[derive(Debug, Serialize)]
pub struct TimeOfDayResponse {
    pub scope: Scope,
    pub group_by: String,
    pub timezone: String,
    pub data: Vec<HourPoint>,
}

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub streak: u32,
    pub timezone: String,
}
