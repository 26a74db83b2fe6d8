//! Retrospect models

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 回顾周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrospectPeriod {
    Week,
    Month,
    Year,
}

impl RetrospectPeriod {
    pub const ALL: [RetrospectPeriod; 3] = [
        RetrospectPeriod::Week,
        RetrospectPeriod::Month,
        RetrospectPeriod::Year,
    ];

    /// 查询参数中的取值
    pub fn as_query(&self) -> &'static str {
        match self {
            RetrospectPeriod::Week => "7d",
            RetrospectPeriod::Month => "1m",
            RetrospectPeriod::Year => "1y",
        }
    }
}

impl fmt::Display for RetrospectPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for RetrospectPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" | "week" => Ok(RetrospectPeriod::Week),
            "1m" | "month" => Ok(RetrospectPeriod::Month),
            "1y" | "year" => Ok(RetrospectPeriod::Year),
            other => Err(format!("unknown period '{}', expected 7d, 1m or 1y", other)),
        }
    }
}

/// 情绪分布（均值，可能带小数）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionSummary {
    #[serde(default)]
    pub joy: f64,
    #[serde(default)]
    pub anger: f64,
    #[serde(default)]
    pub sadness: f64,
    #[serde(default)]
    pub pleasure: f64,
}

/// 周期回顾报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrospectReport {
    #[serde(default)]
    pub average_happiness: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub insight: Option<String>,
    #[serde(default)]
    pub emotion_summary: Option<EmotionSummary>,
    /// 后端附加的其他字段原样保留
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 最近一周、一月、一年的回顾
#[derive(Debug, Clone)]
pub struct RecentRetrospects {
    pub week: RetrospectReport,
    pub month: RetrospectReport,
    pub year: RetrospectReport,
}

/// 月度统计中幸福指数最高的日记
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightEntry {
    pub id: i64,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub generated_diary: String,
    #[serde(default)]
    pub happiness_score: u32,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// 月度统计报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub average_happiness: f64,
    #[serde(default)]
    pub average_emotions: EmotionSummary,
    #[serde(default)]
    pub top_hashtags: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub highlight_entry: HighlightEntry,
}
