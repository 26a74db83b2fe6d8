//! 日历视图辅助：按日分组、当日平均幸福指数、当日综合日记状态

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::diary::consistency::{is_same_diary_inputs, DiaryInputPair};
use crate::models::entry::{DailySummary, DiaryEntry, FeedItem};

/// 某一天综合日记的状态
#[derive(Debug, Clone)]
pub enum DayStatus {
    /// 已有综合日记；`stale` 表示生成后当天的日记又有变动
    Exists { summary: DailySummary, stale: bool },
    /// 有日记但还没有综合日记
    CanGenerate,
    NoEntries,
}

impl DayStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DayStatus::Exists { stale: false, .. } => "exists",
            DayStatus::Exists { stale: true, .. } => "stale",
            DayStatus::CanGenerate => "can_generate",
            DayStatus::NoEntries => "no_entries",
        }
    }
}

/// 从列表中取出单条日记（去掉综合日记）
pub fn entries_only(feed: &[FeedItem]) -> Vec<&DiaryEntry> {
    feed.iter()
        .filter_map(|item| match item {
            FeedItem::Entry(entry) => Some(entry),
            FeedItem::Summary(_) => None,
        })
        .collect()
}

/// 按日历日分组，组内按创建时间排序
pub fn group_by_day<'a>(
    entries: impl IntoIterator<Item = &'a DiaryEntry>,
) -> BTreeMap<NaiveDate, Vec<&'a DiaryEntry>> {
    let mut days: BTreeMap<NaiveDate, Vec<&DiaryEntry>> = BTreeMap::new();
    for entry in entries {
        days.entry(entry.local_date()).or_default().push(entry);
    }
    for day in days.values_mut() {
        day.sort_by_key(|entry| entry.created_at);
    }
    days
}

pub fn entries_on<'a>(
    entries: impl IntoIterator<Item = &'a DiaryEntry>,
    date: NaiveDate,
) -> Vec<&'a DiaryEntry> {
    let mut day: Vec<_> = entries
        .into_iter()
        .filter(|entry| entry.local_date() == date)
        .collect();
    day.sort_by_key(|entry| entry.created_at);
    day
}

/// 平均幸福指数，保留一位小数；没有日记时为 0
pub fn average_happiness(entries: &[&DiaryEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    let total: u64 = entries
        .iter()
        .map(|entry| u64::from(entry.scores.happiness_score))
        .sum();
    let mean = total as f64 / entries.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// 根据当天的日记和（可能不存在的）综合日记得出状态
pub fn resolve_day_status(day_entries: &[&DiaryEntry], summary: Option<DailySummary>) -> DayStatus {
    match summary {
        Some(summary) => {
            let current: Vec<DiaryInputPair> =
                day_entries.iter().map(|entry| entry.input_pair()).collect();
            let stale = !is_same_diary_inputs(&current, &summary.original_inputs);
            DayStatus::Exists { summary, stale }
        }
        None if day_entries.is_empty() => DayStatus::NoEntries,
        None => DayStatus::CanGenerate,
    }
}
