//! Diary entry and daily summary models

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::diary::consistency::DiaryInputPair;

/// 后端对一段文本的情绪打分
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionScores {
    #[serde(default)]
    pub happiness_score: u32,
    #[serde(default)]
    pub joy: u32,
    #[serde(default)]
    pub anger: u32,
    #[serde(default)]
    pub sadness: u32,
    #[serde(default)]
    pub pleasure: u32,
}

/// 单条日记
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: i64,
    #[serde(default)]
    pub user: Option<i64>,
    #[serde(default)]
    pub raw_input: String,
    #[serde(default)]
    pub generated_diary: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(flatten)]
    pub scores: EmotionScores,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub created_at: DateTime<FixedOffset>,
}

fn default_public() -> bool {
    true
}

impl DiaryEntry {
    /// 条目所属的日历日（按后端返回的时区偏移）
    pub fn local_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn input_pair(&self) -> DiaryInputPair {
        DiaryInputPair::new(self.raw_input.as_str(), self.generated_diary.as_str())
    }
}

/// 当日综合日记
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub id: i64,
    #[serde(default)]
    pub user: Option<i64>,
    pub date: NaiveDate,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(flatten)]
    pub scores: EmotionScores,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub raw_input: String,
    #[serde(default)]
    pub generated_diary: String,
    /// 生成综合日记时使用的单条日记快照
    #[serde(default)]
    pub original_inputs: Vec<DiaryInputPair>,
}

impl DailySummary {
    /// 展示用正文：生成结果为空时退回 summary 字段
    pub fn text(&self) -> &str {
        if self.generated_diary.trim().is_empty() {
            &self.summary
        } else {
            &self.generated_diary
        }
    }
}

/// 生成综合日记的响应
///
/// 当天没有日记时后端只返回一条消息；生成失败时以 200 返回 `error` 字段。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SummaryGeneration {
    NoEntries { message: String },
    Failed { error: String },
    Generated(DailySummary),
}

/// 日记列表中的一项；综合日记带有 `is_summary: true`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FeedItem {
    Entry(DiaryEntry),
    Summary(DailySummary),
}

impl<'de> Deserialize<'de> for FeedItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let is_summary = value
            .get("is_summary")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        if is_summary {
            DailySummary::deserialize(value)
                .map(FeedItem::Summary)
                .map_err(serde::de::Error::custom)
        } else {
            DiaryEntry::deserialize(value)
                .map(FeedItem::Entry)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// 编辑日记
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEdit {
    /// 用新的原始输入重新生成
    Regenerate { raw_input: String },
    /// 直接修改生成文本和话题标签
    Manual {
        generated_diary: String,
        hashtags: Vec<String>,
    },
}

impl EntryEdit {
    pub fn manual(generated_diary: impl Into<String>, hashtags: &str) -> Self {
        EntryEdit::Manual {
            generated_diary: generated_diary.into(),
            hashtags: parse_hashtags(hashtags),
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        match self {
            EntryEdit::Regenerate { raw_input } => serde_json::json!({ "raw_input": raw_input }),
            EntryEdit::Manual {
                generated_diary,
                hashtags,
            } => serde_json::json!({
                "generated_diary": generated_diary,
                "hashtags": hashtags,
            }),
        }
    }
}

/// 解析逗号分隔的话题标签
pub fn parse_hashtags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize)]
pub struct GenerateEntryRequest<'a> {
    pub input: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GenerateSummaryRequest {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct MissingSummariesResponse {
    #[serde(default)]
    pub missing_daily_summaries: Vec<NaiveDate>,
}
