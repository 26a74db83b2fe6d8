//! 日记服务：单条日记与当日综合日记

use chrono::NaiveDate;
use std::sync::Arc;

use crate::client::{ApiClient, ApiRequest};
use crate::diary::calendar::{self, DayStatus};
use crate::error::{ClientError, Result};
use crate::models::entry::{
    DailySummary, DiaryEntry, EntryEdit, FeedItem, GenerateEntryRequest, GenerateSummaryRequest,
    MissingSummariesResponse, SummaryGeneration,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct DiaryService {
    client: Arc<ApiClient>,
}

impl DiaryService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// 提交原始输入，由后端生成日记
    pub async fn generate(&self, input: &str) -> Result<DiaryEntry> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ClientError::validation("diary input must not be empty"));
        }

        let entry: DiaryEntry = self
            .client
            .post("/diary/generate/", &GenerateEntryRequest { input })
            .await?;
        tracing::info!(id = entry.id, "Diary entry generated");
        Ok(entry)
    }

    /// 全部日记与综合日记
    pub async fn feed(&self) -> Result<Vec<FeedItem>> {
        self.client.get("/diary/entries/").await
    }

    /// 某一天的单条日记，按创建时间排序
    pub async fn entries_on(&self, date: NaiveDate) -> Result<Vec<DiaryEntry>> {
        let feed = self.feed().await?;
        Ok(calendar::entries_on(calendar::entries_only(&feed), date)
            .into_iter()
            .cloned()
            .collect())
    }

    /// 从列表中查找某一天的综合日记
    pub async fn summary_on(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        let feed = self.feed().await?;
        Ok(feed.into_iter().find_map(|item| match item {
            FeedItem::Summary(summary) if summary.date == date => Some(summary),
            _ => None,
        }))
    }

    pub async fn entry(&self, id: i64) -> Result<DiaryEntry> {
        self.client.get(&format!("/diary/entries/{}/", id)).await
    }

    /// 修改日记：重新生成或手动修改文本与话题标签
    pub async fn edit(&self, id: i64, edit: &EntryEdit) -> Result<DiaryEntry> {
        if let EntryEdit::Regenerate { raw_input } = edit {
            if raw_input.trim().is_empty() {
                return Err(ClientError::validation("diary input must not be empty"));
            }
        }

        let entry: DiaryEntry = self
            .client
            .send_json(&ApiRequest::put(format!("/diary/edit/{}/", id)).body(edit.to_body()))
            .await?;
        tracing::info!(id, "Diary entry updated");
        Ok(entry)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client.delete(&format!("/diary/edit/{}/", id)).await?;
        tracing::info!(id, "Diary entry deleted");
        Ok(())
    }

    /// 某一天的综合日记；不存在时返回 None
    pub async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        let request = ApiRequest::get("/diary/daily-summary/")
            .query("date", date.format(DATE_FORMAT));
        match self.client.send_json(&request).await {
            Ok(summary) => Ok(Some(summary)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 生成（或重新生成）某一天的综合日记
    pub async fn generate_daily_summary(&self, date: NaiveDate) -> Result<SummaryGeneration> {
        let body = GenerateSummaryRequest {
            date: date.format(DATE_FORMAT).to_string(),
        };
        let generation: SummaryGeneration =
            self.client.post("/diary/daily-summary/", &body).await?;

        match &generation {
            SummaryGeneration::Generated(summary) => {
                tracing::info!(id = summary.id, %date, "Daily summary generated")
            }
            SummaryGeneration::NoEntries { .. } => {
                tracing::info!(%date, "No entries to summarize")
            }
            SummaryGeneration::Failed { error } => {
                tracing::warn!(%date, error = %error, "Daily summary generation failed")
            }
        }
        Ok(generation)
    }

    /// 修改综合日记正文
    pub async fn edit_daily_summary(&self, id: i64, text: &str) -> Result<()> {
        let request = ApiRequest::put(format!("/diary/edit/{}/", id))
            .body(serde_json::json!({ "generated_diary": text }));
        self.client.send(&request).await?;
        tracing::info!(id, "Daily summary updated");
        Ok(())
    }

    pub async fn delete_daily_summary(&self, id: i64) -> Result<()> {
        self.client
            .delete(&format!("/diary/daily-summary/delete/{}/", id))
            .await?;
        tracing::info!(id, "Daily summary deleted");
        Ok(())
    }

    /// 有日记但还没有综合日记的日期
    pub async fn missing_summaries(&self) -> Result<Vec<NaiveDate>> {
        let response: MissingSummariesResponse =
            self.client.get("/diary/missing-summaries/").await?;
        Ok(response.missing_daily_summaries)
    }

    /// 某一天综合日记的状态；已存在时检查生成后日记是否有变动
    pub async fn day_status(&self, date: NaiveDate) -> Result<DayStatus> {
        let feed = self.feed().await?;
        let day_entries = calendar::entries_on(calendar::entries_only(&feed), date);
        let summary = self.daily_summary(date).await?;
        Ok(calendar::resolve_day_status(&day_entries, summary))
    }
}
