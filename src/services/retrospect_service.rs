//! 回顾服务：周期回顾、自定义区间回顾、月度统计

use chrono::NaiveDate;
use std::sync::Arc;

use crate::client::{ApiClient, ApiRequest};
use crate::error::{ClientError, Result};
use crate::models::retrospect::{MonthlyReport, RecentRetrospects, RetrospectPeriod, RetrospectReport};

const RETROSPECT_PATH: &str = "/diary/retrospect/";

pub struct RetrospectService {
    client: Arc<ApiClient>,
}

impl RetrospectService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn for_period(&self, period: RetrospectPeriod) -> Result<RetrospectReport> {
        let request = ApiRequest::get(RETROSPECT_PATH).query("period", period.as_query());
        self.client.send_json(&request).await
    }

    /// 自定义区间回顾；开始日期晚于结束日期时不发请求
    pub async fn for_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RetrospectReport> {
        if start > end {
            return Err(ClientError::validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        let request = ApiRequest::get(RETROSPECT_PATH)
            .query("start_date", start.format("%Y-%m-%d"))
            .query("end_date", end.format("%Y-%m-%d"));
        self.client.send_json(&request).await
    }

    /// 并发获取最近一周、一月、一年的回顾
    pub async fn recent(&self) -> Result<RecentRetrospects> {
        let (week, month, year) = futures::future::try_join3(
            self.for_period(RetrospectPeriod::Week),
            self.for_period(RetrospectPeriod::Month),
            self.for_period(RetrospectPeriod::Year),
        )
        .await?;
        Ok(RecentRetrospects { week, month, year })
    }

    /// 月度统计；当月没有日记时返回 None
    pub async fn monthly(&self, year: i32, month: u32) -> Result<Option<MonthlyReport>> {
        validate_month(month)?;
        let request = ApiRequest::get("/diary/monthly-retrospect/")
            .query("year", year)
            .query("month", month);
        match self.client.send_json(&request).await {
            Ok(report) => Ok(Some(report)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 月度情绪分布与文字洞察
    pub async fn monthly_insight(&self, year: i32, month: u32) -> Result<RetrospectReport> {
        validate_month(month)?;
        let request = ApiRequest::get("/diary/monthly-retrospect-llm/")
            .query("year", year)
            .query("month", month);
        self.client.send_json(&request).await
    }
}

fn validate_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(ClientError::validation(format!("month must be 1-12, got {}", month)))
    }
}
