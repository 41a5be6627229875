use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{ChannelTotals, TenantId};

pub const DEFAULT_RANGE_DAYS: i64 = 30;

//--------------------------------------     TimeWindow      ---------------------------------------------------------
/// A half-open time range, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
#[error("Invalid time window: {start} is after {end}")]
pub struct TimeWindowError {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeWindowError> {
        if start > end {
            return Err(TimeWindowError { start, end });
        }
        Ok(Self { start, end })
    }

    /// The window of the given length that ends at `end`.
    pub fn ending_at(end: DateTime<Utc>, length: Duration) -> Self {
        Self { start: end - length, end }
    }

    pub fn last_days(days: i64) -> Self {
        Self::ending_at(Utc::now(), Duration::days(days))
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start <= *ts && *ts < self.end
    }

    /// The daily buckets that fall in this window, as a half-open range of calendar days `[first, last)`.
    ///
    /// A bucket belongs to the window when its midnight does. A window that starts mid-morning leaves out the bucket
    /// for that day, and a window ending exactly at midnight does not include the day that starts then.
    pub fn day_range(&self) -> (NaiveDate, NaiveDate) {
        (first_midnight_from(&self.start), first_midnight_from(&self.end))
    }
}

/// The day whose midnight is the earliest one at or after `ts`.
fn first_midnight_from(ts: &DateTime<Utc>) -> NaiveDate {
    let day = ts.date_naive();
    if ts.time() == NaiveTime::MIN {
        day
    } else {
        day + Duration::days(1)
    }
}

//--------------------------------------     TimeRange       ---------------------------------------------------------
/// A relative time range as clients express it, e.g. `24h`, `7d`, or `30` (days).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeRange {
    Hours(i64),
    Days(i64),
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::Days(DEFAULT_RANGE_DAYS)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid time range: '{0}'. Use e.g. 24h, 7d or 30")]
pub struct TimeRangeParseError(String);

impl FromStr for TimeRange {
    type Err = TimeRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(?P<n>\d{1,5})\s*(?P<unit>[hHdD]?)$").map_err(|e| TimeRangeParseError(e.to_string()))?;
        let caps = re.captures(s.trim()).ok_or_else(|| TimeRangeParseError(s.to_string()))?;
        let n = caps["n"].parse::<i64>().map_err(|_| TimeRangeParseError(s.to_string()))?;
        if n == 0 {
            return Err(TimeRangeParseError(s.to_string()));
        }
        match caps.name("unit").map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("h") => Ok(Self::Hours(n)),
            _ => Ok(Self::Days(n)),
        }
    }
}

impl TryFrom<String> for TimeRange {
    type Error = TimeRangeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(value: TimeRange) -> Self {
        value.to_string()
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeRange::Hours(h) => write!(f, "{h}h"),
            TimeRange::Days(d) => write!(f, "{d}d"),
        }
    }
}

impl TimeRange {
    /// Parses the range, falling back to the 30 day default if it is missing or malformed.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            None => Self::default(),
            Some(s) => s.parse().unwrap_or_else(|e| {
                warn!("📊️ {e}. Using the default of {} instead.", Self::default());
                Self::default()
            }),
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::Hours(h) => Duration::hours(*h),
            TimeRange::Days(d) => Duration::days(*d),
        }
    }

    pub fn window_ending_at(&self, end: DateTime<Utc>) -> TimeWindow {
        TimeWindow::ending_at(end, self.duration())
    }

    pub fn window_ending_now(&self) -> TimeWindow {
        self.window_ending_at(Utc::now())
    }

    /// A human-readable description, e.g. "30 days".
    pub fn describe(&self) -> String {
        match self {
            TimeRange::Hours(1) => "1 hour".to_string(),
            TimeRange::Hours(h) => format!("{h} hours"),
            TimeRange::Days(1) => "1 day".to_string(),
            TimeRange::Days(d) => format!("{d} days"),
        }
    }
}

//--------------------------------------        Roas         ---------------------------------------------------------
/// Return on ad spend for a channel. When a channel has no recorded cost the ratio is undefined, which serializes
/// as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Roas {
    Ratio(f64),
    Undefined,
}

impl Roas {
    pub fn calculate(revenue: f64, cost: f64) -> Self {
        if cost > 0.0 && revenue.is_finite() {
            Self::Ratio(revenue / cost)
        } else {
            Self::Undefined
        }
    }

    pub fn ratio(&self) -> Option<f64> {
        match self {
            Roas::Ratio(r) => Some(*r),
            Roas::Undefined => None,
        }
    }
}

impl From<Option<f64>> for Roas {
    fn from(value: Option<f64>) -> Self {
        value.filter(|v| v.is_finite()).map(Roas::Ratio).unwrap_or(Roas::Undefined)
    }
}

impl From<Roas> for Option<f64> {
    fn from(value: Roas) -> Self {
        value.ratio()
    }
}

//--------------------------------------   ChannelSummary    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: String,
    pub revenue: f64,
    pub cost: f64,
    pub orders: i64,
    pub roas: Roas,
}

impl From<ChannelTotals> for ChannelSummary {
    fn from(totals: ChannelTotals) -> Self {
        let revenue = totals.revenue.to_major();
        let cost = totals.cost.to_major();
        Self { channel: totals.channel, revenue, cost, orders: totals.orders, roas: Roas::calculate(revenue, cost) }
    }
}

//--------------------------------------       Summary       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub tenant_id: TenantId,
    pub window: TimeWindow,
    pub total_revenue: f64,
    pub total_orders: i64,
    pub average_order_value: f64,
    pub per_channel: Vec<ChannelSummary>,
}

impl Summary {
    pub fn new(tenant_id: TenantId, window: TimeWindow, total_revenue: f64, total_orders: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let average_order_value = if total_orders > 0 { total_revenue / total_orders as f64 } else { 0.0 };
        Self { tenant_id, window, total_revenue, total_orders, average_order_value, per_channel: Vec::new() }
    }

    pub fn with_channels(mut self, channels: Vec<ChannelSummary>) -> Self {
        self.per_channel = channels;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.total_orders == 0 && self.total_revenue == 0.0 && self.per_channel.is_empty()
    }

    /// Produces the compact analytics overview handed to a conversational assistant as context.
    pub fn assistant_context(&self, range: TimeRange) -> AssistantContext {
        AssistantContext {
            time_range: range.describe(),
            total_revenue: format!("{:.2}", self.total_revenue),
            total_orders: self.total_orders,
            average_order_value: format!("{:.2}", self.average_order_value),
            channels: self.per_channel.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantContext {
    pub time_range: String,
    pub total_revenue: String,
    pub total_orders: i64,
    pub average_order_value: String,
    pub channels: Vec<ChannelSummary>,
}
