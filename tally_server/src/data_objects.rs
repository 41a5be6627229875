use std::{collections::HashSet, fmt::Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_common::Money;
use tally_engine::{
    broadcast::{ConnectionId, ConnectionState, Scope},
    db_types::{AttributionOutcome, AttributionRecord, ConflictPolicy, Counters, NewAttribution, TenantId},
    helpers::parse_timestamp,
    summary_objects::TimeRange,
};

use crate::errors::ServerError;

const ALL_METRICS: &str = "*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

//--------------------------------------    Query params     ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeParams {
    #[serde(rename = "timeRange", default)]
    pub time_range: Option<String>,
}

impl RangeParams {
    /// Missing or malformed ranges fall back to the 30 day default.
    pub fn range(&self) -> TimeRange {
        TimeRange::parse_or_default(self.time_range.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryParams {
    #[serde(rename = "metricType")]
    pub metric_type: String,
    #[serde(rename = "timeRange", default)]
    pub time_range: Option<String>,
}

impl HistoryParams {
    pub fn range(&self) -> TimeRange {
        TimeRange::parse_or_default(self.time_range.as_deref())
    }
}

//--------------------------------------   Ingest payloads   ---------------------------------------------------------
/// A raw counter delta. `date` may be a calendar date or a timestamp, which is bucketed by its UTC day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDeltaRequest {
    pub metric_type: String,
    pub date: String,
    pub source: String,
    #[serde(default)]
    pub counters: Counters,
}

/// A ledger write. Amounts are in major currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionRequest {
    pub order_id: String,
    pub channel: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub ad_set_id: Option<String>,
    #[serde(default)]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub revenue: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub attribution_model: Option<String>,
    pub order_date: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub policy: ConflictPolicy,
}

impl AttributionRequest {
    pub fn into_new_attribution(self, tenant: TenantId) -> Result<NewAttribution, ServerError> {
        let order_date = parse_timestamp(&self.order_date).map_err(|e| ServerError::ValidationError(e.to_string()))?;
        let revenue = to_money("revenue", self.revenue)?;
        let cost = to_money("cost", self.cost)?;
        let mut record = NewAttribution::new(tenant, self.order_id, self.channel, order_date)
            .with_campaign(self.campaign_id, self.ad_set_id, self.ad_id)
            .with_revenue(revenue)
            .with_cost(cost);
        if let Some(model) = self.attribution_model {
            record = record.with_attribution_model(model);
        }
        if let Some(metadata) = self.metadata {
            record = record.with_metadata(metadata);
        }
        Ok(record)
    }
}

fn to_money(field: &str, value: f64) -> Result<Money, ServerError> {
    Money::from_major(value).map_err(|e| ServerError::ValidationError(format!("{field}: {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionResponse {
    pub outcome: AttributionOutcome,
    pub record: AttributionRecord,
}

//--------------------------------------   Live connections  ---------------------------------------------------------
/// Metric names to (un)subscribe. Either a JSON array of names, or `"*"` for every metric type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeRequest {
    All(String),
    Metrics(Vec<String>),
}

impl ScopeRequest {
    pub fn scopes(&self) -> Result<Vec<Scope>, ServerError> {
        let names = match self {
            ScopeRequest::All(s) if s.trim() == ALL_METRICS => return Ok(vec![Scope::AllMetrics]),
            ScopeRequest::All(s) => {
                return Err(ServerError::ValidationError(format!("Expected a list of metric types or \"*\", got {s}")))
            },
            ScopeRequest::Metrics(names) => names,
        };
        let scopes = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .map(|n| if n == ALL_METRICS { Scope::AllMetrics } else { Scope::metric(n) })
            .collect::<Vec<_>>();
        if scopes.is_empty() {
            return Err(ServerError::ValidationError("At least one metric type is required".into()));
        }
        Ok(scopes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub connection_id: ConnectionId,
    /// The metric types the connection now receives updates for, sorted. `"*"` stands for all of them.
    pub subscriptions: Vec<String>,
}

impl SubscriptionResponse {
    pub fn new(connection_id: ConnectionId, state: &ConnectionState) -> Self {
        let subscriptions = match state {
            ConnectionState::Subscribed(scopes) => scope_names(scopes),
            ConnectionState::Connected | ConnectionState::Disconnected => Vec::new(),
        };
        Self { connection_id, subscriptions }
    }
}

fn scope_names(scopes: &HashSet<Scope>) -> Vec<String> {
    let mut names = scopes
        .iter()
        .map(|s| match s {
            Scope::Metric(m) => m.clone(),
            Scope::AllMetrics => ALL_METRICS.to_string(),
        })
        .collect::<Vec<_>>();
    names.sort();
    names
}
