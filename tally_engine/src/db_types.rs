use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};
pub use tally_common::Money;
use thiserror::Error;

/// The attribution model tag used when a writer does not supply one.
pub const DEFAULT_ATTRIBUTION_MODEL: &str = "last_click";

/// Metric types that the ingestion flows and summaries know about. Adapters are free to use other names.
pub mod metric_types {
    pub const REVENUE: &str = "revenue";
    pub const AD_SPEND: &str = "ad_spend";
    pub const EMAIL: &str = "email";
}

/// Counter names used by the built-in ingestion flows.
pub mod counter_names {
    pub const REVENUE: &str = "revenue";
    pub const ORDERS: &str = "orders";
    pub const SPEND: &str = "spend";
    pub const CONVERSIONS: &str = "conversions";
}

//--------------------------------------      TenantId       ---------------------------------------------------------
/// An opaque tenant identifier. Tenants are owned by the external identity component; this crate only partitions data
/// by them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

//--------------------------------------      Counters       ---------------------------------------------------------
/// A set of named numeric counters, e.g. `{revenue: 150.0, orders: 2.0}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counters(BTreeMap<String, f64>);

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the named counter, or zero if it has never been set.
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn set<S: Into<String>>(&mut self, name: S, value: f64) -> &mut Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn with<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        self.set(name, value);
        self
    }

    /// Field-wise addition of `other` into this set of counters.
    pub fn add(&mut self, other: &Counters) {
        for (name, value) in other.iter() {
            *self.0.entry(name.to_string()).or_default() += value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Counters {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

//--------------------------------------    MetricDelta      ---------------------------------------------------------
/// A validated request to add `delta` to the daily aggregate identified by (tenant, metric_type, date, source).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDelta {
    pub tenant_id: TenantId,
    pub metric_type: String,
    pub date: NaiveDate,
    pub source: String,
    pub delta: Counters,
}

impl MetricDelta {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        tenant_id: TenantId,
        metric_type: S1,
        date: NaiveDate,
        source: S2,
        delta: Counters,
    ) -> Self {
        Self { tenant_id, metric_type: metric_type.into(), date, source: source.into(), delta }
    }
}

//--------------------------------------    DailyMetric      ---------------------------------------------------------
/// The stored daily aggregate for a (tenant, metric_type, date, source) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub id: i64,
    pub tenant_id: TenantId,
    pub metric_type: String,
    pub metric_date: NaiveDate,
    pub source: String,
    pub counters: Counters,
    /// The number of merges applied after the row was first created.
    pub merge_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   ConflictPolicy    ---------------------------------------------------------
/// Decides what happens when an attribution write targets a (tenant, order_id) that already has a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Add the revenue and cost deltas onto the existing row and overwrite any campaign identifiers that are
    /// supplied. The existing channel is kept. Ad platforms write with this policy.
    MergeNumeric,
    /// First writer wins. Storefront orders write with this policy.
    IgnoreIfExists,
    /// Overwrite every value column. Used for corrective re-syncs.
    Replace,
}

impl Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::MergeNumeric => write!(f, "merge_numeric"),
            ConflictPolicy::IgnoreIfExists => write!(f, "ignore_if_exists"),
            ConflictPolicy::Replace => write!(f, "replace"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conflict policy: {0}")]
pub struct ConflictPolicyParseError(String);

impl FromStr for ConflictPolicy {
    type Err = ConflictPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge_numeric" | "merge" => Ok(Self::MergeNumeric),
            "ignore_if_exists" | "ignore" => Ok(Self::IgnoreIfExists),
            "replace" => Ok(Self::Replace),
            _ => Err(ConflictPolicyParseError(s.to_string())),
        }
    }
}

//--------------------------------------  AttributionOutcome ---------------------------------------------------------
/// What a ledger write actually did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionOutcome {
    Inserted,
    Merged,
    Ignored,
    Replaced,
}

impl AttributionOutcome {
    /// True if the stored row changed as a result of the write.
    pub fn modified(&self) -> bool {
        !matches!(self, AttributionOutcome::Ignored)
    }
}

impl Display for AttributionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributionOutcome::Inserted => write!(f, "inserted"),
            AttributionOutcome::Merged => write!(f, "merged"),
            AttributionOutcome::Ignored => write!(f, "ignored"),
            AttributionOutcome::Replaced => write!(f, "replaced"),
        }
    }
}

//--------------------------------------   NewAttribution    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttribution {
    pub tenant_id: TenantId,
    pub order_id: String,
    pub channel: String,
    pub campaign_id: Option<String>,
    pub ad_set_id: Option<String>,
    pub ad_id: Option<String>,
    pub revenue: Money,
    pub cost: Money,
    pub attribution_model: String,
    pub order_date: DateTime<Utc>,
    pub metadata: Value,
}

impl NewAttribution {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        tenant_id: TenantId,
        order_id: S1,
        channel: S2,
        order_date: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            order_id: order_id.into(),
            channel: channel.into(),
            campaign_id: None,
            ad_set_id: None,
            ad_id: None,
            revenue: Money::default(),
            cost: Money::default(),
            attribution_model: DEFAULT_ATTRIBUTION_MODEL.to_string(),
            order_date,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_revenue(mut self, revenue: Money) -> Self {
        self.revenue = revenue;
        self
    }

    pub fn with_cost(mut self, cost: Money) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_campaign(
        mut self,
        campaign_id: Option<String>,
        ad_set_id: Option<String>,
        ad_id: Option<String>,
    ) -> Self {
        self.campaign_id = campaign_id;
        self.ad_set_id = ad_set_id;
        self.ad_id = ad_id;
        self
    }

    pub fn with_attribution_model<S: Into<String>>(mut self, model: S) -> Self {
        self.attribution_model = model.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

//--------------------------------------  AttributionRecord  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub id: i64,
    pub tenant_id: TenantId,
    pub order_id: String,
    pub channel: String,
    pub campaign_id: Option<String>,
    pub ad_set_id: Option<String>,
    pub ad_id: Option<String>,
    pub revenue: Money,
    pub cost: Money,
    pub attribution_model: String,
    pub order_date: DateTime<Utc>,
    pub metadata: Json<Value>,
    /// Zero for a freshly inserted row, incremented on every merge or replacement.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    ChannelTotals    ---------------------------------------------------------
/// Ledger totals for one channel over a time window.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ChannelTotals {
    pub channel: String,
    pub revenue: Money,
    pub cost: Money,
    pub orders: i64,
}
