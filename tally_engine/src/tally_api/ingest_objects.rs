//! Normalized records produced by the platform adapters.
//!
//! Adapters deliver amounts either as JSON numbers or as decimal strings (`"150.00"`), so every amount field accepts
//! both.
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::{
    db_types::{counter_names, ConflictPolicy, Counters, Money, NewAttribution, TenantId},
    helpers::{infer_channel, parse_metric_date, parse_timestamp},
    tally_api::errors::IngestError,
};

/// Source tag for storefront revenue aggregates.
pub const STOREFRONT_SOURCE: &str = "shopify";
/// Ad actions that count as a purchase, in order of preference.
pub const PURCHASE_ACTION_TYPES: [&str; 2] = ["purchase", "offsite_conversion.fb_pixel_purchase"];

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Text(String),
}

fn flexible_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match NumberOrString::deserialize(d)? {
        #[allow(clippy::cast_precision_loss)]
        NumberOrString::Int(n) => Ok(n as f64),
        NumberOrString::Float(n) => Ok(n),
        NumberOrString::Text(s) if s.trim().is_empty() => Ok(0.0),
        NumberOrString::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

fn flexible_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Int(n) => Ok(n.to_string()),
        NumberOrString::Float(n) => Ok(n.to_string()),
        NumberOrString::Text(s) => Ok(s),
    }
}

fn to_money(record: &str, field: &str, value: f64) -> Result<Money, IngestError> {
    Money::from_major(value).map_err(|e| IngestError::invalid(record, format!("{field}: {e}")))
}

//--------------------------------------   StorefrontOrder   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorefrontOrder {
    #[serde(alias = "id", deserialize_with = "flexible_string")]
    pub order_id: String,
    #[serde(deserialize_with = "flexible_f64")]
    pub total_price: f64,
    pub created_at: String,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub referring_site: Option<String>,
    #[serde(default)]
    pub landing_site: Option<String>,
}

impl StorefrontOrder {
    fn label(&self) -> String {
        format!("order {}", self.order_id)
    }

    pub fn order_day(&self) -> Result<NaiveDate, IngestError> {
        parse_metric_date(&self.created_at).map_err(|e| IngestError::invalid(self.label(), e.to_string()))
    }

    /// `{revenue: total_price, orders: 1}`
    pub fn revenue_delta(&self) -> Result<Counters, IngestError> {
        if !self.total_price.is_finite() {
            return Err(IngestError::invalid(self.label(), "total_price is not a finite number"));
        }
        Ok(Counters::new().with(counter_names::REVENUE, self.total_price).with(counter_names::ORDERS, 1.0))
    }

    /// Orders that carry a source name or referring site get a ledger row. The channel comes from the source name.
    pub fn has_attribution(&self) -> bool {
        self.source_name.is_some() || self.referring_site.is_some()
    }

    pub fn attribution(&self, tenant: &TenantId) -> Result<NewAttribution, IngestError> {
        let order_date =
            parse_timestamp(&self.created_at).map_err(|e| IngestError::invalid(self.label(), e.to_string()))?;
        let revenue = to_money(&self.label(), "total_price", self.total_price)?;
        let channel = infer_channel(self.source_name.as_deref());
        let metadata = json!({
            "source_name": self.source_name,
            "referring_site": self.referring_site,
            "landing_site": self.landing_site,
        });
        Ok(NewAttribution::new(tenant.clone(), self.order_id.as_str(), channel, order_date)
            .with_revenue(revenue)
            .with_metadata(metadata))
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::IgnoreIfExists
    }
}

//--------------------------------------      AdInsight      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdAction {
    pub action_type: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub value: f64,
}

/// One day of performance for a single ad, as reported by an ad platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdInsight {
    pub platform: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub campaign_name: Option<String>,
    #[serde(default)]
    pub adset_id: Option<String>,
    #[serde(default)]
    pub adset_name: Option<String>,
    #[serde(deserialize_with = "flexible_string")]
    pub ad_id: String,
    #[serde(default)]
    pub ad_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub spend: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub impressions: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub clicks: f64,
    #[serde(default)]
    pub actions: Vec<AdAction>,
    #[serde(alias = "date_start")]
    pub date: String,
}

impl AdInsight {
    fn label(&self) -> String {
        format!("{} ad {}", self.platform, self.ad_id)
    }

    pub fn channel(&self) -> String {
        self.platform.trim().to_lowercase()
    }

    pub fn day(&self) -> Result<NaiveDate, IngestError> {
        parse_metric_date(&self.date).map_err(|e| IngestError::invalid(self.label(), e.to_string()))
    }

    /// The first action whose type counts as a purchase.
    pub fn purchase_action(&self) -> Option<&AdAction> {
        self.actions.iter().find(|a| PURCHASE_ACTION_TYPES.contains(&a.action_type.as_str()))
    }

    pub fn conversions(&self) -> f64 {
        self.purchase_action().map(|a| a.value).unwrap_or_default()
    }

    pub fn revenue(&self) -> f64 {
        self.purchase_action().map(|a| a.value).unwrap_or_default()
    }

    /// One ledger row per ad per day: `{platform}_{ad_id}_{date}`.
    pub fn attribution_key(&self) -> Result<String, IngestError> {
        Ok(format!("{}_{}_{}", self.channel(), self.ad_id, self.day()?))
    }

    /// `{spend, revenue, conversions}`
    pub fn spend_delta(&self) -> Result<Counters, IngestError> {
        let delta = Counters::new()
            .with(counter_names::SPEND, self.spend)
            .with(counter_names::REVENUE, self.revenue())
            .with(counter_names::CONVERSIONS, self.conversions());
        if delta.iter().any(|(_, v)| !v.is_finite()) {
            return Err(IngestError::invalid(self.label(), "spend and action values must be finite"));
        }
        Ok(delta)
    }

    pub fn attribution(&self, tenant: &TenantId) -> Result<NewAttribution, IngestError> {
        let day = self.day()?;
        let order_date = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        let revenue = to_money(&self.label(), "revenue", self.revenue())?;
        let cost = to_money(&self.label(), "spend", self.spend)?;
        let metadata = json!({
            "campaign_name": self.campaign_name,
            "adset_name": self.adset_name,
            "ad_name": self.ad_name,
            "impressions": self.impressions,
            "clicks": self.clicks,
            "conversions": self.conversions(),
        });
        Ok(NewAttribution::new(tenant.clone(), self.attribution_key()?, self.channel(), order_date)
            .with_campaign(self.campaign_id.clone(), self.adset_id.clone(), Some(self.ad_id.clone()))
            .with_revenue(revenue)
            .with_cost(cost)
            .with_metadata(strip_nulls(metadata)))
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::MergeNumeric
    }
}

// Merged metadata is combined with json_patch, where a null removes an existing key.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        v => v,
    }
}

//--------------------------------------     EmailMetrics    ---------------------------------------------------------
/// A day of email campaign counters (sends, opens, clicks, ...) from an email platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMetrics {
    pub source: String,
    pub date: String,
    pub counters: Counters,
}

//--------------------------------------      SyncReport     ---------------------------------------------------------
/// The outcome of a batch ingestion. Records that fail are logged and counted but do not stop the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub processed: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.processed + self.failed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn storefront_orders_accept_shopify_payloads() {
        let order: StorefrontOrder = serde_json::from_value(json!({
            "id": 5512345678901_i64,
            "total_price": "150.00",
            "created_at": "2024-03-01T10:15:00-05:00",
            "source_name": "Facebook Ads",
            "referring_site": "https://l.facebook.com/"
        }))
        .unwrap();
        assert_eq!(order.order_id, "5512345678901");
        assert_eq!(order.total_price, 150.0);
        assert_eq!(order.order_day().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let delta = order.revenue_delta().unwrap();
        assert_eq!(delta.get("revenue"), 150.0);
        assert_eq!(delta.get("orders"), 1.0);
        assert!(order.has_attribution());
        let attr = order.attribution(&TenantId::from("t1")).unwrap();
        assert_eq!(attr.channel, "facebook");
        assert_eq!(attr.revenue, Money::from(15000));
        assert_eq!(attr.cost, Money::from(0));
        assert_eq!(attr.metadata["landing_site"], Value::Null);
    }

    #[test]
    fn orders_without_source_are_not_attributed() {
        let order: StorefrontOrder = serde_json::from_value(json!({
            "order_id": "A-1", "total_price": 12.5, "created_at": "2024-03-01"
        }))
        .unwrap();
        assert!(!order.has_attribution());
        let order = StorefrontOrder { referring_site: Some("https://google.com".into()), ..order };
        assert!(order.has_attribution());
        // Only the source name drives the channel.
        assert_eq!(order.attribution(&TenantId::from("t1")).unwrap().channel, "organic");
    }

    #[test]
    fn insight_purchase_actions() {
        let insight: AdInsight = serde_json::from_value(json!({
            "platform": "Facebook",
            "campaign_id": "c1",
            "ad_id": "987",
            "spend": "30.00",
            "impressions": "1200",
            "clicks": "31",
            "actions": [
                {"action_type": "link_click", "value": "31"},
                {"action_type": "offsite_conversion.fb_pixel_purchase", "value": "2"},
                {"action_type": "purchase", "value": "3"}
            ],
            "date_start": "2024-03-01"
        }))
        .unwrap();
        assert_eq!(insight.conversions(), 2.0);
        assert_eq!(insight.attribution_key().unwrap(), "facebook_987_2024-03-01");
        let delta = insight.spend_delta().unwrap();
        assert_eq!(delta.get("spend"), 30.0);
        assert_eq!(delta.get("conversions"), 2.0);
        let attr = insight.attribution(&TenantId::from("t1")).unwrap();
        assert_eq!(attr.cost, Money::from(3000));
        assert_eq!(attr.ad_id.as_deref(), Some("987"));
        assert_eq!(attr.ad_set_id, None);
        assert!(attr.metadata.get("campaign_name").is_none());
        assert_eq!(insight.conflict_policy(), ConflictPolicy::MergeNumeric);
    }

    #[test]
    fn insight_without_actions() {
        let insight: AdInsight = serde_json::from_value(json!({
            "platform": "tiktok", "ad_id": 42, "spend": 9.99, "date": "2024-03-02"
        }))
        .unwrap();
        assert_eq!(insight.conversions(), 0.0);
        assert_eq!(insight.revenue(), 0.0);
        assert_eq!(insight.attribution_key().unwrap(), "tiktok_42_2024-03-02");
    }
}
