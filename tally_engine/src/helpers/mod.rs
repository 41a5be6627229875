mod channel;
mod metric_date;

pub use channel::{infer_channel, CHANNEL_FACEBOOK, CHANNEL_GOOGLE, CHANNEL_INSTAGRAM, CHANNEL_ORGANIC, CHANNEL_TIKTOK};
pub use metric_date::{parse_metric_date, parse_timestamp, MetricDateError};
