pub const CHANNEL_FACEBOOK: &str = "facebook";
pub const CHANNEL_GOOGLE: &str = "google";
pub const CHANNEL_INSTAGRAM: &str = "instagram";
pub const CHANNEL_TIKTOK: &str = "tiktok";
pub const CHANNEL_ORGANIC: &str = "organic";

/// Substring rules, checked in order. The first rule with a matching token wins.
const CHANNEL_RULES: [(&[&str], &str); 4] = [
    (&["facebook", "fb"], CHANNEL_FACEBOOK),
    (&["google"], CHANNEL_GOOGLE),
    (&["instagram"], CHANNEL_INSTAGRAM),
    (&["tiktok"], CHANNEL_TIKTOK),
];

/// Infers the marketing channel for a storefront order from its source name.
///
/// This is a heuristic, not a classifier: any source name that merely *contains* one of the tokens matches, so e.g.
/// `"fbx-wholesale"` is attributed to facebook. Missing or unmatched source names are `organic`.
pub fn infer_channel(source_name: Option<&str>) -> &'static str {
    let source = match source_name {
        Some(s) => s.to_lowercase(),
        None => return CHANNEL_ORGANIC,
    };
    CHANNEL_RULES
        .iter()
        .find(|(tokens, _)| tokens.iter().any(|t| source.contains(t)))
        .map(|(_, channel)| *channel)
        .unwrap_or(CHANNEL_ORGANIC)
}
