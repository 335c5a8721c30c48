pub const BASE_URL: &str = "https://graph.facebook.com";
pub const API_VERSION: &str = "v24.0";

/// Insights fields requested when the job gives no `fields_list`.
pub const DEFAULT_FIELDS: &[&str] = &[
    "account_id",
    "account_name",
    "campaign_id",
    "campaign_name",
    "adset_id",
    "adset_name",
    "ad_id",
    "ad_name",
    "date_start",
    "date_stop",
    "impressions",
    "reach",
    "frequency",
    "clicks",
    "spend",
    "cpc",
    "cpm",
    "ctr",
    "video_play_actions",
    "video_thruplay_watched_actions",
    "video_p25_watched_actions",
    "video_p100_watched_actions",
];

/// Metrics Meta returns as `[{"action_type": ..., "value": ...}]`.
pub const UNWRAP_FIELDS: &[&str] = &[
    "video_play_actions",
    "video_thruplay_watched_actions",
    "video_p100_watched_actions",
    "video_p25_watched_actions",
];

pub const LEVEL: &str = "ad";
pub const BREAKDOWNS: &str = "publisher_platform";
pub const PAGE_LIMIT: u32 = 500;
pub const LOOKBACK_DAYS: u32 = 7;

/// Graph API error codes.
pub const INVALID_TOKEN_CODE: i64 = 190;
pub const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];
