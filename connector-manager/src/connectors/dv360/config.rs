pub const BASE_URL: &str = "https://doubleclickbidmanager.googleapis.com";
pub const API_VERSION: &str = "v2";

pub const DEFAULT_GROUP_BYS: &[&str] = &[
    "FILTER_DATE",
    "FILTER_ADVERTISER",
    "FILTER_ADVERTISER_NAME",
    "FILTER_INSERTION_ORDER",
    "FILTER_INSERTION_ORDER_NAME",
    "FILTER_LINE_ITEM",
    "FILTER_LINE_ITEM_NAME",
    "FILTER_CREATIVE",
    "FILTER_CREATIVE_NAME",
];

pub const DEFAULT_METRICS: &[&str] = &[
    "METRIC_IMPRESSIONS",
    "METRIC_CLICKS",
    "METRIC_TOTAL_MEDIA_COST_USD_MICROS",
    "METRIC_TOTAL_CONVERSIONS",
    "METRIC_POST_VIEW_CONVERSIONS",
    "METRIC_POST_CLICK_CONVERSIONS",
    "METRIC_REVENUE_USD_MICROS",
    "METRIC_VIDEO_VIEWS",
    "METRIC_VIDEO_COMPLETIONS",
];

/// Report states from `queries.reports.get`.
pub const STATE_DONE: &str = "DONE";
pub const STATE_FAILED: &str = "FAILED";
