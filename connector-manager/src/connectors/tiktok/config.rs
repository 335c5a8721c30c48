pub const BASE_URL: &str = "https://business-api.tiktok.com";
pub const REPORT_PATH: &str = "/open_api/v1.3/report/integrated/get/";
pub const PAGE_SIZE: u32 = 1000;

/// Dataset used for default destination tables.
pub const DEFAULT_DATASET: &str = "RAW";

/// Business API `code` values. Zero is success.
pub const RATE_LIMIT_CODE: i64 = 40100;
pub const AUTH_CODES: &[i64] = &[40102, 40104, 40105];

/// A supported report level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLevel {
    pub name: &'static str,
    pub data_level: &'static str,
    pub id_dimension: &'static str,
    pub table: &'static str,
}

pub const REPORT_LEVELS: &[ReportLevel] = &[
    ReportLevel {
        name: "advertiser",
        data_level: "AUCTION_ADVERTISER",
        id_dimension: "advertiser_id",
        table: "TKT001_TIKTOK_ADS_ADVERTISER",
    },
    ReportLevel {
        name: "campaign",
        data_level: "AUCTION_CAMPAIGN",
        id_dimension: "campaign_id",
        table: "TKT002_TIKTOK_ADS_CAMPAIGN",
    },
    ReportLevel {
        name: "adgroup",
        data_level: "AUCTION_ADGROUP",
        id_dimension: "adgroup_id",
        table: "TKT003_TIKTOK_ADS_ADGROUP",
    },
    ReportLevel {
        name: "ad",
        data_level: "AUCTION_AD",
        id_dimension: "ad_id",
        table: "TKT004_TIKTOK_ADS_AD",
    },
];

pub fn report_level(name: &str) -> Option<&'static ReportLevel> {
    REPORT_LEVELS.iter().find(|l| l.name == name)
}

pub const DATE_DIMENSION: &str = "stat_time_day";

pub const METRICS: &[&str] = &[
    "spend",
    "impressions",
    "clicks",
    "ctr",
    "cpc",
    "cpm",
    "reach",
    "frequency",
    "profile_visits",
    "likes",
    "comments",
    "shares",
    "follows",
    "video_play_actions",
    "video_watched_2s",
    "video_watched_6s",
    "video_views_p25",
    "video_views_p50",
    "video_views_p75",
    "video_views_p100",
    "conversion",
    "cost_per_conversion",
    "conversion_rate",
    "result",
    "cost_per_result",
];
