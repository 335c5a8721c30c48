pub const BASE_URL: &str = "https://reporting.api.bingads.microsoft.com";
pub const SUBMIT_PATH: &str = "/Reporting/v13/GenerateReport/Submit";
pub const POLL_PATH: &str = "/Reporting/v13/GenerateReport/Poll";

pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
pub const SCOPE: &str = "https://ads.microsoft.com/msads.manage offline_access";

pub const AGGREGATION: &str = "Daily";

pub const CAMPAIGN_REPORT: &str = "CampaignPerformanceReport";
pub const AD_REPORT: &str = "AdPerformanceReport";

pub const CAMPAIGN_COLUMNS: &[&str] = &[
    "AccountId",
    "AccountName",
    "CampaignId",
    "CampaignName",
    "CampaignStatus",
    "TimePeriod",
    "Impressions",
    "Clicks",
    "Spend",
    "Conversions",
    "Revenue",
    "CostPerConversion",
    "AverageCpc",
    "Ctr",
];

pub const AD_COLUMNS: &[&str] = &[
    "AccountId",
    "AccountName",
    "CampaignId",
    "CampaignName",
    "AdGroupId",
    "AdGroupName",
    "AdId",
    "AdTitle",
    "TimePeriod",
    "Impressions",
    "Clicks",
    "Spend",
    "Conversions",
    "Revenue",
];

/// Default columns for a supported report type.
pub fn default_columns(report_type: &str) -> Option<&'static [&'static str]> {
    match report_type {
        CAMPAIGN_REPORT => Some(CAMPAIGN_COLUMNS),
        AD_REPORT => Some(AD_COLUMNS),
        _ => None,
    }
}

/// Error codes that mean the token or account access is bad.
pub const AUTH_ERROR_CODES: &[&str] = &[
    "AuthenticationTokenExpired",
    "InvalidCredentials",
    "UserIsNotAuthorized",
    "CustomerIdHeaderMissing",
];
pub const RATE_LIMIT_ERROR_CODE: &str = "CallRateExceeded";
