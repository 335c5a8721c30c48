pub const BASE_URL: &str = "https://googleads.googleapis.com";
pub const API_VERSION: &str = "v20";

/// Query used when the job gives none. The date clause is appended per
/// window.
pub const DEFAULT_QUERY: &str = "SELECT \
segments.date, \
customer.id, \
customer.descriptive_name, \
campaign.id, \
campaign.name, \
campaign.status, \
campaign.advertising_channel_type, \
ad_group.id, \
ad_group.name, \
metrics.impressions, \
metrics.clicks, \
metrics.cost_micros, \
metrics.conversions, \
metrics.conversions_value, \
metrics.video_views, \
metrics.engagements \
FROM ad_group";

pub const DEVELOPER_TOKEN_HEADER: &str = "developer-token";
pub const LOGIN_CUSTOMER_HEADER: &str = "login-customer-id";
