//! Connector registry - the vendors this service can run.

use crate::connectors::bing_ads::BingAdsConnector;
use crate::connectors::dv360::Dv360Connector;
use crate::connectors::google_ads::GoogleAdsConnector;
use crate::connectors::meta::MetaConnector;
use crate::connectors::tiktok::TikTokConnector;
use crate::Connector;
use reqwest::Client;
use std::sync::Arc;

/// Returns all available connectors, sharing one HTTP client.
pub fn get_all_connectors(http_client: &Client) -> Vec<Arc<dyn Connector>> {
    vec![
        Arc::new(MetaConnector::new(http_client.clone())),
        Arc::new(GoogleAdsConnector::new(http_client.clone())),
        Arc::new(BingAdsConnector::new(http_client.clone())),
        Arc::new(Dv360Connector::new(http_client.clone())),
        Arc::new(TikTokConnector::new(http_client.clone())),
    ]
}

/// Looks a connector up by its route name.
pub fn find(connectors: &[Arc<dyn Connector>], name: &str) -> Option<Arc<dyn Connector>> {
    connectors.iter().find(|c| c.name() == name).cloned()
}
