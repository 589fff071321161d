//! Explicit runtime environment passed into normalization.

use crate::{Campaign, Page, Referrer};
use url::Url;

/// Query parameters that mark a referral, with the referrer type they imply.
pub const REFERRER_MARKERS: &[(&str, &str)] = &[("urid", "millennial-media")];

/// The page and agent a call originates from.
///
/// When `url` is `None`, campaign and referrer extraction yield nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeEnvironment {
    pub url: Option<Url>,
    pub user_agent: Option<String>,
    /// Current host, used as the local source for cross-domain ids.
    pub hostname: String,
}

impl RuntimeEnvironment {
    /// Environment for a page URL; the hostname is taken from the URL.
    pub fn for_url(url: Url) -> Self {
        let hostname = url.host_str().unwrap_or_default().to_string();
        Self {
            url: Some(url),
            user_agent: None,
            hostname,
        }
    }

    /// Parse `raw` as the page URL.
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Url::parse(raw).map(Self::for_url)
    }

    /// Environment with only a hostname and no URL.
    pub fn for_hostname(hostname: impl Into<String>) -> Self {
        Self {
            url: None,
            user_agent: None,
            hostname: hostname.into(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Page scheme without the trailing colon, if a URL is known.
    pub fn scheme(&self) -> Option<&str> {
        self.url.as_ref().map(|url| url.scheme())
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.url.as_ref().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        })
    }

    /// UTM campaign fields from the query string, `None` if there are none.
    pub fn campaign(&self) -> Option<Campaign> {
        let campaign = Campaign {
            name: self.query_param("utm_campaign"),
            source: self.query_param("utm_source"),
            medium: self.query_param("utm_medium"),
            term: self.query_param("utm_term"),
            content: self.query_param("utm_content"),
            ..Campaign::default()
        };
        (!campaign.is_empty()).then_some(campaign)
    }

    /// Referral record carried by the URL, if any marker is present.
    pub fn referrer(&self) -> Option<Referrer> {
        REFERRER_MARKERS.iter().find_map(|(param, kind)| {
            self.query_param(param)
                .filter(|id| !id.is_empty())
                .map(|id| Referrer {
                    id,
                    kind: (*kind).to_string(),
                })
        })
    }

    /// Path and query details of the page.
    pub fn page(&self) -> Option<Page> {
        self.url.as_ref().map(|url| Page {
            path: Some(url.path().to_string()),
            search: url.query().map(|q| format!("?{q}")),
            url: Some(url.to_string()),
            ..Page::default()
        })
    }
}
