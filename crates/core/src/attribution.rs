//! First-touch attribution: campaign parameters and referrer classification.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

const SEARCH_HOST_PATTERN: &str = concat!(
    r"(^|\.)(google|bing|yahoo|duckduckgo|baidu|yandex|ecosia|startpage|qwant|ask|naver)\.[a-z.]+$",
    r"|(^|\.)search\.brave\.com$",
);

const SOCIAL_HOST_PATTERN: &str = concat!(
    r"(^|\.)(facebook\.com|fb\.me|instagram\.com|twitter\.com|x\.com|t\.co|linkedin\.com|lnkd\.in",
    r"|reddit\.com|pinterest\.[a-z.]+|tiktok\.com|youtube\.com|youtu\.be|threads\.net",
    r"|mastodon\.social|news\.ycombinator\.com)$",
);

static SEARCH_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SEARCH_HOST_PATTERN).expect("invalid search host pattern"));

static SOCIAL_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SOCIAL_HOST_PATTERN).expect("invalid social host pattern"));

/// Where a visit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferrerType {
    Direct,
    Search,
    Social,
    Referral,
}

impl ReferrerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Search => "search",
            Self::Social => "social",
            Self::Referral => "referral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "search" => Some(Self::Search),
            "social" => Some(Self::Social),
            "referral" => Some(Self::Referral),
            _ => None,
        }
    }

    /// Class forced by an explicit campaign medium, if any.
    fn from_medium(medium: &str) -> Option<Self> {
        match medium.trim().to_ascii_lowercase().as_str() {
            "cpc" | "ppc" | "paid" | "paidsearch" | "organic" | "search" => Some(Self::Search),
            "social" | "social-network" | "social-media" | "sm" | "paid-social" => {
                Some(Self::Social)
            }
            _ => None,
        }
    }
}

/// utm_* campaign parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub term: Option<String>,
    pub content: Option<String>,
}

impl CampaignParams {
    /// Reads `utm_*` query parameters from a page URL.
    pub fn from_url(url: &str) -> Self {
        let mut params = Self::default();
        let Ok(parsed) = Url::parse(url) else {
            return params;
        };
        for (key, value) in parsed.query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "utm_source" => &mut params.source,
                "utm_medium" => &mut params.medium,
                "utm_campaign" => &mut params.campaign,
                "utm_term" => &mut params.term,
                "utm_content" => &mut params.content,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        params
    }

    /// Fills every missing parameter from `fallback`.
    pub fn or(self, fallback: CampaignParams) -> Self {
        Self {
            source: self.source.or(fallback.source),
            medium: self.medium.or(fallback.medium),
            campaign: self.campaign.or(fallback.campaign),
            term: self.term.or(fallback.term),
            content: self.content.or(fallback.content),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.medium.is_none()
            && self.campaign.is_none()
            && self.term.is_none()
            && self.content.is_none()
    }
}

/// Classifies the referrer of a page view.
///
/// An explicit campaign medium wins over the referrer host. A referrer on the
/// same host as the page is internal navigation and counts as direct.
pub fn classify_referrer(
    referrer: Option<&str>,
    page_url: &str,
    medium: Option<&str>,
) -> ReferrerType {
    if let Some(class) = medium.and_then(ReferrerType::from_medium) {
        return class;
    }

    let Some(referrer_host) = referrer.and_then(host_of) else {
        return ReferrerType::Direct;
    };

    if host_of(page_url).is_some_and(|page_host| page_host == referrer_host) {
        return ReferrerType::Direct;
    }

    if SEARCH_HOST.is_match(&referrer_host) {
        ReferrerType::Search
    } else if SOCIAL_HOST.is_match(&referrer_host) {
        ReferrerType::Social
    } else {
        ReferrerType::Referral
    }
}

/// Lower-cased host without a leading `www.`.
fn host_of(url: &str) -> Option<String> {
    let host = Url::parse(url.trim()).ok()?.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Path component of a URL, `/` when the URL cannot be parsed.
pub fn extract_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| u.path().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_string())
}
