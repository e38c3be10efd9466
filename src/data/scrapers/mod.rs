//! Web scrapers for the FIS results site

pub mod discovery;
pub mod parse;
pub mod points_list;
pub mod race_page;

use crate::{FisError, Result, ScraperConfig};
use scraper::{ElementRef, Selector};

/// Source of page text for a URL
pub trait Fetcher {
    /// Fetch the document at `url`; transport failures and non-2xx statuses are errors
    fn get(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP fetcher; no caching, no retry
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<String> {
        log::debug!("Fetching {}", url);

        let response = self.client.get(url).send()?;

        if !response.status().is_success() {
            return Err(FisError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text()?)
    }
}

/// Parse a selector known at compile time
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {:?}: {:?}", css, e))
}

/// Element text with runs of whitespace collapsed
pub(crate) fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// True if the element's class list contains every class in `classes`
pub(crate) fn has_classes(element: &ElementRef, classes: &[&str]) -> bool {
    let value = element.value();
    classes
        .iter()
        .all(|class| value.classes().any(|c| c == *class))
}
