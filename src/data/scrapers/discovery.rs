//! Event and race discovery from the FIS calendar
//!
//! Only the first page of calendar results is read; the calendar's paging
//! is not followed.

use super::parse::race_id_from_link;
use super::{selector, Fetcher};
use crate::{FisError, Result, ScraperConfig};
use reqwest::Url;
use scraper::Html;
use std::collections::HashSet;

/// Race category codes swept for a whole season
pub const CATEGORIES: &[&str] = &[
    "WC", "EC", "FIS", "NC", "NJR", "NJC", "CIT", "UNI", "ENL", "ANC", "FEC", "NAC", "SAC",
    "EQUAL", "JUN", "YOG", "CHI", "OWG", "WSC", "TRA",
];

const EVENT_LINK: &str = "a.pl-xs-0_6.pr-xs-0.g-sm-2.g-xs-3.justify-sm-center.hidden-md-up.bold";
const RACE_LINK: &str = "a.g-lg-2.g-md-3.g-sm-2.g-xs-4.px-md-1.px-lg-1.pl-xs-1.justify-left";

/// Results page of a race
pub fn race_url(base_url: &str, race_id: i64) -> String {
    format!(
        "{}/DB/general/results.html?sectorcode=AL&raceid={}",
        base_url.trim_end_matches('/'),
        race_id
    )
}

pub struct Discovery<'a> {
    fetcher: &'a dyn Fetcher,
    config: &'a ScraperConfig,
}

impl<'a> Discovery<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, config: &'a ScraperConfig) -> Self {
        Discovery { fetcher, config }
    }

    /// Event URLs across every category of a season
    pub fn find_events_by_season(&self, season: i32) -> Result<Vec<String>> {
        let mut events = Vec::new();
        for category in CATEGORIES {
            events.extend(self.find_events_by_category(category, season)?);
        }
        log::info!("Found {} events in season {}", events.len(), season);
        Ok(events)
    }

    /// Event URLs listed on the calendar for one category and season
    pub fn find_events_by_category(&self, category: &str, season: i32) -> Result<Vec<String>> {
        let url = self.calendar_url(category, season)?;
        let html = self.fetcher.get(&url)?;
        let document = Html::parse_document(&html);

        let events: Vec<String> = document
            .select(&selector(EVENT_LINK))
            .filter_map(|link| link.value().attr("href"))
            .map(|href| self.absolute(href))
            .collect();

        log::debug!("{} {}: {} events", category, season, events.len());
        Ok(events)
    }

    /// Race ids listed on an event page, in page order without repeats
    pub fn find_races_by_event(&self, event_url: &str) -> Result<Vec<i64>> {
        let html = self.fetcher.get(event_url)?;
        let document = Html::parse_document(&html);

        let mut seen = HashSet::new();
        let mut races = Vec::new();
        for link in document.select(&selector(RACE_LINK)) {
            let href = link.value().attr("href").unwrap_or_default();
            match race_id_from_link(href) {
                Some(id) if seen.insert(id) => races.push(id),
                Some(_) => {}
                None => log::warn!("Event {}: race link without race id: {:?}", event_url, href),
            }
        }

        Ok(races)
    }

    /// Calendar query for one category and season
    pub fn calendar_url(&self, category: &str, season: i32) -> Result<String> {
        let season = season.to_string();
        let season_month = format!("X-{}", season);
        let params = [
            ("eventselection", ""),
            ("place", ""),
            ("sectorcode", "AL"),
            ("seasoncode", season.as_str()),
            ("categorycode", category),
            ("disciplinecode", ""),
            ("gendercode", ""),
            ("racedate", ""),
            ("racecodex", ""),
            ("nationcode", ""),
            ("seasonmonth", season_month.as_str()),
            ("saveselection", "-1"),
            ("seasonselection", ""),
        ];
        let url = Url::parse_with_params(&self.config.calendar_url, &params)
            .map_err(|e| FisError::Config(format!("Bad calendar URL: {}", e)))?;
        Ok(url.to_string())
    }

    pub fn race_url(&self, race_id: i64) -> String {
        race_url(&self.config.base_url, race_id)
    }

    fn absolute(&self, href: &str) -> String {
        if href.starts_with('/') {
            format!("{}{}", self.config.base_url.trim_end_matches('/'), href)
        } else {
            href.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::MapFetcher;
    use super::*;

    const EVENT: &str = "https://www.fis-ski.com/DB/general/event-details.html?sectorcode=AL&eventid=56543&seasoncode=2025";

    fn calendar_page(event_ids: &[u32]) -> String {
        let links: String = event_ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div class="g-row"><a class="pl-xs-0_6 pr-xs-0 g-sm-2 g-xs-3 justify-sm-center hidden-md-up bold"
                        href="/DB/general/event-details.html?sectorcode=AL&amp;eventid={}&amp;seasoncode=2025">Details</a>
                        <a class="g-sm-2 hidden-xs" href="/DB/other.html">Other</a></div>"#,
                    id
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", links)
    }

    fn event_page() -> String {
        let link = |href: &str| {
            format!(
                r#"<a class="g-lg-2 g-md-3 g-sm-2 g-xs-4 px-md-1 px-lg-1 pl-xs-1 justify-left" href="{}">20 Mar</a>"#,
                href
            )
        };
        format!(
            "<html><body>{}{}{}{}</body></html>",
            link("https://www.fis-ski.com/DB/general/results.html?sectorcode=AL&amp;raceid=124886"),
            link("https://www.fis-ski.com/DB/general/results.html?sectorcode=AL&amp;raceid=124887"),
            link("https://www.fis-ski.com/DB/general/results.html?sectorcode=AL&amp;raceid=124886"),
            link("https://www.fis-ski.com/DB/general/event-details.html"),
        )
    }

    #[test]
    fn test_calendar_url_params() {
        let config = ScraperConfig::default();
        let fetcher = MapFetcher::new();
        let url = Discovery::new(&fetcher, &config).calendar_url("NAC", 2025).unwrap();

        assert!(url.starts_with("https://www.fis-ski.com/DB/alpine-skiing/calendar-results.html?"));
        assert!(url.contains("sectorcode=AL"));
        assert!(url.contains("seasoncode=2025"));
        assert!(url.contains("categorycode=NAC"));
        assert!(url.contains("seasonmonth=X-2025"));
        assert!(url.contains("saveselection=-1"));
    }

    #[test]
    fn test_find_events_by_category() {
        let config = ScraperConfig::default();
        let url = {
            let probe = MapFetcher::new();
            Discovery::new(&probe, &config).calendar_url("NAC", 2025).unwrap()
        };
        let fetcher = MapFetcher::new().with_page(&url, calendar_page(&[56543, 56544]));
        let discovery = Discovery::new(&fetcher, &config);

        let events = discovery.find_events_by_category("NAC", 2025).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], EVENT);
    }

    #[test]
    fn test_find_events_by_season_covers_every_category() {
        let config = ScraperConfig::default();
        let probe = MapFetcher::new();
        let probe_discovery = Discovery::new(&probe, &config);
        let mut fetcher = MapFetcher::new();
        for category in CATEGORIES {
            let ids: &[u32] = if *category == "NAC" { &[56543] } else { &[] };
            fetcher = fetcher.with_page(
                &probe_discovery.calendar_url(category, 2025).unwrap(),
                calendar_page(ids),
            );
        }

        let events = Discovery::new(&fetcher, &config).find_events_by_season(2025).unwrap();
        assert_eq!(events, vec![EVENT.to_string()]);
        assert_eq!(fetcher.requests.borrow().len(), CATEGORIES.len());
    }

    #[test]
    fn test_find_races_by_event() {
        let config = ScraperConfig::default();
        let fetcher = MapFetcher::new().with_page(EVENT, event_page());
        let races = Discovery::new(&fetcher, &config).find_races_by_event(EVENT).unwrap();
        assert_eq!(races, vec![124886, 124887]);
    }

    #[test]
    fn test_transport_error_propagates() {
        let config = ScraperConfig::default();
        let fetcher = MapFetcher::new();
        let err = Discovery::new(&fetcher, &config).find_races_by_event(EVENT).unwrap_err();
        assert!(matches!(err, FisError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn test_race_url() {
        assert_eq!(
            race_url("https://www.fis-ski.com/", 124886),
            "https://www.fis-ski.com/DB/general/results.html?sectorcode=AL&raceid=124886"
        );
    }
}
