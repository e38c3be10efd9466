//! FIS points list catalog and CSV loader

use super::{element_text, selector, Fetcher};
use crate::data::database::{DisciplinePoints, NewAthlete};
use crate::data::points::{PointsListDescriptor, PointsListSource};
use crate::data::Database;
use crate::{Config, Gender, Result};
use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use std::path::PathBuf;

const EXPORT_LINK: &str = r#"a[title="Export the full list in Excel"]"#;

/// One athlete row of a points list CSV export. Columns not listed here are
/// ignored; AC columns are absent from older seasons.
#[derive(Debug, Deserialize)]
struct PointsListRow {
    #[serde(rename = "Competitorid")]
    competitor_id: i64,
    #[serde(rename = "Fiscode", default)]
    fis_code: Option<i64>,
    #[serde(rename = "Lastname", default)]
    last_name: String,
    #[serde(rename = "Firstname", default)]
    first_name: String,
    #[serde(rename = "Nationcode", default)]
    nation_code: Option<String>,
    #[serde(rename = "Gender", default)]
    gender: Option<String>,
    #[serde(rename = "Birthyear", default)]
    birth_year: Option<i32>,
    #[serde(rename = "SLpoints", default)]
    sl_points: Option<f64>,
    #[serde(rename = "GSpoints", default)]
    gs_points: Option<f64>,
    #[serde(rename = "SGpoints", default)]
    sg_points: Option<f64>,
    #[serde(rename = "DHpoints", default)]
    dh_points: Option<f64>,
    #[serde(rename = "ACpoints", default)]
    ac_points: Option<f64>,
}

impl PointsListRow {
    fn athlete(&self) -> NewAthlete {
        NewAthlete {
            external_id: self.competitor_id,
            fis_code: self.fis_code,
            name: format!("{} {}", self.last_name.trim(), self.first_name.trim())
                .trim()
                .to_string(),
            nation_code: self.nation_code.clone().filter(|n| !n.is_empty()),
            gender: self.gender.as_deref().and_then(Gender::from_code),
            birth_year: self.birth_year,
        }
    }

    fn points(&self) -> DisciplinePoints {
        DisciplinePoints {
            sl: self.sl_points,
            gs: self.gs_points,
            sg: self.sg_points,
            dh: self.dh_points,
            ac: self.ac_points,
        }
    }
}

/// Points lists published on the FIS site
pub struct FisPointsListSource<'a> {
    fetcher: &'a dyn Fetcher,
    config: &'a Config,
}

impl<'a> FisPointsListSource<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, config: &'a Config) -> Self {
        FisPointsListSource { fetcher, config }
    }

    /// CSV export of a list
    pub fn csv_url(&self, descriptor: &PointsListDescriptor) -> String {
        let mut url = format!(
            "{}/fis_athletes/ajax/fispointslistfunctions/export_fispointslist.html?export_csv=true&sectorcode={}&seasoncode={}",
            self.config.scraper.data_url.trim_end_matches('/'),
            descriptor.sector,
            descriptor.season
        );
        if let Some(list_id) = &descriptor.list_id {
            url.push_str(&format!("&listid={}", list_id));
        }
        url
    }

    /// Local copy of a list's CSV, e.g. `FAL_202583.csv`
    pub fn csv_path(&self, descriptor: &PointsListDescriptor) -> PathBuf {
        PathBuf::from(&self.config.data.points_list_dir).join(format!(
            "F{}_{}{}.csv",
            descriptor.sector,
            descriptor.season,
            descriptor.list_id.as_deref().unwrap_or_default()
        ))
    }

    fn download(&self, descriptor: &PointsListDescriptor) -> Result<PathBuf> {
        let path = self.csv_path(descriptor);
        if path.exists() {
            log::info!("Points list already downloaded: {}", path.display());
            return Ok(path);
        }

        log::info!("Downloading points list {:?}", descriptor.name);
        let text = self.fetcher.get(&self.csv_url(descriptor))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text)?;
        Ok(path)
    }
}

impl PointsListSource for FisPointsListSource<'_> {
    fn list_available(&self) -> Result<Vec<PointsListDescriptor>> {
        let html = self.fetcher.get(&self.config.scraper.points_lists_url)?;
        let lists = parse_catalog(&html);
        log::debug!("{} points lists published", lists.len());
        Ok(lists)
    }

    fn ingest(&self, db: &Database, descriptor: &PointsListDescriptor) -> Result<bool> {
        let Some(list_id) = descriptor.list_id.as_deref() else {
            log::warn!("Points list {:?} has no list id", descriptor.name);
            return Ok(false);
        };
        if db.find_points_list(&descriptor.season, list_id)?.is_some() {
            log::info!("Points list {:?} already stored", descriptor.name);
            return Ok(true);
        }

        let path = self.download(descriptor)?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path)?;

        let tx = db.begin()?;
        let list = db.insert_points_list(
            &descriptor.season,
            list_id,
            Some(&descriptor.name),
            descriptor.valid_from,
            descriptor.valid_to,
        )?;

        let mut loaded = 0;
        for (line, record) in reader.deserialize::<PointsListRow>().enumerate() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    log::warn!("{}: skipping row {}: {}", path.display(), line + 1, e);
                    continue;
                }
            };
            let athlete = db.get_or_create_athlete(&row.athlete())?;
            db.upsert_points_list_entry(list, athlete, &row.points())?;
            loaded += 1;
        }
        tx.commit()?;

        log::info!("Loaded {} athletes from {:?}", loaded, descriptor.name);
        Ok(true)
    }
}

/// Dated lists from the points list page; base lists carry no validity
/// window and are left out
pub fn parse_catalog(html: &str) -> Vec<PointsListDescriptor> {
    let document = Html::parse_document(html);
    let link_re = Regex::new(r"fct_export_fispointslist_xlsx\('(\w\w)','(\d\d\d\d)','(\d*)'\)").unwrap();
    let title_re = Regex::new(
        r"(?is)(\d.+ FIS points list \d\d\d\d.\d\d).+(\d\d-\d\d-\d\d\d\d).+(\d\d-\d\d-\d\d\d\d)",
    )
    .unwrap();
    let link_sel = selector(EXPORT_LINK);

    let mut lists = Vec::new();
    for row in document.select(&selector("div.container.g-xs-24")) {
        let Some(onclick) = row
            .select(&link_sel)
            .next()
            .and_then(|link| link.value().attr("onclick"))
        else {
            continue;
        };
        let Some(params) = link_re.captures(onclick) else {
            log::warn!("Unrecognized points list export link {:?}", onclick);
            continue;
        };

        let text = element_text(&row);
        let Some(title) = title_re.captures(&text) else {
            log::debug!("Skipping undated points list {:?}", text);
            continue;
        };
        let (Some(valid_from), Some(valid_to)) = (parse_date(&title[2]), parse_date(&title[3]))
        else {
            log::warn!("Bad validity dates in points list {:?}", text);
            continue;
        };

        lists.push(PointsListDescriptor {
            sector: params[1].to_string(),
            season: params[2].to_string(),
            list_id: Some(params[3].to_string()).filter(|id| !id.is_empty()),
            name: title[1].to_string(),
            valid_from,
            valid_to,
        });
    }
    lists
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%d-%m-%Y").ok()
}
