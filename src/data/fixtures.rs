//! Synthetic race pages mirroring the FIS results markup

use super::database::{DisciplinePoints, NewAthlete};
use super::Database;
use crate::{AthleteId, PointsList};
use chrono::NaiveDate;
use std::fmt::Write;

/// First external athlete id used for finisher rows
pub const FINISHER_ID_BASE: i64 = 100_000;
/// First external athlete id used for non-finisher rows
pub const NON_FINISHER_ID_BASE: i64 = 200_000;

pub struct PageLayout {
    pub kind: &'static str,
    pub category: &'static str,
    pub location: &'static str,
    pub date: &'static str,
    pub codex: u32,
    pub finishers: usize,
    /// (heading, row count) per non-finisher table
    pub non_finishers: Vec<(&'static str, usize)>,
    pub has_results: bool,
}

impl PageLayout {
    pub fn slalom(finishers: usize, non_finishers: &[(&'static str, usize)]) -> Self {
        PageLayout {
            kind: "Men's Slalom",
            category: "Nor-Am Cup",
            location: "Sugarloaf (USA)",
            date: "2025-03-20",
            codex: 1970,
            finishers,
            non_finishers: non_finishers.to_vec(),
            has_results: true,
        }
    }

    /// 45 finishers and 52 non-finishers, one of them DNS1
    pub fn large_slalom() -> Self {
        Self::slalom(
            45,
            &[
                ("Did Not Start 1st Run", 1),
                ("Did Not Finish 1st Run", 30),
                ("Did Not Finish 2nd Run", 15),
                ("Disqualified 2nd Run", 6),
            ],
        )
    }

    pub fn future() -> Self {
        PageLayout {
            kind: "Women's Giant Slalom",
            category: "FIS",
            location: "El Colorado (CHI)",
            date: "2025-08-20",
            codex: 154,
            finishers: 0,
            non_finishers: Vec::new(),
            has_results: false,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.finishers + self.non_finishers.iter().map(|(_, n)| n).sum::<usize>()
    }
}

fn format_time(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    format!("{}:{:05.2}", minutes as u32, seconds - minutes * 60.0)
}

fn row(athlete_id: i64, first_field: &str, times: [&str; 3], points_slot: &str) -> String {
    format!(
        r#"
        <a class="table-row" href="https://www.fis-ski.com/DB/general/athlete-biography.html?sectorcode=al&amp;competitorid={athlete_id}" target="_self">
          <div class="g-row container">
            <div class="g-row justify-sb">
              <div class="g-lg-1 g-md-1 g-sm-1 g-xs-2 justify-right pr-1 bold">{first_field}</div>
              <div class="pr-1 g-lg-2 g-md-2 g-sm-2 hidden-xs justify-right gray">{athlete_id}</div>
              <div class="g-lg-6 g-md-6 g-sm-5 g-xs-8 justify-left bold">ATHLETE Number{index}</div>
              <div class="g-lg-1 g-md-1 hidden-sm-down justify-left">1999</div>
              <div class="g-lg-1 g-md-1 g-sm-2 g-xs-3 justify-left">
                <div class="country country_flag">
                  <span class="country__flag"><span class="flag flag-CRO"></span></span>
                  <span class="country__name-short">CRO</span>
                </div>
              </div>
              <div class="g-lg-2 g-md-2 g-sm-2 justify-right bold hidden-xs">{run1}</div>
              <div class="g-lg-2 g-md-2 g-sm-2 justify-right bold hidden-xs">{run2}</div>
              <div class="g-lg-2 g-md-2 justify-right blue bold hidden-sm hidden-xs">{total}</div>
              <div class="g-lg-2 g-md-2 g-sm-3 g-xs-5 justify-right bold"><span class="hidden-md-up visible-sm">{total}</span></div>
              <div class="g-lg-2 g-md-2 g-sm-2 g-xs-3 justify-right ">{points_slot}</div>
            </div>
          </div>
        </a>"#,
        index = athlete_id % 100_000,
        run1 = times[0],
        run2 = times[1],
        total = times[2],
    )
}

fn technical_row(label: &str, value: &str) -> String {
    format!(
        r#"<div class="table-row"><div class="g-row justify-sb">
             <div class="g-xs-12 justify-left bold">{label}</div>
             <div class="g-xs-12 justify-right">{value}</div>
           </div></div>"#
    )
}

fn run_row(label: &str, value: &str) -> String {
    format!(
        r#"<div class="table-row"><div class="g-row justify-sb">
             <div class="g-xs-12 justify-left bold">{label}</div>
             <div class="g-xs-12 justify-left">{value}</div>
           </div></div>"#
    )
}

/// Render a race page. Finisher `i` has athlete id `FINISHER_ID_BASE + i`;
/// non-finishers are numbered from `NON_FINISHER_ID_BASE` across all tables.
pub fn race_page(layout: &PageLayout) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html><html><head>
        <title>Alpine Skiing - Results - {title} 2024/2025</title>
        <script>window.dataLayer = [{{"competitionCodex":{codex},"sectorCode":"AL"}}];</script>
        </head><body>
        <div class="event-header">
          <h1 class="heading heading_l2 heading_off-sm-style">{location}</h1>
          <div class="event-header__subtitle">{category}</div>
          <div class="event-header__kind">{kind}</div>
          <div class="timezone-date" data-date="{date}">{date}</div>
          <span class="event-header__codex">CODEX: {codex:04}</span>
        </div>
        <section class="section_more-info"><h3 class="heading heading_l3">Technical data</h3>
          {t1}{t2}{t3}{t4}
        </section>
        <section class="section_more-info"><h3 class="heading heading_l3">1st Run</h3>
          {r1}{r2}
        </section>
        <section class="section_more-info"><h3 class="heading heading_l3">2nd Run</h3>
          {r3}{r4}
        </section>
        "#,
        title = layout.location,
        location = layout.location,
        category = layout.category,
        kind = layout.kind,
        date = layout.date,
        codex = layout.codex,
        t1 = technical_row("Start Altitude", "918m"),
        t2 = technical_row("Finish Altitude", "743m"),
        t3 = technical_row("Length", "430m"),
        t4 = technical_row("Homologation Number", "13162/05/19"),
        r1 = run_row("Number of Gates", "58"),
        r2 = run_row("Turning Gates", "56"),
        r3 = run_row("Number of Gates", "54"),
        r4 = run_row("Turning Gates", "53"),
    );

    if layout.has_results {
        html.push_str(r#"<div class="table table_min_height"><div class="table__head">Rank Bib Name</div>"#);
        html.push_str(r#"<div id="events-info-results" class="table__body">"#);
        for i in 0..layout.finishers {
            let total = 92.72 + 0.36 * i as f64;
            let points = if i == 0 {
                "15.00".to_string()
            } else {
                format!("{:.2}", 15.0 + 2.83 * i as f64)
            };
            html.push_str(&row(
                FINISHER_ID_BASE + i as i64,
                &(i + 1).to_string(),
                ["46.77", "45.95", &format_time(total)],
                &points,
            ));
        }
        html.push_str("</div>");

        let mut next_id = NON_FINISHER_ID_BASE;
        for (heading, count) in &layout.non_finishers {
            let _ = write!(html, r#"<div class="g-row justify-sb heading">{heading}</div>"#);
            html.push_str(r#"<div class="table__body">"#);
            let run1 = if heading.contains("2nd Run") { "54.67" } else { "" };
            for _ in 0..*count {
                html.push_str(&row(next_id, "", [run1, "", ""], "DNF"));
                next_id += 1;
            }
            html.push_str("</div>");
        }
        html.push_str("</div>");
    }

    html.push_str("</body></html>");
    html
}

/// Store an athlete for every row of `layout`, except the external ids in `missing`
pub fn seed_athletes(db: &Database, layout: &PageLayout, missing: &[i64]) -> Vec<AthleteId> {
    let non_finishers: usize = layout.non_finishers.iter().map(|(_, n)| n).sum();
    let ids = (0..layout.finishers as i64)
        .map(|i| FINISHER_ID_BASE + i)
        .chain((0..non_finishers as i64).map(|i| NON_FINISHER_ID_BASE + i));

    ids.filter(|id| !missing.contains(id))
        .map(|external_id| {
            db.get_or_create_athlete(&NewAthlete {
                external_id,
                fis_code: None,
                name: format!("ATHLETE Number{}", external_id % 100_000),
                nation_code: Some("CRO".to_string()),
                gender: None,
                birth_year: Some(1999),
            })
            .unwrap()
        })
        .collect()
}

/// Store a points list for March 2025 listing the athletes of `layout`,
/// except the external ids in `missing`
pub fn seed_points_list(db: &Database, layout: &PageLayout, missing: &[i64]) -> PointsList {
    let date = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
    let list = db
        .insert_points_list("2025", "83", Some("10th FIS points list 2024/25"), date(1), date(31))
        .unwrap();

    for athlete in seed_athletes(db, layout, missing) {
        db.upsert_points_list_entry(list, athlete, &DisciplinePoints::default())
            .unwrap();
    }

    db.points_list_for_date(date(20)).unwrap().unwrap()
}
