//! FIS alpine results CLI
//!
//! Discovers races on the FIS calendar and ingests their results into SQLite.

use clap::{Parser, Subcommand};
use fis_results::{Config, Result};

#[derive(Parser)]
#[command(name = "fis")]
#[command(about = "Ingest FIS alpine race results into SQLite", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Show database status
    Status,
    /// List calendar events for a season
    Discover {
        /// Season, e.g. 2025 for 2024/25 (default: current season)
        #[arg(long)]
        season: Option<i32>,
        /// Only this race category, e.g. WC or NAC
        #[arg(long)]
        category: Option<String>,
    },
    /// Parse one race page and print it without storing anything
    Scrape {
        /// Race id (the `raceid` of the results page)
        race_id: i64,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Ingest races by id
    Ingest {
        /// Race ids
        #[arg(required = true)]
        race_ids: Vec<i64>,
    },
    /// Ingest every race of a season's events
    Sweep {
        /// Season, e.g. 2025 for 2024/25 (default: current season)
        #[arg(long)]
        season: Option<i32>,
        /// Only this race category, e.g. WC or NAC
        #[arg(long)]
        category: Option<String>,
        /// List race ids and links without scraping
        #[arg(long)]
        discover_only: bool,
    },
    /// List published points lists
    PointsLists,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Status => commands::status(&config),
        Commands::Discover { season, category } => commands::discover(&config, season, category),
        Commands::Scrape { race_id, format } => commands::scrape(&config, race_id, format),
        Commands::Ingest { race_ids } => commands::ingest(&config, &race_ids),
        Commands::Sweep {
            season,
            category,
            discover_only,
        } => commands::sweep(&config, season, category, discover_only),
        Commands::PointsLists => commands::points_lists(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use fis_results::current_season;
    use fis_results::data::points::PointsListSource;
    use fis_results::data::scrapers::discovery::Discovery;
    use fis_results::data::scrapers::points_list::FisPointsListSource;
    use fis_results::data::scrapers::HttpFetcher;
    use fis_results::data::{scrape_race, Database, IngestStatus, RaceIngester};

    fn season_or_current(season: Option<i32>) -> i32 {
        season.unwrap_or_else(|| current_season(chrono::Local::now().date_naive()))
    }

    fn find_events(discovery: &Discovery, season: i32, category: Option<&str>) -> Result<Vec<String>> {
        match category {
            Some(category) => discovery.find_events_by_category(category, season),
            None => discovery.find_events_by_season(season),
        }
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all(&config.data.points_list_dir)?;
        println!("Created {}", config.data.points_list_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'fis discover --category WC' to list events");
        println!("  3. Run 'fis sweep --category WC' to ingest their results");

        Ok(())
    }

    pub fn status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:         {}", config.data.database_path);
        println!("  Athletes:     {}", stats.athlete_count);
        println!("  Points lists: {}", stats.points_list_count);
        println!("  Races:        {}", stats.race_count);
        println!("  Results:      {}", stats.result_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_race, stats.latest_race) {
            println!("  Range:        {} to {}", earliest, latest);
        }

        Ok(())
    }

    pub fn discover(config: &Config, season: Option<i32>, category: Option<String>) -> Result<()> {
        let fetcher = HttpFetcher::new(&config.scraper)?;
        let discovery = Discovery::new(&fetcher, &config.scraper);
        let season = season_or_current(season);

        let events = find_events(&discovery, season, category.as_deref())?;
        println!("{} events in season {}", events.len(), season);
        for event in &events {
            println!("  {}", event);
        }

        Ok(())
    }

    pub fn scrape(config: &Config, race_id: i64, format: OutputFormat) -> Result<()> {
        let fetcher = HttpFetcher::new(&config.scraper)?;
        let race = scrape_race(&fetcher, &config.scraper, race_id)?;

        match format {
            OutputFormat::Json => {
                let text = serde_json::to_string_pretty(&race)
                    .map_err(|e| fis_results::FisError::Parse(e.to_string()))?;
                println!("{}", text);
            }
            OutputFormat::Table => {
                let h = &race.header;
                let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
                println!("{}", opt(&h.name));
                println!("───────────────────────────────");
                println!("  Codex:      {}", h.codex.map_or("-".to_string(), |c| c.to_string()));
                println!("  Date:       {}", h.date.map_or("-".to_string(), |d| d.to_string()));
                println!(
                    "  Discipline: {}",
                    h.discipline.map_or("-".to_string(), |d| d.to_string())
                );
                println!("  Category:   {}", opt(&h.category));
                println!("  Location:   {} ({})", opt(&h.location), opt(&h.nation));
                println!(
                    "  Starters:   {}  Finishers: {}",
                    h.total_starters.unwrap_or(0),
                    h.total_finishers.unwrap_or(0)
                );
                println!();

                let time = |t: Option<f64>| t.map_or(String::new(), |t| format!("{:.2}", t));
                println!(
                    "{:>5}  {:>8}  {:<30} {:<4} {:>8} {:>8} {:>8} {:>7}",
                    "Rank", "Athlete", "Name", "Nat", "Run 1", "Run 2", "Total", "Points"
                );
                for row in &race.results {
                    let place = match (row.rank(), row.status()) {
                        (Some(rank), _) => rank.to_string(),
                        (None, Some(status)) => status.code(),
                        (None, None) => String::new(),
                    };
                    println!(
                        "{:>5}  {:>8}  {:<30} {:<4} {:>8} {:>8} {:>8} {:>7}",
                        place,
                        row.athlete_id,
                        row.athlete_name.as_deref().unwrap_or(""),
                        row.nation.as_deref().unwrap_or(""),
                        time(row.run1_time),
                        time(row.run2_time),
                        time(row.total_time),
                        time(row.points),
                    );
                }
            }
        }

        Ok(())
    }

    pub fn ingest(config: &Config, race_ids: &[i64]) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let fetcher = HttpFetcher::new(&config.scraper)?;
        let points = FisPointsListSource::new(&fetcher, config);
        let mut ingester = RaceIngester::new(&fetcher, &points, &db, &config.scraper);

        let mut failed = 0;
        for &race_id in race_ids {
            let report = ingester.ingest(race_id);
            println!("Race {}: {} ({} results)", race_id, report.status, report.count);
            if report.status == IngestStatus::Error {
                failed += 1;
            }
        }

        if failed > 0 {
            println!("{} of {} races failed; see log for details", failed, race_ids.len());
        }
        Ok(())
    }

    pub fn sweep(
        config: &Config,
        season: Option<i32>,
        category: Option<String>,
        discover_only: bool,
    ) -> Result<()> {
        let fetcher = HttpFetcher::new(&config.scraper)?;
        let discovery = Discovery::new(&fetcher, &config.scraper);
        let season = season_or_current(season);
        let events = find_events(&discovery, season, category.as_deref())?;
        println!("Found {} events in season {}", events.len(), season);

        if discover_only {
            for event in &events {
                for race_id in discovery.find_races_by_event(event)? {
                    println!("Race ID: {}, link: {}", race_id, discovery.race_url(race_id));
                }
            }
            return Ok(());
        }

        let db = Database::open(&config.data.database_path)?;
        let points = FisPointsListSource::new(&fetcher, config);
        let mut ingester = RaceIngester::new(&fetcher, &points, &db, &config.scraper);
        let summary = ingester.process_events(&events);

        println!("Sweep Summary");
        println!("───────────────────────────────");
        println!("  Recorded:          {}", summary.recorded);
        println!("  No new results:    {}", summary.no_new_results);
        println!("  Errors:            {}", summary.errors);

        Ok(())
    }

    pub fn points_lists(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let fetcher = HttpFetcher::new(&config.scraper)?;
        let source = FisPointsListSource::new(&fetcher, config);

        let lists = source.list_available()?;
        println!("{} points lists published", lists.len());
        for list in &lists {
            let stored = match &list.list_id {
                Some(id) => db.find_points_list(&list.season, id)?.is_some(),
                None => false,
            };
            println!(
                "  {:<40} {} to {}{}",
                list.name,
                list.valid_from,
                list.valid_to,
                if stored { "  (stored)" } else { "" }
            );
        }

        Ok(())
    }
}
