use clap::Parser;
use room_stats::config::AppConfig;
use room_stats::db::Store;
use room_stats::export::Exporter;
use room_stats::ingest::Ingestor;
use room_stats::sink::FileSink;
use room_stats::source::JsonArraySource;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "room-stats",
    about = "Load rooms and students into PostgreSQL and export room statistics"
)]
struct Args {
    /// Path to the rooms file (JSON array).
    #[arg(long)]
    rooms: PathBuf,

    /// Path to the students file (JSON array).
    #[arg(long)]
    students: PathBuf,

    /// Output format: `json` or `xml`.
    #[arg(long, default_value = "json")]
    format: String,

    /// Log EXPLAIN ANALYZE output for every query.
    #[arg(long)]
    analyze: bool,

    /// Records per insert batch (overrides INGEST_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Number of rooms returned by ranking queries (overrides RANKING_LIMIT).
    #[arg(long)]
    limit: Option<i64>,

    /// Database connection string (overrides DATABASE_URL).
    #[arg(long)]
    database_url: Option<String>,

    /// Directory exports are written to (overrides RESULTS_DIR).
    #[arg(long)]
    results_dir: Option<PathBuf>,
}

impl Args {
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size.max(1);
        }
        if let Some(limit) = self.limit {
            config.ranking_limit = limit.max(0);
        }
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    room_stats::init_logger();

    let args = Args::parse();
    let config = args.apply(AppConfig::from_env());

    log::info!(
        "starting run: rooms={}, students={}, format={}, batch_size={}",
        args.rooms.display(),
        args.students.display(),
        args.format,
        config.batch_size
    );

    let store = Store::connect(&config.database).await;
    run(&args, &config, &store).await;
    store.close().await;
}

async fn run(args: &Args, config: &AppConfig, store: &Store) {
    if store.bootstrap().await.is_none() {
        log::error!("schema bootstrap failed, continuing with existing schema");
    }

    let summary = Ingestor::new(config.batch_size)
        .populate(&JsonArraySource, store, &args.rooms, &args.students)
        .await;
    if summary.rooms.is_none() || summary.students.is_none() {
        log::warn!("ingestion incomplete, exports may be partial");
    }

    let sink = FileSink::new(&config.results_dir);
    Exporter::new(&args.format)
        .with_analyze(args.analyze)
        .with_limit(config.ranking_limit)
        .export_all(store, &sink)
        .await;
}
