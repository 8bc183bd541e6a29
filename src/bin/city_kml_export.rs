use std::path::PathBuf;

use anyhow::{Context, Result};
use city_kml::export::{
    CancellationToken, DisplayForm, DisplaySelection, ExportPool, ExportTask, ProgressCounters,
};
use city_kml::geometry::IdentityTransformer;
use city_kml::lod::ObjectClass;
use city_kml::store::{SqliteStore, SqliteStoreFactory};
use city_kml::ExportConfig;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "city_kml_export", version, about = "Export city objects from a SQLite city model to KML/COLLADA")]
struct Args {
    /// SQLite city model database
    #[arg(long, value_name = "PATH")]
    db: PathBuf,

    /// TOML export configuration; defaults apply when omitted
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    /// gml id of an object to export (repeatable)
    #[arg(long = "id", value_name = "GMLID", conflicts_with = "all")]
    ids: Vec<String>,

    /// Export every object in the database
    #[arg(long)]
    all: bool,

    /// footprint, extruded, geometry or collada
    #[arg(long, default_value = "geometry", value_parser = parse_form)]
    form: DisplayForm,

    /// Add a highlight shell (geometry and collada forms)
    #[arg(long)]
    highlight: bool,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

fn parse_form(text: &str) -> std::result::Result<DisplayForm, String> {
    text.parse()
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// One task per selected object whose class can be exported
fn collect_tasks(store: &SqliteStore, args: &Args) -> Result<Vec<ExportTask>> {
    let display = DisplaySelection::new(args.form).with_highlight(args.highlight);
    let objects = store.list_objects().context("Failed to list city objects")?;
    let mut tasks = Vec::new();
    for object in objects {
        if !args.all && !args.ids.iter().any(|id| id == &object.gml_id) {
            continue;
        }
        match ObjectClass::from_class_id(object.class_id) {
            Some(class) => tasks.push(ExportTask::new(object.id, object.gml_id, class, display)),
            None => warn!(gml_id = %object.gml_id, class_id = object.class_id, "unsupported object class, skipped"),
        }
    }
    for id in &args.ids {
        if !tasks.iter().any(|t| &t.gml_id == id) {
            warn!(gml_id = %id, "object not found");
        }
    }
    Ok(tasks)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json);
    anyhow::ensure!(args.all || !args.ids.is_empty(), "select objects with --id or --all");

    let config = match &args.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };
    std::fs::create_dir_all(&args.out).with_context(|| format!("Failed to create {}", args.out.display()))?;

    let store = SqliteStore::open(&args.db).with_context(|| format!("Failed to open {}", args.db.display()))?;
    let tasks = collect_tasks(&store, &args)?;
    drop(store);
    info!(tasks = tasks.len(), form = %args.form, "collected export tasks");

    let transformer = IdentityTransformer;
    let factory = SqliteStoreFactory::new(args.db.clone());
    let counters = ProgressCounters::new();
    let cancel = CancellationToken::new();
    let pool = ExportPool::new(&config, &transformer);

    let summary = pool.run(tasks, &factory, &counters, &cancel, |output| {
        let path = output.write(&args.out, &config.materials)?;
        info!(name = %output.name, path = %path.display(), lod = output.lod, "written");
        Ok(())
    })?;

    let report = serde_json::json!({
        "summary": summary,
        "progress": counters.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
