use std::{path::Path, process::ExitCode, sync::Mutex};

use clap::Parser;
use rentrank::{
    ColbertEmbedder,
    DataDir,
    Embedder,
    EmbeddingCache,
    HashEmbedder,
    ListingSnapshot,
    SettingKey,
    SettingsDb,
    SharedSnapshot,
    cli::{Cli, Command, EmbedderKind, SearchArgs, SettingsAction},
    config,
    dataset::{self, DatasetOptions},
    error::{Error, Result},
    mcp::{self, ServerState},
    search,
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RENTRANK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_contract_violation() => {
            eprintln!("invalid input: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let settings = SettingsDb::open(&data_dir.settings_db())?;
    let model = config::resolve_model(cli.model.as_deref(), Some(&settings))?;

    match cli.command {
        Command::Search(args) => {
            let embedder = make_embedder(cli.embedder, model);
            cmd_search(&settings, embedder, &args)?;
        }
        Command::Settings { action } => cmd_settings(&settings, action)?,
        Command::Status(args) => {
            let embedder = make_embedder(cli.embedder, model);
            cmd_status(&data_dir, &settings, embedder.as_ref(), args.json)?;
        }
        Command::Mcp(args) => {
            let mut embedder = make_embedder(cli.embedder, model);
            let path = config::resolve_dataset(args.dataset, Some(&settings))?;
            let cache = EmbeddingCache::in_memory()?;
            let snapshot = load_snapshot(&path, &mut embedder, Some(&cache))?;

            mcp::run_mcp(ServerState {
                snapshot: SharedSnapshot::new(snapshot),
                embedder: Mutex::new(embedder),
                cache: Some(cache),
                settings: Some(settings),
                dataset: Some(path),
            })?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn make_embedder(kind: EmbedderKind, model: String) -> Box<dyn Embedder + Send> {
    match kind {
        EmbedderKind::Colbert => Box::new(ColbertEmbedder::with_model_id(model)),
        EmbedderKind::Hash => Box::new(HashEmbedder::default()),
    }
}

fn load_snapshot(
    path: &Path,
    embedder: &mut Box<dyn Embedder + Send>,
    cache: Option<&EmbeddingCache>,
) -> Result<ListingSnapshot> {
    let listings = dataset::load_listings(path, &DatasetOptions::default())?;
    ListingSnapshot::build(listings, embedder, cache)
}

fn cmd_search(
    settings: &SettingsDb,
    mut embedder: Box<dyn Embedder + Send>,
    args: &SearchArgs,
) -> Result<()> {
    // Reject bad options before paying for embeddings.
    let overrides = args.overrides();
    let query = config::resolve_query(&args.query, &overrides, Some(settings))?;
    let rank_config = config::resolve_rank_config(&overrides, Some(settings))?;
    let path = config::resolve_dataset(args.dataset.clone(), Some(settings))?;

    let snapshot = load_snapshot(&path, &mut embedder, None)?;

    let result =
        search::execute_search(&snapshot, &mut embedder, &query, &rank_config)?;

    if args.json {
        println!("{}", search::format_json(&result, &query.text)?);
    } else {
        print!("{}", search::format_human(&result));
    }
    Ok(())
}

fn cmd_settings(settings: &SettingsDb, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show { json } => {
            let stored = settings.list()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = stored
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            } else if stored.is_empty() {
                println!("No settings stored.");
            } else {
                for (key, value) in &stored {
                    println!("{key}\t{value}");
                }
            }
        }
        SettingsAction::Set { key, value } => {
            let key: SettingKey = key.parse()?;
            settings.set(key, &value)?;
            println!("Set {key} = {value}");
        }
        SettingsAction::Clear { key } => {
            let key: SettingKey = key.parse()?;
            if !settings.remove(key)? {
                return Err(Error::NotFound {
                    kind: "stored setting",
                    name: key.to_string(),
                });
            }
            println!("Cleared {key}");
        }
    }
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    settings: &SettingsDb,
    embedder: &(dyn Embedder + Send),
    json: bool,
) -> Result<()> {
    let dataset = settings.get(SettingKey::Dataset)?;
    let stored = settings.list()?.len();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "data_dir": data_dir.root().display().to_string(),
                "model": embedder.model_version(),
                "dataset": dataset,
                "stored_settings": stored,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Model: {}", embedder.model_version());
        println!("Dataset: {}", dataset.as_deref().unwrap_or("(not set)"));
        println!("Stored settings: {stored}");
    }
    Ok(())
}
