use anyhow::Result;
use clap::Parser;
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use kbcontext::cli::{Cli, Commands, NeighborhoodArgs, QueryArgs};
use kbcontext::config::Config;
use kbcontext::kb::IndexBuilder;
use kbcontext::{Deadline, KbContext};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run_main().await {
        eprintln!("Error: {error:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let cli = Cli::parse();

    // building the index never loads one
    if let Commands::BuildIndex { dump, out, metadata } = &cli.command {
        let mut builder = IndexBuilder::new(out);
        if let Some(metadata) = metadata {
            builder = builder.metadata(metadata);
        }
        let stats = builder.build(dump)?;
        print_json(&json!({
            "facts": stats.facts,
            "entities": stats.entities,
            "predicates": stats.predicates,
            "literals": stats.literals,
            "skipped_lines": stats.skipped_lines,
        }))?;
        return Ok(());
    }

    let config = resolve_config(&cli)?;
    let context = KbContext::open(config)?;

    match &cli.command {
        Commands::Label { item } => println!("{}", context.label(item)),
        Commands::Labels { item } => print_json(&context.labels(item))?,
        Commands::Aliases { item } => print_json(&context.aliases(item))?,
        Commands::Description { item } => println!("{}", context.description(item)),
        Commands::Types { item } => print_json(&context.types(item))?,
        Commands::Frequency { item } => {
            let (subject, object) = context.frequency(item);
            print_json(&json!([subject, object]))?;
        }
        Commands::Neighborhood(args) => {
            let facts = context.neighborhood(&args.item, args.p, args.labels || args.types, args.types);
            print_json(&facts)?;
        }
        Commands::TwoHop(args) => {
            let NeighborhoodArgs { item, p, labels, types } = args;
            let facts = context.two_hop_neighborhood(item, *p, *labels || *types, *types);
            print_json(&facts)?;
        }
        Commands::Connect { item1, item2 } => print_json(&context.connect(item1, item2))?,
        Commands::Connectivity { item1, item2 } => {
            println!("{}", context.connectivity_check(item1, item2));
        }
        Commands::Distance { item1, item2 } => match context.distance(item1, item2) {
            Some(distance) => println!("{distance}"),
            None => println!("None"),
        },
        Commands::SearchSpace {
            items,
            p,
            labels,
            types,
            connected,
        } => {
            let facts =
                context.tuple_search_space(items, *p, *labels || *types, *types, *connected);
            print_json(&facts)?;
        }
        Commands::Query(args) => {
            let result = run_query(&context, args).await?;
            print_json(&result)?;
            context.store_caches()?;
        }
        Commands::BuildIndex { .. } => unreachable!("handled above"),
    }
    Ok(())
}

async fn run_query(context: &KbContext, args: &QueryArgs) -> Result<kbcontext::QuestionContext> {
    let mut overrides = serde_json::Map::new();
    if let Some(k) = &args.k {
        overrides.insert("k".to_string(), Value::String(k.clone()));
    }
    if let Some(d) = args.d {
        overrides.insert("d".to_string(), json!(d));
    }
    if let Some(p) = args.p {
        overrides.insert("p_setting".to_string(), json!(p));
    }
    let deadline = match args.timeout_ms {
        Some(ms) => Deadline::within(Duration::from_millis(ms)),
        None => Deadline::none(),
    };
    context
        .search_space(
            &args.question,
            Some(&overrides),
            args.labels || args.types,
            args.types,
            deadline,
        )
        .await
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    // command-line flags win over the config file
    if let Some(index_dir) = &cli.index_dir {
        config.index_dir = index_dir.clone();
    }
    if let Some(vectors) = &cli.vectors {
        config.vectors_path = Some(vectors.clone());
    }
    if let Some(stopwords) = &cli.stopwords {
        config.stopwords_path = Some(stopwords.clone());
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
