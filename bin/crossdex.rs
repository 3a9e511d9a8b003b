use anyhow::{Context, Result};
use clap::Parser;
use crossdex::testing::{ClusterFixture, InMemoryCluster};
use crossdex::{QueryRewriter, QueryTree, RewriterConfig};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "crossdex")]
#[command(about = "Rewrite a parsed query tree into search engine DSL", long_about = None)]
struct Args {
    /// Cluster fixture (index metadata, documents, join paths) as JSON
    #[arg(long, env = "CROSSDEX_FIXTURE")]
    fixture: PathBuf,

    /// Query tree as JSON
    #[arg(long)]
    tree: PathBuf,

    /// Index the query is issued against
    #[arg(long)]
    index: String,

    /// Rewriter configuration as JSON
    #[arg(long, env = "CROSSDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Include the post-rewrite tree dump
    #[arg(long)]
    dump: bool,

    /// Run the compiled query against the fixture and include the matches
    #[arg(long)]
    evaluate: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("crossdex v{}", crossdex::VERSION);

    let fixture = ClusterFixture::from_file(&args.fixture)
        .with_context(|| format!("loading fixture {}", args.fixture.display()))?;
    let cluster = Arc::new(InMemoryCluster::from_fixture(fixture)?);

    let tree_json = std::fs::read_to_string(&args.tree)
        .with_context(|| format!("reading query tree {}", args.tree.display()))?;
    let tree = QueryTree::from_json_str(&tree_json)?;

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            RewriterConfig::from_json_str(&json)?
        }
        None => RewriterConfig::default(),
    };

    let mut rewriter = QueryRewriter::builder(args.index.as_str(), tree)
        .resolver(cluster.clone())
        .executor(cluster.clone())
        .config(config)
        .build()?;

    let query = rewriter.rewrite_query()?;
    let search_index = rewriter.search_index_name()?;
    info!(index = %search_index, scans = cluster.scan_count(), "Query rewritten");

    let mut output = Map::new();
    output.insert("index".to_string(), json!(search_index));
    output.insert("query".to_string(), query.to_json());
    if let Some(aggregation) = rewriter.rewrite_aggregations()? {
        output.insert("aggregation".to_string(), aggregation.to_json());
    }
    if let Some(suggestion) = rewriter.rewrite_suggestions()? {
        output.insert("suggest".to_string(), suggestion.to_json());
    }
    if args.dump {
        output.insert("dump".to_string(), json!(rewriter.dump()));
    }
    if args.evaluate {
        let hits = cluster.search(&search_index, &query)?;
        output.insert("hits".to_string(), Value::Array(hits));
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);
    Ok(())
}
