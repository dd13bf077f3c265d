//! twine-worker — long-running daemon that dispatches broker messages
//! through the graph-processing pipeline.
//!
//! Exit codes: 0 on clean shutdown, 1 on initialisation failure.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use twine_broker::AmqpBroker;
use twine_cluster::StaticCluster;
use twine_core::config::Config;
use twine_core::context::Context;
use twine_core::plugin::PluginToken;
use twine_dispatch::run_workers;
use twine_pipeline::{register_builtins, register_rdf_input, Pipeline};
use twine_store::index::BlockingIndex;
use twine_store::object_store::S3Config;
use twine_store::sparql::SparqlConfig;
use twine_store::{object_store, sparql};

/// twine-worker — daemon; a flat getopt-style flag set
/// (`-f`/`-d`/`-c`/`-D`) rather than subcommands, matching the
/// literal CLI interface the workflow engine has always exposed.
#[derive(Parser)]
#[command(name = "twine-worker", version, about)]
struct Cli {
    /// Config file path.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Stay in the foreground instead of forking to the background.
    #[arg(short = 'f', long = "foreground")]
    foreground: bool,

    /// Enable debug-level logging.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// A `section:key` or `section:key=value` configuration override.
    /// May be given more than once.
    #[arg(short = 'D', value_name = "section:key[=value]")]
    overrides: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("twine-worker: ERROR: {e:?}");
            std::process::exit(1);
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if !cli.foreground {
        tracing::info!("-f not given; daemonising (double-fork, pidfile) is left to the process supervisor, running in foreground regardless");
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path, "twine").context("loading configuration")?,
        None => Config::empty("twine"),
    };
    for spec in &cli.overrides {
        config.apply_override(spec).with_context(|| format!("applying override '{spec}'"))?;
    }

    let ctx = build_context(&config)?;

    {
        let mut registry = ctx.registry().write().expect("registry lock poisoned");
        register_builtins(&mut registry);
        register_rdf_input(&mut registry, PluginToken::INTERNAL);
    }

    let workflow_spec = config.get_string("*:workflow", "");
    let pipeline = Pipeline::parse(&workflow_spec);
    {
        let registry = ctx.registry().read().expect("registry lock poisoned");
        pipeline.validate(&registry).context("validating configured workflow")?;
    }

    let mq_uri = config.get_string("mq:uri", "amqp://localhost/%2f");
    let queue = config.get_string("*:mq", "twine");
    let broker = Arc::new(AmqpBroker::connect_recv(&mq_uri, &queue).context("connecting to message broker")?);

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&shutdown))?;

    let worker_count = config.get_int("*:worker-threads", 1).max(1) as usize;
    tracing::info!(worker_count, queue = %queue, "twine-worker starting");

    run_workers(ctx, broker, worker_count, shutdown).context("dispatch loop")?;
    tracing::info!("twine-worker shut down cleanly");
    Ok(())
}

/// Wire up the external service handles (SPARQL, S3-compatible object
/// store, optional SQL index, cluster coordinator) named in
/// configuration into a `Context`.
fn build_context(config: &Config) -> anyhow::Result<Arc<Context>> {
    let sparql = sparql::shared(SparqlConfig {
        query_uri: config.get_string("sparql:query", "http://localhost:8080/sparql/"),
        update_uri: config.get_string("sparql:update", "http://localhost:8080/update/"),
        data_uri: config.get_string("sparql:data", "http://localhost:8080/data/"),
    });

    let store = object_store::shared(S3Config {
        endpoint: config.get_string("s3:endpoint", "http://localhost:9000"),
        bucket: config.get_string("s3:bucket", "twine"),
        access_key: config.get_string("s3:access", ""),
        secret_key: config.get_string("s3:secret", ""),
    });

    let cluster = Arc::new(StaticCluster::from_config(config));

    let mut builder = Context::builder(config.clone()).sparql(sparql).store(store).cluster(cluster);

    let db_uri = config.get_string("twine:db", "");
    if !db_uri.is_empty() {
        let pool = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building startup runtime")?
            .block_on(PgPoolOptions::new().connect(&db_uri))
            .context("connecting to twine:db")?;
        let index = BlockingIndex::new(pool).context("initialising SQL index runtime")?;
        builder = builder.sql(Arc::new(index));
    }

    Ok(builder.build())
}

fn install_signal_handler(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received, finishing in-flight messages");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("registering signal handler")
}
