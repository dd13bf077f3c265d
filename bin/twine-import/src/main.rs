//! twine-import — one-shot CLI for bulk-importing a file (or stdin) into
//! the same pipeline the daemon runs, driving a targeted update handler,
//! or applying schema migrations.
//!
//! Exit codes: 0 on success, 1 on failure.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use twine_cluster::StaticCluster;
use twine_core::config::Config;
use twine_core::context::Context;
use twine_core::plugin::PluginToken;
use twine_dispatch::bulk::run_bulk_import;
use twine_dispatch::run_update;
use twine_pipeline::{register_builtins, register_rdf_input};
use twine_store::index::BlockingIndex;
use twine_store::object_store::S3Config;
use twine_store::sparql::SparqlConfig;
use twine_store::{object_store, sparql};

#[derive(Parser)]
#[command(name = "twine-import", version, about)]
struct Cli {
    /// Config file path.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// A `section:key` or `section:key=value` configuration override.
    #[arg(short = 'D', value_name = "section:key[=value]")]
    overrides: Vec<String>,

    /// Force a MIME type instead of inferring one from the filename
    /// extension.
    #[arg(short = 't', value_name = "TYPE")]
    mime_type: Option<String>,

    /// Update mode: the registered update handler's name. The
    /// positional argument becomes the identifier passed to it rather
    /// than a filename.
    #[arg(short = 'u', value_name = "NAME")]
    update_handler: Option<String>,

    /// Apply pending schema migrations, then exit without importing
    /// anything.
    #[arg(short = 'S')]
    init_schema: bool,

    /// Filename to import, or (with `-u`) the identifier to update.
    /// Reads stdin if omitted.
    argument: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("twine-import: ERROR: {e:?}");
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
    let mut config = match &cli.config {
        Some(path) => Config::load(path, "twine").context("loading configuration")?,
        None => Config::empty("twine"),
    };
    for spec in &cli.overrides {
        config.apply_override(spec).with_context(|| format!("applying override '{spec}'"))?;
    }

    if cli.init_schema {
        return run_init_schema(&config);
    }

    let ctx = build_context(&config)?;
    {
        let mut registry = ctx.registry().write().expect("registry lock poisoned");
        register_builtins(&mut registry);
        register_rdf_input(&mut registry, PluginToken::INTERNAL);
    }

    if let Some(handler_name) = &cli.update_handler {
        let identifier = cli.argument.context("-u requires an identifier argument")?;
        run_update(&ctx, handler_name, &identifier).context("running update handler")?;
        return Ok(());
    }

    let mime_type = resolve_mime_type(cli.mime_type.as_deref(), cli.argument.as_deref())?;
    let body = read_input(cli.argument.as_deref())?;

    let bulk_registered = {
        let registry = ctx.registry().read().expect("registry lock poisoned");
        registry.bulk_exists(&mime_type)
    };

    if bulk_registered {
        run_bulk_import(&ctx, &mime_type, std::io::Cursor::new(body)).context("bulk import")?;
    } else {
        let registry = ctx.registry().read().expect("registry lock poisoned");
        registry
            .resolve_input(&ctx, &mime_type, &body, None)
            .context("processing input")?;
    }

    Ok(())
}

fn run_init_schema(config: &Config) -> anyhow::Result<()> {
    let db_uri = config.get_string("twine:db", "");
    if db_uri.is_empty() {
        anyhow::bail!("-S requires twine:db to be configured");
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building migration runtime")?
        .block_on(async {
            let pool = PgPoolOptions::new().connect(&db_uri).await.context("connecting to twine:db")?;
            twine_store::migrate::migrate(&pool).await.context("running schema migrations")
        })
}

/// Wire up the external service handles named in configuration into a
/// `Context`, the same way the daemon does.
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

fn read_input(argument: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match argument {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {path}")),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn resolve_mime_type(forced: Option<&str>, argument: Option<&str>) -> anyhow::Result<String> {
    if let Some(mime) = forced {
        return Ok(mime.to_string());
    }
    let path = argument.context("-t TYPE is required when reading from stdin")?;
    mime_from_extension(Path::new(path))
        .map(str::to_string)
        .with_context(|| format!("cannot infer a MIME type from '{path}'; pass -t TYPE"))
}

/// Extension-to-MIME-type table for the import tool, matching the
/// daemon's recognised RDF serialisations plus a handful of bulk/plain
/// formats a plug-in might register a bulk handler for.
fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "trig" => "application/trig",
        "nq" => "application/n-quads",
        "ttl" => "text/turtle",
        "rdf" => "application/rdf+xml",
        "nt" => "application/n-triples",
        "xml" => "text/xml",
        "html" => "text/html",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => return None,
    })
}
