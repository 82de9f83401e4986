use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sql_scope::{
    DatabaseType, DbError, EngineConfig, ExecutionContext, create_engine, with_transaction,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run SQL statements inside a single transaction")]
struct Args {
    /// JSON engine config; replaces the connection flags below
    #[arg(long, conflicts_with_all = ["database", "host", "port", "user", "password"])]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "sqlite")]
    driver: DatabaseType,
    #[arg(long)]
    database: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long, env = "SQL_SCOPE_PASSWORD")]
    password: Option<String>,
    /// Driver option override, as key=value
    #[arg(long = "option", value_parser = parse_option)]
    options: Vec<(String, String)>,
    /// Statements run in order; SELECT/WITH/PRAGMA/VALUES print rows as JSON lines
    #[arg(required = true)]
    statements: Vec<String>,
}

fn parse_option(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

fn engine_config(args: &Args) -> Result<EngineConfig, DbError> {
    if let Some(path) = &args.config {
        return EngineConfig::from_json_file(path);
    }
    let database = args
        .database
        .clone()
        .ok_or_else(|| DbError::ConfigError("either --config or --database is required".into()))?;
    let mut builder = EngineConfig::builder(database).driver(args.driver).credentials(
        args.user.clone().unwrap_or_default(),
        args.password.clone().unwrap_or_default(),
    );
    if let Some(host) = &args.host {
        builder = builder.host(host.clone());
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    for (key, value) in &args.options {
        builder = builder.option(key.clone(), value.clone());
    }
    builder.finish()
}

fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_uppercase();
    ["SELECT", "WITH", "PRAGMA", "VALUES"]
        .iter()
        .any(|kw| head.starts_with(kw))
}

fn run(args: &Args) -> Result<(), DbError> {
    let cfg = engine_config(args)?;
    create_engine(&cfg)?;
    let mut ctx = ExecutionContext::from_registry()?;

    with_transaction(&mut ctx, |ctx| {
        for sql in &args.statements {
            if returns_rows(sql) {
                for row in ctx.select(sql, &[])?.results {
                    println!("{}", row.to_json());
                }
            } else {
                let affected = ctx.execute(sql, &[])?;
                println!("{}", serde_json::json!({ "rows_affected": affected }));
            }
        }
        Ok(())
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "sql-scope failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
