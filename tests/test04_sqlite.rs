#![cfg(feature = "sqlite")]

use sql_scope::{
    DbError, Engine, EngineConfig, ExecutionContext, RowValues, TransactionScope,
    with_transaction,
};
use tempfile::TempDir;

fn sqlite_engine(dir: &TempDir) -> Result<Engine, DbError> {
    let path = dir.path().join("scope.db");
    // string form, as passed by `--option busy_timeout_ms=1000`
    let cfg = EngineConfig::builder(path.to_string_lossy())
        .option("busy_timeout_ms", "1000")
        .finish()?;
    Engine::from_config(&cfg)
}

fn setup(ctx: &mut ExecutionContext<'_>) -> Result<(), DbError> {
    ctx.execute(
        "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, active INTEGER)",
        &[],
    )?;
    Ok(())
}

#[test]
fn committed_transaction_is_visible_afterwards() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = sqlite_engine(&dir)?;
    let mut ctx = ExecutionContext::new(&engine);
    setup(&mut ctx)?;

    with_transaction(&mut ctx, |ctx| {
        ctx.execute(
            "INSERT INTO users (name, active) VALUES (?1, ?2)",
            &[RowValues::Text("alice".into()), RowValues::Bool(true)],
        )?;
        with_transaction(ctx, |ctx| {
            ctx.execute(
                "INSERT INTO users (name, active) VALUES (?1, ?2)",
                &[RowValues::Text("bob".into()), RowValues::Bool(false)],
            )
        })?;
        Ok::<_, DbError>(())
    })?;

    assert_eq!(ctx.select_int("SELECT count(*) FROM users", &[])?, 2);
    let row = ctx
        .select_one("SELECT name, active FROM users WHERE name = ?1", &[RowValues::Text("bob".into())])?
        .expect("bob exists");
    assert_eq!(row.get("name").and_then(RowValues::as_text), Some("bob"));
    assert_eq!(row.get("active").and_then(RowValues::as_bool), Some(false));
    Ok(())
}

#[test]
fn failed_transaction_leaves_no_rows() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = sqlite_engine(&dir)?;
    let mut ctx = ExecutionContext::new(&engine);
    setup(&mut ctx)?;

    let result = with_transaction(&mut ctx, |ctx| {
        ctx.execute(
            "INSERT INTO users (name) VALUES (?1)",
            &[RowValues::Text("carol".into())],
        )?;
        // NOT NULL violation
        ctx.execute("INSERT INTO users (name) VALUES (?1)", &[RowValues::Null])
    });

    assert!(matches!(result, Err(DbError::SqliteError(_))));
    assert_eq!(ctx.select_int("SELECT count(*) FROM users", &[])?, 0);
    Ok(())
}

#[test]
fn work_is_invisible_to_other_connections_until_commit() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = sqlite_engine(&dir)?;
    let mut writer = ExecutionContext::new(&engine);
    let mut reader = ExecutionContext::new(&engine);
    setup(&mut writer)?;

    let mut tx = TransactionScope::begin(&mut writer)?;
    tx.execute(
        "INSERT INTO users (name) VALUES (?1)",
        &[RowValues::Text("dave".into())],
    )?;
    assert_eq!(reader.select_int("SELECT count(*) FROM users", &[])?, 0);
    tx.commit()?;

    assert_eq!(reader.select_int("SELECT count(*) FROM users", &[])?, 1);
    Ok(())
}

#[test]
fn execute_outside_transaction_is_durable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = sqlite_engine(&dir)?;
    let mut ctx = ExecutionContext::new(&engine);
    setup(&mut ctx)?;

    let affected = ctx.execute(
        "INSERT INTO users (name) VALUES (?1)",
        &[RowValues::Text("erin".into())],
    )?;
    assert_eq!(affected, 1);

    let mut other = ExecutionContext::new(&engine);
    assert_eq!(other.select_int("SELECT count(*) FROM users", &[])?, 1);
    Ok(())
}

#[test]
fn select_int_rejects_two_columns() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = sqlite_engine(&dir)?;
    let mut ctx = ExecutionContext::new(&engine);

    let err = ctx.select_int("SELECT 1, 2", &[]).unwrap_err();
    assert!(matches!(err, DbError::MultiColumnsError(_)));
    Ok(())
}

#[test]
fn missing_directory_is_a_connection_error() {
    let cfg = EngineConfig::new("/nonexistent-dir/for/sure/scope.db");
    let engine = Engine::from_config(&cfg).expect("engine builds without connecting");
    let mut ctx = ExecutionContext::new(&engine);

    let err = ctx.select("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, DbError::ConnectionError(_)));
    assert!(!ctx.is_initialized());
}

#[test]
fn autocommit_config_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scope.db");
    let cfg = EngineConfig::builder(path.to_string_lossy())
        .autocommit(true)
        .finish()?;

    let err = Engine::from_config(&cfg).unwrap_err();
    assert!(matches!(err, DbError::ConfigError(_)));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn statements_before_a_failure_are_rolled_back_with_it() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = sqlite_engine(&dir)?;
    let mut ctx = ExecutionContext::new(&engine);
    setup(&mut ctx)?;

    let result = with_transaction(&mut ctx, |ctx| {
        ctx.execute("INSERT INTO users (name) VALUES ('frank')", &[])?;
        ctx.execute("INSERT INTO users (name) VALUES ('grace')", &[])?;
        ctx.execute("INSERT INTO users (name) VALUES (NULL)", &[])
    });

    assert!(result.is_err());
    let mut other = ExecutionContext::new(&engine);
    assert_eq!(other.select_int("SELECT count(*) FROM users", &[])?, 0);
    Ok(())
}
