//! Connection pool construction: connect, creating the target database if
//! it doesn't exist yet, then retry once before giving up.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, Pool, Postgres};

use crate::error::PersistenceError;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>, PersistenceError> {
    match PgPoolOptions::new().min_connections(1).max_connections(max_connections).connect(database_url).await {
        Ok(pool) => Ok(pool),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("3D000") => {
            log::warn!("target database not found, attempting to create it");
            ensure_database_exists(database_url).await?;
            PgPoolOptions::new().min_connections(1).max_connections(max_connections).connect(database_url).await.map_err(PersistenceError::from)
        }
        Err(e) => Err(PersistenceError::from(e)),
    }
}

async fn ensure_database_exists(full_url: &str) -> Result<(), PersistenceError> {
    let (base, db_name) = match full_url.rfind('/') {
        Some(pos) => {
            let (b, tail) = full_url.split_at(pos);
            let db_part = &tail[1..];
            let db_only = db_part.split('?').next().unwrap_or(db_part);
            (b.to_string(), db_only.to_string())
        }
        None => return Ok(()),
    };
    if db_name.is_empty() {
        return Ok(());
    }

    let admin_url = if base.ends_with("/postgres") || db_name == "postgres" { full_url.to_string() } else { format!("{base}/postgres") };

    let admin_pool = PgPoolOptions::new().max_connections(1).connect(&admin_url).await.map_err(PersistenceError::from)?;

    let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_database WHERE datname = $1").bind(&db_name).fetch_one(&admin_pool).await.map_err(PersistenceError::from)?;

    if exists.0 == 0 {
        if db_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            let create_stmt = format!("CREATE DATABASE \"{}\"", db_name.replace('"', ""));
            admin_pool.execute(create_stmt.as_str()).await.map_err(PersistenceError::from)?;
            log::info!("database '{db_name}' created automatically");
        } else {
            log::warn!("refusing to auto-create database with unsafe name: {db_name}");
        }
    }
    Ok(())
}

pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), PersistenceError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| PersistenceError::Migration(e.to_string()))
}
