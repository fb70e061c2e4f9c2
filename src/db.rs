use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tracing::info;

use crate::auth::password::hash_password;
use crate::config::SeedAdmin;
use crate::model::role::{Role, join_roles};

pub async fn init_db(database_url: &str) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

pub async fn run_migrations(pool: &MySqlPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");
    Ok(())
}

/// Creates the bootstrap admin when no active ADMIN exists yet.
pub async fn seed_admin(pool: &MySqlPool, seed: &SeedAdmin) -> Result<bool> {
    let admins: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE FIND_IN_SET('ADMIN', roles) > 0 AND is_active = TRUE",
    )
    .fetch_one(pool)
    .await
    .context("Failed to count admin users")?;

    if admins > 0 {
        return Ok(false);
    }

    let hashed = hash_password(&seed.password)
        .map_err(|e| anyhow::anyhow!("Failed to hash seed password: {}", e))?;

    sqlx::query(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, roles, is_active)
        VALUES ('System', 'Admin', ?, ?, ?, TRUE)
        "#,
    )
    .bind(seed.email.trim().to_lowercase())
    .bind(hashed)
    .bind(join_roles(&[Role::Admin]))
    .execute(pool)
    .await
    .context("Failed to insert seed admin")?;

    info!(email = %seed.email, "Seed admin created");
    Ok(true)
}
