use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

/// Holds only emails known to be taken.
pub static TAKEN_EMAILS: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(86_400))
        .build()
});

pub async fn mark_taken(email: &str) {
    TAKEN_EMAILS.insert(email.trim().to_lowercase(), ()).await;
}

pub async fn is_taken(email: &str) -> bool {
    TAKEN_EMAILS.contains_key(&email.trim().to_lowercase())
}

/// Loads emails of users who logged in during the last `days` days.
pub async fn warmup_email_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT email
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        ORDER BY last_login_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch: Vec<String> = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let (email,) = row?;
        batch.push(email);
        total_count += 1;

        if batch.len() >= batch_size {
            futures::future::join_all(batch.drain(..).map(|e| async move { mark_taken(&e).await })).await;
        }
    }

    if !batch.is_empty() {
        futures::future::join_all(batch.drain(..).map(|e| async move { mark_taken(&e).await })).await;
    }

    log::info!(
        "Email cache warmup complete: {} recent users (last {} days)",
        total_count,
        days
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn marked_email_is_taken() {
        mark_taken("Maryam@Shabra.ir").await;
        assert!(is_taken("maryam@shabra.ir").await);
        assert!(!is_taken("nobody-3b9e@shabra.ir").await);
    }
}
