//! Full query text side table
//!
//! Query texts longer than the truncation threshold are stored once, keyed by
//! their SHA-1, and aggregate rows carry only the truncated prefix plus the
//! hash. Reuse refreshes the row's TTL so a hot query's full text outlives
//! any aggregate row that references it; a moka cache suppresses redundant
//! refreshes for recently-touched hashes.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::core::config::CentralConfig;

use super::error::StoreError;
use super::schema;
use super::store::{PreparedStatement, Session, Value};

/// How long a refreshed sha1 is considered fresh before the next reference
/// triggers another TTL write
const REFRESH_SUPPRESSION: Duration = Duration::from_secs(3600);

const REFRESH_CACHE_CAPACITY: u64 = 100_000;

pub struct FullQueryTextDao {
    session: Arc<dyn Session>,
    insert: PreparedStatement,
    select: PreparedStatement,
    ttl_seconds: i32,
    recently_refreshed: Cache<String, ()>,
}

impl FullQueryTextDao {
    pub async fn build(
        session: Arc<dyn Session>,
        config: &CentralConfig,
    ) -> Result<Self, StoreError> {
        let max_expiration_hours = config
            .storage
            .rollup_expiration_hours
            .iter()
            .copied()
            .max()
            .unwrap_or(0);
        session
            .create_table(&format!(
                "create table if not exists full_query_text \
                 (full_query_text_sha1 varchar, full_query_text varchar, \
                 primary key (full_query_text_sha1)) with {}",
                schema::twcs_options(max_expiration_hours.max(1))
            ))
            .await?;
        let insert = session
            .prepare(
                "insert into full_query_text (full_query_text_sha1, full_query_text) \
                 values (?, ?) using ttl ?",
            )
            .await?;
        let select = session
            .prepare(
                "select full_query_text from full_query_text where full_query_text_sha1 = ?",
            )
            .await?;
        // 0 = keep forever when every level has retention disabled
        let ttl_seconds = (max_expiration_hours * 3600).min(i64::from(i32::MAX)) as i32;
        Ok(Self {
            session,
            insert,
            select,
            ttl_seconds,
            recently_refreshed: Cache::builder()
                .max_capacity(REFRESH_CACHE_CAPACITY)
                .time_to_live(REFRESH_SUPPRESSION)
                .build(),
        })
    }

    /// Store a full text under its hash with a fresh TTL
    pub async fn store(&self, sha1: &str, full_text: &str) -> Result<(), StoreError> {
        self.session
            .execute(self.insert.bind(vec![
                Value::Text(sha1.to_string()),
                Value::Text(full_text.to_string()),
                Value::Int(self.ttl_seconds),
            ]))
            .await?;
        self.recently_refreshed.insert(sha1.to_string(), ()).await;
        Ok(())
    }

    /// Refresh the TTL of an existing hash; re-reads the text and rewrites
    /// the row. Skipped when the hash was refreshed recently.
    pub async fn update_ttl(&self, sha1: &str) -> Result<(), StoreError> {
        if self.recently_refreshed.get(sha1).await.is_some() {
            return Ok(());
        }
        match self.full_text(sha1).await? {
            Some(full_text) => self.store(sha1, &full_text).await,
            None => {
                // the reference outlived the stored text (retention change or
                // expiry); the UI will fall back to the truncated prefix
                tracing::debug!(sha1, "Full query text missing on TTL refresh");
                Ok(())
            }
        }
    }

    /// Resolve a hash back to its full text
    pub async fn full_text(&self, sha1: &str) -> Result<Option<String>, StoreError> {
        let rows = self
            .session
            .execute(self.select.bind(vec![Value::Text(sha1.to_string())]))
            .await?;
        match rows.first() {
            Some(row) => Ok(Some(row.text(0)?.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemorySession;
    use crate::utils::hash::sha1_hex;
    use crate::utils::time::ManualClock;

    async fn dao() -> FullQueryTextDao {
        let session: Arc<dyn Session> = Arc::new(MemorySession::new(ManualClock::new(0)));
        FullQueryTextDao::build(session, &CentralConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_and_resolve() {
        let dao = dao().await;
        let text = "SELECT * FROM orders WHERE customer_id = ? AND status IN (?, ?, ?)";
        let sha1 = sha1_hex(text);
        dao.store(&sha1, text).await.unwrap();
        assert_eq!(dao.full_text(&sha1).await.unwrap().as_deref(), Some(text));
    }

    #[tokio::test]
    async fn test_store_is_idempotent_per_hash() {
        let dao = dao().await;
        let text = "SELECT 1";
        let sha1 = sha1_hex(text);
        dao.store(&sha1, text).await.unwrap();
        dao.store(&sha1, text).await.unwrap();
        assert_eq!(dao.full_text(&sha1).await.unwrap().as_deref(), Some(text));
    }

    #[tokio::test]
    async fn test_update_ttl_missing_row_is_ok() {
        let dao = dao().await;
        dao.update_ttl(&sha1_hex("never stored")).await.unwrap();
        assert_eq!(dao.full_text(&sha1_hex("never stored")).await.unwrap(), None);
    }
}
