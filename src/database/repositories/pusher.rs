//! Pusher repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::PusherDbModel;
use crate::stream::StreamToken;
use crate::{Error, Result};

/// Pusher repository trait.
///
/// The durable store for pusher registrations and their cursor/failure
/// state. All mutations are keyed by `(app_id, pushkey)`.
#[async_trait]
pub trait PusherRepository: Send + Sync {
    async fn get_all_pushers(&self) -> Result<Vec<PusherDbModel>>;
    async fn get_pusher_by_app_id_and_pushkey(
        &self,
        app_id: &str,
        pushkey: &str,
    ) -> Result<PusherDbModel>;
    async fn get_pushers_by_user_id(&self, user_id: &str) -> Result<Vec<PusherDbModel>>;

    /// Idempotent upsert. A re-registration replaces the configuration
    /// fields but preserves any cursor/failure state already persisted.
    async fn add_pusher(&self, pusher: &PusherDbModel) -> Result<()>;
    async fn delete_pusher(&self, app_id: &str, pushkey: &str) -> Result<()>;

    async fn update_pusher_last_token(
        &self,
        app_id: &str,
        pushkey: &str,
        token: StreamToken,
    ) -> Result<()>;
    async fn update_pusher_last_token_and_success(
        &self,
        app_id: &str,
        pushkey: &str,
        token: StreamToken,
        success_ts: i64,
    ) -> Result<()>;
    async fn update_pusher_failing_since(
        &self,
        app_id: &str,
        pushkey: &str,
        failing_since_ts: Option<i64>,
    ) -> Result<()>;
}

/// SQLx implementation of PusherRepository.
pub struct SqlxPusherRepository {
    pool: SqlitePool,
}

impl SqlxPusherRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PusherRepository for SqlxPusherRepository {
    async fn get_all_pushers(&self) -> Result<Vec<PusherDbModel>> {
        let pushers = sqlx::query_as::<_, PusherDbModel>("SELECT * FROM pushers")
            .fetch_all(&self.pool)
            .await?;
        Ok(pushers)
    }

    async fn get_pusher_by_app_id_and_pushkey(
        &self,
        app_id: &str,
        pushkey: &str,
    ) -> Result<PusherDbModel> {
        sqlx::query_as::<_, PusherDbModel>(
            "SELECT * FROM pushers WHERE app_id = ? AND pushkey = ?",
        )
        .bind(app_id)
        .bind(pushkey)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Pusher", format!("{}:{}", app_id, pushkey)))
    }

    async fn get_pushers_by_user_id(&self, user_id: &str) -> Result<Vec<PusherDbModel>> {
        let pushers = sqlx::query_as::<_, PusherDbModel>(
            "SELECT * FROM pushers WHERE user_id = ? ORDER BY app_id, pushkey",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pushers)
    }

    async fn add_pusher(&self, pusher: &PusherDbModel) -> Result<()> {
        // The conflict clause deliberately leaves the cursor and failure
        // columns untouched: a re-registration must not reset delivery
        // progress for an existing (app_id, pushkey).
        sqlx::query(
            r#"
            INSERT INTO pushers (
                app_id, pushkey, user_id, kind, app_display_name,
                device_display_name, data, last_stream_token,
                last_success_ts, failing_since_ts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (app_id, pushkey) DO UPDATE SET
                user_id = excluded.user_id,
                kind = excluded.kind,
                app_display_name = excluded.app_display_name,
                device_display_name = excluded.device_display_name,
                data = excluded.data
            "#,
        )
        .bind(&pusher.app_id)
        .bind(&pusher.pushkey)
        .bind(&pusher.user_id)
        .bind(&pusher.kind)
        .bind(&pusher.app_display_name)
        .bind(&pusher.device_display_name)
        .bind(&pusher.data)
        .bind(pusher.last_stream_token)
        .bind(pusher.last_success_ts)
        .bind(pusher.failing_since_ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_pusher(&self, app_id: &str, pushkey: &str) -> Result<()> {
        sqlx::query("DELETE FROM pushers WHERE app_id = ? AND pushkey = ?")
            .bind(app_id)
            .bind(pushkey)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_pusher_last_token(
        &self,
        app_id: &str,
        pushkey: &str,
        token: StreamToken,
    ) -> Result<()> {
        sqlx::query("UPDATE pushers SET last_stream_token = ? WHERE app_id = ? AND pushkey = ?")
            .bind(token.0)
            .bind(app_id)
            .bind(pushkey)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_pusher_last_token_and_success(
        &self,
        app_id: &str,
        pushkey: &str,
        token: StreamToken,
        success_ts: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pushers SET last_stream_token = ?, last_success_ts = ?
            WHERE app_id = ? AND pushkey = ?
            "#,
        )
        .bind(token.0)
        .bind(success_ts)
        .bind(app_id)
        .bind(pushkey)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_pusher_failing_since(
        &self,
        app_id: &str,
        pushkey: &str,
        failing_since_ts: Option<i64>,
    ) -> Result<()> {
        sqlx::query("UPDATE pushers SET failing_since_ts = ? WHERE app_id = ? AND pushkey = ?")
            .bind(failing_since_ts)
            .bind(app_id)
            .bind(pushkey)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    async fn test_repo() -> SqlxPusherRepository {
        let pool = database::init_pool("sqlite::memory:").await.unwrap();
        database::run_migrations(&pool).await.unwrap();
        SqlxPusherRepository::new(pool)
    }

    fn test_pusher(app_id: &str, pushkey: &str) -> PusherDbModel {
        PusherDbModel {
            app_id: app_id.to_string(),
            pushkey: pushkey.to_string(),
            user_id: "@alice:example.org".to_string(),
            kind: "http".to_string(),
            app_display_name: "Example".to_string(),
            device_display_name: "Phone".to_string(),
            data: r#"{"url":"https://push.example.org/notify"}"#.to_string(),
            last_stream_token: None,
            last_success_ts: None,
            failing_since_ts: None,
        }
    }

    #[tokio::test]
    async fn test_add_and_get_pusher() {
        let repo = test_repo().await;
        repo.add_pusher(&test_pusher("app", "key1")).await.unwrap();

        let row = repo
            .get_pusher_by_app_id_and_pushkey("app", "key1")
            .await
            .unwrap();
        assert_eq!(row.user_id, "@alice:example.org");
        assert_eq!(row.kind, "http");
        assert!(row.last_stream_token.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_pusher_is_not_found() {
        let repo = test_repo().await;
        let result = repo.get_pusher_by_app_id_and_pushkey("app", "nope").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_upsert_preserves_cursor_state() {
        let repo = test_repo().await;
        repo.add_pusher(&test_pusher("app", "key1")).await.unwrap();
        repo.update_pusher_last_token("app", "key1", StreamToken(42))
            .await
            .unwrap();
        repo.update_pusher_failing_since("app", "key1", Some(1_000))
            .await
            .unwrap();

        // Re-register with new gateway data
        let mut updated = test_pusher("app", "key1");
        updated.data = r#"{"url":"https://push2.example.org/notify"}"#.to_string();
        repo.add_pusher(&updated).await.unwrap();

        let row = repo
            .get_pusher_by_app_id_and_pushkey("app", "key1")
            .await
            .unwrap();
        assert!(row.data.contains("push2"));
        assert_eq!(row.last_stream_token, Some(42));
        assert_eq!(row.failing_since_ts, Some(1_000));
    }

    #[tokio::test]
    async fn test_update_last_token_and_success() {
        let repo = test_repo().await;
        repo.add_pusher(&test_pusher("app", "key1")).await.unwrap();

        repo.update_pusher_last_token_and_success("app", "key1", StreamToken(7), 123_456)
            .await
            .unwrap();

        let row = repo
            .get_pusher_by_app_id_and_pushkey("app", "key1")
            .await
            .unwrap();
        assert_eq!(row.last_stream_token, Some(7));
        assert_eq!(row.last_success_ts, Some(123_456));
    }

    #[tokio::test]
    async fn test_failing_since_roundtrip() {
        let repo = test_repo().await;
        repo.add_pusher(&test_pusher("app", "key1")).await.unwrap();

        repo.update_pusher_failing_since("app", "key1", Some(99))
            .await
            .unwrap();
        let row = repo
            .get_pusher_by_app_id_and_pushkey("app", "key1")
            .await
            .unwrap();
        assert_eq!(row.failing_since_ts, Some(99));

        repo.update_pusher_failing_since("app", "key1", None)
            .await
            .unwrap();
        let row = repo
            .get_pusher_by_app_id_and_pushkey("app", "key1")
            .await
            .unwrap();
        assert!(row.failing_since_ts.is_none());
    }

    #[tokio::test]
    async fn test_get_pushers_by_user_id() {
        let repo = test_repo().await;
        repo.add_pusher(&test_pusher("app", "key1")).await.unwrap();
        repo.add_pusher(&test_pusher("app", "key2")).await.unwrap();

        let mut other = test_pusher("app", "key3");
        other.user_id = "@bob:example.org".to_string();
        repo.add_pusher(&other).await.unwrap();

        let pushers = repo
            .get_pushers_by_user_id("@alice:example.org")
            .await
            .unwrap();
        assert_eq!(pushers.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_pusher() {
        let repo = test_repo().await;
        repo.add_pusher(&test_pusher("app", "key1")).await.unwrap();
        repo.delete_pusher("app", "key1").await.unwrap();

        assert!(repo.get_all_pushers().await.unwrap().is_empty());
    }
}
