//! SQLite persistence for Castboard
//!
//! `Database` is the production implementation of [`ContentStore`],
//! [`TargetRegistry`] and [`ActivityLog`].

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::activity::{ActivityLog, ActivityRecord, NewActivity};
use crate::error::{CastboardError, DbError, Result};
use crate::store::{ContentStore, TargetRegistry};
use crate::types::{Post, PostStatus, PostTarget, Target};

const POST_COLUMNS: &str =
    "id, owner, title, content, image_ref, scheduled_at, status, created_at, updated_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // Forward slashes keep the URL valid on Windows; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        // A single long-lived connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Close the pool; later operations fail with a database error
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a new post together with its target rows
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, owner, title, content, image_ref, scheduled_at, status,
                               claimed_until, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.image_ref)
        .bind(post.scheduled_at)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        insert_targets(&mut tx, post).await?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Delete a post and its target rows. Returns `false` if it did not exist.
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM post_targets WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(result.rows_affected() > 0)
    }

    /// List posts, optionally filtered by status and owner, by schedule time
    pub async fn list_posts(
        &self,
        status: Option<PostStatus>,
        owner: Option<&str>,
    ) -> Result<Vec<Post>> {
        let mut where_clauses = vec!["1=1"];
        if status.is_some() {
            where_clauses.push("status = ?");
        }
        if owner.is_some() {
            where_clauses.push("owner = ?");
        }

        let query_str = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY scheduled_at ASC, id ASC",
            POST_COLUMNS,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        if let Some(owner) = owner {
            query = query.bind(owner);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        self.hydrate(rows).await
    }

    /// Count an owner's scheduled posts with `start <= scheduled_at < end`,
    /// optionally leaving one post out
    pub async fn count_scheduled_between(
        &self,
        owner: &str,
        start: i64,
        end: i64,
        exclude: Option<&str>,
    ) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM posts
            WHERE owner = ?
              AND status = 'scheduled'
              AND scheduled_at >= ?
              AND scheduled_at < ?
              AND id != ?
            "#,
        )
        .bind(owner)
        .bind(start)
        .bind(end)
        .bind(exclude.unwrap_or(""))
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(count as usize)
    }

    /// Insert or update registry targets by id
    pub async fn seed_targets(&self, targets: &[Target]) -> Result<()> {
        for target in targets {
            sqlx::query(
                r#"
                INSERT INTO targets (id, name, kind, max_content_length)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    max_content_length = excluded.max_content_length
                "#,
            )
            .bind(&target.id)
            .bind(&target.name)
            .bind(&target.kind)
            .bind(target.max_content_length.map(|l| l as i64))
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        }
        Ok(())
    }

    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        let rows = sqlx::query("SELECT id, name, kind, max_content_length FROM targets ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(target_from_row).collect()
    }

    /// Enable or disable a target for one owner
    pub async fn set_target_enabled(&self, owner: &str, target_id: &str, enabled: bool) -> Result<()> {
        if self.target(target_id).await?.is_none() {
            return Err(CastboardError::NotFound(format!("target '{}'", target_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO owner_targets (owner, target_id, enabled)
            VALUES (?, ?, ?)
            ON CONFLICT(owner, target_id) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(owner)
        .bind(target_id)
        .bind(enabled)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Targets enabled for an owner
    pub async fn enabled_targets(&self, owner: &str) -> Result<Vec<Target>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.kind, t.max_content_length
            FROM targets t
            JOIN owner_targets o ON o.target_id = t.id
            WHERE o.owner = ? AND o.enabled = 1
            ORDER BY t.id
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(target_from_row).collect()
    }

    /// Rewrite a post and its target rows in one transaction, clearing the
    /// claim. With a fence, the row must still be scheduled under exactly that
    /// claim. Returns `false` when no row matched.
    async fn write_post(&self, post: &Post, fence: Option<i64>) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let mut query_str = String::from(
            r#"
            UPDATE posts
            SET title = ?, content = ?, image_ref = ?, scheduled_at = ?, status = ?,
                claimed_until = NULL, updated_at = ?
            WHERE id = ?
            "#,
        );
        if fence.is_some() {
            query_str.push_str(" AND status = 'scheduled' AND claimed_until = ?");
        }

        let mut query = sqlx::query(&query_str)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.image_ref)
            .bind(post.scheduled_at)
            .bind(post.status.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(&post.id);
        if let Some(claimed_until) = fence {
            query = query.bind(claimed_until);
        }

        let result = query.execute(&mut *tx).await.map_err(DbError::SqlxError)?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM post_targets WHERE post_id = ?")
            .bind(&post.id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        insert_targets(&mut tx, post).await?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }

    async fn post_targets(&self, post_id: &str) -> Result<Vec<PostTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT target_id, status, external_ref, error_message
            FROM post_targets
            WHERE post_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| -> Result<PostTarget> {
                Ok(PostTarget {
                    target_id: col(r, "target_id")?,
                    status: col::<String>(r, "status")?.parse()?,
                    external_ref: col(r, "external_ref")?,
                    error_message: col(r, "error_message")?,
                })
            })
            .collect()
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<Post>> {
        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut post = post_from_row(row)?;
            post.targets = self.post_targets(&post.id).await?;
            posts.push(post);
        }
        Ok(posts)
    }
}

async fn insert_targets(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, post: &Post) -> Result<()> {
    for (position, target) in post.targets.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO post_targets (post_id, target_id, position, status, external_ref, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&target.target_id)
        .bind(position as i64)
        .bind(target.status.as_str())
        .bind(&target.external_ref)
        .bind(&target.error_message)
        .execute(&mut **tx)
        .await
        .map_err(DbError::SqlxError)?;
    }
    Ok(())
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    Ok(row.try_get(name).map_err(DbError::SqlxError)?)
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: col(row, "id")?,
        owner: col(row, "owner")?,
        title: col(row, "title")?,
        content: col(row, "content")?,
        image_ref: col(row, "image_ref")?,
        scheduled_at: col(row, "scheduled_at")?,
        status: col::<String>(row, "status")?.parse()?,
        targets: Vec::new(),
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn target_from_row(row: &SqliteRow) -> Result<Target> {
    Ok(Target {
        id: col(row, "id")?,
        name: col(row, "name")?,
        kind: col(row, "kind")?,
        max_content_length: col::<Option<i64>>(row, "max_content_length")?.map(|l| l as usize),
    })
}

#[async_trait]
impl ContentStore for Database {
    async fn select_due(&self, now: i64) -> Result<Vec<Post>> {
        let query_str = format!(
            r#"
            SELECT {}
            FROM posts
            WHERE status = 'scheduled'
              AND scheduled_at <= ?
              AND (claimed_until IS NULL OR claimed_until <= ?)
            ORDER BY scheduled_at ASC, id ASC
            "#,
            POST_COLUMNS
        );

        let rows = sqlx::query(&query_str)
            .bind(now)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        self.hydrate(rows).await
    }

    async fn claim(&self, post_id: &str, now: i64, until: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET claimed_until = ?
            WHERE id = ?
              AND status = 'scheduled'
              AND (claimed_until IS NULL OR claimed_until <= ?)
            "#,
        )
        .bind(until)
        .bind(post_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    async fn save(&self, post: &Post) -> Result<()> {
        if !self.write_post(post, None).await? {
            return Err(CastboardError::NotFound(format!("post '{}'", post.id)));
        }
        Ok(())
    }

    async fn save_claimed(&self, post: &Post, claimed_until: i64) -> Result<bool> {
        self.write_post(post, Some(claimed_until)).await
    }

    async fn get(&self, post_id: &str) -> Result<Option<Post>> {
        let query_str = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query(&query_str)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TargetRegistry for Database {
    async fn target(&self, target_id: &str) -> Result<Option<Target>> {
        let row = sqlx::query("SELECT id, name, kind, max_content_length FROM targets WHERE id = ?")
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(target_from_row).transpose()
    }

    async fn is_enabled(&self, owner: &str, target_id: &str) -> Result<bool> {
        let enabled: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT o.enabled
            FROM owner_targets o
            JOIN targets t ON t.id = o.target_id
            WHERE o.owner = ? AND o.target_id = ?
            "#,
        )
        .bind(owner)
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(enabled.unwrap_or(false))
    }

    async fn limit_for(&self, target_id: &str) -> Result<Option<usize>> {
        self.target(target_id)
            .await?
            .map(|t| t.max_content_length)
            .ok_or_else(|| CastboardError::NotFound(format!("target '{}'", target_id)))
    }
}

#[async_trait]
impl ActivityLog for Database {
    async fn record(&self, entry: NewActivity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (owner, action, details, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.owner)
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.metadata.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn records_for(&self, owner: &str, limit: usize) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner, action, details, metadata, created_at
            FROM activity_logs
            WHERE owner = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(owner)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| -> Result<ActivityRecord> {
                let metadata: String = col(r, "metadata")?;
                Ok(ActivityRecord {
                    id: col(r, "id")?,
                    owner: col(r, "owner")?,
                    action: col(r, "action")?,
                    details: col(r, "details")?,
                    metadata: serde_json::from_str(&metadata)
                        .map_err(|e| DbError::Corrupt(format!("activity metadata: {}", e)))?,
                    created_at: col(r, "created_at")?,
                })
            })
            .collect()
    }
}
