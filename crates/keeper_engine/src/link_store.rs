use chrono::{DateTime, Utc};
use keeper_core::{ArchiveFormat, Link, LinkId, NewLink};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

const LINK_COLUMNS: &str = "id, collection_id, url, name, description, created_at, updated_at, \
     pdf, monolith, screenshot, readable, preserved_at, archive_generation";

#[derive(Debug, Error)]
pub enum LinkStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persisted link records. Artifact references are only ever changed one
/// column at a time, keyed by link id.
#[async_trait::async_trait]
pub trait LinkStore: Send + Sync {
    async fn insert(&self, link: NewLink) -> Result<Link, LinkStoreError>;

    async fn get(&self, id: LinkId) -> Result<Option<Link>, LinkStoreError>;

    /// Returns `false` when the link no longer exists.
    async fn set_artifact(
        &self,
        id: LinkId,
        format: ArchiveFormat,
        path: Option<&str>,
    ) -> Result<bool, LinkStoreError>;

    /// Removes the record and returns it as it was.
    async fn delete(&self, id: LinkId) -> Result<Option<Link>, LinkStoreError>;

    /// Sets `preserved_at` unless a re-archive was requested since
    /// `generation` was read. Returns `false` when nothing was marked.
    async fn mark_preserved(
        &self,
        id: LinkId,
        generation: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, LinkStoreError>;

    /// Clears `preserved_at` and bumps the archive generation.
    async fn reset_preserved(&self, id: LinkId) -> Result<bool, LinkStoreError>;

    /// Oldest links first.
    async fn unpreserved(&self, limit: u32) -> Result<Vec<Link>, LinkStoreError>;

    /// Ids of every link without `preserved_at`, i.e. with archiving work
    /// queued, running or still to be picked up.
    async fn unpreserved_ids(&self) -> Result<Vec<LinkId>, LinkStoreError>;

    /// Every artifact path referenced by any link.
    async fn referenced_paths(&self) -> Result<Vec<String>, LinkStoreError>;
}

pub struct SqliteLinkStore {
    pool: SqlitePool,
}

impl SqliteLinkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects and creates the schema if needed.
    pub async fn connect(url: &str) -> Result<Self, LinkStoreError> {
        let options = url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect_with(options)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self, LinkStoreError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), LinkStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                pdf TEXT,
                monolith TEXT,
                screenshot TEXT,
                readable TEXT,
                preserved_at TEXT,
                archive_generation INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS links_unpreserved ON links (preserved_at, created_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn column(format: ArchiveFormat) -> &'static str {
    match format {
        ArchiveFormat::Pdf => "pdf",
        ArchiveFormat::Monolith => "monolith",
        ArchiveFormat::Screenshot => "screenshot",
        ArchiveFormat::Readability => "readable",
    }
}

fn link_from_row(row: &SqliteRow) -> Result<Link, sqlx::Error> {
    Ok(Link {
        id: row.try_get("id")?,
        collection_id: row.try_get("collection_id")?,
        url: row.try_get("url")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        pdf: row.try_get("pdf")?,
        monolith: row.try_get("monolith")?,
        screenshot: row.try_get("screenshot")?,
        readable: row.try_get("readable")?,
        preserved_at: row.try_get("preserved_at")?,
        archive_generation: row.try_get("archive_generation")?,
    })
}

#[async_trait::async_trait]
impl LinkStore for SqliteLinkStore {
    async fn insert(&self, link: NewLink) -> Result<Link, LinkStoreError> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO links (collection_id, url, name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(link.collection_id)
        .bind(&link.url)
        .bind(&link.name)
        .bind(&link.description)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(link_from_row(&row)?)
    }

    async fn get(&self, id: LinkId) -> Result<Option<Link>, LinkStoreError> {
        let row = sqlx::query(&format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(link_from_row).transpose()?)
    }

    async fn set_artifact(
        &self,
        id: LinkId,
        format: ArchiveFormat,
        path: Option<&str>,
    ) -> Result<bool, LinkStoreError> {
        let result = sqlx::query(&format!(
            "UPDATE links SET {} = ?, updated_at = ? WHERE id = ?",
            column(format)
        ))
        .bind(path)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: LinkId) -> Result<Option<Link>, LinkStoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM links WHERE id = ? RETURNING {LINK_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(link_from_row).transpose()?)
    }

    async fn mark_preserved(
        &self,
        id: LinkId,
        generation: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, LinkStoreError> {
        let result = sqlx::query(
            "UPDATE links SET preserved_at = ? WHERE id = ? AND archive_generation = ?",
        )
        .bind(at)
        .bind(id)
        .bind(generation)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_preserved(&self, id: LinkId) -> Result<bool, LinkStoreError> {
        let result = sqlx::query(
            "UPDATE links SET preserved_at = NULL, archive_generation = archive_generation + 1 \
             WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unpreserved(&self, limit: u32) -> Result<Vec<Link>, LinkStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LINK_COLUMNS} FROM links
            WHERE preserved_at IS NULL
            ORDER BY created_at, id
            LIMIT ?
            "#
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(link_from_row).collect::<Result<_, _>>()?)
    }

    async fn unpreserved_ids(&self) -> Result<Vec<LinkId>, LinkStoreError> {
        let rows = sqlx::query("SELECT id FROM links WHERE preserved_at IS NULL")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<LinkId, _>(0))
            .collect::<Result<_, _>>()?)
    }

    async fn referenced_paths(&self) -> Result<Vec<String>, LinkStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT pdf AS path FROM links WHERE pdf IS NOT NULL
            UNION SELECT monolith FROM links WHERE monolith IS NOT NULL
            UNION SELECT screenshot FROM links WHERE screenshot IS NOT NULL
            UNION SELECT readable FROM links WHERE readable IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<_, _>>()?)
    }
}
