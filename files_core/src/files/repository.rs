use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{FileError, Result};
use super::models::{ToolRecord, UploadRecord};

/// Read access to persisted upload and tool file records.
///
/// Both lookups are batched: one call is one query no matter how many ids are
/// passed. Records owned by another tenant are never returned.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upload_records(&self, ids: &[Uuid], tenant_id: &str) -> Result<HashMap<Uuid, UploadRecord>>;
    async fn tool_records(&self, ids: &[Uuid], tenant_id: &str) -> Result<HashMap<Uuid, ToolRecord>>;
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS upload_files (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                extension TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                key TEXT NOT NULL,
                source_url TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tool_files (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                file_key TEXT NOT NULL,
                mimetype TEXT NOT NULL,
                size INTEGER NOT NULL,
                original_url TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_files_tenant_id ON upload_files (tenant_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tool_files_tenant_id ON tool_files (tenant_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_upload_record(&self, record: &UploadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_files (id, tenant_id, name, extension, mime_type, size, key, source_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(&record.extension)
        .bind(&record.mime_type)
        .bind(record.size)
        .bind(&record.key)
        .bind(&record.source_url)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_tool_record(&self, record: &ToolRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tool_files (id, tenant_id, name, file_key, mimetype, size, original_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(&record.file_key)
        .bind(&record.mimetype)
        .bind(record.size)
        .bind(&record.original_url)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_upload_record(&self, id: Uuid) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM upload_files WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(FileError::RecordNotFound(format!("Upload file not found for id: {}", id)));
        }

        Ok(())
    }
}

fn in_clause_sql(base: &str, count: usize) -> String {
    let placeholders = vec!["?"; count].join(", ");
    format!("{} WHERE tenant_id = ? AND id IN ({})", base, placeholders)
}

fn parse_id(row: &SqliteRow) -> Result<Uuid> {
    Uuid::parse_str(&row.get::<String, _>("id"))
        .map_err(|e| FileError::Database(format!("Invalid UUID: {}", e)))
}

fn parse_created_at(row: &SqliteRow) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
        .map_err(|e| FileError::Database(format!("Invalid datetime: {}", e)))?
        .with_timezone(&Utc))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upload_records(&self, ids: &[Uuid], tenant_id: &str) -> Result<HashMap<Uuid, UploadRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = in_clause_sql(
            "SELECT id, tenant_id, name, extension, mime_type, size, key, source_url, created_at FROM upload_files",
            ids.len(),
        );

        let mut query = sqlx::query(&sql).bind(tenant_id);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = HashMap::with_capacity(rows.len());
        for row in rows {
            let record = UploadRecord {
                id: parse_id(&row)?,
                tenant_id: row.get("tenant_id"),
                name: row.get("name"),
                extension: row.get("extension"),
                mime_type: row.get("mime_type"),
                size: row.get("size"),
                key: row.get("key"),
                source_url: row.get("source_url"),
                created_at: parse_created_at(&row)?,
            };
            records.insert(record.id, record);
        }

        Ok(records)
    }

    async fn tool_records(&self, ids: &[Uuid], tenant_id: &str) -> Result<HashMap<Uuid, ToolRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = in_clause_sql(
            "SELECT id, tenant_id, name, file_key, mimetype, size, original_url, created_at FROM tool_files",
            ids.len(),
        );

        let mut query = sqlx::query(&sql).bind(tenant_id);
        for id in ids {
            query = query.bind(id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = HashMap::with_capacity(rows.len());
        for row in rows {
            let record = ToolRecord {
                id: parse_id(&row)?,
                tenant_id: row.get("tenant_id"),
                name: row.get("name"),
                file_key: row.get("file_key"),
                mimetype: row.get("mimetype"),
                size: row.get("size"),
                original_url: row.get("original_url"),
                created_at: parse_created_at(&row)?,
            };
            records.insert(record.id, record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn create_test_store() -> (SqliteRecordStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let database_url = format!("sqlite:{}", temp_file.path().display());

        let pool = SqlitePool::connect(&database_url).await.unwrap();
        let store = SqliteRecordStore::new(pool);
        store.create_tables().await.unwrap();

        (store, temp_file)
    }

    fn upload_record(tenant_id: &str, name: &str) -> UploadRecord {
        let (stem, extension) = name.rsplit_once('.').unwrap();
        UploadRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            extension: extension.to_string(),
            mime_type: "application/pdf".to_string(),
            size: 2048,
            key: format!("upload_files/{}/{}.{}", tenant_id, stem, extension),
            source_url: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upload_records_batched_and_scoped() {
        let (store, _temp_file) = create_test_store().await;

        let a = upload_record("tenant-a", "a.pdf");
        let b = upload_record("tenant-a", "b.pdf");
        let other = upload_record("tenant-b", "c.pdf");
        for record in [&a, &b, &other] {
            store.insert_upload_record(record).await.unwrap();
        }

        let found = store
            .upload_records(&[a.id, b.id, other.id, Uuid::new_v4()], "tenant-a")
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[&a.id], a);
        assert_eq!(found[&b.id].key, b.key);
        assert!(!found.contains_key(&other.id));
    }

    #[tokio::test]
    async fn test_tool_records_round_trip() {
        let (store, _temp_file) = create_test_store().await;

        let record = ToolRecord {
            id: Uuid::new_v4(),
            tenant_id: "tenant-a".to_string(),
            name: "chart.png".to_string(),
            file_key: "tools/tenant-a/9f2c.png".to_string(),
            mimetype: "image/png".to_string(),
            size: 512,
            original_url: None,
            created_at: Utc::now(),
        };
        store.insert_tool_record(&record).await.unwrap();

        let found = store.tool_records(&[record.id], "tenant-a").await.unwrap();
        assert_eq!(found.get(&record.id), Some(&record));

        let found = store.tool_records(&[record.id], "tenant-b").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_empty_id_list() {
        let (store, _temp_file) = create_test_store().await;
        assert!(store.upload_records(&[], "tenant-a").await.unwrap().is_empty());
        assert!(store.tool_records(&[], "tenant-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_upload_record() {
        let (store, _temp_file) = create_test_store().await;
        let record = upload_record("tenant-a", "gone.pdf");
        store.insert_upload_record(&record).await.unwrap();

        store.delete_upload_record(record.id).await.unwrap();
        assert!(store.upload_records(&[record.id], "tenant-a").await.unwrap().is_empty());
        assert!(matches!(
            store.delete_upload_record(record.id).await,
            Err(FileError::RecordNotFound(_))
        ));
    }
}
