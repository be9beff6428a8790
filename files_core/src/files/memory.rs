//! In-memory record store

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;
use super::models::{ToolRecord, UploadRecord};
use super::repository::RecordStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub upload_queries: usize,
    pub tool_queries: usize,
}

impl QueryStats {
    pub fn total(&self) -> usize {
        self.upload_queries + self.tool_queries
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    uploads: Arc<RwLock<HashMap<Uuid, UploadRecord>>>,
    tools: Arc<RwLock<HashMap<Uuid, ToolRecord>>>,
    upload_queries: Arc<AtomicUsize>,
    tool_queries: Arc<AtomicUsize>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_upload(&self, record: UploadRecord) {
        self.uploads.write().insert(record.id, record);
    }

    pub fn insert_tool(&self, record: ToolRecord) {
        self.tools.write().insert(record.id, record);
    }

    pub fn remove_upload(&self, id: &Uuid) -> Option<UploadRecord> {
        self.uploads.write().remove(id)
    }

    pub fn remove_tool(&self, id: &Uuid) -> Option<ToolRecord> {
        self.tools.write().remove(id)
    }

    pub fn stats(&self) -> QueryStats {
        QueryStats {
            upload_queries: self.upload_queries.load(Ordering::Relaxed),
            tool_queries: self.tool_queries.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.upload_queries.store(0, Ordering::Relaxed);
        self.tool_queries.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upload_records(&self, ids: &[Uuid], tenant_id: &str) -> Result<HashMap<Uuid, UploadRecord>> {
        self.upload_queries.fetch_add(1, Ordering::Relaxed);

        let uploads = self.uploads.read();
        Ok(ids
            .iter()
            .filter_map(|id| uploads.get(id))
            .filter(|record| record.tenant_id == tenant_id)
            .map(|record| (record.id, record.clone()))
            .collect())
    }

    async fn tool_records(&self, ids: &[Uuid], tenant_id: &str) -> Result<HashMap<Uuid, ToolRecord>> {
        self.tool_queries.fetch_add(1, Ordering::Relaxed);

        let tools = self.tools.read();
        Ok(ids
            .iter()
            .filter_map(|id| tools.get(id))
            .filter(|record| record.tenant_id == tenant_id)
            .map(|record| (record.id, record.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tool_record(tenant_id: &str) -> ToolRecord {
        ToolRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: "out.txt".to_string(),
            file_key: "tools/out.txt".to_string(),
            mimetype: "text/plain".to_string(),
            size: 3,
            original_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lookups_are_tenant_scoped_and_counted() {
        let store = InMemoryRecordStore::new();
        let mine = tool_record("tenant-a");
        let theirs = tool_record("tenant-b");
        store.insert_tool(mine.clone());
        store.insert_tool(theirs.clone());

        let found = store.tool_records(&[mine.id, theirs.id], "tenant-a").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&mine.id));

        let found = store.upload_records(&[], "tenant-a").await.unwrap();
        assert!(found.is_empty());

        assert_eq!(store.stats(), QueryStats { upload_queries: 1, tool_queries: 1 });
        store.reset_stats();
        assert_eq!(store.stats().total(), 0);
    }
}
