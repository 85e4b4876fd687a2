use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use partsmart_core::store::{Query, Record, RecordId, RecordStore, StoreError, WriteOp};

type Collection = BTreeMap<RecordId, Record>;

/// Process-local store for tests, demos and the `memory` backend.
#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|records| records.get(id)).cloned())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError> {
        let collections = self.collections.read().await;
        let records = collections.get(collection).into_iter().flat_map(|records| records.values());
        Ok(query.apply(records.cloned()))
    }

    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let now = Utc::now();

        // Stage results so a failing operation leaves every collection untouched.
        let mut staged: HashMap<(String, RecordId), Option<Record>> = HashMap::new();
        for operation in &operations {
            let key = (operation.collection().to_owned(), operation.id().clone());
            let current = match staged.get(&key) {
                Some(staged_record) => staged_record.clone(),
                None => collections
                    .get(operation.collection())
                    .and_then(|records| records.get(operation.id()))
                    .cloned(),
            };
            let next = operation.apply(current.as_ref(), now)?;
            staged.insert(key, next);
        }

        for ((collection, id), record) in staged {
            let records = collections.entry(collection).or_default();
            match record {
                Some(record) => {
                    records.insert(id, record);
                }
                None => {
                    records.remove(&id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use partsmart_core::store::{
        Patch, Precondition, Query, RecordId, RecordStore, StoreError, WriteOp,
    };

    use super::InMemoryRecordStore;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn failed_precondition_discards_the_whole_batch() {
        let store = InMemoryRecordStore::new();
        let quotation = RecordId::from("q-1");
        store
            .create_with_id("quotations", &quotation, fields(json!({ "status": "accepted" })))
            .await
            .expect("seed quotation");

        let error = store
            .batch_write(vec![
                WriteOp::create("purchase_orders", RecordId::from("po-1"), fields(json!({}))),
                WriteOp::update(
                    "quotations",
                    quotation.clone(),
                    Patch::new().set("status", "accepted"),
                )
                .guarded(Precondition::field_equals("status", "pending")),
            ])
            .await
            .expect_err("quotation is not pending");

        assert!(
            matches!(error, StoreError::PreconditionFailed { ref field, .. } if field == "status")
        );
        assert_eq!(store.len("purchase_orders").await, 0);
        let untouched = store.get_by_id("quotations", &quotation).await.expect("read");
        assert_eq!(untouched.map(|record| record.version), Some(1));
    }

    #[tokio::test]
    async fn increments_accumulate_within_and_across_batches() {
        let store = InMemoryRecordStore::new();
        let id = RecordId::from("req-1");
        store.create_with_id("quotation_requests", &id, fields(json!({}))).await.expect("seed");

        store
            .batch_write(vec![
                WriteOp::update("quotation_requests", id.clone(), Patch::new().increment("n", 1)),
                WriteOp::update("quotation_requests", id.clone(), Patch::new().increment("n", 1)),
            ])
            .await
            .expect("double increment");
        store
            .update("quotation_requests", &id, Patch::new().increment("n", 1))
            .await
            .expect("single increment");

        let record =
            store.get_by_id("quotation_requests", &id).await.expect("read").expect("exists");
        assert_eq!(record.fields.get("n"), Some(&json!(3)));
        assert_eq!(record.version, 4);
    }

    #[tokio::test]
    async fn create_with_existing_id_is_rejected() {
        let store = InMemoryRecordStore::new();
        let id = RecordId::from("ord-po-1");
        store.create_with_id("orders", &id, fields(json!({}))).await.expect("first create");

        let error = store
            .create_with_id("orders", &id, fields(json!({})))
            .await
            .expect_err("duplicate id");
        assert!(matches!(error, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn query_filters_and_orders_newest_first() {
        let store = InMemoryRecordStore::new();
        for (id, buyer) in [("a", "buyer-1"), ("b", "buyer-2"), ("c", "buyer-1")] {
            let document = fields(json!({ "buyer_id": buyer }));
            store
                .create_with_id("quotations", &RecordId::from(id), document)
                .await
                .expect("seed");
        }

        let found = store
            .query("quotations", Query::new().filter_eq("buyer_id", "buyer-1").newest_first())
            .await
            .expect("query");
        let ids: Vec<&str> = found.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a") && ids.contains(&"c"));
        assert!(found[0].created_at >= found[1].created_at);
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let store = InMemoryRecordStore::new();
        let error = store
            .update("orders", &RecordId::from("missing"), Patch::new().set("rating", 5))
            .await
            .expect_err("missing");
        assert!(matches!(error, StoreError::NotFound { .. }));
    }
}
