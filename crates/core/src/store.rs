//! Record store contract consumed by the workflow components.
//!
//! A store holds named collections of JSON documents wrapped in a common
//! envelope (id, timestamps, active flag, version). Implementations live in
//! `partsmart-db`; they share the write semantics defined here through
//! [`WriteOp::apply`] so that batches behave identically on every backend.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::timestamp;

pub type Fields = Map<String, Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_ACTIVE: &str = "active";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record `{id}` not found in `{collection}`")]
    NotFound { collection: String, id: RecordId },
    #[error("record `{id}` already exists in `{collection}`")]
    AlreadyExists { collection: String, id: RecordId },
    #[error("precondition failed on `{collection}/{id}`: `{field}` is {actual}")]
    PreconditionFailed { collection: String, id: RecordId, field: String, actual: String },
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("record decode error: {0}")]
    Decode(String),
}

/// A stored document with its envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
    pub version: u64,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: RecordId, fields: Fields, now: DateTime<Utc>) -> Self {
        Self { id, created_at: now, updated_at: now, active: true, version: 1, fields }
    }

    /// Looks up a field, resolving envelope fields before document fields.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            FIELD_ID => Some(Value::String(self.id.0.clone())),
            FIELD_CREATED_AT => Some(timestamp::to_value(self.created_at)),
            FIELD_UPDATED_AT => Some(timestamp::to_value(self.updated_at)),
            FIELD_ACTIVE => Some(Value::Bool(self.active)),
            _ => self.fields.get(name).cloned(),
        }
    }

    pub fn decode<T: Document>(self) -> Result<Stored<T>, StoreError> {
        let data = serde_json::from_value::<T>(Value::Object(self.fields)).map_err(|error| {
            StoreError::Decode(format!("{}/{}: {error}", T::COLLECTION, self.id))
        })?;
        Ok(Stored {
            id: T::Id::from(self.id),
            created_at: self.created_at,
            updated_at: self.updated_at,
            active: self.active,
            version: self.version,
            data,
        })
    }
}

pub trait DocumentId:
    Clone + Debug + Display + PartialEq + Eq + Send + Sync + From<RecordId> + 'static
{
    fn record_id(&self) -> RecordId;
}

/// A typed document living in a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    type Id: DocumentId;
}

/// A decoded document together with its envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct Stored<T: Document> {
    pub id: T::Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
    pub version: u64,
    pub data: T,
}

pub fn encode<T: Serialize>(document: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(document) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => {
            Err(StoreError::Decode(format!("documents must encode as objects, got {other}")))
        }
        Err(error) => Err(StoreError::Decode(error.to_string())),
    }
}

/// Field assignments and atomic increments applied to one record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    set: Fields,
    increment: BTreeMap<String, i64>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        *self.increment.entry(field.into()).or_insert(0) += by;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.increment.is_empty()
    }

    pub fn apply_to(&self, record: &mut Record) -> Result<(), StoreError> {
        for (field, value) in &self.set {
            if field == FIELD_ACTIVE {
                record.active = value.as_bool().ok_or_else(|| {
                    StoreError::Decode(format!("`{FIELD_ACTIVE}` must be a boolean, got {value}"))
                })?;
                continue;
            }
            record.fields.insert(field.clone(), value.clone());
        }

        for (field, by) in &self.increment {
            let current = match record.fields.get(field) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    StoreError::Decode(format!("cannot increment non-integer field `{field}`"))
                })?,
            };
            record.fields.insert(field.clone(), Value::from(current + by));
        }

        Ok(())
    }
}

/// Conditional-write guard: the field's current value must be one of `allowed`.
#[derive(Clone, Debug, PartialEq)]
pub struct Precondition {
    pub field: String,
    pub allowed: Vec<Value>,
}

impl Precondition {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), allowed: vec![value.into()] }
    }

    pub fn field_in<V>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        Self { field: field.into(), allowed: values.into_iter().map(Into::into).collect() }
    }

    pub fn holds_for(&self, record: &Record) -> bool {
        let actual = record.field(&self.field).unwrap_or(Value::Null);
        self.allowed.iter().any(|allowed| values_equal(&actual, allowed))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Create { collection: String, id: RecordId, fields: Fields },
    Update { collection: String, id: RecordId, patch: Patch, precondition: Option<Precondition> },
    Delete { collection: String, id: RecordId },
}

impl WriteOp {
    pub fn create(collection: impl Into<String>, id: RecordId, fields: Fields) -> Self {
        Self::Create { collection: collection.into(), id, fields }
    }

    pub fn update(collection: impl Into<String>, id: RecordId, patch: Patch) -> Self {
        Self::Update { collection: collection.into(), id, patch, precondition: None }
    }

    pub fn delete(collection: impl Into<String>, id: RecordId) -> Self {
        Self::Delete { collection: collection.into(), id }
    }

    /// Attaches a guard to an update; other operations are returned unchanged.
    pub fn guarded(self, guard: Precondition) -> Self {
        match self {
            Self::Update { collection, id, patch, .. } => {
                Self::Update { collection, id, patch, precondition: Some(guard) }
            }
            other => other,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &RecordId {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    /// Computes the record that results from applying this operation to
    /// `current`. `None` means the record is absent afterwards.
    pub fn apply(
        &self,
        current: Option<&Record>,
        now: DateTime<Utc>,
    ) -> Result<Option<Record>, StoreError> {
        match self {
            Self::Create { collection, id, fields } => {
                if current.is_some() {
                    return Err(StoreError::AlreadyExists {
                        collection: collection.clone(),
                        id: id.clone(),
                    });
                }
                Ok(Some(Record::new(id.clone(), fields.clone(), now)))
            }
            Self::Update { collection, id, patch, precondition } => {
                let Some(current) = current else {
                    return Err(StoreError::NotFound {
                        collection: collection.clone(),
                        id: id.clone(),
                    });
                };
                if let Some(guard) = precondition {
                    if !guard.holds_for(current) {
                        let actual = current.field(&guard.field).unwrap_or(Value::Null);
                        return Err(StoreError::PreconditionFailed {
                            collection: collection.clone(),
                            id: id.clone(),
                            field: guard.field.clone(),
                            actual: actual.to_string(),
                        });
                    }
                }
                let mut next = current.clone();
                patch.apply_to(&mut next)?;
                next.updated_at = now;
                next.version += 1;
                Ok(Some(next))
            }
            Self::Delete { .. } => Ok(None),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.field(&self.field) else {
            return false;
        };
        if self.op == FilterOp::Eq {
            return values_equal(&actual, &self.value);
        }
        match compare_values(&actual, &self.value) {
            Some(ordering) => match self.op {
                FilterOp::Lt => ordering == Ordering::Less,
                FilterOp::Lte => ordering != Ordering::Greater,
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
                FilterOp::Eq => ordering == Ordering::Equal,
            },
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order_by: Option<(String, Direction)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter { field: field.into(), op, value: value.into() });
        self
    }

    pub fn filter_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn newest_first(self) -> Self {
        self.order_by(FIELD_CREATED_AT, Direction::Descending)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|filter| filter.matches(record))
    }

    /// Filters, orders and truncates `records` in memory.
    pub fn apply(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut matched: Vec<Record> =
            records.into_iter().filter(|record| self.matches(record)).collect();

        if let Some((field, direction)) = &self.order_by {
            matched.sort_by(|left, right| {
                let ordering = match (left.field(field), right.field(field)) {
                    (Some(a), Some(b)) => compare_values(&a, &b).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                let ordering = ordering.then_with(|| left.id.cmp(&right.id));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Orders two JSON values, treating timestamps and decimal strings by value.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => {
            if let (Some(a), Some(b)) = (timestamp::parse_str(a), timestamp::parse_str(b)) {
                return Some(a.cmp(&b));
            }
            if let (Ok(a), Ok(b)) = (a.parse::<Decimal>(), b.parse::<Decimal>()) {
                return Some(a.cmp(&b));
            }
            Some(a.cmp(b))
        }
        _ => match (timestamp::from_value(left), timestamp::from_value(right)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        },
    }
}

/// Equality for filters and preconditions. Two strings match only when they are
/// identical, so ids like `0771` and `771` stay distinct; value coercion applies
/// across encodings, e.g. a timestamp string against a timestamp object.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => a == b,
        _ => left == right || compare_values(left, right) == Some(Ordering::Equal),
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_id(&self, collection: &str, id: &RecordId)
        -> Result<Option<Record>, StoreError>;

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Record>, StoreError>;

    /// Applies every operation or none of them.
    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<(), StoreError>;

    async fn create(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        self.create_with_id(collection, &id, fields).await?;
        Ok(id)
    }

    async fn create_with_id(
        &self,
        collection: &str,
        id: &RecordId,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::create(collection, id.clone(), fields)]).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &RecordId,
        patch: Patch,
    ) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::update(collection, id.clone(), patch)]).await
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> Result<(), StoreError> {
        self.batch_write(vec![WriteOp::delete(collection, id.clone())]).await
    }
}

/// Typed access on top of any [`RecordStore`].
#[async_trait]
pub trait DocumentStore: RecordStore {
    async fn insert_document<T: Document>(&self, document: &T) -> Result<T::Id, StoreError> {
        let fields = encode(document)?;
        let id = self.create(T::COLLECTION, fields).await?;
        Ok(T::Id::from(id))
    }

    async fn fetch_document<T: Document>(
        &self,
        id: &T::Id,
    ) -> Result<Option<Stored<T>>, StoreError> {
        match self.get_by_id(T::COLLECTION, &id.record_id()).await? {
            Some(record) => Ok(Some(record.decode()?)),
            None => Ok(None),
        }
    }

    async fn find_documents<T: Document>(
        &self,
        query: Query,
    ) -> Result<Vec<Stored<T>>, StoreError> {
        self.query(T::COLLECTION, query).await?.into_iter().map(Record::decode::<T>).collect()
    }
}

impl<S: RecordStore + ?Sized> DocumentStore for S {}
