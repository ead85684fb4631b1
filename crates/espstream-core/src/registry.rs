//! Subscription registry.
//!
//! Holds per-subscription state: negotiated wire format, requested field
//! allowlist and, once announced by the server, the field schema. Written
//! by `subscribe` callers and by the inbound frame task, so every access
//! goes through one lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::codec::WireFormat;
use crate::error::RegistryError;
use crate::types::SchemaFieldType;

/// Field name → declared type.
pub type FieldSchema = HashMap<String, SchemaFieldType>;

/// Server-visible subscription id: `{project}/{cq}/{window}/{token}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Generate a fresh id for a window. Repeated calls for the same window
    /// never collide.
    pub fn generate(project: &str, cq: &str, window: &str) -> Self {
        Self(format!(
            "{}/{}",
            window_path(project, cq, window),
            Uuid::new_v4()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `project/cq/window` part of the id, if it has one.
    pub fn window_path(&self) -> Option<&str> {
        let (path, token) = self.0.rsplit_once('/')?;
        (!token.is_empty() && path.split('/').count() == 3).then_some(path)
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `project/cq/window`.
pub fn window_path(project: &str, cq: &str, window: &str) -> String {
    format!("{project}/{cq}/{window}")
}

/// Client-side state of one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub format: WireFormat,
    pub fields: Vec<String>,
    /// Absent until the server's schema message arrives
    pub schema: Option<FieldSchema>,
}

impl Subscription {
    pub fn new(format: WireFormat, fields: Vec<String>) -> Self {
        Self {
            format,
            fields,
            schema: None,
        }
    }

    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }
}

/// Thread-safe subscription registry. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, Subscription>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, Subscription>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a subscription with an empty schema.
    pub fn register(&self, id: SubscriptionId, format: WireFormat, fields: Vec<String>) {
        self.write().insert(id, Subscription::new(format, fields));
    }

    /// Set the schema of a subscription, replacing any earlier one.
    pub fn attach_schema(&self, id: &SubscriptionId, schema: FieldSchema) -> Result<(), RegistryError> {
        match self.write().get_mut(id) {
            Some(sub) => {
                sub.schema = Some(schema);
                Ok(())
            }
            None => Err(RegistryError::NotFound { id: id.to_string() }),
        }
    }

    /// Snapshot of one subscription.
    pub fn get(&self, id: &SubscriptionId) -> Result<Subscription, RegistryError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Drop a subscription whose request never reached the server.
    pub fn remove(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.write().remove(id)
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
