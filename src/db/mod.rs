//! Persistence for Favorr
//!
//! Store traits with MongoDB and in-memory implementations.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use mongo_store::MongoStore;
pub use store::{
    FavorChange, FavorFilter, FavorStore, RequestFilter, RequestStore, UserStore,
};

use crate::types::Result;

/// Handles to the three stores, shared by every component
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub favors: Arc<dyn FavorStore>,
    pub requests: Arc<dyn RequestStore>,
}

impl Stores {
    /// All three stores backed by one in-memory store
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            favors: store.clone(),
            requests: store,
        }
    }

    /// All three stores backed by MongoDB
    pub async fn mongo(mongo: &MongoClient) -> Result<Self> {
        let store = Arc::new(MongoStore::new(mongo).await?);
        Ok(Self {
            users: store.clone(),
            favors: store.clone(),
            requests: store,
        })
    }
}
