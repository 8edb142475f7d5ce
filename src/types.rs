use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{error::DbError, utils::HandyRwLock};

pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = Result<Pod<T>, DbError>;
pub type DbResult = Result<(), DbError>;

/// A `HashMap` behind its own `RwLock`, so the buffer pool can expose
/// `&self` methods while many transactions touch it concurrently.
pub struct ConcurrentHashMap<K, V> {
    map: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> ConcurrentHashMap<K, V> {
    pub fn new() -> Self {
        Self {
            map: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        K: std::cmp::Eq + std::hash::Hash,
        V: Clone,
    {
        self.map.rl().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        K: std::cmp::Eq + std::hash::Hash,
    {
        self.map.wl().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V>
    where
        K: std::cmp::Eq + std::hash::Hash,
    {
        self.map.wl().remove(key)
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.map.rl().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.map.rl().len()
    }

    pub fn clear(&self) {
        self.map.wl().clear();
    }
}
