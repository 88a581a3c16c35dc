//! Per-origin permission (whitelist) store
//!
//! A [`Permission`] grants one web origin visibility of the wallet's
//! addresses. Absence of a record means no visibility. Revocation is
//! immediate: the next lookup after [`PermissionStore::revoke`] returns
//! `false`.

use crate::network::Network;
use crate::storage::{KeyValueStore, STORAGE_DAPP_WHITELIST};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Normalized web origin (`scheme://host[:port]`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Parse and normalize an origin or full URL
    pub fn parse(input: &str) -> Result<Self> {
        let url = url::Url::parse(input.trim())
            .map_err(|e| Error::InvalidOrigin(format!("{}: {}", input, e)))?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(Error::InvalidOrigin(format!("{}: opaque origin", input)));
        }
        Ok(Self(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Origin {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Origin::parse(&value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

/// A grant of account visibility to an origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub origin: Origin,
    /// Networks the grant covers; `None` covers all
    #[serde(default)]
    pub networks: Option<Vec<Network>>,
    pub granted_at: DateTime<Utc>,
}

impl Permission {
    /// Grant covering every network
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            networks: None,
            granted_at: Utc::now(),
        }
    }

    /// Restrict the grant to specific networks
    pub fn with_networks(mut self, networks: Vec<Network>) -> Self {
        self.networks = Some(networks);
        self
    }

    /// Whether the grant covers `network`
    pub fn covers(&self, network: Network) -> bool {
        self.networks
            .as_ref()
            .is_none_or(|networks| networks.contains(&network))
    }
}

/// Whitelist of origins, persisted under [`STORAGE_DAPP_WHITELIST`]
pub struct PermissionStore {
    store: Arc<dyn KeyValueStore>,
    grants: DashMap<Origin, Permission>,
    /// Serializes mutate-then-persist so snapshots land in order
    write_lock: Mutex<()>,
}

impl PermissionStore {
    /// Load persisted grants. A corrupt record set is discarded with a warning.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let grants = DashMap::new();

        if let Some(raw) = store.get_item(STORAGE_DAPP_WHITELIST).await? {
            match serde_json::from_str::<Vec<Permission>>(&raw) {
                Ok(records) => {
                    for permission in records {
                        grants.insert(permission.origin.clone(), permission);
                    }
                }
                Err(e) => warn!(error = %e, "Discarding unreadable dApp whitelist"),
            }
        }

        debug!(count = grants.len(), "Loaded dApp whitelist");
        Ok(Self {
            store,
            grants,
            write_lock: Mutex::new(()),
        })
    }

    /// Whether `origin` has any grant
    pub fn is_whitelisted(&self, origin: &Origin) -> bool {
        self.grants.contains_key(origin)
    }

    /// Whether `origin` has a grant covering `network`
    pub fn allows(&self, origin: &Origin, network: Network) -> bool {
        self.grants
            .get(origin)
            .is_some_and(|grant| grant.covers(network))
    }

    /// Fetch the grant for `origin`
    pub fn get(&self, origin: &Origin) -> Option<Permission> {
        self.grants.get(origin).map(|grant| grant.value().clone())
    }

    /// Grant `origin` visibility on every network
    pub async fn whitelist(&self, origin: &Origin) -> Result<Permission> {
        self.grant(Permission::new(origin.clone())).await
    }

    /// Insert or replace a grant. The map changes only once the new set is stored.
    pub async fn grant(&self, permission: Permission) -> Result<Permission> {
        let _guard = self.write_lock.lock().await;
        let mut records: Vec<Permission> = self
            .list()
            .into_iter()
            .filter(|record| record.origin != permission.origin)
            .collect();
        records.push(permission.clone());
        self.persist(records).await?;

        self.grants
            .insert(permission.origin.clone(), permission.clone());
        info!(origin = %permission.origin, "Origin whitelisted");
        Ok(permission)
    }

    /// Remove the grant for `origin`. Returns whether one existed.
    pub async fn revoke(&self, origin: &Origin) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if !self.grants.contains_key(origin) {
            return Ok(false);
        }

        let records: Vec<Permission> = self
            .list()
            .into_iter()
            .filter(|record| &record.origin != origin)
            .collect();
        self.persist(records).await?;

        self.grants.remove(origin);
        info!(origin = %origin, "Origin permission revoked");
        Ok(true)
    }

    /// All grants, ordered by origin
    pub fn list(&self) -> Vec<Permission> {
        let mut records: Vec<Permission> =
            self.grants.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.origin.cmp(&b.origin));
        records
    }

    /// Drop every grant
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove_item(STORAGE_DAPP_WHITELIST).await?;
        self.grants.clear();
        Ok(())
    }

    async fn persist(&self, mut records: Vec<Permission>) -> Result<()> {
        records.sort_by(|a, b| a.origin.cmp(&b.origin));
        let json = serde_json::to_string(&records)?;
        self.store.set_item(STORAGE_DAPP_WHITELIST, &json).await
    }
}

impl fmt::Debug for PermissionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionStore")
            .field("grants", &self.grants.len())
            .finish()
    }
}
