//! Client-side identity resolution
//!
//! First visit generates a temporary id and asks the server to issue a
//! canonical record over REST; later visits reuse whatever the device store
//! holds. Resolution failing closed is the point: until an identity exists,
//! every chat action is rejected with `IdentityUnresolved` rather than
//! guessed at.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use shoptalk_shared::{CustomerProfile, Identity, IdentityId, IdentityKind};

use crate::error::{ChatClientError, ChatClientResult};

/// A successfully resolved identity, tagged by durability.
#[derive(Debug, Clone)]
pub enum ResolvedIdentity {
    Temporary(Identity),
    Durable(Identity),
}

impl ResolvedIdentity {
    fn from_identity(identity: Identity) -> Self {
        match identity.kind {
            IdentityKind::Temporary => Self::Temporary(identity),
            IdentityKind::Durable => Self::Durable(identity),
        }
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Self::Temporary(i) | Self::Durable(i) => i,
        }
    }

    pub fn id(&self) -> &IdentityId {
        &self.identity().id
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }
}

/// Device-local persistence seam (browser storage, keychain, a file).
/// The in-memory impl backs tests and throwaway sessions.
pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Option<Identity>;
    fn save(&self, identity: &Identity);
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    slot: Mutex<Option<Identity>>,
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Option<Identity> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        }
    }

    fn save(&self, identity: &Identity) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(identity.clone());
        }
    }
}

#[derive(Serialize)]
struct IssueIdentityRequest<'a> {
    temporary_id: &'a IdentityId,
    profile: &'a CustomerProfile,
    device_fingerprint: &'a str,
}

#[derive(Serialize)]
struct PromoteIdentityRequest<'a> {
    profile: &'a CustomerProfile,
}

/// Resolves and caches the customer identity for this device.
pub struct IdentityResolver {
    http: reqwest::Client,
    base_url: String,
    storage: Arc<dyn IdentityStore>,
    resolved: Option<ResolvedIdentity>,
}

impl IdentityResolver {
    pub fn new(base_url: impl Into<String>, storage: Arc<dyn IdentityStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            storage,
            resolved: None,
        }
    }

    pub fn resolved(&self) -> Option<&ResolvedIdentity> {
        self.resolved.as_ref()
    }

    /// The resolved identity, or `IdentityUnresolved`. Chat entry points call
    /// this first so unresolved sessions fail closed.
    pub fn require_resolved(&self) -> ChatClientResult<&ResolvedIdentity> {
        self.resolved
            .as_ref()
            .ok_or(ChatClientError::IdentityUnresolved)
    }

    /// Resolve the identity for this device. A stored identity short-circuits
    /// issuance; otherwise a fresh temporary id is sent to the server. On
    /// network failure the resolver stays unresolved.
    pub async fn resolve(
        &mut self,
        device_fingerprint: &str,
    ) -> ChatClientResult<&ResolvedIdentity> {
        if self.resolved.is_some() {
            return self.require_resolved();
        }

        if let Some(stored) = self.storage.load() {
            tracing::debug!(identity_id = %stored.id, "reusing stored identity");
            self.resolved = Some(ResolvedIdentity::from_identity(stored));
            return self.require_resolved();
        }

        let temporary_id = IdentityId::temporary();
        let request = IssueIdentityRequest {
            temporary_id: &temporary_id,
            profile: &CustomerProfile::default(),
            device_fingerprint,
        };
        let identity: Identity = self
            .http
            .post(format!("{}/identities", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(identity_id = %identity.id, "identity issued");
        self.storage.save(&identity);
        self.resolved = Some(ResolvedIdentity::from_identity(identity));
        self.require_resolved()
    }

    /// Exchange a temporary identity for a durable one. One-way; calling on
    /// an already durable identity is an error.
    pub async fn promote(
        &mut self,
        profile: &CustomerProfile,
    ) -> ChatClientResult<&ResolvedIdentity> {
        let current = self.require_resolved()?;
        if current.is_durable() {
            return Err(ChatClientError::AlreadyDurable);
        }

        let identity: Identity = self
            .http
            .post(format!("{}/identities/{}/promote", self.base_url, current.id()))
            .json(&PromoteIdentityRequest { profile })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(identity_id = %identity.id, "identity promoted");
        self.storage.save(&identity);
        self.resolved = Some(ResolvedIdentity::from_identity(identity));
        self.require_resolved()
    }
}
