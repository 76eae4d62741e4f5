//! Registry of search backends and their health.

use crate::search::backends::{failure_status, SearchBackend};
use crate::search::error::ErrorCategory;
use crate::search::result::{BackendResponse, BackendStatus, BackendType};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Health snapshot of one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: BackendStatus,
    pub last_error: Option<String>,
    /// Last failure was a missing or rejected session
    pub auth_failure: bool,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            status: BackendStatus::Unavailable,
            last_error: None,
            auth_failure: false,
            checked_at: None,
        }
    }
}

struct RegisteredBackend {
    backend: Arc<dyn SearchBackend>,
    health: RwLock<BackendHealth>,
    initialized: OnceCell<()>,
}

impl RegisteredBackend {
    fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            health: RwLock::new(BackendHealth::default()),
            initialized: OnceCell::new(),
        }
    }

    fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    fn update(&self, next: BackendHealth) {
        let mut health = self.health.write();
        if health.status != next.status {
            info!(
                backend = self.backend_type().as_str(),
                from = %health.status,
                to = %next.status,
                "Backend status changed"
            );
        }
        *health = next;
    }

    async fn probe(&self) {
        let next = match self.backend.probe().await {
            Ok(()) => BackendHealth {
                status: BackendStatus::Available,
                last_error: None,
                auth_failure: false,
                checked_at: Some(Utc::now()),
            },
            Err(err) => {
                debug!(backend = self.backend_type().as_str(), error = %err, "Backend probe failed");
                BackendHealth {
                    status: failure_status(&err),
                    last_error: Some(err.to_string()),
                    auth_failure: err.category() == ErrorCategory::Authentication,
                    checked_at: Some(Utc::now()),
                }
            }
        };
        self.update(next);
    }

    /// Probe once, on first use
    async fn ensure_initialized(&self) {
        self.initialized.get_or_init(|| self.probe()).await;
    }

    fn is_available(&self) -> bool {
        self.health.read().status == BackendStatus::Available
    }
}

/// Fixed set of backends in registration order
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<RegisteredBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend; a backend of the same type is replaced in place
    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) {
        let backend_type = backend.backend_type();
        let entry = RegisteredBackend::new(backend);

        match self.backends.iter().position(|b| b.backend_type() == backend_type) {
            Some(pos) => self.backends[pos] = entry,
            None => self.backends.push(entry),
        }
        info!(backend = backend_type.as_str(), "Registered search backend");
    }

    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, backend_type: BackendType) -> Option<Arc<dyn SearchBackend>> {
        self.entry(backend_type).map(|entry| entry.backend.clone())
    }

    /// Registered backend types, in registration order
    pub fn backend_types(&self) -> Vec<BackendType> {
        self.backends.iter().map(RegisteredBackend::backend_type).collect()
    }

    fn entry(&self, backend_type: BackendType) -> Option<&RegisteredBackend> {
        self.backends.iter().find(|b| b.backend_type() == backend_type)
    }

    async fn ensure_initialized(&self) {
        for entry in &self.backends {
            entry.ensure_initialized().await;
        }
    }

    /// Backends currently reporting `available`, in registration order
    pub async fn available_backends(&self) -> Vec<Arc<dyn SearchBackend>> {
        self.ensure_initialized().await;
        self.backends
            .iter()
            .filter(|entry| entry.is_available())
            .map(|entry| entry.backend.clone())
            .collect()
    }

    /// First available backend in registration order
    pub async fn primary_backend(&self) -> Option<Arc<dyn SearchBackend>> {
        self.available_backends().await.into_iter().next()
    }

    async fn pick(&self, requested: Option<BackendType>) -> Option<Arc<dyn SearchBackend>> {
        match requested {
            Some(backend_type) => {
                let entry = self.entry(backend_type)?;
                entry.ensure_initialized().await;
                entry.is_available().then(|| entry.backend.clone())
            }
            None => self.primary_backend().await,
        }
    }

    /// Resolve the requested backend, or the primary one; re-probes once if nothing is available
    pub async fn resolve(&self, requested: Option<BackendType>) -> Option<Arc<dyn SearchBackend>> {
        if let Some(backend) = self.pick(requested).await {
            return Some(backend);
        }

        debug!("No backend available, re-probing");
        self.refresh().await;
        self.pick(requested).await
    }

    /// Fold the outcome of a search into the backend's health
    pub fn record_response(&self, response: &BackendResponse) {
        let Some(entry) = self.entry(response.backend_type) else {
            return;
        };
        entry.update(BackendHealth {
            status: response.status,
            last_error: response.error_message.clone(),
            auth_failure: response.error_category == Some(ErrorCategory::Authentication),
            checked_at: Some(Utc::now()),
        });
    }

    /// Whether any backend's last failure was an authentication failure
    pub async fn has_auth_failure(&self) -> bool {
        self.ensure_initialized().await;
        self.backends.iter().any(|entry| entry.health.read().auth_failure)
    }

    /// Health of every backend, keyed by backend name
    pub async fn status_report(&self) -> BTreeMap<String, BackendHealth> {
        self.ensure_initialized().await;
        self.backends
            .iter()
            .map(|entry| (entry.backend_type().to_string(), entry.health.read().clone()))
            .collect()
    }

    /// Status of every backend, keyed by backend name
    pub async fn statuses(&self) -> BTreeMap<String, BackendStatus> {
        self.status_report()
            .await
            .into_iter()
            .map(|(name, health)| (name, health.status))
            .collect()
    }

    /// Re-probe every backend
    pub async fn refresh(&self) {
        for entry in &self.backends {
            entry.probe().await;
            // A refresh counts as the first probe
            let _ = entry.initialized.set(());
        }
    }
}
