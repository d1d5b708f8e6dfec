//! Provider registry
//!
//! Routes every call to the provider registered for the resource kind.
//! Patterns are either an exact kind (`AWS::ECS::Service`) or a prefix ending
//! in `*` (`AWS::EC2::*`); the longest matching pattern wins.

use crate::provider::{
    Attributes, ProviderError, ProviderResult, Provisioned, ResourceProvider, ResourceRequest,
};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<(String, Arc<dyn ResourceProvider>)>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for every kind matching `pattern`
    pub fn register(mut self, pattern: impl Into<String>, provider: Arc<dyn ResourceProvider>) -> Self {
        let pattern = pattern.into();
        tracing::debug!(pattern = %pattern, provider = provider.name(), "Registered provider");
        self.providers.push((pattern, provider));
        self
    }

    /// Provider responsible for `kind`, if any
    pub fn provider_for(&self, kind: &str) -> Option<&Arc<dyn ResourceProvider>> {
        self.providers
            .iter()
            .filter(|(pattern, _)| matches_kind(pattern, kind))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, provider)| provider)
    }

    fn resolve(&self, kind: &str) -> ProviderResult<&Arc<dyn ResourceProvider>> {
        self.provider_for(kind).ok_or_else(|| {
            ProviderError::Permanent(format!("no provider registered for kind '{}'", kind))
        })
    }
}

fn matches_kind(pattern: &str, kind: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => kind.starts_with(prefix),
        None => pattern == kind,
    }
}

#[async_trait]
impl ResourceProvider for ProviderRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn create(&self, request: &ResourceRequest) -> ProviderResult<Provisioned> {
        self.resolve(&request.kind)?.create(request).await
    }

    async fn read(&self, kind: &str, physical_id: &str) -> ProviderResult<Attributes> {
        self.resolve(kind)?.read(kind, physical_id).await
    }

    async fn update(
        &self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> ProviderResult<Provisioned> {
        self.resolve(&request.kind)?
            .update(physical_id, request)
            .await
    }

    async fn delete(&self, kind: &str, physical_id: &str) -> ProviderResult<()> {
        self.resolve(kind)?.delete(kind, physical_id).await
    }

    async fn is_stable(&self, kind: &str, physical_id: &str) -> ProviderResult<bool> {
        self.resolve(kind)?.is_stable(kind, physical_id).await
    }
}
