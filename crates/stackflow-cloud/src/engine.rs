//! Reconciliation engine
//!
//! Drives every resource of a stack to its declared state, one wave at a
//! time. Resources of a wave are reconciled concurrently; a wave starts only
//! after every resource of the previous one reached a terminal status.
//!
//! Per resource:
//!
//! 1. properties are evaluated against the resources provisioned so far
//! 2. with a prior record, the resource is read back: an unchanged
//!    fingerprint is a no-op, a changed one an update, a vanished resource a
//!    create; a kind change replaces the resource
//! 3. after a create or update the engine waits for `is_stable`, then reads
//!    the attributes again
//!
//! A failure marks every resource relying on it `Skipped`. Nothing is rolled
//! back.

use crate::action::{ActionType, Plan};
use crate::error::Result;
use crate::provider::{
    ProviderError, ProviderResult, ResourceProvider, ResourceRequest, RetryConfig, WaitConfig,
};
use crate::report::{ResourceOutcome, RunKind, RunReport};
use crate::state::{ResourceRecord, ResourceStatus, StackState, deletion_order, fingerprint};
use futures_util::future::join_all;
use stackflow_core::{
    DeletionPolicy, DependencyGraph, ParameterValues, ResolvedResource, Resource, Scope, Stack,
    project_outputs,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared flag requesting a run to stop at the next wave boundary
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of reconciling one resource
struct Settled {
    outcome: ResourceOutcome,
    /// New state record; `None` leaves the prior record untouched
    record: Option<ResourceRecord>,
}

struct Failure {
    action: ActionType,
    error: ProviderError,
    record: Option<ResourceRecord>,
}

type Converged = std::result::Result<(ActionType, ResourceRecord), Failure>;

pub struct Reconciler {
    provider: Arc<dyn ResourceProvider>,
    retry: RetryConfig,
    wait: WaitConfig,
    cancel: CancelFlag,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            retry: RetryConfig::default(),
            wait: WaitConfig::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// What `apply` would do, without calling the provider
    pub fn plan(
        &self,
        stack: &Stack,
        parameters: &ParameterValues,
        state: &StackState,
    ) -> Result<Plan> {
        Plan::compute(stack, parameters, state)
    }

    /// Bring every declared resource to its declared state.
    ///
    /// Validation errors (cycles, dangling references) are returned before
    /// any provider call. Provider failures are not errors: they end up in the
    /// returned report, and `state` records whatever exists afterwards.
    #[tracing::instrument(skip_all, fields(stack = %state.stack_name))]
    pub async fn apply(
        &self,
        stack: &Stack,
        parameters: &ParameterValues,
        state: &mut StackState,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let graph = DependencyGraph::new(stack)?;
        let waves = graph.waves()?;
        info!(resources = graph.len(), waves = waves.len(), "Applying stack");

        let mut report = RunReport::new(RunKind::Apply, &state.stack_name);
        for (name, resource) in &stack.resources {
            report.record(ResourceOutcome::pending(name, &resource.kind));
        }
        let mut resolved: HashMap<String, ResolvedResource> = HashMap::new();
        let ranks: HashMap<&str, usize> = waves
            .iter()
            .flatten()
            .enumerate()
            .map(|(rank, name)| (name.as_str(), rank))
            .collect();

        for (index, wave) in waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(wave = index, "Cancelled, remaining resources stay pending");
                report.cancelled = true;
                break;
            }
            debug!(wave = index, resources = ?wave, "Starting wave");

            let mut tasks = Vec::new();
            for name in wave {
                let Some(resource) = stack.resource(name) else {
                    continue;
                };

                if let Some(blocker) = resource
                    .dependencies
                    .iter()
                    .find(|d| report.status_of(d) != Some(ResourceStatus::Available))
                {
                    warn!(resource = %name, dependency = %blocker, "Skipping");
                    report.record(
                        ResourceOutcome::pending(name, &resource.kind)
                            .with_status(ResourceStatus::Skipped, ActionType::NoOp)
                            .with_error(format!("dependency '{}' is not available", blocker)),
                    );
                    continue;
                }

                let properties = match Scope::new(parameters, &resolved)
                    .evaluate_properties(&resource.properties)
                {
                    Ok(properties) => properties,
                    Err(e) => {
                        let message = parameters.redact(&e.to_string());
                        warn!(resource = %name, error = %message, "Could not evaluate properties");
                        report.record(
                            ResourceOutcome::pending(name, &resource.kind)
                                .with_status(ResourceStatus::Failed, ActionType::NoOp)
                                .with_error(message),
                        );
                        continue;
                    }
                };

                let order = ranks.get(name.as_str()).copied().unwrap_or_default();
                let prior = state.get_resource(name).cloned();
                tasks.push(self.reconcile(resource, properties, prior, order, parameters));
            }

            for settled in join_all(tasks).await {
                let name = settled.outcome.name.clone();
                if settled.outcome.status == ResourceStatus::Failed {
                    let dependents = graph.transitive_dependents(&name);
                    if !dependents.is_empty() {
                        warn!(resource = %name, ?dependents, "Dependents will be skipped");
                    }
                }
                if let Some(record) = settled.record {
                    if record.status == ResourceStatus::Available {
                        resolved.insert(name.clone(), record.resolved());
                    }
                    state.set_resource(name, record);
                }
                report.record(settled.outcome);
            }
        }

        if report.failed().is_empty() && report.skipped().is_empty() && !report.cancelled {
            self.prune(stack, parameters, state, &mut report).await;
        }

        state.outputs.clear();
        if report.is_success() {
            match project_outputs(stack, parameters, &resolved) {
                Ok(outputs) => {
                    state.outputs = outputs.clone();
                    report.outputs = Some(outputs);
                }
                Err(e) => {
                    let message = parameters.redact(&e.to_string());
                    warn!(error = %message, "Output projection failed");
                    report.output_error = Some(message);
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("Apply finished: {}", report);
        Ok(report)
    }

    /// Delete every resource of the stack in reverse dependency order.
    ///
    /// Resources with `DeletionPolicy: Retain` are only forgotten. A
    /// resource whose dependent could not be deleted is skipped.
    #[tracing::instrument(skip_all, fields(stack = %state.stack_name))]
    pub async fn destroy(
        &self,
        stack: &Stack,
        parameters: &ParameterValues,
        state: &mut StackState,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let graph = DependencyGraph::new(stack)?;
        let waves = graph.reverse_waves()?;
        info!(resources = graph.len(), "Destroying stack");

        let mut report = RunReport::new(RunKind::Destroy, &state.stack_name);
        for (name, resource) in &stack.resources {
            report.record(ResourceOutcome::pending(name, &resource.kind));
        }
        state.outputs.clear();

        // Nothing declared can depend on an undeclared resource
        self.prune(stack, parameters, state, &mut report).await;

        for (index, wave) in waves.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(wave = index, "Cancelled, remaining resources stay pending");
                report.cancelled = true;
                break;
            }
            debug!(wave = index, resources = ?wave, "Starting wave");

            let mut tasks = Vec::new();
            for name in wave {
                let Some(resource) = stack.resource(name) else {
                    continue;
                };
                let pending = ResourceOutcome::pending(name, &resource.kind);

                if let Some(blocker) = graph
                    .dependents_of(name)
                    .into_iter()
                    .find(|d| report.status_of(d) != Some(ResourceStatus::Deleted))
                {
                    warn!(resource = %name, dependent = %blocker, "Skipping");
                    report.record(
                        pending
                            .with_status(ResourceStatus::Skipped, ActionType::NoOp)
                            .with_error(format!("dependent '{}' was not deleted", blocker)),
                    );
                    continue;
                }

                let Some(record) = state.get_resource(name).cloned() else {
                    debug!(resource = %name, "Never provisioned");
                    report.record(pending.with_status(ResourceStatus::Deleted, ActionType::NoOp));
                    continue;
                };

                if resource.deletion_policy == DeletionPolicy::Retain {
                    info!(
                        resource = %name,
                        physical_id = %record.physical_id,
                        "Retained, removing from state only"
                    );
                    state.remove_resource(name);
                    report.record(
                        pending
                            .with_status(ResourceStatus::Deleted, ActionType::NoOp)
                            .with_physical_id(record.physical_id),
                    );
                    continue;
                }

                tasks.push(self.delete_resource(name, record, parameters));
            }

            for (outcome, remaining) in join_all(tasks).await {
                match remaining {
                    Some(record) => state.set_resource(outcome.name.clone(), record),
                    None => {
                        state.remove_resource(&outcome.name);
                    }
                }
                report.record(outcome);
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("Destroy finished: {}", report);
        Ok(report)
    }

    async fn reconcile(
        &self,
        resource: &Resource,
        properties: serde_json::Value,
        prior: Option<ResourceRecord>,
        order: usize,
        parameters: &ParameterValues,
    ) -> Settled {
        let digest = fingerprint(&properties);
        let request = ResourceRequest::new(&resource.name, &resource.kind, properties);
        let mut outcome = ResourceOutcome::pending(&resource.name, &resource.kind);
        let mut attempts = 0;

        let converged = self
            .converge(&request, &digest, prior.as_ref(), &mut attempts)
            .await;
        outcome.attempts = attempts;

        match converged {
            Ok((action, record)) => {
                info!(
                    resource = %resource.name,
                    physical_id = %record.physical_id,
                    %action,
                    "Available"
                );
                Settled {
                    outcome: outcome
                        .with_status(ResourceStatus::Available, action)
                        .with_physical_id(&record.physical_id),
                    record: Some(
                        record
                            .with_order(order)
                            .with_dependencies(resource.dependencies.clone()),
                    ),
                }
            }
            Err(failure) => {
                let message = parameters.redact(&failure.error.to_string());
                warn!(resource = %resource.name, error = %message, "Failed");
                let mut outcome = outcome
                    .with_status(ResourceStatus::Failed, failure.action)
                    .with_error(message);
                if let Some(record) = &failure.record
                    && record.status != ResourceStatus::Deleted
                {
                    outcome = outcome.with_physical_id(&record.physical_id);
                }
                Settled {
                    outcome,
                    record: failure.record.map(|r| {
                        r.with_order(order)
                            .with_dependencies(resource.dependencies.clone())
                    }),
                }
            }
        }
    }

    async fn converge(
        &self,
        request: &ResourceRequest,
        digest: &str,
        prior: Option<&ResourceRecord>,
        attempts: &mut u32,
    ) -> Converged {
        let name = request.logical_id.as_str();
        let kind = request.kind.as_str();

        if let Some(prior) = prior {
            if prior.kind != kind {
                info!(resource = name, from = %prior.kind, to = kind, "Kind changed, replacing");
                let deleted = self
                    .call(name, "delete", &mut 0, move || {
                        self.provider.delete(&prior.kind, &prior.physical_id)
                    })
                    .await;
                match deleted {
                    Ok(()) | Err(ProviderError::NotFound(_)) => {}
                    Err(error) => {
                        return Err(Failure {
                            action: ActionType::Create,
                            error,
                            record: Some(
                                prior
                                    .clone()
                                    .transition(ResourceStatus::Deleting)
                                    .transition(ResourceStatus::Failed),
                            ),
                        });
                    }
                }
                // The old resource is gone; state must not point at it anymore
                return self
                    .create(request, digest, attempts)
                    .await
                    .map_err(|mut failure| {
                        failure.record.get_or_insert_with(|| {
                            prior
                                .clone()
                                .transition(ResourceStatus::Deleting)
                                .transition(ResourceStatus::Deleted)
                        });
                        failure
                    });
            }

            let current = self
                .call(name, "read", &mut 0, move || {
                    self.provider.read(kind, &prior.physical_id)
                })
                .await;
            match current {
                Ok(attributes)
                    if prior.status == ResourceStatus::Available && prior.fingerprint == digest =>
                {
                    debug!(resource = name, "Up to date");
                    let mut record = prior.clone();
                    record.attributes = attributes;
                    return Ok((ActionType::NoOp, record));
                }
                Ok(_) => return self.update(request, digest, prior, attempts).await,
                Err(ProviderError::NotFound(_)) => {
                    warn!(
                        resource = name,
                        physical_id = %prior.physical_id,
                        "Resource disappeared, recreating"
                    );
                }
                Err(error) => {
                    return Err(Failure {
                        action: ActionType::NoOp,
                        error,
                        record: None,
                    });
                }
            }
        }

        self.create(request, digest, attempts).await
    }

    async fn create(&self, request: &ResourceRequest, digest: &str, attempts: &mut u32) -> Converged {
        let provisioned = self
            .call(&request.logical_id, "create", attempts, move || {
                self.provider.create(request)
            })
            .await
            .map_err(|error| Failure {
                action: ActionType::Create,
                error,
                record: None,
            })?;

        let mut record = ResourceRecord::new(provisioned.physical_id, &request.kind)
            .transition(ResourceStatus::Reconciling)
            .with_fingerprint(digest);
        record.attributes = provisioned.attributes;
        self.settle(request, record, ActionType::Create).await
    }

    async fn update(
        &self,
        request: &ResourceRequest,
        digest: &str,
        prior: &ResourceRecord,
        attempts: &mut u32,
    ) -> Converged {
        let provisioned = self
            .call(&request.logical_id, "update", attempts, move || {
                self.provider.update(&prior.physical_id, request)
            })
            .await
            .map_err(|error| Failure {
                action: ActionType::Update,
                error,
                record: Some(
                    prior
                        .clone()
                        .transition(ResourceStatus::Reconciling)
                        .transition(ResourceStatus::Failed),
                ),
            })?;

        if provisioned.physical_id != prior.physical_id {
            info!(
                resource = %request.logical_id,
                previous = %prior.physical_id,
                physical_id = %provisioned.physical_id,
                "Provider assigned a new physical id"
            );
        }

        let mut record = prior.clone().transition(ResourceStatus::Reconciling);
        record.physical_id = provisioned.physical_id;
        record.fingerprint = digest.to_string();
        record.attributes = provisioned.attributes;
        self.settle(request, record, ActionType::Update).await
    }

    /// Wait for the resource to settle, then refresh its attributes
    async fn settle(
        &self,
        request: &ResourceRequest,
        mut record: ResourceRecord,
        action: ActionType,
    ) -> Converged {
        let name = request.logical_id.as_str();
        let kind = request.kind.as_str();
        let physical_id = record.physical_id.clone();
        let id = physical_id.as_str();

        if let Err(error) = self.wait_until_stable(name, kind, id).await {
            return Err(Failure {
                action,
                error,
                record: Some(record.transition(ResourceStatus::Failed)),
            });
        }

        let refreshed = self
            .call(name, "read", &mut 0, move || self.provider.read(kind, id))
            .await;
        match refreshed {
            Ok(attributes) => record.attributes.extend(attributes),
            Err(error) => {
                return Err(Failure {
                    action,
                    error,
                    record: Some(record.transition(ResourceStatus::Failed)),
                });
            }
        }

        Ok((action, record.transition(ResourceStatus::Available)))
    }

    async fn wait_until_stable(&self, name: &str, kind: &str, physical_id: &str) -> ProviderResult<()> {
        for poll in 0..self.wait.max_polls {
            let stable = self
                .call(name, "is_stable", &mut 0, move || {
                    self.provider.is_stable(kind, physical_id)
                })
                .await?;
            if stable {
                debug!(resource = name, polls = poll + 1, "Stable");
                return Ok(());
            }
            if poll + 1 < self.wait.max_polls {
                tokio::time::sleep(self.wait.delay_for_attempt(poll)).await;
            }
        }

        Err(ProviderError::Permanent(format!(
            "did not stabilize after {} polls",
            self.wait.max_polls
        )))
    }

    /// Delete one resource. Returns the record that remains, if any.
    async fn delete_resource(
        &self,
        name: &str,
        record: ResourceRecord,
        parameters: &ParameterValues,
    ) -> (ResourceOutcome, Option<ResourceRecord>) {
        info!(resource = name, physical_id = %record.physical_id, "Deleting");
        let mut attempts = 0;
        let kind = record.kind.as_str();
        let id = record.physical_id.as_str();

        let deleted = self
            .call(name, "delete", &mut attempts, move || {
                self.provider.delete(kind, id)
            })
            .await;

        let mut outcome = ResourceOutcome::pending(name, kind).with_physical_id(id);
        outcome.attempts = attempts;

        match deleted {
            Ok(()) => (
                outcome.with_status(ResourceStatus::Deleted, ActionType::Delete),
                None,
            ),
            Err(ProviderError::NotFound(_)) => {
                debug!(resource = name, "Already gone");
                (
                    outcome.with_status(ResourceStatus::Deleted, ActionType::Delete),
                    None,
                )
            }
            Err(error) => {
                let message = parameters.redact(&error.to_string());
                warn!(resource = name, error = %message, "Delete failed");
                let outcome = outcome
                    .with_status(ResourceStatus::Failed, ActionType::Delete)
                    .with_error(message);
                let record = record
                    .transition(ResourceStatus::Deleting)
                    .transition(ResourceStatus::Failed);
                (outcome, Some(record))
            }
        }
    }

    /// Delete resources recorded in state but no longer declared, dependents first
    async fn prune(
        &self,
        stack: &Stack,
        parameters: &ParameterValues,
        state: &mut StackState,
        report: &mut RunReport,
    ) {
        let orphans: Vec<(String, ResourceRecord)> = state
            .resources
            .iter()
            .filter(|(name, _)| stack.resource(name).is_none())
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        if orphans.is_empty() {
            return;
        }
        let orphans = deletion_order(orphans);
        info!(count = orphans.len(), "Deleting resources no longer declared");

        for (name, record) in orphans {
            let (outcome, remaining) = self.delete_resource(&name, record, parameters).await;
            match remaining {
                Some(record) => state.set_resource(name, record),
                None => {
                    state.remove_resource(&name);
                }
            }
            report.record(outcome);
        }
    }

    /// Run one provider call, retrying transient errors with backoff
    async fn call<T, F, Fut>(
        &self,
        name: &str,
        operation: &'static str,
        attempts: &mut u32,
        mut op: F,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            *attempts += 1;
            match op().await {
                Err(error) if error.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(resource = name, operation, attempt, "Retries exhausted");
                        return Err(error);
                    }
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    warn!(
                        resource = name,
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
