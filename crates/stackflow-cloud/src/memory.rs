//! In-memory resource provider
//!
//! Simulates a cloud API: hands out physical ids, reports computed
//! attributes and keeps a call log. Faults can be injected per logical
//! resource to exercise retries, stabilization timeouts and partial
//! failures.

use crate::provider::{
    Attributes, ProviderError, ProviderResult, Provisioned, ResourceProvider, ResourceRequest,
};
use crate::state::{ResourceStatus, StackState};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Provider operation, as recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    IsStable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: Operation,
    pub logical_id: String,
    pub physical_id: Option<String>,
}

/// A resource held by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    pub logical_id: String,
    pub kind: String,
    pub properties: Value,
    pub attributes: Attributes,
    /// False once a revision has been deregistered
    pub active: bool,
    unstable_polls: u32,
}

#[derive(Debug, Clone, Default)]
struct Fault {
    permanent: Option<String>,
    transient: u32,
    unstable_polls: u32,
    delete_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    resources: HashMap<String, StoredResource>,
    next_id: u64,
    revisions: HashMap<String, u32>,
    faults: HashMap<String, Fault>,
    calls: Vec<ProviderCall>,
}

pub struct MemoryProvider {
    name: String,
    region: String,
    computed: HashMap<String, Vec<(String, String)>>,
    revisioned: HashSet<String>,
    inner: Mutex<Inner>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: "us-east-1".to_string(),
            computed: HashMap::new(),
            revisioned: HashSet::new(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Provider preloaded with the attributes common AWS kinds report
    pub fn simulated(region: impl Into<String>) -> Self {
        Self::new()
            .with_region(region)
            .with_revisioned_kind("AWS::ECS::TaskDefinition")
            .with_computed_attribute("AWS::EC2::SecurityGroup", "GroupId", "{id}")
            .with_computed_attribute(
                "AWS::ElasticLoadBalancing::LoadBalancer",
                "DNSName",
                "{id}.{region}.elb.amazonaws.com",
            )
            .with_computed_attribute(
                "AWS::RDS::DBInstance",
                "Endpoint.Address",
                "{id}.{region}.rds.amazonaws.com",
            )
            .with_computed_attribute("AWS::RDS::DBInstance", "Endpoint.Port", "3306")
            .with_computed_attribute(
                "AWS::ECS::Cluster",
                "Arn",
                "arn:aws:ecs:{region}:000000000000:cluster/{id}",
            )
            .with_computed_attribute("AWS::IAM::Role", "Arn", "arn:aws:iam::000000000000:role/{id}")
            .with_computed_attribute(
                "AWS::ECS::TaskDefinition",
                "Arn",
                "arn:aws:ecs:{region}:000000000000:task-definition/{id}",
            )
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Report `attribute` for every resource of `kind`.
    ///
    /// `template` may contain `{id}`, `{logical_id}`, `{kind}` and `{region}`.
    pub fn with_computed_attribute(
        mut self,
        kind: impl Into<String>,
        attribute: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.computed
            .entry(kind.into())
            .or_default()
            .push((attribute.into(), template.into()));
        self
    }

    /// Updates of `kind` register a new `family:N` revision and deregister
    /// the previous one.
    pub fn with_revisioned_kind(mut self, kind: impl Into<String>) -> Self {
        self.revisioned.insert(kind.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every create and update of `logical_id` fails permanently
    pub fn fail_permanently(&self, logical_id: &str, message: impl Into<String>) {
        self.lock()
            .faults
            .entry(logical_id.to_string())
            .or_default()
            .permanent = Some(message.into());
    }

    /// The next `times` creates or updates of `logical_id` fail transiently
    pub fn fail_transiently(&self, logical_id: &str, times: u32) {
        self.lock()
            .faults
            .entry(logical_id.to_string())
            .or_default()
            .transient = times;
    }

    /// After each create or update, `logical_id` reports unstable `polls` times
    pub fn unstable_for(&self, logical_id: &str, polls: u32) {
        self.lock()
            .faults
            .entry(logical_id.to_string())
            .or_default()
            .unstable_polls = polls;
    }

    /// `logical_id` never settles
    pub fn never_stable(&self, logical_id: &str) {
        self.unstable_for(logical_id, u32::MAX);
    }

    /// Deleting `logical_id` fails permanently
    pub fn fail_delete(&self, logical_id: &str, message: impl Into<String>) {
        self.lock()
            .faults
            .entry(logical_id.to_string())
            .or_default()
            .delete_error = Some(message.into());
    }

    pub fn clear_faults(&self, logical_id: &str) {
        self.lock().faults.remove(logical_id);
    }

    /// Register an existing resource, e.g. one recorded in a state file
    pub fn seed(&self, logical_id: &str, kind: &str, physical_id: &str, attributes: Attributes) {
        let mut inner = self.lock();
        if self.revisioned.contains(kind)
            && let Some((family, revision)) = physical_id.rsplit_once(':')
            && let Ok(revision) = revision.parse::<u32>()
        {
            let latest = inner.revisions.entry(family.to_string()).or_default();
            *latest = (*latest).max(revision);
        } else if let Some((_, counter)) = physical_id.rsplit_once('-')
            && let Ok(counter) = counter.parse::<u64>()
        {
            // Ids handed out later must not collide with seeded ones
            inner.next_id = inner.next_id.max(counter);
        }
        inner.resources.insert(
            physical_id.to_string(),
            StoredResource {
                logical_id: logical_id.to_string(),
                kind: kind.to_string(),
                properties: Value::Null,
                attributes,
                active: true,
                unstable_polls: 0,
            },
        );
    }

    /// Seed every resource a state file records as existing
    pub fn seed_from_state(&self, state: &StackState) {
        for (name, record) in &state.resources {
            if record.status != ResourceStatus::Deleted {
                self.seed(
                    name,
                    &record.kind,
                    &record.physical_id,
                    record.attributes.clone(),
                );
            }
        }
    }

    /// Remove a resource behind the engine's back
    pub fn remove_out_of_band(&self, physical_id: &str) -> Option<StoredResource> {
        self.lock().resources.remove(physical_id)
    }

    pub fn get(&self, physical_id: &str) -> Option<StoredResource> {
        self.lock().resources.get(physical_id).cloned()
    }

    /// Active resources by physical id
    pub fn live_resources(&self) -> HashMap<String, StoredResource> {
        self.lock()
            .resources
            .iter()
            .filter(|(_, r)| r.active)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn count_for(&self, operation: Operation, logical_id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation && c.logical_id == logical_id)
            .count()
    }

    fn attributes_for(&self, kind: &str, logical_id: &str, physical_id: &str) -> Attributes {
        self.computed
            .get(kind)
            .map(|templates| {
                templates
                    .iter()
                    .map(|(attribute, template)| {
                        let value = template
                            .replace("{id}", physical_id)
                            .replace("{logical_id}", logical_id)
                            .replace("{kind}", kind)
                            .replace("{region}", &self.region);
                        (attribute.clone(), Value::String(value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn new_physical_id(&self, inner: &mut Inner, request: &ResourceRequest) -> String {
        if self.revisioned.contains(&request.kind) {
            let family = request
                .get_property::<String>("Family")
                .unwrap_or_else(|| request.logical_id.clone());
            let revision = inner.revisions.entry(family.clone()).or_default();
            *revision += 1;
            return format!("{}:{}", family, revision);
        }

        inner.next_id += 1;
        let short = request
            .kind
            .rsplit("::")
            .next()
            .unwrap_or("resource")
            .to_lowercase();
        format!("{}-{:06}", short, inner.next_id)
    }

    fn store(&self, inner: &mut Inner, physical_id: &str, request: &ResourceRequest) -> Provisioned {
        let unstable_polls = inner
            .faults
            .get(&request.logical_id)
            .map(|f| f.unstable_polls)
            .unwrap_or(0);
        let attributes = self.attributes_for(&request.kind, &request.logical_id, physical_id);
        inner.resources.insert(
            physical_id.to_string(),
            StoredResource {
                logical_id: request.logical_id.clone(),
                kind: request.kind.clone(),
                properties: request.properties.clone(),
                attributes: attributes.clone(),
                active: true,
                unstable_polls,
            },
        );
        Provisioned::new(physical_id).with_attributes(attributes)
    }
}

fn record_call(inner: &mut Inner, operation: Operation, physical_id: Option<&str>, logical_id: Option<&str>) {
    let logical_id = logical_id
        .map(str::to_string)
        .or_else(|| {
            physical_id
                .and_then(|id| inner.resources.get(id))
                .map(|r| r.logical_id.clone())
        })
        .unwrap_or_default();
    inner.calls.push(ProviderCall {
        operation,
        logical_id,
        physical_id: physical_id.map(str::to_string),
    });
}

fn check_mutation_faults(inner: &mut Inner, logical_id: &str) -> ProviderResult<()> {
    let Some(fault) = inner.faults.get_mut(logical_id) else {
        return Ok(());
    };
    if let Some(message) = &fault.permanent {
        return Err(ProviderError::Permanent(message.clone()));
    }
    if fault.transient > 0 {
        fault.transient -= 1;
        return Err(ProviderError::Transient(format!(
            "throttled while provisioning {}",
            logical_id
        )));
    }
    Ok(())
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self, request: &ResourceRequest) -> ProviderResult<Provisioned> {
        let mut inner = self.lock();
        record_call(&mut inner, Operation::Create, None, Some(&request.logical_id));
        check_mutation_faults(&mut inner, &request.logical_id)?;

        let physical_id = self.new_physical_id(&mut inner, request);
        tracing::debug!(resource = %request.logical_id, physical_id = %physical_id, "Created");
        Ok(self.store(&mut inner, &physical_id, request))
    }

    async fn read(&self, _kind: &str, physical_id: &str) -> ProviderResult<Attributes> {
        let mut inner = self.lock();
        record_call(&mut inner, Operation::Read, Some(physical_id), None);
        match inner.resources.get(physical_id) {
            Some(resource) if resource.active => Ok(resource.attributes.clone()),
            _ => Err(ProviderError::NotFound(physical_id.to_string())),
        }
    }

    async fn update(
        &self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> ProviderResult<Provisioned> {
        let mut inner = self.lock();
        record_call(
            &mut inner,
            Operation::Update,
            Some(physical_id),
            Some(&request.logical_id),
        );
        check_mutation_faults(&mut inner, &request.logical_id)?;

        if !inner
            .resources
            .get(physical_id)
            .is_some_and(|r| r.active)
        {
            return Err(ProviderError::NotFound(physical_id.to_string()));
        }

        if self.revisioned.contains(&request.kind) {
            let next_id = self.new_physical_id(&mut inner, request);
            if let Some(previous) = inner.resources.get_mut(physical_id) {
                previous.active = false;
            }
            tracing::debug!(
                resource = %request.logical_id,
                previous = physical_id,
                revision = %next_id,
                "Registered new revision"
            );
            return Ok(self.store(&mut inner, &next_id, request));
        }

        Ok(self.store(&mut inner, physical_id, request))
    }

    async fn delete(&self, kind: &str, physical_id: &str) -> ProviderResult<()> {
        let mut inner = self.lock();
        record_call(&mut inner, Operation::Delete, Some(physical_id), None);

        let Some(resource) = inner.resources.get(physical_id) else {
            return Err(ProviderError::NotFound(physical_id.to_string()));
        };
        if let Some(message) = inner
            .faults
            .get(&resource.logical_id)
            .and_then(|f| f.delete_error.clone())
        {
            return Err(ProviderError::Permanent(message));
        }

        if self.revisioned.contains(kind) {
            // Deregistering an inactive revision changes nothing
            if let Some(resource) = inner.resources.get_mut(physical_id) {
                resource.active = false;
            }
        } else {
            inner.resources.remove(physical_id);
        }
        Ok(())
    }

    async fn is_stable(&self, _kind: &str, physical_id: &str) -> ProviderResult<bool> {
        let mut inner = self.lock();
        record_call(&mut inner, Operation::IsStable, Some(physical_id), None);

        let Some(resource) = inner.resources.get_mut(physical_id) else {
            return Err(ProviderError::NotFound(physical_id.to_string()));
        };
        match resource.unstable_polls {
            0 => Ok(true),
            u32::MAX => Ok(false),
            _ => {
                resource.unstable_polls -= 1;
                Ok(false)
            }
        }
    }
}
