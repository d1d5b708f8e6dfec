//! End-to-end reconciliation against the in-memory provider

use async_trait::async_trait;
use serde_json::json;
use stackflow_cloud::{
    ActionType, Attributes, CancelFlag, MemoryProvider, Operation, ProviderResult, Provisioned,
    Reconciler, ResourceProvider, ResourceRequest, ResourceStatus, RetryConfig, StackState,
    WaitConfig,
};
use stackflow_core::{ParameterValues, RunContext, Stack, parse_template_str};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

const DEMO: &str = include_str!("../../../demos/ecs-stack.yaml");

const SERVICE_STACK: &str = r#"
Resources:
  DB:
    Type: AWS::RDS::DBInstance
    Properties:
      Engine: MySQL
  Cluster:
    Type: AWS::ECS::Cluster
  Service:
    Type: AWS::ECS::Service
    Properties:
      Cluster: !Ref Cluster
      DbHost: !GetAtt DB.Endpoint.Address
Outputs:
  ClusterName:
    Value: !Ref Cluster
"#;

fn reconciler(provider: Arc<dyn ResourceProvider>) -> Reconciler {
    Reconciler::new(provider)
        .with_retry(RetryConfig::immediate(3))
        .with_wait(WaitConfig::immediate(5))
}

fn no_params() -> ParameterValues {
    ParameterValues::default()
}

fn demo_params(stack: &Stack) -> ParameterValues {
    let supplied: HashMap<String, String> = [
        ("KeyName", "ops"),
        ("Subnets", "subnet-a,subnet-b"),
        ("ImageId", "ami-0123"),
        ("DbPassword", "correct-horse-battery"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    ParameterValues::bind(stack, &supplied, &RunContext::new("web", "eu-west-1")).unwrap()
}

#[tokio::test]
async fn test_partial_failure_skips_dependents() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    provider.fail_permanently("DB", "insufficient capacity");
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let report = assert_ok!(
        reconciler(provider.clone())
            .apply(&stack, &no_params(), &mut state)
            .await
    );

    assert_eq!(report.status_of("DB"), Some(ResourceStatus::Failed));
    assert_eq!(report.status_of("Cluster"), Some(ResourceStatus::Available));
    assert_eq!(report.status_of("Service"), Some(ResourceStatus::Skipped));
    assert!(!report.is_success());
    assert!(report.outputs.is_none());
    assert!(state.outputs.is_empty());
    assert_eq!(
        report.resources["DB"].error.as_deref(),
        Some("Provider error: insufficient capacity")
    );

    // Service was never sent to the provider
    assert_eq!(provider.count_for(Operation::Create, "Service"), 0);
    assert_eq!(
        state.resources.keys().collect::<Vec<_>>(),
        vec!["Cluster"]
    );
}

#[tokio::test]
async fn test_failure_only_affects_its_dependency_path() {
    let yaml = r#"
Resources:
  A:
    Type: Test::Node
  B:
    Type: Test::Node
    Properties: { Parent: !Ref A }
  C:
    Type: Test::Node
    Properties: { Parent: !Ref B }
  D:
    Type: Test::Node
  E:
    Type: Test::Node
    Properties: { Left: !Ref C, Right: !Ref D }
  F:
    Type: Test::Node
    Properties: { Parent: !Ref D }
"#;
    let provider = Arc::new(MemoryProvider::new());
    provider.fail_permanently("A", "boom");
    let stack = parse_template_str(yaml).unwrap();
    let mut state = StackState::new("s");

    let report = reconciler(provider.clone())
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert_eq!(report.failed(), vec!["A"]);
    assert_eq!(report.skipped(), vec!["B", "C", "E"]);
    assert_eq!(report.available(), vec!["D", "F"]);
}

#[tokio::test]
async fn test_attribute_values_flow_into_dependents() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let report = reconciler(provider.clone())
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    assert!(report.is_success());

    let db = &state.resources["DB"];
    let cluster = &state.resources["Cluster"];
    let service = provider.get(&state.resources["Service"].physical_id).unwrap();

    assert_eq!(
        service.properties["DbHost"],
        db.attributes["Endpoint.Address"]
    );
    assert_eq!(service.properties["Cluster"], json!(cluster.physical_id));
    assert_eq!(
        report.outputs.unwrap()["ClusterName"],
        json!(cluster.physical_id)
    );
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let first = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    let ids: Vec<String> = state
        .resources
        .values()
        .map(|r| r.physical_id.clone())
        .collect();

    provider.clear_calls();
    let second = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(second.is_success());
    assert_eq!(provider.count(Operation::Create), 0);
    assert_eq!(provider.count(Operation::Update), 0);
    assert_eq!(provider.count(Operation::Delete), 0);
    assert_eq!(provider.count(Operation::Read), 3);
    assert_eq!(second.count(ActionType::NoOp), 3);
    assert_eq!(second.outputs, first.outputs);
    assert_eq!(
        state
            .resources
            .values()
            .map(|r| r.physical_id.clone())
            .collect::<Vec<_>>(),
        ids
    );
}

#[tokio::test]
async fn test_changed_property_updates_in_place() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let mut state = StackState::new("svc");

    let stack = parse_template_str(SERVICE_STACK).unwrap();
    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    let db_id = state.resources["DB"].physical_id.clone();

    provider.clear_calls();
    let stack = parse_template_str(&SERVICE_STACK.replace("MySQL", "Postgres")).unwrap();
    let report = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert_eq!(report.resources["DB"].action, ActionType::Update);
    assert_eq!(report.resources["Cluster"].action, ActionType::NoOp);
    // Same endpoint, so the service is untouched
    assert_eq!(report.resources["Service"].action, ActionType::NoOp);
    assert_eq!(state.resources["DB"].physical_id, db_id);
    assert_eq!(
        provider.get(&db_id).unwrap().properties["Engine"],
        json!("Postgres")
    );
    assert_eq!(provider.count(Operation::Update), 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    provider.fail_transiently("Cluster", 2);
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let report = reconciler(provider.clone())
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.resources["Cluster"].attempts, 3);
    assert_eq!(report.resources["DB"].attempts, 1);
    assert_eq!(provider.count_for(Operation::Create, "Cluster"), 3);
}

#[tokio::test]
async fn test_vanished_resource_is_recreated() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");
    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    let old_id = state.resources["Cluster"].physical_id.clone();
    provider.remove_out_of_band(&old_id).unwrap();

    let report = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.resources["Cluster"].action, ActionType::Create);
    assert_ne!(state.resources["Cluster"].physical_id, old_id);
    // The service now points at the new cluster
    assert_eq!(report.resources["Service"].action, ActionType::Update);
}

/// Records when creates start and finish
struct TimingProvider {
    inner: MemoryProvider,
    events: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl ResourceProvider for TimingProvider {
    fn name(&self) -> &str {
        "timing"
    }

    async fn create(&self, request: &ResourceRequest) -> ProviderResult<Provisioned> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("start:{}", request.logical_id));
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.events
            .lock()
            .unwrap()
            .push(format!("end:{}", request.logical_id));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.create(request).await
    }

    async fn read(&self, kind: &str, physical_id: &str) -> ProviderResult<Attributes> {
        self.inner.read(kind, physical_id).await
    }

    async fn update(
        &self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> ProviderResult<Provisioned> {
        self.inner.update(physical_id, request).await
    }

    async fn delete(&self, kind: &str, physical_id: &str) -> ProviderResult<()> {
        self.inner.delete(kind, physical_id).await
    }

    async fn is_stable(&self, kind: &str, physical_id: &str) -> ProviderResult<bool> {
        self.inner.is_stable(kind, physical_id).await
    }
}

#[tokio::test]
async fn test_waves_run_concurrently_behind_a_barrier() {
    let timing = Arc::new(TimingProvider {
        inner: MemoryProvider::simulated("us-east-1"),
        events: Mutex::new(Vec::new()),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let report = reconciler(timing.clone())
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    assert!(report.is_success());

    let events = timing.events.lock().unwrap().clone();
    let position = |event: &str| events.iter().position(|e| e == event).unwrap();
    assert_eq!(timing.max_in_flight.load(Ordering::SeqCst), 2);
    assert!(position("start:Service") > position("end:DB"));
    assert!(position("start:Service") > position("end:Cluster"));
}

/// Requests cancellation while a given resource is being created
struct CancellingProvider {
    inner: MemoryProvider,
    trigger: String,
    flag: CancelFlag,
}

#[async_trait]
impl ResourceProvider for CancellingProvider {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn create(&self, request: &ResourceRequest) -> ProviderResult<Provisioned> {
        if request.logical_id == self.trigger {
            self.flag.cancel();
        }
        self.inner.create(request).await
    }

    async fn read(&self, kind: &str, physical_id: &str) -> ProviderResult<Attributes> {
        self.inner.read(kind, physical_id).await
    }

    async fn update(
        &self,
        physical_id: &str,
        request: &ResourceRequest,
    ) -> ProviderResult<Provisioned> {
        self.inner.update(physical_id, request).await
    }

    async fn delete(&self, kind: &str, physical_id: &str) -> ProviderResult<()> {
        self.inner.delete(kind, physical_id).await
    }

    async fn is_stable(&self, kind: &str, physical_id: &str) -> ProviderResult<bool> {
        self.inner.is_stable(kind, physical_id).await
    }
}

#[tokio::test]
async fn test_cancellation_stops_at_wave_boundary() {
    let flag = CancelFlag::new();
    let provider = Arc::new(CancellingProvider {
        inner: MemoryProvider::simulated("us-east-1"),
        trigger: "DB".to_string(),
        flag: flag.clone(),
    });
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let report = reconciler(provider)
        .with_cancel_flag(flag)
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    // The wave in flight completes; the next one never starts
    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.available(), vec!["DB", "Cluster"]);
    assert_eq!(report.pending(), vec!["Service"]);
    assert!(report.outputs.is_none());
    assert_eq!(state.resources.len(), 2);
}

#[tokio::test]
async fn test_cycle_is_rejected_before_any_provider_call() {
    let yaml = r#"
Resources:
  A:
    Type: Test::Node
    Properties: { Peer: !Ref B }
  B:
    Type: Test::Node
    Properties: { Peer: !GetAtt A.Id }
  C:
    Type: Test::Node
"#;
    let provider = Arc::new(MemoryProvider::new());
    let stack = parse_template_str(yaml).unwrap();
    let mut state = StackState::new("s");

    let result = reconciler(provider.clone())
        .apply(&stack, &no_params(), &mut state)
        .await;

    assert!(matches!(result, Err(e) if e.is_validation_error()));
    assert!(provider.calls().is_empty());
    assert!(state.resources.is_empty());
}

#[tokio::test]
async fn test_undeclared_resources_are_pruned_after_success() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let mut state = StackState::new("svc");

    let stack = parse_template_str(SERVICE_STACK).unwrap();
    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    let service_id = state.resources["Service"].physical_id.clone();

    let trimmed = r#"
Resources:
  DB:
    Type: AWS::RDS::DBInstance
    Properties:
      Engine: MySQL
  Cluster:
    Type: AWS::ECS::Cluster
"#;
    let stack = parse_template_str(trimmed).unwrap();
    let report = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.resources["Service"].action, ActionType::Delete);
    assert_eq!(report.status_of("Service"), Some(ResourceStatus::Deleted));
    assert!(state.get_resource("Service").is_none());
    assert!(provider.get(&service_id).is_none());
}

#[tokio::test]
async fn test_pruning_deletes_dependents_before_dependencies() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let mut state = StackState::new("svc");

    // App is declared ahead of the database it reads from
    let full = r#"
Resources:
  App:
    Type: Test::App
    Properties:
      DbHost: !GetAtt Db.Endpoint.Address
  Db:
    Type: AWS::RDS::DBInstance
  Keep:
    Type: Test::Keep
"#;
    let stack = parse_template_str(full).unwrap();
    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    let trimmed = r#"
Resources:
  Keep:
    Type: Test::Keep
"#;
    let stack = parse_template_str(trimmed).unwrap();
    let plan = reconciler.plan(&stack, &no_params(), &state).unwrap();
    let planned: Vec<&str> = plan
        .actions_by_type(ActionType::Delete)
        .iter()
        .map(|a| a.id.as_str())
        .collect();
    assert_eq!(planned, vec!["App", "Db"]);

    provider.clear_calls();
    let report = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(report.is_success());
    let deleted: Vec<String> = provider
        .calls()
        .into_iter()
        .filter(|c| c.operation == Operation::Delete)
        .map(|c| c.logical_id)
        .collect();
    assert_eq!(deleted, vec!["App", "Db"]);
    assert_eq!(state.resources.keys().collect::<Vec<_>>(), vec!["Keep"]);
}

#[tokio::test]
async fn test_seeded_apply_adds_resource_of_existing_kind() {
    let first = r#"
Resources:
  SgA:
    Type: AWS::EC2::SecurityGroup
"#;
    let second = r#"
Resources:
  SgA:
    Type: AWS::EC2::SecurityGroup
  SgB:
    Type: AWS::EC2::SecurityGroup
"#;
    let mut state = StackState::new("net");
    let stack = parse_template_str(first).unwrap();
    reconciler(Arc::new(MemoryProvider::simulated("us-east-1")))
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    // A later run starts from a fresh provider rebuilt from state
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    provider.seed_from_state(&state);
    let reconciler = reconciler(provider.clone());

    let stack = parse_template_str(second).unwrap();
    let report = reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.resources["SgA"].action, ActionType::NoOp);
    assert_eq!(report.resources["SgB"].action, ActionType::Create);
    assert_ne!(
        state.resources["SgA"].physical_id,
        state.resources["SgB"].physical_id
    );
    assert_eq!(provider.live_resources().len(), 2);

    let report = reconciler
        .destroy(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.deleted().len(), 2);
    assert!(provider.live_resources().is_empty());
    assert!(state.resources.is_empty());
}

#[tokio::test]
async fn test_missing_output_attribute_is_reported() {
    let yaml = r#"
Resources:
  Cluster:
    Type: AWS::ECS::Cluster
Outputs:
  Endpoint:
    Value: !GetAtt Cluster.Endpoint
"#;
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let stack = parse_template_str(yaml).unwrap();
    let mut state = StackState::new("s");

    let report = reconciler(provider)
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert_eq!(report.available(), vec!["Cluster"]);
    assert!(!report.is_success());
    assert!(report.outputs.is_none());
    assert!(report.output_error.unwrap().contains("Endpoint"));
}

#[tokio::test]
async fn test_sensitive_values_stay_out_of_reports_and_state() {
    let yaml = r#"
Parameters:
  DbPassword:
    Type: String
    NoEcho: true
Resources:
  Db:
    Type: AWS::RDS::DBInstance
    Properties:
      MasterUserPassword: !Ref DbPassword
"#;
    let stack = parse_template_str(yaml).unwrap();
    let supplied = HashMap::from([("DbPassword".to_string(), "hunter2-secret".to_string())]);
    let params = ParameterValues::bind(&stack, &supplied, &RunContext::new("s", "us-east-1"))
        .unwrap();

    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    provider.fail_permanently("Db", "password 'hunter2-secret' is too weak");
    let mut state = StackState::new("s");
    let report = reconciler(provider.clone())
        .apply(&stack, &params, &mut state)
        .await
        .unwrap();

    let error = report.resources["Db"].error.clone().unwrap();
    assert_eq!(error, "Provider error: password '****' is too weak");
    assert!(!serde_json::to_string(&report).unwrap().contains("hunter2"));

    provider.clear_faults("Db");
    let report = reconciler(provider)
        .apply(&stack, &params, &mut state)
        .await
        .unwrap();
    assert!(report.is_success());
    let persisted = serde_json::to_string(&state).unwrap();
    assert!(!persisted.contains("hunter2"));
    assert!(!format!("{:?}", params).contains("hunter2"));
}

#[tokio::test]
async fn test_demo_stack_lifecycle() {
    let stack = parse_template_str(DEMO).unwrap();
    let params = demo_params(&stack);
    let provider = Arc::new(MemoryProvider::simulated("eu-west-1"));
    let reconciler = reconciler(provider.clone());
    let mut state = StackState::new("web");

    let report = reconciler.apply(&stack, &params, &mut state).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.count(ActionType::Create), 11);

    let outputs = report.outputs.unwrap();
    let lb_id = &state.resources["LoadBalancer"].physical_id;
    assert_eq!(
        outputs["WebsiteUrl"],
        json!(format!("http://{}.eu-west-1.elb.amazonaws.com", lb_id))
    );
    let db_id = state.resources["Database"].physical_id.clone();
    assert_eq!(
        outputs["DatabaseEndpoint"],
        json!(format!("{}.eu-west-1.rds.amazonaws.com:3306", db_id))
    );
    assert_eq!(state.resources["TaskDefinition"].physical_id, "web-web:1");
    assert_eq!(state.outputs, outputs);

    // A new image registers a new task definition revision and rolls the service
    let bumped = parse_template_str(&DEMO.replace("nginx:1.27", "nginx:1.28")).unwrap();
    let report = reconciler.apply(&bumped, &params, &mut state).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.resources["TaskDefinition"].action, ActionType::Update);
    assert_eq!(report.resources["Service"].action, ActionType::Update);
    assert_eq!(report.count(ActionType::NoOp), 9);
    assert_eq!(state.resources["TaskDefinition"].physical_id, "web-web:2");
    assert!(!provider.get("web-web:1").unwrap().active);

    // Destroy runs dependents first and keeps the retained database
    provider.clear_calls();
    let report = reconciler.destroy(&bumped, &params, &mut state).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert!(state.resources.is_empty());
    assert!(state.outputs.is_empty());
    assert!(provider.get(&db_id).unwrap().active);
    assert_eq!(report.resources["Database"].action, ActionType::NoOp);

    let deleted: Vec<String> = provider
        .calls()
        .into_iter()
        .filter(|c| c.operation == Operation::Delete)
        .map(|c| c.logical_id)
        .collect();
    let position = |name: &str| deleted.iter().position(|n| n == name).unwrap();
    assert_eq!(deleted.len(), 10);
    assert_eq!(deleted[0], "Service");
    assert!(position("TaskDefinition") < position("Cluster"));
    assert!(position("AutoScalingGroup") < position("LaunchConfiguration"));
    assert!(position("LoadBalancer") < position("LoadBalancerSecurityGroup"));
    assert!(position("DbSecurityGroup") < position("InstanceSecurityGroup"));
}

#[tokio::test]
async fn test_destroy_skips_dependencies_of_failed_delete() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");
    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    provider.fail_delete("Service", "service still draining");
    let report = reconciler
        .destroy(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed(), vec!["Service"]);
    assert_eq!(report.skipped(), vec!["DB", "Cluster"]);
    assert_eq!(state.resources.len(), 3);
    assert_eq!(state.resources["Service"].status, ResourceStatus::Failed);

    // Once the fault clears, destroy finishes the job
    provider.clear_faults("Service");
    let report = reconciler
        .destroy(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    assert!(report.is_success());
    assert!(state.resources.is_empty());
}

#[tokio::test]
async fn test_destroy_tolerates_missing_resources() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");
    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    provider
        .remove_out_of_band(&state.resources["DB"].physical_id.clone())
        .unwrap();
    let report = reconciler
        .destroy(&stack, &no_params(), &mut state)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.deleted().len(), 3);
    assert!(provider.live_resources().is_empty());

    // Nothing left: a second destroy makes no delete call
    provider.clear_calls();
    let report = reconciler
        .destroy(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(provider.count(Operation::Delete), 0);
}

#[tokio::test]
async fn test_plan_makes_no_provider_calls() {
    let provider = Arc::new(MemoryProvider::simulated("us-east-1"));
    let reconciler = reconciler(provider.clone());
    let stack = parse_template_str(SERVICE_STACK).unwrap();
    let mut state = StackState::new("svc");

    let plan = reconciler.plan(&stack, &no_params(), &state).unwrap();
    assert_eq!(plan.summary().create, 3);
    assert!(provider.calls().is_empty());

    reconciler
        .apply(&stack, &no_params(), &mut state)
        .await
        .unwrap();
    provider.clear_calls();

    let plan = reconciler.plan(&stack, &no_params(), &state).unwrap();
    assert!(!plan.has_changes);
    assert!(provider.calls().is_empty());
}
