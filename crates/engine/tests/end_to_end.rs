//! End-to-end tests driving `WorkflowEngine` through its public API.
//!
//! No external systems: notifications go to `MockNotifier`, custom steps to
//! `MockAction`, and timers run on Tokio's paused clock where needed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use actions::collaborators::ExternalResponse;
use actions::mock::{MockAction, MockHttpClient, MockNotifier};
use actions::{ActionError, Collaborators};
use engine::{
    EngineConfig, EngineError, ExecutionStatus, Step, StepStatus, TemplateCatalog,
    TemplateOverrides, Trigger, WorkflowConfig, WorkflowEngine, WorkflowTemplate,
};

fn engine_with_notifier() -> (WorkflowEngine, Arc<MockNotifier>) {
    let notifier = Arc::new(MockNotifier::new());
    let engine =
        WorkflowEngine::with_builtins(Collaborators::new().with_notifier(notifier.clone())).unwrap();
    (engine, notifier)
}

fn notify_step(id: &str, message: &str) -> Step {
    Step::new(id, "notify", json!({ "message": message, "target": "ops" }))
}

fn order_workflow() -> WorkflowConfig {
    WorkflowConfig::new(
        "Order received",
        vec![Trigger::event("order.created")],
        vec![notify_step("announce", "Order {{data.orderId}} received")],
    )
}

// ============================================================
// Event dispatch
// ============================================================

#[tokio::test]
async fn order_created_sends_notification() {
    let (engine, notifier) = engine_with_notifier();
    engine.define("orders", order_workflow()).unwrap();

    let executions = engine
        .trigger_workflow("order.created", json!({ "orderId": 42 }))
        .await;

    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.steps[0].data["message"], json!("Order 42 received"));
    assert_eq!(execution.context["sent"], json!(true));
    assert_eq!(
        notifier.sent(),
        vec![("ops".to_owned(), "Order 42 received".to_owned())]
    );

    let stored = engine.history().get(execution.id).unwrap();
    assert_eq!(stored.workflow_id, "orders");
    assert_eq!(engine.execution(execution.id).unwrap().id, execution.id);
    assert!(engine.active_executions().is_empty());
}

#[tokio::test]
async fn event_without_subscribers_is_a_no_op() {
    let (engine, notifier) = engine_with_notifier();
    engine.define("orders", order_workflow()).unwrap();

    assert!(engine.trigger_workflow("order.deleted", json!({})).await.is_empty());
    assert!(engine.trigger_workflow("order.deleted", json!({})).await.is_empty());
    assert!(engine.history().is_empty());
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn trigger_conditions_filter_and_a_workflow_runs_once_per_event() {
    let (engine, _) = engine_with_notifier();

    let mut big_orders = order_workflow();
    big_orders.triggers = vec![Trigger::Event {
        name: "order.created".into(),
        conditions: json!({ "data.total": { "operator": "greaterThan", "value": 100 } })
            .as_object()
            .cloned(),
    }];
    engine.define("big-orders", big_orders).unwrap();

    let mut audit = order_workflow();
    audit.triggers = vec![Trigger::event("order.created"), Trigger::event("*")];
    engine.define("audit", audit).unwrap();

    let small = engine
        .trigger_workflow("order.created", json!({ "orderId": 1, "total": 10 }))
        .await;
    let ids: Vec<&str> = small.iter().map(|e| e.workflow_id.as_str()).collect();
    assert_eq!(ids, vec!["audit"]);

    let big = engine
        .trigger_workflow("order.created", json!({ "orderId": 2, "total": 500 }))
        .await;
    let mut ids: Vec<&str> = big.iter().map(|e| e.workflow_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["audit", "big-orders"]);

    // The wildcard catches unrelated events too.
    assert_eq!(engine.trigger_workflow("user.created", json!({})).await.len(), 1);
}

#[tokio::test]
async fn disabled_workflows_are_skipped_but_stay_registered() {
    let (engine, _) = engine_with_notifier();
    engine.define("orders", order_workflow()).unwrap();
    engine.set_enabled("orders", false).unwrap();

    assert!(engine.trigger_workflow("order.created", json!({})).await.is_empty());
    assert_eq!(engine.trigger_index().count_for("orders"), 1);
    assert!(matches!(
        engine.execute_workflow("orders", json!({})).await,
        Err(EngineError::WorkflowDisabled(id)) if id == "orders"
    ));

    engine.set_enabled("orders", true).unwrap();
    assert_eq!(engine.trigger_workflow("order.created", json!({})).await.len(), 1);
}

#[tokio::test]
async fn execute_workflow_runs_on_demand() {
    let (engine, _) = engine_with_notifier();
    engine.define("orders", order_workflow()).unwrap();

    let execution = engine
        .execute_workflow("orders", json!({ "orderId": 7 }))
        .await
        .unwrap();
    assert_eq!(execution.context["event"], json!("manual"));
    assert_eq!(execution.steps[0].data["message"], json!("Order 7 received"));

    assert!(matches!(
        engine.execute_workflow("missing", json!({})).await,
        Err(EngineError::WorkflowNotFound(_))
    ));
}

#[tokio::test]
async fn variables_flow_between_steps_with_types_preserved() {
    let (engine, notifier) = engine_with_notifier();
    let mut config = WorkflowConfig::new(
        "Escalation",
        vec![Trigger::event("incident.opened")],
        vec![
            Step::new(
                "resolve",
                "setVariable",
                json!({ "variables": { "severity": "{{data.severity}}", "owner": "{{team}}" } }),
            ),
            Step::new(
                "gate",
                "condition",
                json!({ "conditions": { "severity": { "operator": "greaterThan", "value": 2 } } }),
            ),
            notify_step("page", "Paging {{owner}} for severity {{severity}}"),
        ],
    );
    config.variables = json!({ "team": "sre" }).as_object().cloned().unwrap();
    engine.define("escalation", config).unwrap();

    let low = engine
        .trigger_workflow("incident.opened", json!({ "severity": 1 }))
        .await;
    assert_eq!(low[0].status, ExecutionStatus::Completed);
    assert_eq!(low[0].steps.len(), 2);
    assert_eq!(low[0].context["severity"], json!(1));
    assert!(notifier.sent().is_empty());

    let high = engine
        .trigger_workflow("incident.opened", json!({ "severity": 4 }))
        .await;
    assert_eq!(high[0].steps.len(), 3);
    assert_eq!(
        notifier.sent(),
        vec![("ops".to_owned(), "Paging sre for severity 4".to_owned())]
    );
}

#[tokio::test(start_paused = true)]
async fn call_external_leans_on_step_retry() {
    let http = Arc::new(MockHttpClient::scripted(
        vec![Err(ActionError::Failed("connection reset".into()))],
        ExternalResponse {
            status: 200,
            data: json!({ "tracking": "TRK-9" }),
        },
    ));
    let engine = WorkflowEngine::with_builtins(Collaborators::new().with_http(http.clone())).unwrap();
    let config = WorkflowConfig::new(
        "Ship order",
        vec![Trigger::event("order.paid")],
        vec![Step::new(
            "ship",
            "callExternal",
            json!({ "url": "https://shipping.test/orders/{{data.orderId}}", "method": "post" }),
        )
        .with_retry(3, 500)],
    );
    engine.define("ship", config).unwrap();

    let executions = engine
        .trigger_workflow("order.paid", json!({ "orderId": 42 }))
        .await;

    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.steps[0].status, StepStatus::Completed);
    assert_eq!(execution.steps[0].attempts, 2);
    assert_eq!(execution.context["success"], json!(true));
    assert_eq!(execution.context["data"]["tracking"], json!("TRK-9"));

    let requests = http.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url, "https://shipping.test/orders/42");
    assert_eq!(requests[1].method, "POST");
}

#[tokio::test]
async fn actions_registered_after_define_are_used() {
    let (engine, _) = engine_with_notifier();
    let config = WorkflowConfig::new(
        "Custom",
        vec![Trigger::event("go")],
        vec![Step::new("custom", "enrich", json!({})).stop_on_failure()],
    );
    engine.define("custom", config).unwrap();

    let before = engine.trigger_workflow("go", json!({})).await;
    assert_eq!(before[0].status, ExecutionStatus::Failed);
    assert!(before[0].error.as_deref().unwrap().contains("enrich"));

    let enrich = Arc::new(MockAction::returning("enrich", json!({ "enriched": true })));
    engine.register_action("enrich", enrich.clone()).unwrap();

    let after = engine.trigger_workflow("go", json!({})).await;
    assert_eq!(after[0].status, ExecutionStatus::Completed);
    assert_eq!(after[0].context["enriched"], json!(true));
    assert_eq!(enrich.call_count(), 1);

    let stats = engine.history().stats("custom");
    assert_eq!((stats.total, stats.completed, stats.failed), (2, 1, 1));
}

// ============================================================
// Registry
// ============================================================

#[tokio::test]
async fn delete_removes_every_index_entry_and_timer() {
    let (engine, _) = engine_with_notifier();
    let mut config = order_workflow();
    config.triggers = vec![
        Trigger::event("order.created"),
        Trigger::event("*"),
        Trigger::Schedule { interval_ms: 60_000 },
        Trigger::Time { hhmm: "09:00".into() },
    ];
    engine.define("orders", config).unwrap();
    assert_eq!(engine.trigger_index().count_for("orders"), 4);
    assert_eq!(engine.scheduler().timer_count("orders"), 1);

    engine.delete("orders").unwrap();
    assert_eq!(engine.trigger_index().count_for("orders"), 0);
    assert!(engine.trigger_index().is_empty());
    assert_eq!(engine.scheduler().timer_count("orders"), 0);
    assert!(engine.get("orders").is_none());
    assert!(engine.trigger_workflow("order.created", json!({})).await.is_empty());
    assert!(matches!(
        engine.delete("orders"),
        Err(EngineError::WorkflowNotFound(_))
    ));
}

#[test]
fn validation_reports_every_problem() {
    let (engine, _) = engine_with_notifier();
    let config = WorkflowConfig::new(
        "Broken",
        vec![Trigger::event(" "), Trigger::Time { hhmm: "9am".into() }],
        vec![
            notify_step("dup", "a"),
            notify_step("dup", "b"),
            Step::new("blank-type", "", json!({})),
        ],
    );

    let Err(EngineError::Validation(problems)) = engine.define("broken", config) else {
        panic!("expected a validation error");
    };
    assert_eq!(problems.len(), 4, "{problems:?}");
    assert!(engine.get("broken").is_none());
    assert!(engine.trigger_index().is_empty());
}

#[tokio::test]
async fn export_then_import_round_trips() {
    let (engine, _) = engine_with_notifier();
    let mut config = order_workflow();
    config.description = "Tell ops about new orders".into();
    config.triggers.push(Trigger::Time { hhmm: "18:30".into() });
    config.variables = json!({ "team": "ops", "limits": [1, 2, 3] })
        .as_object()
        .cloned()
        .unwrap();
    config.steps[0] = config.steps[0].clone().with_retry(5, 250);
    engine.define("orders", config).unwrap();

    let exported = engine.export("orders").unwrap();
    let wire = serde_json::to_string(&exported).unwrap();
    let imported: WorkflowConfig = serde_json::from_str(&wire).unwrap();
    engine.import("orders-copy", imported).unwrap();

    let copy = engine.export("orders-copy").unwrap();
    for field in ["triggers", "steps", "variables"] {
        assert_eq!(
            serde_json::to_string(&serde_json::to_value(&copy).unwrap()[field]).unwrap(),
            serde_json::to_string(&serde_json::to_value(&exported).unwrap()[field]).unwrap(),
            "{field} differs"
        );
    }
    assert_eq!(copy, exported);
    assert!(matches!(
        engine.export("missing"),
        Err(EngineError::WorkflowNotFound(_))
    ));
}

#[tokio::test]
async fn templates_instantiate_into_workflows() {
    let (engine, notifier) = engine_with_notifier();
    let catalog = TemplateCatalog::new();
    catalog.register(WorkflowTemplate {
        id: "welcome".into(),
        name: "Welcome new users".into(),
        description: String::new(),
        category: "users".into(),
        triggers: vec![Trigger::event("user.created")],
        steps: vec![notify_step("greet", "{{greeting}}, {{data.name}}")],
        variables: json!({ "greeting": "Hello" }).as_object().cloned().unwrap(),
    });

    let definition = engine
        .define_from_template(
            &catalog,
            "welcome",
            "welcome-fr",
            TemplateOverrides::named("Bienvenue").with_variable("greeting", json!("Bonjour")),
        )
        .unwrap();
    assert_eq!(definition.name, "Bienvenue");

    engine
        .trigger_workflow("user.created", json!({ "name": "Ada" }))
        .await;
    assert_eq!(
        notifier.sent(),
        vec![("ops".to_owned(), "Bonjour, Ada".to_owned())]
    );

    assert!(matches!(
        engine.define_from_template(&catalog, "nope", "x", TemplateOverrides::default()),
        Err(EngineError::TemplateNotFound(_))
    ));
}

// ============================================================
// Scheduling
// ============================================================

#[tokio::test]
async fn clock_trigger_fires_once_per_window() {
    let (engine, _) = engine_with_notifier();
    let mut config = order_workflow();
    config.triggers = vec![Trigger::Time { hhmm: "09:00".into() }];
    engine.define("morning", config).unwrap();

    let at = |h, m| Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap();

    assert!(engine.tick_at(&at(8, 59)).unwrap().is_empty());

    let fired = engine.tick_at(&at(9, 1)).unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].workflow_id, "morning");
    for dispatched in fired {
        let execution = dispatched.handle.await.unwrap();
        assert_eq!(execution.context["event"], json!("schedule"));
        assert_eq!(execution.context["data"]["time"], json!("09:00"));
    }

    assert!(engine.tick_at(&at(9, 3)).unwrap().is_empty());
    assert_eq!(engine.history().for_workflow("morning", 10).len(), 1);
}

#[tokio::test]
async fn disabled_clock_trigger_does_not_fire() {
    let (engine, _) = engine_with_notifier();
    let mut config = order_workflow();
    config.triggers = vec![Trigger::Time { hhmm: "09:00".into() }];
    config.enabled = false;
    engine.define("morning", config).unwrap();

    let nine = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    assert!(engine.tick_at(&nine).unwrap().is_empty());
}

#[test]
fn tick_outside_a_runtime_is_an_error_and_claims_nothing() {
    let (engine, _) = engine_with_notifier();
    let mut config = order_workflow();
    config.triggers = vec![Trigger::Time { hhmm: "09:00".into() }];
    engine.define("morning", config).unwrap();

    let nine = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    assert!(matches!(engine.tick_at(&nine), Err(EngineError::NoRuntime)));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let fired = engine.tick_at(&nine).unwrap();
        assert_eq!(fired.len(), 1);
        for dispatched in fired {
            dispatched.handle.await.unwrap();
        }
    });
    assert_eq!(engine.history().for_workflow("morning", 10).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn interval_trigger_runs_until_deleted() {
    let (engine, _) = engine_with_notifier();
    let mut config = order_workflow();
    config.triggers = vec![Trigger::Schedule { interval_ms: 1_000 }];
    engine.define("heartbeat", config).unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let runs = engine.history().for_workflow("heartbeat", 10);
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0].context["event"], json!("schedule"));
    assert_eq!(runs[0].context["data"]["intervalMs"], json!(1_000));

    engine.delete("heartbeat").unwrap();
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(engine.history().for_workflow("heartbeat", 10).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn start_and_shutdown_manage_the_tick() {
    let (engine, _) = engine_with_notifier();
    assert!(!engine.is_running());
    engine.start().unwrap();
    assert!(engine.is_running());
    engine.start().unwrap();
    assert!(engine.is_running());
    engine.shutdown();
    assert!(!engine.is_running());
}

// ============================================================
// Configuration
// ============================================================

#[test]
fn invalid_engine_config_is_rejected() {
    let config = EngineConfig {
        tick_interval_ms: 0,
        ..EngineConfig::default()
    };
    let err = WorkflowEngine::new(
        config,
        actions::ActionRegistry::with_builtins(),
        Collaborators::new(),
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn engine_config_from_json() {
    let config: EngineConfig =
        EngineConfig::from_json_str(r#"{ "defaultRetry": { "maxAttempts": 5, "backoffMs": 10 } }"#)
            .unwrap();
    let engine =
        WorkflowEngine::new(config, actions::ActionRegistry::with_builtins(), Collaborators::new())
            .unwrap();
    let definition = engine.define("orders", order_workflow()).unwrap();
    assert_eq!(definition.retry_policy.max_attempts, 5);
    assert_eq!(engine.config().tick_interval_ms, 60_000);
    let _: Value = serde_json::to_value(engine.config()).unwrap();
}

#[test]
fn step_results_serialise_for_inspection() {
    let status = serde_json::to_value(StepStatus::Retrying).unwrap();
    assert_eq!(status, json!("retrying"));
}
