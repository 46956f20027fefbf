use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bpmn_orchestrator::config::EngineConfig;
use bpmn_orchestrator::engine::{ExecutionStatus, InstanceStatus, WorkflowEngine};
use bpmn_orchestrator::intercept::{InterceptMode, InterceptSession, MockValue, SessionManager};
use bpmn_orchestrator::store::{MemoryWorkflowStore, WorkflowStore};
use bpmn_orchestrator::OrchestratorError;

fn charge_process(url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL"
                  xmlns:biz="http://example.com/schema/bpmn/business">
  <bpmn:process id="charge" name="Charge">
    <bpmn:startEvent id="Start"><bpmn:outgoing>f1</bpmn:outgoing></bpmn:startEvent>
    <bpmn:serviceTask id="Charge" name="Charge card">
      <bpmn:extensionElements><biz:url>{url}</biz:url></bpmn:extensionElements>
      <bpmn:incoming>f1</bpmn:incoming>
      <bpmn:outgoing>f2</bpmn:outgoing>
    </bpmn:serviceTask>
    <bpmn:endEvent id="End"><bpmn:incoming>f2</bpmn:incoming></bpmn:endEvent>
    <bpmn:sequenceFlow id="f1" sourceRef="Start" targetRef="Charge"/>
    <bpmn:sequenceFlow id="f2" sourceRef="Charge" targetRef="End"/>
  </bpmn:process>
</bpmn:definitions>"#
    )
}

const LINEAR: &str = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="linear">
    <startEvent id="Start"/>
    <task id="T1"/>
    <task id="T2"/>
    <endEvent id="End"/>
    <sequenceFlow id="f1" sourceRef="Start" targetRef="T1"/>
    <sequenceFlow id="f2" sourceRef="T1" targetRef="T2"/>
    <sequenceFlow id="f3" sourceRef="T2" targetRef="End"/>
  </process>
</definitions>"#;

const ROUTING: &str = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="routing">
    <startEvent id="Start"/>
    <exclusiveGateway id="G"/>
    <task id="A"/>
    <task id="B"/>
    <sequenceFlow id="f1" sourceRef="Start" targetRef="G"/>
    <sequenceFlow id="toA" sourceRef="G" targetRef="A">
      <conditionExpression xsi:type="tFormalExpression">${x &gt; 5}</conditionExpression>
    </sequenceFlow>
    <sequenceFlow id="toB" sourceRef="G" targetRef="B"/>
  </process>
</definitions>"#;

async fn setup(xml: &str, config: EngineConfig) -> (WorkflowEngine, String) {
    let store = Arc::new(MemoryWorkflowStore::new());
    let workflow = store.save_workflow("test", xml).await.unwrap();
    let engine = WorkflowEngine::new(store, config).unwrap();
    (engine, workflow.id)
}

async fn start(engine: &WorkflowEngine, workflow_id: &str) -> String {
    engine
        .start_instance(workflow_id, HashMap::new(), None)
        .await
        .unwrap()
        .engine_response
        .instance_id
}

#[tokio::test]
async fn service_task_calls_business_api_and_completes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/charge"))
        .and(body_partial_json(json!({"nodeId": "Charge", "params": {"amount": 42}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"charged": true})))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/charge", server.uri());
    let (engine, workflow_id) = setup(&charge_process(&url), EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let result = engine
        .execute_from_node(&instance_id, "Charge", json!({"amount": 42}), None)
        .await
        .unwrap();

    assert_eq!(result.business_response, Some(json!({"charged": true})));
    assert_eq!(result.engine_response.status, InstanceStatus::Completed);
    assert!(result.engine_response.current_node_ids.is_empty());
    assert_eq!(result.engine_response.next_node_ids, vec!["End"]);
    assert_eq!(
        result.engine_response.variables["business_response"],
        json!({"charged": true})
    );

    let execution = engine
        .store()
        .get_execution(&result.engine_response.execution_id)
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output, Some(json!({"charged": true})));
}

#[tokio::test]
async fn business_api_error_status_fails_execution() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let url = format!("{}/charge", server.uri());
    let (engine, workflow_id) = setup(&charge_process(&url), EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let err = engine
        .execute_from_node(&instance_id, "Charge", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::ExternalCall(ref msg) if msg.contains("502")));

    let executions = engine.store().list_executions(&instance_id).await.unwrap();
    let last = executions.last().unwrap();
    assert_eq!(last.status, ExecutionStatus::Failed);
    assert_eq!(last.error_code.as_deref(), Some("EXTERNAL_CALL_ERROR"));

    let instance = engine.store().get_instance(&instance_id).await.unwrap();
    assert_eq!(instance.current_node_ids, vec!["Charge"]);
}

#[tokio::test]
async fn business_api_timeout_is_a_hard_cutoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/slow", server.uri());
    let config = EngineConfig {
        business_api_timeout_secs: 1,
        ..EngineConfig::default()
    };
    let (engine, workflow_id) = setup(&charge_process(&url), config).await;
    let instance_id = start(&engine, &workflow_id).await;

    let err = engine
        .execute_from_node(&instance_id, "Charge", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Timeout(1)));
}

#[tokio::test]
async fn enabled_session_replays_mock_without_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"real": true})))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/charge", server.uri());
    let (engine, workflow_id) = setup(&charge_process(&url), EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let sessions = SessionManager::new();
    let session = sessions.create(&instance_id, InterceptMode::Enabled).await;
    session
        .set_mock(
            format!("CallBusinessApi:{}:Charge", instance_id),
            json!({"mocked": true}),
        )
        .await;

    let result = engine
        .execute_from_node(&instance_id, "Charge", json!({}), Some(session.clone()))
        .await
        .unwrap();
    assert_eq!(result.business_response, Some(json!({"mocked": true})));

    let log = session.execution_log().await;
    assert_eq!(log.len(), 1);
    assert!(log[0].is_mocked);
    assert_eq!(log[0].operation, "CallBusinessApi");
}

#[tokio::test]
async fn record_session_stores_real_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"charged": true})))
        .mount(&server)
        .await;

    let url = format!("{}/charge", server.uri());
    let (engine, workflow_id) = setup(&charge_process(&url), EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let session = Arc::new(InterceptSession::new(&instance_id, InterceptMode::Record));
    engine
        .execute_from_node(&instance_id, "Charge", json!({}), Some(session.clone()))
        .await
        .unwrap();

    let recorded = session
        .get(&format!("CallBusinessApi:{}:Charge", instance_id))
        .await
        .unwrap();
    assert_eq!(
        recorded,
        MockValue::Json(json!({"statusCode": 200, "body": {"charged": true}}))
    );
    assert!(!session.execution_log().await[0].is_mocked);
}

#[tokio::test]
async fn mock_of_wrong_type_fails_and_is_logged() {
    let (engine, workflow_id) =
        setup(&charge_process("http://127.0.0.1:9/unused"), EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let session = Arc::new(InterceptSession::new(&instance_id, InterceptMode::Enabled));
    session
        .set_mock(format!("CallBusinessApi:{}:Charge", instance_id), "not json")
        .await;

    let err = engine
        .execute_from_node(&instance_id, "Charge", json!({}), Some(session.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::MockTypeMismatch { .. }));

    let log = session.execution_log().await;
    assert_eq!(log.len(), 1);
    assert!(log[0].error.is_some());

    let executions = engine.store().list_executions(&instance_id).await.unwrap();
    assert_eq!(executions.last().unwrap().status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn rollback_and_skipped_step_through_engine() {
    let (engine, workflow_id) = setup(LINEAR, EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let moved = engine
        .execute_from_node(&instance_id, "T1", json!({}), None)
        .await
        .unwrap();
    assert_eq!(moved.engine_response.current_node_ids, vec!["T2"]);
    assert!(!moved.engine_response.rolled_back);

    let replayed = engine
        .execute_from_node(&instance_id, "T1", json!({}), None)
        .await
        .unwrap();
    assert!(replayed.engine_response.rolled_back);
    assert_eq!(replayed.engine_response.current_node_ids, vec!["T2"]);

    let err = engine
        .execute_from_node(&instance_id, "End", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::SkippedStep { ref node, .. } if node == "End"));

    let done = engine
        .execute_from_node(&instance_id, "T2", json!({}), None)
        .await
        .unwrap();
    assert_eq!(done.engine_response.status, InstanceStatus::Completed);
}

#[tokio::test]
async fn gateway_routes_on_instance_variables() {
    let (engine, workflow_id) = setup(ROUTING, EngineConfig::default()).await;

    for (x, expected) in [(10, "A"), (3, "B")] {
        let started = engine
            .start_instance(&workflow_id, HashMap::from([("x".to_string(), json!(x))]), None)
            .await
            .unwrap();
        let instance_id = started.engine_response.instance_id;

        let routed = engine
            .execute_from_node(&instance_id, "G", json!({}), None)
            .await
            .unwrap();
        assert_eq!(routed.engine_response.current_node_ids, vec![expected]);
    }
}

#[tokio::test]
async fn concurrent_triggers_on_one_instance_are_serialised() {
    let (engine, workflow_id) = setup(LINEAR, EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let (first, second) = tokio::join!(
        engine.execute_from_node(&instance_id, "T1", json!({}), None),
        engine.execute_from_node(&instance_id, "T1", json!({}), None),
    );
    assert!(first.is_ok());
    assert!(second.is_ok());

    let instance = engine.store().get_instance(&instance_id).await.unwrap();
    assert_eq!(instance.version, 3);
    assert_eq!(instance.current_node_ids, vec!["T2"]);
}

const EVENTS: &str = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="events">
    <startEvent id="Start"/>
    <eventBasedGateway id="Wait"/>
    <intermediateCatchEvent id="Paid"/>
    <intermediateCatchEvent id="Expired"/>
    <task id="Ship"/>
    <task id="Archive"/>
    <endEvent id="End"/>
    <sequenceFlow id="f1" sourceRef="Start" targetRef="Wait"/>
    <sequenceFlow id="f2" sourceRef="Wait" targetRef="Paid"/>
    <sequenceFlow id="f3" sourceRef="Wait" targetRef="Expired"/>
    <sequenceFlow id="f4" sourceRef="Paid" targetRef="Ship"/>
    <sequenceFlow id="f5" sourceRef="Expired" targetRef="Archive"/>
    <sequenceFlow id="f6" sourceRef="Ship" targetRef="End"/>
  </process>
</definitions>"#;

#[tokio::test]
async fn event_gateway_holds_until_catch_event_fires() {
    let (engine, workflow_id) = setup(EVENTS, EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let held = engine
        .execute_from_node(&instance_id, "Wait", json!({}), None)
        .await
        .unwrap();
    assert_eq!(held.engine_response.current_node_ids, vec!["Wait"]);
    assert!(held.engine_response.next_node_ids.is_empty());
    assert_eq!(held.engine_response.status, InstanceStatus::Running);

    let fired = engine
        .execute_from_node(&instance_id, "Paid", json!({"paid": true}), None)
        .await
        .unwrap();
    assert!(!fired.engine_response.rolled_back);
    assert_eq!(fired.engine_response.current_node_ids, vec!["Ship"]);
    assert_eq!(fired.engine_response.status, InstanceStatus::Running);
    assert_eq!(fired.engine_response.variables["paid"], json!(true));
}

#[tokio::test]
async fn parallel_gateway_takes_first_outgoing_flow() {
    let xml = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="fork">
    <startEvent id="Start"/>
    <parallelGateway id="Fork"/>
    <task id="Left"/>
    <task id="Right"/>
    <sequenceFlow id="f1" sourceRef="Start" targetRef="Fork"/>
    <sequenceFlow id="f2" sourceRef="Fork" targetRef="Left"/>
    <sequenceFlow id="f3" sourceRef="Fork" targetRef="Right"/>
  </process>
</definitions>"#;
    let (engine, workflow_id) = setup(xml, EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let result = engine
        .execute_from_node(&instance_id, "Fork", json!({}), None)
        .await
        .unwrap();
    assert_eq!(result.engine_response.next_node_ids, vec!["Left"]);
    assert_eq!(result.engine_response.current_node_ids, vec!["Left"]);
    assert_eq!(result.engine_response.status, InstanceStatus::Running);
}

#[tokio::test]
async fn service_task_before_another_task_keeps_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reserved": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let xml = format!(
        r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="reserve">
    <startEvent id="Start"/>
    <serviceTask id="Reserve" url="{}/reserve"/>
    <task id="Pack"/>
    <endEvent id="End"/>
    <sequenceFlow id="f1" sourceRef="Start" targetRef="Reserve"/>
    <sequenceFlow id="f2" sourceRef="Reserve" targetRef="Pack"/>
    <sequenceFlow id="f3" sourceRef="Pack" targetRef="End"/>
  </process>
</definitions>"#,
        server.uri()
    );
    let (engine, workflow_id) = setup(&xml, EngineConfig::default()).await;
    let instance_id = start(&engine, &workflow_id).await;

    let result = engine
        .execute_from_node(&instance_id, "Reserve", json!({}), None)
        .await
        .unwrap();
    assert_eq!(result.business_response, Some(json!({"reserved": 3})));
    assert_eq!(result.engine_response.current_node_ids, vec!["Pack"]);
    assert_eq!(result.engine_response.status, InstanceStatus::Running);
}
