use std::sync::Arc;

use serde_json::json;

use bpmn_orchestrator::bpmn::compile;
use bpmn_orchestrator::config::EngineConfig;
use bpmn_orchestrator::drivers::{
    DebugSession, DebugStatus, MockCapabilities, MockScenario, MockSimulator, NodeMock,
    SimulationStatus,
};
use bpmn_orchestrator::OrchestratorError;

const LOAN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="loan" name="Loan application">
    <startEvent id="Start"/>
    <serviceTask id="Score" name="Credit score"/>
    <exclusiveGateway id="Decision"/>
    <userTask id="Review" name="Manual review"/>
    <boundaryEvent id="Reviewed" attachedToRef="Review"/>
    <serviceTask id="Disburse"/>
    <endEvent id="Paid"/>
    <sequenceFlow id="f1" sourceRef="Start" targetRef="Score"/>
    <sequenceFlow id="f2" sourceRef="Score" targetRef="Decision"/>
    <sequenceFlow id="auto" sourceRef="Decision" targetRef="Disburse">
      <conditionExpression>business_response.score &gt;= 700</conditionExpression>
    </sequenceFlow>
    <sequenceFlow id="manual" sourceRef="Decision" targetRef="Review"/>
    <sequenceFlow id="f3" sourceRef="Reviewed" targetRef="Disburse"/>
    <sequenceFlow id="f4" sourceRef="Disburse" targetRef="Paid"/>
  </process>
</definitions>"#;

fn loan() -> Arc<bpmn_orchestrator::WorkflowDefinition> {
    Arc::new(compile(LOAN).unwrap())
}

#[test]
fn simulator_waits_at_user_task_and_resumes_on_boundary_event() {
    let scenario = MockScenario::new().with_node("Score", NodeMock::respond(json!({"score": 610})));
    let mut simulator = MockSimulator::new(loan(), scenario);

    let report = tokio_test::block_on(simulator.run());
    assert_eq!(report.status, SimulationStatus::Waiting);
    assert_eq!(report.current_node_ids, vec!["Review"]);
    assert_eq!(report.visited(), vec!["Start", "Score", "Decision"]);

    let report = tokio_test::block_on(simulator.trigger("Reviewed", json!({"reviewer": "ops"}))).unwrap();
    assert_eq!(report.status, SimulationStatus::Completed);
    assert_eq!(report.variables["reviewer"], json!("ops"));
    assert_eq!(
        report.visited(),
        vec!["Start", "Score", "Decision", "Reviewed", "Disburse"]
    );
}

#[test]
fn simulator_high_score_skips_review() {
    let scenario = MockScenario::new().with_node("Score", NodeMock::respond(json!({"score": 780})));
    let mut simulator = MockSimulator::new(loan(), scenario);

    let report = tokio_test::block_on(simulator.run());
    assert_eq!(report.status, SimulationStatus::Completed);
    assert!(!report.visited().contains(&"Review"));
}

#[test]
fn simulator_step_limit_guards_loops() {
    let xml = r#"<definitions><process id="loop">
        <startEvent id="Start"/>
        <task id="A"/>
        <task id="B"/>
        <sequenceFlow id="f1" sourceRef="Start" targetRef="A"/>
        <sequenceFlow id="f2" sourceRef="A" targetRef="B"/>
        <sequenceFlow id="f3" sourceRef="B" targetRef="A"/>
    </process></definitions>"#;
    let config = EngineConfig {
        max_debug_steps: 10,
        ..EngineConfig::default()
    };
    let mut simulator =
        MockSimulator::new(Arc::new(compile(xml).unwrap()), MockScenario::new()).with_config(&config);

    let report = tokio_test::block_on(simulator.run());
    assert_eq!(report.status, SimulationStatus::StepLimit);
    assert_eq!(report.trace.len(), 10);
}

#[tokio::test]
async fn debugger_shares_mock_capabilities() {
    let scenario = MockScenario::new()
        .with_node("Score", NodeMock::respond(json!({"score": 500})))
        .with_gateway_path("Decision", "Disburse");
    let capabilities = MockCapabilities::new(Arc::new(scenario));
    let mut debugger = DebugSession::new(loan(), capabilities);
    debugger.add_breakpoint("Decision").unwrap();

    assert_eq!(debugger.continue_run().await.unwrap(), DebugStatus::Paused);
    assert_eq!(debugger.current_node_ids(), ["Decision".to_string()]);
    assert_eq!(debugger.variables()["business_response"], json!({"score": 500}));

    assert_eq!(debugger.continue_run().await.unwrap(), DebugStatus::Completed);
    let trace: Vec<&str> = debugger
        .call_stack()
        .iter()
        .map(|f| f.node_id.as_str())
        .collect();
    assert_eq!(trace, vec!["Start", "Score", "Decision", "Disburse"]);
}

#[tokio::test]
async fn debugger_rolls_back_and_reports_failures() {
    let scenario = MockScenario::new().with_node("Score", NodeMock::fail("bureau offline"));
    let mut debugger = DebugSession::new(loan(), MockCapabilities::new(Arc::new(scenario)));

    debugger.step().await.unwrap();
    let err = debugger.step().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ExternalCall(_)));
    assert_eq!(debugger.status(), DebugStatus::Failed);
    assert!(debugger.snapshot().last_error.unwrap().contains("bureau offline"));

    let err = debugger.trigger("Paid", json!({})).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::SkippedStep { .. }));

    assert_eq!(
        debugger.trigger("Start", json!({})).await.unwrap(),
        DebugStatus::Running
    );
    assert_eq!(debugger.current_node_ids(), ["Score".to_string()]);
}
