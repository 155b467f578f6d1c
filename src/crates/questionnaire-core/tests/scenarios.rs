//! End-to-end coverage of `Session::handle` against a real in-memory graph
//! and a real sandboxed expression evaluator — no mocks on either
//! collaborator. Each fixture is built directly against `InMemoryGraphStore`
//! rather than through a schema-loading layer, since this crate never reads
//! schema files itself.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use questionnaire_core::config::EngineConfig;
use questionnaire_core::error::EngineError;
use questionnaire_core::graph_store::QueryOutcome;
use questionnaire_core::model::VariableDef;
use questionnaire_core::session::{NextQuestionRequest, Session};
use questionnaire_core::value::TemplateValue;
use questionnaire_graphstore::{EdgeFixture, InMemoryGraphStore};
use questionnaire_rhai_sandbox::engine::Limits;
use questionnaire_rhai_sandbox::RhaiSandbox;
use tokio_util::sync::CancellationToken;

fn props(value: serde_json::Value) -> IndexMap<String, TemplateValue> {
    match TemplateValue::from(&value) {
        TemplateValue::Map(map) => map,
        _ => IndexMap::new(),
    }
}

fn add_section(store: &InMemoryGraphStore, id: &str, input_params: &[&str], variables: Vec<VariableDef>) {
    let mut properties = props(json!({
        "sectionId": id,
        "name": id,
        "inputParams": input_params,
    }));
    properties.insert(
        "variables".to_string(),
        TemplateValue::from(&serde_json::to_value(&variables).unwrap()),
    );
    store.add_node(id, vec!["Section".to_string()], properties);
}

fn add_question(store: &InMemoryGraphStore, id: &str, order_in_form: i64) {
    let properties = props(json!({
        "questionId": id,
        "prompt": format!("Prompt for {id}"),
        "fieldId": format!("{id}_field"),
        "dataType": "string",
        "orderInForm": order_in_form,
        "variables": [],
    }));
    store.add_node(id, vec!["Question".to_string()], properties);
}

fn add_goto_action(store: &InMemoryGraphStore, id: &str, next_section_id: &str) {
    let properties = props(json!({
        "actionId": id,
        "actionType": "GotoSection",
        "nextSectionId": next_section_id,
        "returnImmediately": true,
        "variables": [],
    }));
    store.add_node(id, vec!["Action".to_string()], properties);
}

fn add_create_action(store: &InMemoryGraphStore, id: &str, body: &str, return_immediately: bool) {
    let properties = props(json!({
        "actionId": id,
        "actionType": "CreatePropertyNode",
        "body": body,
        "returnImmediately": return_immediately,
        "variables": [],
    }));
    store.add_node(id, vec!["Action".to_string()], properties);
}

fn add_complete_action(store: &InMemoryGraphStore, id: &str, body: &str) {
    let properties = props(json!({
        "actionId": id,
        "actionType": "MarkSectionComplete",
        "body": body,
        "returnImmediately": true,
        "variables": [],
    }));
    store.add_node(id, vec!["Action".to_string()], properties);
}

fn created_id_row(id: i64) -> IndexMap<String, TemplateValue> {
    let mut record = IndexMap::new();
    record.insert("createdId".to_string(), TemplateValue::Int(id));
    record
}

fn session(store: InMemoryGraphStore) -> Session {
    Session::new(Arc::new(store), Arc::new(RhaiSandbox::new()), EngineConfig::default())
}

fn request(section_id: &str, inputs: serde_json::Value) -> NextQuestionRequest {
    let mut obj = inputs.as_object().cloned().unwrap_or_default();
    obj.insert("sectionId".to_string(), json!(section_id));
    serde_json::from_value(serde_json::Value::Object(obj)).expect("request must deserialize")
}

// S1: a single unanswered question at the front of its section reports
// `question` non-null with no side effects.
#[tokio::test]
async fn s1_first_unanswered_question_is_returned() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_PI", &["applicationId", "applicantId"], vec![]);
    add_question(&store, "Q_FN", 10);
    store.add_edge("SEC_PI", EdgeFixture::precedes("Q_FN", 10, 1));

    let response = session(store)
        .handle(request("SEC_PI", json!({"applicationId": "A1", "applicantId": "P1"})))
        .await
        .expect("traversal succeeds");

    assert_eq!(response.section_id, "SEC_PI");
    let question = response.question.expect("question present");
    assert_eq!(question["questionId"], json!("Q_FN"));
    assert!(!response.completed);
    assert_eq!(response.next_section_id, None);
    assert!(response.created_node_ids.is_empty());
    assert_eq!(response.source_node, Some(serde_json::Value::Null));
}

// S2: a falsy `askWhen` skips its edge in favor of the next in order.
#[tokio::test]
async fn s2_false_ask_when_skips_to_next_edge() {
    let store = InMemoryGraphStore::new();
    let flag = VariableDef {
        name: "flag".into(),
        cypher: None,
        python: Some("false".into()),
        timeout_ms: None,
    };
    add_section(&store, "SEC_X", &[], vec![flag]);
    add_question(&store, "Q1", 10);
    add_question(&store, "Q2", 20);
    store.add_edge(
        "SEC_X",
        EdgeFixture::precedes("Q1", 10, 1).with_ask_when("python: {{ flag }} == true"),
    );
    store.add_edge("SEC_X", EdgeFixture::precedes("Q2", 20, 2));

    let response = session(store).handle(request("SEC_X", json!({}))).await.unwrap();

    let question = response.question.expect("question present");
    assert_eq!(question["questionId"], json!("Q2"));
}

// S3: an answered question's triggered action can redirect the caller to
// another section without selecting any further edge at this node.
#[tokio::test]
async fn s3_answered_question_triggers_goto_action() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_ROOT", &["applicantId"], vec![]);
    add_question(&store, "Q_HAS_COAPP", 10);
    add_goto_action(&store, "ACT_GOTO", "SEC_COAPP");
    store.add_edge(
        "SEC_ROOT",
        EdgeFixture::precedes("Q_HAS_COAPP", 10, 1).with_source_node("python: {{ applicantId }}"),
    );
    store.add_edge("Q_HAS_COAPP", EdgeFixture::triggers("ACT_GOTO", 10, 1));
    store.mark_answered("Q_HAS_COAPP", "P1");

    let response = session(store)
        .handle(request("SEC_ROOT", json!({"applicantId": "P1"})))
        .await
        .unwrap();

    assert!(response.question.is_none());
    assert_eq!(response.next_section_id, Some("SEC_COAPP".to_string()));
    assert!(!response.completed);
    assert_eq!(response.source_node, Some(json!("P1")));
}

// S4: a `CreatePropertyNode` action's returned `createdId` columns are
// appended to the response in the order the store returned them.
#[tokio::test]
async fn s4_create_property_node_collects_created_ids() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_CP", &[], vec![]);
    let body = "CREATE (p:Property) RETURN 123 AS createdId";
    add_create_action(&store, "ACT_CREATE", body, true);
    store.add_edge("SEC_CP", EdgeFixture::triggers("ACT_CREATE", 10, 1));
    store.seed_query_result(
        body,
        QueryOutcome {
            records: vec![created_id_row(123), created_id_row(456)],
            truncated: false,
        },
    );

    let response = session(store).handle(request("SEC_CP", json!({}))).await.unwrap();

    assert_eq!(response.created_node_ids, vec![json!(123), json!(456)]);
    assert!(response.question.is_none());
}

// S5: `MarkSectionComplete` flips `completed` once its body runs
// successfully.
#[tokio::test]
async fn s5_mark_section_complete_sets_completed_flag() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_MSC", &[], vec![]);
    let body = "MERGE (s:Section {id: 'SEC_MSC'})-[:COMPLETED]->(a:Application)";
    add_complete_action(&store, "ACT_COMPLETE", body);
    store.add_edge("SEC_MSC", EdgeFixture::triggers("ACT_COMPLETE", 10, 1));
    store.seed_query_result(body, QueryOutcome::empty());

    let response = session(store).handle(request("SEC_MSC", json!({}))).await.unwrap();

    assert!(response.completed);
}

// S6: a variable that times out resolves to `null`, is reported as a
// warning, and the traversal continues rather than failing the request.
#[tokio::test]
async fn s6_timed_out_variable_becomes_null_with_warning() {
    let store = InMemoryGraphStore::new();
    let slow = VariableDef {
        name: "slow".into(),
        cypher: None,
        python: Some("let x = 0; while true { x += 1; }".into()),
        timeout_ms: Some(200),
    };
    add_section(&store, "SEC_TO", &[], vec![slow]);
    add_question(&store, "Q_AFTER", 10);
    // rhai has no `null` literal (its nil value is the unit `()`), so a
    // predicate comparing the timed-out variable against unresolved-ness
    // must spell that as `()`, not the JSON-ish `null`.
    store.add_edge(
        "SEC_TO",
        EdgeFixture::precedes("Q_AFTER", 10, 1).with_ask_when("python: {{ slow }} == ()"),
    );

    // Disable the operation ceiling for this one sandbox instance so the
    // only thing that can stop the loop is the deadline itself, matching
    // the "times out" scenario rather than racing against the resource
    // ceiling that would otherwise trip first.
    let unlimited = Limits {
        max_operations: 0,
        ..Limits::default()
    };
    let sandbox = RhaiSandbox::with_limits(unlimited);
    let session = Session::new(Arc::new(store), Arc::new(sandbox), EngineConfig::default());

    let response = session.handle(request("SEC_TO", json!({}))).await.unwrap();

    let question = response.question.expect("traversal continues to the next question");
    assert_eq!(question["questionId"], json!("Q_AFTER"));
    assert_eq!(response.vars["slow"].value, serde_json::Value::Null);
    assert!(response
        .warnings
        .iter()
        .any(|w| w.variable == "slow" && w.message.contains("timed out")));
}

// Invariant: edges are gated in ascending orderInForm; the first truthy one
// wins and nothing past it is touched, even if a later edge would also be
// truthy.
#[tokio::test]
async fn first_truthy_edge_wins_and_later_edges_are_never_dispatched() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_ORDER", &[], vec![]);
    add_question(&store, "Q_FIRST", 20);
    add_complete_action(&store, "ACT_SHOULD_NOT_RUN", "THIS MUST NEVER EXECUTE");
    store.add_edge(
        "SEC_ORDER",
        EdgeFixture::precedes("Q_FIRST", 10, 1).with_ask_when("python: false"),
    );
    store.add_edge("SEC_ORDER", EdgeFixture::precedes("Q_FIRST", 20, 2));
    store.add_edge("SEC_ORDER", EdgeFixture::triggers("ACT_SHOULD_NOT_RUN", 30, 3));
    // Deliberately leave "THIS MUST NEVER EXECUTE" unseeded: if the engine
    // ever dispatched the third edge, the action's query would fail with
    // `UnregisteredStatement` and the whole request would error out.

    let response = session(store).handle(request("SEC_ORDER", json!({}))).await.unwrap();

    let question = response.question.expect("question present");
    assert_eq!(question["questionId"], json!("Q_FIRST"));
}

// Invariant: `returnImmediately` (the default) stops the traversal at the
// action itself — its own outgoing edges are never enumerated.
#[tokio::test]
async fn return_immediately_action_never_dispatches_its_own_edges() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_IMM", &[], vec![]);
    add_goto_action(&store, "ACT_IMM", "SEC_NEXT");
    store.add_edge("SEC_IMM", EdgeFixture::triggers("ACT_IMM", 10, 1));
    // No node named "NOPE" exists; if the engine recursed into ACT_IMM's
    // own edges despite returnImmediately defaulting to true, this would
    // surface as an engine error rather than a clean response.
    store.add_edge("ACT_IMM", EdgeFixture::precedes("NOPE", 10, 1));

    let response = session(store).handle(request("SEC_IMM", json!({}))).await.unwrap();

    assert_eq!(response.next_section_id, Some("SEC_NEXT".to_string()));
    assert!(!response.completed);
}

// Invariant: `createdNodeIds` accumulates append-only across a chain of
// non-returning actions within the same request.
#[tokio::test]
async fn created_node_ids_accumulate_across_chained_actions() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_CHAIN", &[], vec![]);
    let body_a = "CREATE (p:Property) RETURN 111 AS createdId";
    let body_b = "CREATE (p:Property) RETURN 222 AS createdId";
    add_create_action(&store, "ACT_A", body_a, false);
    add_create_action(&store, "ACT_B", body_b, true);
    store.add_edge("SEC_CHAIN", EdgeFixture::triggers("ACT_A", 10, 1));
    store.add_edge("ACT_A", EdgeFixture::triggers("ACT_B", 10, 1));
    store.seed_query_result(body_a, QueryOutcome::single(created_id_row(111)));
    store.seed_query_result(body_b, QueryOutcome::single(created_id_row(222)));

    let response = session(store).handle(request("SEC_CHAIN", json!({}))).await.unwrap();

    assert_eq!(response.created_node_ids, vec![json!(111), json!(222)]);
}

// Invariant: a section-scoped variable referenced by more than one edge in
// the same request resolves to one consistent, cached value rather than
// being re-evaluated per reference.
#[tokio::test]
async fn shared_section_variable_is_materialised_once() {
    let store = InMemoryGraphStore::new();
    let flag = VariableDef {
        name: "flag2".into(),
        cypher: None,
        python: Some("7".into()),
        timeout_ms: None,
    };
    add_section(&store, "SEC_SHARE", &[], vec![flag]);
    add_question(&store, "Q_A", 10);
    add_question(&store, "Q_B", 20);
    store.add_edge(
        "SEC_SHARE",
        EdgeFixture::precedes("Q_A", 10, 1).with_ask_when("python: {{ flag2 }} == 999"),
    );
    store.add_edge(
        "SEC_SHARE",
        EdgeFixture::precedes("Q_B", 20, 2).with_ask_when("python: {{ flag2 }} == 7"),
    );

    let response = session(store).handle(request("SEC_SHARE", json!({}))).await.unwrap();

    let question = response.question.expect("question present");
    assert_eq!(question["questionId"], json!("Q_B"));
    assert_eq!(response.vars.len(), 1);
    assert_eq!(response.vars["flag2"].value, json!(7));
}

// Invariant: calling MarkSectionComplete again in a later request is a
// no-op from the caller's point of view — it still reports `completed`.
#[tokio::test]
async fn mark_section_complete_is_idempotent_across_requests() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_MSC2", &[], vec![]);
    let body = "MERGE (s:Section {id: 'SEC_MSC2'})-[:COMPLETED]->(a:Application)";
    add_complete_action(&store, "ACT_COMPLETE2", body);
    store.add_edge("SEC_MSC2", EdgeFixture::triggers("ACT_COMPLETE2", 10, 1));
    store.seed_query_result(body, QueryOutcome::empty());
    let store = Arc::new(store);
    let sandbox = Arc::new(RhaiSandbox::new());
    let session = Session::new(store, sandbox, EngineConfig::default());

    let first = session.handle(request("SEC_MSC2", json!({}))).await.unwrap();
    let second = session.handle(request("SEC_MSC2", json!({}))).await.unwrap();

    assert!(first.completed);
    assert!(second.completed);
}

// Invariant: a cancellation token signalled before the request starts stops
// the traversal at the first edge-selection boundary instead of running to
// completion.
#[tokio::test]
async fn cancelled_token_aborts_traversal() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_CANCEL", &[], vec![]);
    add_question(&store, "Q_CANCEL", 10);
    store.add_edge("SEC_CANCEL", EdgeFixture::precedes("Q_CANCEL", 10, 1));

    let session = Session::new(Arc::new(store), Arc::new(RhaiSandbox::new()), EngineConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let result = session
        .handle_cancellable(request("SEC_CANCEL", json!({})), Some(token))
        .await;

    assert!(matches!(result, Err(EngineError::Cancelled)));
}

// Invariant: given the same fixture and inputs, repeated requests produce
// an identical response (no hidden request-to-request state).
#[tokio::test]
async fn identical_requests_yield_identical_responses() {
    let store = InMemoryGraphStore::new();
    add_section(&store, "SEC_DET", &["applicantId"], vec![]);
    add_question(&store, "Q_DET", 10);
    store.add_edge("SEC_DET", EdgeFixture::precedes("Q_DET", 10, 1));
    let store = Arc::new(store);
    let sandbox = Arc::new(RhaiSandbox::new());
    let session = Session::new(store, sandbox, EngineConfig::default());

    let first = session
        .handle(request("SEC_DET", json!({"applicantId": "P1"})))
        .await
        .unwrap();
    let second = session
        .handle(request("SEC_DET", json!({"applicantId": "P1"})))
        .await
        .unwrap();

    assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::to_value(&second).unwrap());
}
