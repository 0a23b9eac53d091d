//! End-to-end conversation tests through `Orchestrator::process`.
//!
//! The LLM and the database are scripted fakes, so every turn is
//! deterministic.

mod common;

use common::{FakeDatabase, FakeLlm, Harness, count_row, test_config};
use nl2sql_orchestrator::config::Config;
use nl2sql_orchestrator::error::AppError;
use nl2sql_orchestrator::models::{AgentKind, RowSet};
use serde_json::json;

#[tokio::test]
async fn test_connect_creates_session_and_connects() {
    let h = Harness::new();

    let response = h.turn("connection", "connect", None).await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.agent, Some(AgentKind::Connection));
    assert_eq!(response.data["intent"], "connection");
    assert!(response.execution_time_ms.is_some());
    assert!(response.message.contains("Available databases: DB1, DB2"));

    let id = response.session_id.expect("session id");
    let session = h.orchestrator.session(&id).await.expect("session persisted");
    assert!(session.is_connected());
    assert_eq!(h.db.open_count(), 1);
}

#[tokio::test]
async fn test_connect_routes_by_keyword_when_classifier_fails() {
    let h = Harness::new();

    // No scripted label: the classifier errors and the keyword rules decide
    let response = h.orchestrator.process("please connect me", None).await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.agent, Some(AgentKind::Connection));
    let session = h
        .orchestrator
        .session(response.session_id.as_deref().unwrap())
        .await
        .unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_connect_twice_does_not_reconnect() {
    let h = Harness::new();
    let id = h.connected().await;

    let response = h.turn("connection", "connect", Some(&id)).await;

    assert!(response.success);
    assert!(response.message.contains("Already connected"));
    assert_eq!(h.db.open_count(), 1);
}

#[tokio::test]
async fn test_connect_with_missing_credentials() {
    let h = Harness::with(Config::default_config(), FakeLlm::new(), FakeDatabase::new());

    let response = h.turn("connection", "connect", None).await;

    assert!(!response.success);
    assert_eq!(response.data["missing_credentials"], true);
    let missing = response.data["missing_fields"].as_array().unwrap();
    assert!(missing.contains(&json!("account")));
    assert!(missing.contains(&json!("password")));
    assert!(response.message.contains("NL2SQL_DB_ACCOUNT"));

    let session = h
        .orchestrator
        .session(response.session_id.as_deref().unwrap())
        .await
        .unwrap();
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_connect_with_inline_credentials() {
    let h = Harness::with(Config::default_config(), FakeLlm::new(), FakeDatabase::new());

    let response = h
        .turn(
            "connection",
            "connect account db.internal:5432 user bob password test",
            None,
        )
        .await;

    assert!(response.success, "{}", response.message);
    assert!(response.message.contains("as bob"));
    assert_eq!(response.data["connection"]["user"], "bob");
}

#[tokio::test]
async fn test_connect_failure_reports_driver_error() {
    let db = FakeDatabase {
        refuse_open: true,
        ..FakeDatabase::default()
    };
    let h = Harness::with(test_config(), FakeLlm::new(), db);

    let response = h.turn("connection", "connect", None).await;

    assert!(!response.success);
    assert!(response.message.contains("Failed to connect"));
    assert!(response.message.contains("Check the user name and password"));
}

#[tokio::test]
async fn test_status_and_disconnect() {
    let h = Harness::new();
    let id = h.with_orders().await;

    let status = h.turn("connection", "check the connection status", Some(&id)).await;
    assert!(status.success);
    assert_eq!(status.data["status"], "connected");

    let response = h.turn("connection", "disconnect", Some(&id)).await;
    assert!(response.success);

    let session = h.orchestrator.session(&id).await.unwrap();
    assert!(session.connection.is_none());
    assert!(session.selected_tables.is_empty());
    assert_eq!(h.db.open_count(), 0);

    let status = h.turn("connection", "status", Some(&id)).await;
    assert_eq!(status.data["status"], "disconnected");
}

#[tokio::test]
async fn test_show_databases_lists_catalogs() {
    let h = Harness::new();
    let id = h.connected().await;

    let response = h.turn("exploration", "show me the databases", Some(&id)).await;

    assert!(response.success, "{}", response.message);
    assert!(response.message.contains("DB1"));
    assert!(response.message.contains("DB2"));
    assert_eq!(response.data["databases"], json!(["DB1", "DB2"]));
    assert_eq!(response.data["current_database"], "DB1");
}

#[tokio::test]
async fn test_show_tables_routes_by_keyword() {
    let h = Harness::new();
    let id = h.connected().await;

    let response = h.orchestrator.process("show tables", Some(&id)).await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.agent, Some(AgentKind::Exploration));
    assert!(response.message.contains("orders (42 rows)"));
    assert_eq!(response.data["tables"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_select_before_connect_fails() {
    let h = Harness::new();

    let response = h.turn("exploration", "select orders", None).await;

    assert!(!response.success);
    let session = h
        .orchestrator
        .session(response.session_id.as_deref().unwrap())
        .await
        .unwrap();
    assert!(session.selected_tables.is_empty());
}

#[tokio::test]
async fn test_select_by_name_and_ordinal() {
    let h = Harness::new();
    let id = h.connected().await;

    let response = h.turn("exploration", "select orders", Some(&id)).await;
    assert_eq!(response.data["selected_tables"], json!(["orders"]));
    let session = h.orchestrator.session(&id).await.unwrap();
    // Selection is enriched with the described columns
    assert_eq!(session.selected_tables[0].columns.len(), 3);

    let response = h.turn("exploration", "pick 2", Some(&id)).await;
    assert_eq!(response.data["selected_tables"], json!(["customers"]));

    let response = h.turn("exploration", "choose the widgets", Some(&id)).await;
    assert!(!response.success);
    assert_eq!(response.data["selected_tables"], json!(["customers"]));
}

#[tokio::test]
async fn test_unconfirmed_delete_never_executes() {
    let h = Harness::new();
    let id = h.with_orders().await;

    let response = h.turn("query", "delete all rows from orders", Some(&id)).await;

    assert!(!response.success);
    assert_eq!(response.data["requires_confirmation"], true);
    assert_eq!(response.data["query_type"], "DELETE");
    assert!(h.db.executed().is_empty());
    assert_eq!(h.llm.sql_count(), 0);

    let session = h.orchestrator.session(&id).await.unwrap();
    assert!(session.query_history.is_empty());
}

#[tokio::test]
async fn test_confirmed_delete_executes() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("DELETE FROM orders WHERE total IS NULL");
    h.db.push_result(Ok(RowSet {
        rows_affected: Some(3),
        ..RowSet::default()
    }));

    let response = h
        .turn("query", "confirm delete orders without a total", Some(&id))
        .await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.data["rows_affected"], 3);
    assert_eq!(h.db.executed(), vec!["DELETE FROM orders WHERE total IS NULL"]);
    assert_eq!(h.llm.summarize_count(), 0);

    let session = h.orchestrator.session(&id).await.unwrap();
    assert_eq!(session.query_history.len(), 1);
}

#[tokio::test]
async fn test_select_appends_exactly_one_history_entry() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("```sql\nSELECT COUNT(*) AS n FROM orders\n```");
    h.llm.set_summary("There are 42 orders.");
    h.db.push_rows(&["n"], vec![count_row(42)]);

    let response = h.turn("query", "how many orders are there", Some(&id)).await;

    assert!(response.success, "{}", response.message);
    assert_eq!(response.data["query_type"], "SELECT");
    assert_eq!(response.data["summary"], "There are 42 orders.");
    assert!(response.message.contains("Summary: There are 42 orders."));
    assert_eq!(h.llm.summarize_count(), 1);

    let executed = h.db.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(response.data["sql"], executed[0].as_str());

    let session = h.orchestrator.session(&id).await.unwrap();
    assert_eq!(session.query_history.len(), 1);
    assert_eq!(session.query_history[0].sql_query, executed[0]);
    assert_eq!(session.query_history[0].row_count, 1);
}

#[tokio::test]
async fn test_empty_select_notes_no_results_without_summary() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("SELECT * FROM orders WHERE total > 1000000");
    h.llm.set_summary("unused");

    let response = h.turn("query", "find huge orders", Some(&id)).await;

    assert!(response.success);
    assert!(response.message.contains("no results"));
    assert!(response.message.contains("check your filters"));
    assert_eq!(h.llm.summarize_count(), 0);
    assert!(response.data.get("summary").is_none());
}

#[tokio::test]
async fn test_many_rows_are_capped_in_message() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("SELECT id FROM orders");
    h.db
        .push_rows(&["id"], (1..=25).map(|i| json!({ "id": i })).collect());

    let response = h.turn("query", "list order ids", Some(&id)).await;

    assert!(response.success);
    assert!(response.message.contains("Showing 10 of 25 total results."));
    // Summary failure is swallowed
    assert!(response.data.get("summary").is_none());
    assert_eq!(h.llm.summarize_count(), 1);
}

#[tokio::test]
async fn test_failed_query_is_not_recorded() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("SELECT * FROM missing");
    h.db
        .push_result(Err(AppError::internal("no such table: missing")));

    let response = h.turn("query", "list everything in missing", Some(&id)).await;

    assert!(!response.success);
    assert!(response.message.contains("no such table: missing"));
    assert!(response.message.contains("Query Error:"));
    assert_eq!(response.data["query_result"]["success"], false);

    let session = h.orchestrator.session(&id).await.unwrap();
    assert!(session.query_history.is_empty());
}

#[tokio::test]
async fn test_read_request_refuses_modifying_sql() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("DROP TABLE orders");

    let response = h.turn("query", "list all orders", Some(&id)).await;

    assert!(!response.success);
    assert!(h.db.executed().is_empty());
}

#[tokio::test]
async fn test_query_requires_selected_tables() {
    let h = Harness::new();
    let id = h.connected().await;

    let response = h.turn("query", "how many orders are there", Some(&id)).await;

    assert!(!response.success);
    assert!(response.message.contains("No tables selected"));
    assert_eq!(h.llm.sql_count(), 0);
}

#[tokio::test]
async fn test_help_falls_back_to_static_suggestions() {
    let h = Harness::new();

    let response = h.turn("help", "what can you do?", None).await;

    assert!(!response.success);
    assert!(response.message.contains("rephrase"));
    assert!(response.agent.is_none());
    assert_eq!(response.data["intent"], "help");
    assert!(!response.data["suggestions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_help_uses_llm_text() {
    let h = Harness::new();
    h.llm.push_response("Start by connecting.");

    let response = h.turn("help", "help", None).await;

    assert!(response.success);
    assert_eq!(response.message, "Start by connecting.");
}

#[tokio::test]
async fn test_unknown_session_id_starts_new_session() {
    let h = Harness::new();

    let response = h.turn("help", "hello", Some("no-such-session")).await;

    let id = response.session_id.unwrap();
    assert_ne!(id, "no-such-session");
    assert!(h.orchestrator.session(&id).await.is_some());
    assert!(h.orchestrator.session("no-such-session").await.is_none());
}

#[tokio::test]
async fn test_delete_session_closes_connection() {
    let h = Harness::new();
    let id = h.connected().await;

    assert!(h.orchestrator.delete_session(&id).await);
    assert_eq!(h.db.open_count(), 0);
    assert!(h.orchestrator.session(&id).await.is_none());
    assert!(!h.orchestrator.delete_session(&id).await);
}

#[tokio::test]
async fn test_shutdown_closes_all_connections() {
    let h = Harness::new();
    h.connected().await;
    h.connected().await;
    assert_eq!(h.db.open_count(), 2);

    h.orchestrator.shutdown().await;

    assert_eq!(h.db.open_count(), 0);
}

#[tokio::test]
async fn test_repeated_question_reuses_cached_sql() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("SELECT COUNT(*) AS n FROM orders");
    h.db.push_rows(&["n"], vec![count_row(42)]);

    let first = h.turn("query", "How many orders are there?", Some(&id)).await;
    assert!(first.success, "{}", first.message);
    assert_eq!(first.data["cached"], false);

    h.db.push_rows(&["n"], vec![count_row(43)]);
    let second = h
        .turn("query", "how many  orders are there?", Some(&id))
        .await;

    assert!(second.success, "{}", second.message);
    assert_eq!(second.data["cached"], true);
    assert_eq!(second.data["query_result"]["rows"][0]["n"], 43);
    assert_eq!(h.llm.sql_count(), 1);
    assert_eq!(h.db.executed().len(), 2);
    let session = h.orchestrator.session(&id).await.unwrap();
    assert_eq!(session.query_history.len(), 2);
    assert_eq!(session.query_history[1].sql_query, "SELECT COUNT(*) AS n FROM orders");
}

#[tokio::test]
async fn test_new_questions_and_reselection_generate_fresh_sql() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("SELECT COUNT(*) AS n FROM orders");
    h.llm.push_sql("SELECT SUM(total) AS n FROM orders");

    h.turn("query", "how many orders", Some(&id)).await;
    let other = h.turn("query", "what is the total of all orders", Some(&id)).await;
    assert_eq!(other.data["cached"], false);
    assert_eq!(h.llm.sql_count(), 2);

    h.turn("exploration", "select orders and customers", Some(&id)).await;
    h.llm.push_sql("SELECT COUNT(*) AS n FROM orders");
    let again = h.turn("query", "how many orders", Some(&id)).await;

    assert!(again.success, "{}", again.message);
    assert_eq!(again.data["cached"], false);
    assert_eq!(h.llm.sql_count(), 3);
}

#[tokio::test]
async fn test_failed_query_is_not_cached() {
    let h = Harness::new();
    let id = h.with_orders().await;
    h.llm.push_sql("SELECT * FROM missing");
    h.db.push_result(Err(AppError::internal("no such table: missing")));
    h.turn("query", "show the missing rows", Some(&id)).await;

    h.llm.push_sql("SELECT id FROM orders");
    let response = h.turn("query", "show the missing rows", Some(&id)).await;

    assert_eq!(response.data["cached"], false);
    assert_eq!(h.llm.sql_count(), 2);
}

#[tokio::test]
async fn test_same_session_turns_are_serialized() {
    let h = Harness::new();
    let id = h.with_orders().await;
    for _ in 0..2 {
        h.llm.push_label("query");
        h.llm.push_sql("SELECT COUNT(*) AS n FROM orders");
        h.db.push_rows(&["n"], vec![count_row(42)]);
    }

    let (a, b) = tokio::join!(
        h.orchestrator.process("how many orders", Some(&id)),
        h.orchestrator.process("count the orders again", Some(&id)),
    );

    assert!(a.success && b.success);
    let session = h.orchestrator.session(&id).await.unwrap();
    assert_eq!(session.query_history.len(), 2);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let h = Harness::new();
    let first = h.with_orders().await;
    let second = h.connected().await;

    let session = h.orchestrator.session(&second).await.unwrap();
    assert!(session.selected_tables.is_empty());
    let session = h.orchestrator.session(&first).await.unwrap();
    assert_eq!(session.selected_table_names(), vec!["orders"]);
}
