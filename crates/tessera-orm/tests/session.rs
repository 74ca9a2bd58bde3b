//! Connection, transaction and prepared queue behavior of `DbContext`.

mod common;

use common::{context, Employee, Event, MockExecutor};
use serde_json::{json, Value};
use tessera_orm::{expr, IsolationLevel, OrmError, Record, SessionStatus};

#[tokio::test]
async fn test_connect_commits_and_closes() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let status = ctx
        .connect(|db| async move {
            db.execute_queries(&["SELECT 1".to_string()]).await?;
            Ok(db.status())
        })
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Transacting);
    assert_eq!(ctx.status(), SessionStatus::Ready);
    assert_eq!(
        mock.events(),
        vec![
            Event::Connect,
            Event::Begin(None),
            Event::Execute(vec!["SELECT 1".to_string()]),
            Event::Commit,
            Event::Close,
        ]
    );
}

#[tokio::test]
async fn test_connect_rolls_back_on_error() {
    let mock = MockExecutor::new();
    mock.fail_on("boom");
    let ctx = context(&mock);

    let result = ctx
        .connect(|db| async move {
            db.execute_queries(&["SELECT boom".to_string()]).await?;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(OrmError::Statement { statements, .. }) if statements == "SELECT boom"));
    assert_eq!(
        mock.events(),
        vec![
            Event::Connect,
            Event::Begin(None),
            Event::Execute(vec!["SELECT boom".to_string()]),
            Event::Rollback,
            Event::Close,
        ]
    );
    assert_eq!(ctx.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn test_rollback_without_begin_is_swallowed() {
    let mock = MockExecutor::new();
    mock.fail_on("boom");
    mock.fail_rollback(
        "The ROLLBACK TRANSACTION request has no corresponding BEGIN TRANSACTION.",
    );
    let ctx = context(&mock);

    let result = ctx
        .connect(|db| async move { db.execute_queries(&["boom".to_string()]).await.map(|_| ()) })
        .await;

    assert!(matches!(result, Err(OrmError::Statement { .. })));
}

#[tokio::test]
async fn test_other_rollback_failure_is_reported() {
    let mock = MockExecutor::new();
    mock.fail_on("boom");
    mock.fail_rollback("connection reset");
    let ctx = context(&mock);

    let result = ctx
        .connect(|db| async move { db.execute_queries(&["boom".to_string()]).await.map(|_| ()) })
        .await;

    match result {
        Err(OrmError::Executor(e)) => assert_eq!(e.to_string(), "connection reset"),
        other => panic!("expected the rollback failure, got {other:?}"),
    }
    assert_eq!(mock.events().last(), Some(&Event::Close));
}

#[tokio::test]
async fn test_nested_transaction_fails() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let result = ctx
        .connect(|db| async move { db.transaction(|_| async { Ok(()) }).await })
        .await;

    assert!(matches!(result, Err(OrmError::Session(_))));
}

#[tokio::test]
async fn test_transaction_inside_connection_without_transaction() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    ctx.connect_without_transaction(|db| async move {
        assert_eq!(db.status(), SessionStatus::Connected);
        db.transaction_isolated(Some(IsolationLevel::Serializable), |db| async move {
            assert_eq!(db.status(), SessionStatus::Transacting);
            Ok(())
        })
        .await?;
        assert_eq!(db.status(), SessionStatus::Connected);
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(
        mock.events(),
        vec![
            Event::Connect,
            Event::Begin(Some(IsolationLevel::Serializable)),
            Event::Commit,
            Event::Close,
        ]
    );
}

#[tokio::test]
async fn test_failed_transaction_closes_connection() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let result = ctx
        .connect_without_transaction(|db| async move {
            db.transaction(|_| async { Err::<(), _>(OrmError::Session("nope".to_string())) })
                .await
        })
        .await;

    assert!(matches!(result, Err(OrmError::Session(message)) if message == "nope"));
    assert!(mock.events().contains(&Event::Rollback));
    assert_eq!(ctx.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn test_execute_requires_connection() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let result = ctx.execute_queries(&["SELECT 1".to_string()]).await;

    assert!(matches!(result, Err(OrmError::Session(_))));
    assert!(mock.events().is_empty());
}

#[tokio::test]
async fn test_prepared_returns_kept_results_in_order() {
    let mock = MockExecutor::new();
    mock.respond(vec![
        vec![],
        vec![json!({"id": 1})],
        vec![],
        vec![json!({"id": 2, "name": "kim"})],
    ]);
    let ctx = context(&mock);

    let results = ctx
        .connect(|db| async move {
            let employees = db.query::<Employee>();
            employees.configure_identity_insert(&db, true)?;
            employees.insert_prepare(&db, &[Record::new().set("name", "lee")], &["id"])?;
            employees.configure_identity_insert(&db, false)?;
            employees
                .where_clause(|e| vec![expr::equal(e.col("id"), 2)])
                .result_prepare(&db)?;
            assert_eq!(db.prepared_len(), 4);
            db.execute_prepared().await
        })
        .await
        .unwrap();

    assert_eq!(
        results,
        vec![vec![json!({"id": 1})], vec![json!({"id": 2, "name": "kim"})]]
    );
    let batches = mock.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 4);
    assert_eq!(batches[0][0], "SET IDENTITY_INSERT [Main].[dbo].[Employee] ON");
    assert_eq!(batches[0][3].lines().next(), Some("SELECT"));
}

#[tokio::test]
async fn test_empty_prepared_queue_runs_nothing() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let results: Vec<Vec<Value>> = ctx
        .connect(|db| async move { db.execute_prepared().await })
        .await
        .unwrap();

    assert!(results.is_empty());
    assert!(mock.batches().is_empty());
}

#[tokio::test]
async fn test_close_rolls_back_open_transaction() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let status = ctx
        .connect(|db| async move {
            db.close().await?;
            Ok(db.status())
        })
        .await
        .unwrap();

    assert_eq!(status, SessionStatus::Ready);
    assert_eq!(
        mock.events(),
        vec![Event::Connect, Event::Begin(None), Event::Rollback, Event::Close]
    );
}

#[tokio::test]
async fn test_close_ignores_rollback_without_begin() {
    let mock = MockExecutor::new();
    mock.fail_rollback(
        "The ROLLBACK TRANSACTION request has no corresponding BEGIN TRANSACTION.",
    );
    let ctx = context(&mock);

    let result = ctx.connect(|db| async move { db.close().await }).await;

    assert!(result.is_ok());
    assert_eq!(mock.events().last(), Some(&Event::Close));
    assert_eq!(ctx.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn test_close_reports_rollback_failure_after_closing() {
    let mock = MockExecutor::new();
    mock.fail_rollback("connection reset");
    let ctx = context(&mock);

    let result = ctx.connect(|db| async move { db.close().await }).await;

    match result {
        Err(OrmError::Executor(e)) => assert_eq!(e.to_string(), "connection reset"),
        other => panic!("expected the rollback failure, got {other:?}"),
    }
    assert_eq!(
        mock.events(),
        vec![Event::Connect, Event::Begin(None), Event::Rollback, Event::Close]
    );
    assert_eq!(ctx.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn test_close_when_ready_does_nothing() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    ctx.close().await.unwrap();

    assert!(mock.events().is_empty());
}
