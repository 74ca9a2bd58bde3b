//! Session-bound writes, identity insert wrapping and row counts.

mod common;

use common::{context, Company, Employee, Event, MockExecutor};
use serde::Deserialize;
use serde_json::json;
use tessera_orm::{expr, OrmError, Record};

#[derive(Debug, Deserialize, PartialEq)]
struct Inserted {
    id: i64,
    name: String,
}

#[tokio::test]
async fn test_explicit_identity_is_wrapped() {
    let mock = MockExecutor::new();
    mock.respond(vec![
        vec![],
        vec![json!({"id": "7", "name": "kim"})],
        vec![json!({"id": "8", "name": "lee"})],
        vec![],
    ]);
    let ctx = context(&mock);

    let inserted: Vec<Inserted> = ctx
        .connect(|db| async move {
            db.query::<Employee>()
                .insert_returning(
                    &db,
                    &[
                        Record::new().set("id", 7).set("name", "kim"),
                        Record::new().set("id", 8).set("name", "lee"),
                    ],
                    &["id", "name"],
                )
                .await
        })
        .await
        .unwrap();

    assert_eq!(
        inserted,
        vec![
            Inserted { id: 7, name: "kim".to_string() },
            Inserted { id: 8, name: "lee".to_string() },
        ]
    );
    let batch = &mock.batches()[0];
    assert_eq!(batch.len(), 4);
    assert_eq!(batch[0], "SET IDENTITY_INSERT [Main].[dbo].[Employee] ON");
    assert_eq!(
        batch[1],
        "INSERT INTO [Main].[dbo].[Employee] ([id], [fullName])\n\
         OUTPUT INSERTED.[id], INSERTED.[fullName] as [name]\n\
         VALUES (7, N'kim');"
    );
    assert_eq!(batch[3], "SET IDENTITY_INSERT [Main].[dbo].[Employee] OFF");
}

#[tokio::test]
async fn test_generated_identity_is_not_wrapped() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    ctx.connect(|db| async move {
        db.query::<Employee>()
            .insert(&db, &[Record::new().set("name", "kim")])
            .await
    })
    .await
    .unwrap();

    let batch = &mock.batches()[0];
    assert_eq!(batch.len(), 1);
    assert!(!batch[0].contains("IDENTITY_INSERT"));
}

#[tokio::test]
async fn test_insert_from_model_skips_unset_key() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);
    let employee = Employee {
        id: None,
        name: "kim".to_string(),
        age: Some(30),
        company_id: None,
        company: None,
    };

    ctx.connect(|db| async move {
        let record = Record::from_model(&employee)?;
        db.query::<Employee>().insert(&db, &[record]).await
    })
    .await
    .unwrap();

    assert_eq!(
        mock.statements(),
        vec!["INSERT INTO [Main].[dbo].[Employee] ([fullName], [age])\nVALUES (N'kim', 30);"]
    );
}

#[tokio::test]
async fn test_empty_insert_runs_nothing() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    ctx.connect(|db| async move { db.query::<Employee>().insert(&db, &[]).await })
        .await
        .unwrap();

    assert!(mock.batches().is_empty());
}

#[tokio::test]
async fn test_update_returning() {
    let mock = MockExecutor::new();
    mock.respond(vec![vec![json!({"id": 3, "age": 41})]]);
    let ctx = context(&mock);

    let rows: Vec<serde_json::Value> = ctx
        .connect(|db| async move {
            db.query::<Employee>()
                .where_clause(|e| vec![expr::equal(e.col("id"), 3)])
                .update_returning(&db, |_| Record::new().set("age", 41), &["id", "age"])
                .await
        })
        .await
        .unwrap();

    assert_eq!(rows, vec![json!({"id": 3, "age": 41})]);
    assert_eq!(
        mock.statements(),
        vec![
            "UPDATE [TBL] SET\n  [TBL].[age] = 41\n\
             OUTPUT INSERTED.[id], INSERTED.[age]\n\
             FROM [Main].[dbo].[Employee] as [TBL]\n\
             WHERE ([TBL].[id] = 3);"
        ]
    );
}

#[tokio::test]
async fn test_upsert_with_identity_in_insert_record() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    ctx.connect(|db| async move {
        db.query::<Company>()
            .where_clause(|e| vec![expr::equal(e.col("id"), 5)])
            .upsert(
                &db,
                |_| Record::new().set("name", "acme"),
                Some(Record::new().set("id", 5).set("name", "acme")),
            )
            .await
    })
    .await
    .unwrap();

    let batch = &mock.batches()[0];
    assert_eq!(batch.len(), 3);
    assert!(batch[0].ends_with("ON"));
    assert!(batch[1].starts_with("MERGE [Main].[dbo].[Company] as [TBL]"));
    assert!(batch[2].ends_with("OFF"));
}

#[tokio::test]
async fn test_delete_returning_and_prepare() {
    let mock = MockExecutor::new();
    mock.respond(vec![vec![json!({"id": 4})]]);
    let ctx = context(&mock);

    let deleted: Vec<serde_json::Value> = ctx
        .connect(|db| async move {
            let graph = db
                .query::<Employee>()
                .where_clause(|e| vec![expr::is_null(e.col("company_id"))]);
            let deleted = graph.delete_returning(&db, &["id"]).await?;
            graph.delete_prepare(&db, &[])?;
            db.execute_prepared().await?;
            Ok(deleted)
        })
        .await
        .unwrap();

    assert_eq!(deleted, vec![json!({"id": 4})]);
    let statements = mock.statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[1],
        "DELETE [TBL]\nFROM [Main].[dbo].[Employee] as [TBL]\nWHERE ([TBL].[companyId] IS NULL);"
    );
}

#[tokio::test]
async fn test_illegal_write_never_executes() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let result = ctx
        .connect(|db| async move {
            db.query::<Employee>()
                .where_clause(|e| vec![expr::equal(e.col("id"), 1)])
                .insert(&db, &[Record::new().set("name", "kim")])
                .await
        })
        .await;

    assert!(matches!(
        result,
        Err(OrmError::IllegalClause { statement: "INSERT", clause: "WHERE" })
    ));
    assert!(mock.batches().is_empty());
    assert!(mock.events().contains(&Event::Rollback));
}

#[tokio::test]
async fn test_count_and_exists() {
    let mock = MockExecutor::new();
    mock.respond(vec![vec![json!({"cnt": 3})]]);
    let ctx = context(&mock);

    let (count, exists) = ctx
        .connect(|db| async move {
            let graph = db
                .query::<Employee>()
                .where_clause(|e| vec![expr::greater_than(e.col("age"), 20)])
                .order_by(|e| e.col("name"), tessera_orm::OrderDirection::Asc)?
                .limit(0, 10);
            let count = graph.count(&db).await?;
            let exists = graph.exists(&db).await?;
            Ok((count, exists))
        })
        .await
        .unwrap();

    assert_eq!(count, 3);
    assert!(exists);
    assert_eq!(mock.batches().len(), 1);
    assert_eq!(
        mock.statements()[0],
        "SELECT\n  COUNT(*) as [cnt]\nFROM [Main].[dbo].[Employee] as [TBL]\nWHERE ([TBL].[age] > 20)"
    );
}

#[tokio::test]
async fn test_count_after_distinct_fails() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);

    let result = ctx
        .connect(|db| async move { db.query::<Employee>().distinct().count(&db).await })
        .await;

    assert!(matches!(result, Err(OrmError::CountAfterDistinct)));
}

#[tokio::test]
async fn test_single_rejects_several_rows() {
    let mock = MockExecutor::new();
    mock.respond(vec![vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})]]);
    mock.respond(vec![vec![]]);
    let ctx = context(&mock);

    let (several, none) = ctx
        .connect(|db| async move {
            let several = db.query::<Employee>().single(&db).await;
            let none = db
                .query::<Employee>()
                .where_clause(|e| vec![expr::equal(e.col("id"), 9)])
                .single(&db)
                .await?;
            Ok((several, none))
        })
        .await
        .unwrap();

    assert!(matches!(several, Err(OrmError::MultipleRows(2))));
    assert!(none.is_none());
}

#[tokio::test]
async fn test_bulk_insert_maps_physical_names() {
    let mock = MockExecutor::new();
    let ctx = context(&mock);
    let employees = vec![
        Employee {
            id: None,
            name: "kim".to_string(),
            age: None,
            company_id: Some(1),
            company: None,
        };
        3
    ];

    ctx.connect(|db| async move { db.query::<Employee>().bulk_insert(&db, &employees).await })
        .await
        .unwrap();

    assert!(mock.events().contains(&Event::BulkInsert {
        table: "[Main].[dbo].[Employee]".to_string(),
        rows: 3,
    }));
}
