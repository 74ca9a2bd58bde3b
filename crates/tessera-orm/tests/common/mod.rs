#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_orm::{
    BoxError, BulkColumn, DbContext, Executor, IsolationLevel, Migration, Model, Row,
};

#[derive(Debug, Clone, PartialEq, Model, Serialize, Deserialize)]
#[table(schema = "dbo")]
pub struct Company {
    #[column(primary_key = 1, auto_increment)]
    pub id: Option<i64>,
    pub name: String,
    #[foreign_key_target(foreign_key = "company")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub employees: Vec<Employee>,
}

#[derive(Debug, Clone, PartialEq, Model, Serialize, Deserialize)]
#[table(schema = "dbo")]
#[index(name = "byName", columns = "name")]
pub struct Employee {
    #[column(primary_key = 1, auto_increment)]
    pub id: Option<i64>,
    #[column(name = "fullName")]
    pub name: String,
    pub age: Option<i64>,
    #[column(name = "companyId")]
    pub company_id: Option<i64>,
    #[foreign_key(columns = "company_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
}

/// Events recorded by [`MockExecutor`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Begin(Option<IsolationLevel>),
    Commit,
    Rollback,
    Close,
    Execute(Vec<String>),
    BulkInsert { table: String, rows: usize },
}

#[derive(Default)]
struct MockState {
    events: Vec<Event>,
    responses: VecDeque<Vec<Vec<Row>>>,
    fail_on: Option<String>,
    rollback_error: Option<String>,
    yielding: bool,
}

/// An executor that records every call and answers `execute` from a script.
///
/// Without a scripted response every statement returns an empty result set.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockExecutor").finish_non_exhaustive()
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result sets of the next `execute` call.
    pub fn respond(&self, results: Vec<Vec<Value>>) {
        let results = results
            .into_iter()
            .map(|set| set.into_iter().map(into_row).collect())
            .collect();
        self.state.lock().unwrap().responses.push_back(results);
    }

    /// Fails every `execute` call whose batch contains `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.state.lock().unwrap().fail_on = Some(needle.to_string());
    }

    /// Fails every rollback with `message`.
    pub fn fail_rollback(&self, message: &str) {
        self.state.lock().unwrap().rollback_error = Some(message.to_string());
    }

    /// Makes every `execute` call yield to the scheduler once, so concurrent
    /// session calls interleave.
    pub fn yield_on_execute(&self) {
        self.state.lock().unwrap().yielding = true;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Every executed batch.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Execute(statements) => Some(statements),
                _ => None,
            })
            .collect()
    }

    /// Every executed statement, flattened.
    pub fn statements(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().events.clear();
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn connect(&mut self) -> Result<(), BoxError> {
        self.record(Event::Connect);
        Ok(())
    }

    async fn begin_transaction(&mut self, isolation: Option<IsolationLevel>) -> Result<(), BoxError> {
        self.record(Event::Begin(isolation));
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<(), BoxError> {
        self.record(Event::Commit);
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<(), BoxError> {
        self.record(Event::Rollback);
        let error = self.state.lock().unwrap().rollback_error.clone();
        match error {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), BoxError> {
        self.record(Event::Close);
        Ok(())
    }

    async fn execute(&mut self, statements: &[String]) -> Result<Vec<Vec<Row>>, BoxError> {
        self.record(Event::Execute(statements.to_vec()));
        let yielding = self.state.lock().unwrap().yielding;
        if yielding {
            tokio::task::yield_now().await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(needle) = &state.fail_on {
            if statements.iter().any(|s| s.contains(needle.as_str())) {
                return Err(format!("statement failed near '{needle}'").into());
            }
        }
        Ok(state
            .responses
            .pop_front()
            .unwrap_or_else(|| vec![Vec::new(); statements.len()]))
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        _columns: &[BulkColumn],
        rows: &[Row],
    ) -> Result<(), BoxError> {
        self.record(Event::BulkInsert {
            table: table.to_string(),
            rows: rows.len(),
        });
        Ok(())
    }
}

pub fn into_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object row, got {other}"),
    }
}

/// A session over `executor` with database `Main`, schema `dbo` and both
/// sample models registered.
pub fn context(executor: &MockExecutor) -> DbContext {
    DbContext::builder(executor.clone())
        .database("Main")
        .schema("dbo")
        .model::<Company>()
        .model::<Employee>()
        .build()
        .unwrap()
}

/// A migration that runs one raw statement.
#[derive(Debug, Clone)]
pub struct RawMigration {
    pub name: String,
    pub sql: String,
}

impl RawMigration {
    pub fn new(name: &str, sql: &str) -> Self {
        Self {
            name: name.to_string(),
            sql: sql.to_string(),
        }
    }
}

#[async_trait]
impl Migration for RawMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, ctx: &DbContext) -> tessera_orm::Result<()> {
        ctx.execute_queries(&[self.sql.clone()]).await?;
        Ok(())
    }
}
