//! Session-bound execution of graphs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use tessera_core::query::ConfigIdentityInsertDef;
use tessera_core::schema::ValueType;
use tessera_core::{QueryDef, TableName};

use super::QueryGraph;
use crate::context::{BulkColumn, DbContext};
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::expr;
use crate::record::Record;
use crate::result::{ParseOption, Row};

fn decode<R: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<R>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(OrmError::from))
        .collect()
}

/// Write definitions plus the `SET IDENTITY_INSERT` toggles around them.
struct WriteBatch {
    defs: Vec<QueryDef>,
    identity: Option<TableName>,
}

impl WriteBatch {
    fn new(defs: Vec<QueryDef>, identity: Option<TableName>) -> Self {
        Self { defs, identity }
    }

    fn toggle(table: &TableName, enabled: bool) -> QueryDef {
        QueryDef::ConfigIdentityInsert(ConfigIdentityInsertDef {
            table: table.clone(),
            enabled,
        })
    }

    /// Every definition in execution order, `true` marking the writes.
    fn into_entries(self) -> Vec<(QueryDef, bool)> {
        let Some(table) = self.identity else {
            return self.defs.into_iter().map(|def| (def, true)).collect();
        };
        let mut entries = Vec::with_capacity(self.defs.len() + 2);
        entries.push((Self::toggle(&table, true), false));
        entries.extend(self.defs.into_iter().map(|def| (def, true)));
        entries.push((Self::toggle(&table, false), false));
        entries
    }

    async fn execute(self, ctx: &DbContext, option: &ParseOption) -> Result<Vec<Value>> {
        let entries = self.into_entries();
        let options: Vec<Option<ParseOption>> = entries
            .iter()
            .map(|(_, keep)| keep.then(|| option.clone()))
            .collect();
        let keeps: Vec<bool> = entries.iter().map(|(_, keep)| *keep).collect();
        let defs: Vec<QueryDef> = entries.into_iter().map(|(def, _)| def).collect();

        let results = ctx.execute_defs(&defs, &options).await?;
        Ok(results
            .into_iter()
            .zip(keeps)
            .filter(|(_, keep)| *keep)
            .flat_map(|(rows, _)| rows)
            .collect())
    }

    fn prepare(self, ctx: &DbContext, option: &ParseOption) -> Result<()> {
        for (def, keep) in self.into_entries() {
            ctx.prepare(&def, keep.then(|| option.clone()), keep)?;
        }
        Ok(())
    }
}

impl<T> QueryGraph<T> {
    fn output_option(&self, output: &[&str]) -> ParseOption {
        ParseOption::from_entity(&self.entity, Some(output))
    }

    /// The table to bracket with `SET IDENTITY_INSERT` when `record` sets the
    /// auto-increment column.
    fn identity_target(&self, record: Option<&Record>) -> Option<TableName> {
        let meta = self.table?;
        let column = meta.auto_increment_column()?;
        if column.value_type == ValueType::Uuid {
            return None;
        }
        record
            .filter(|record| record.contains_key(&column.property_key))
            .map(|_| self.scope.table_name(meta))
    }

    fn insert_batch(&self, records: &[Record], output: &[&str]) -> Result<WriteBatch> {
        let defs = records
            .iter()
            .map(|record| self.insert_def(record, output).map(QueryDef::Insert))
            .collect::<Result<Vec<_>>>()?;
        Ok(WriteBatch::new(defs, self.identity_target(records.first())))
    }

    fn upsert_batch(
        &self,
        update: &Record,
        insert: Option<&Record>,
        output: &[&str],
    ) -> Result<WriteBatch> {
        let def = self.upsert_def(update, insert, output)?;
        let identity = self.identity_target(Some(insert.unwrap_or(update)));
        Ok(WriteBatch::new(vec![QueryDef::Upsert(def)], identity))
    }

    /// Queues this select. Its rows are returned by
    /// [`DbContext::execute_prepared`].
    pub fn result_prepare(&self, ctx: &DbContext) -> Result<()> {
        let def = self.select_def()?;
        let option = ParseOption::from_entity(&self.entity, None);
        ctx.prepare(&QueryDef::Select(def), Some(option), true)
    }

    /// Number of rows. Ordering and paging are dropped.
    pub async fn count(&self, ctx: &DbContext) -> Result<u64> {
        if self.clauses.distinct {
            return Err(OrmError::CountAfterDistinct);
        }
        if !self.clauses.group_by.is_empty() {
            return Err(OrmError::CountAfterGroupBy);
        }

        let mut graph = self.clone().clear_order_by();
        graph.clauses_mut().limit = None;
        let graph = graph.select(|_| Entity::new().with("cnt", expr::count()));
        let rows = graph.result(ctx).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("cnt"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Returns `true` when at least one row matches.
    pub async fn exists(&self, ctx: &DbContext) -> Result<bool> {
        Ok(self.count(ctx).await? > 0)
    }

    /// Inserts records.
    pub async fn insert(&self, ctx: &DbContext, records: &[Record]) -> Result<()> {
        self.insert_returning::<Value>(ctx, records, &[]).await?;
        Ok(())
    }

    /// Inserts records and returns the `output` columns of each inserted row.
    pub async fn insert_returning<R: DeserializeOwned>(
        &self,
        ctx: &DbContext,
        records: &[Record],
        output: &[&str],
    ) -> Result<Vec<R>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.insert_batch(records, output)?;
        decode(batch.execute(ctx, &self.output_option(output)).await?)
    }

    /// Queues inserts for [`DbContext::execute_prepared`].
    pub fn insert_prepare(&self, ctx: &DbContext, records: &[Record], output: &[&str]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.insert_batch(records, output)?
            .prepare(ctx, &self.output_option(output))
    }

    /// Updates the selected rows with the record `f` builds from the entity.
    pub async fn update<F>(&self, ctx: &DbContext, f: F) -> Result<()>
    where
        F: FnOnce(&Entity) -> Record,
    {
        self.update_returning::<Value, F>(ctx, f, &[]).await?;
        Ok(())
    }

    /// Updates the selected rows and returns their `output` columns.
    pub async fn update_returning<R, F>(&self, ctx: &DbContext, f: F, output: &[&str]) -> Result<Vec<R>>
    where
        R: DeserializeOwned,
        F: FnOnce(&Entity) -> Record,
    {
        let record = f(&self.entity);
        let def = self.update_def(&record, output)?;
        let batch = WriteBatch::new(vec![QueryDef::Update(def)], None);
        decode(batch.execute(ctx, &self.output_option(output)).await?)
    }

    /// Queues an update for [`DbContext::execute_prepared`].
    pub fn update_prepare<F>(&self, ctx: &DbContext, f: F, output: &[&str]) -> Result<()>
    where
        F: FnOnce(&Entity) -> Record,
    {
        let record = f(&self.entity);
        let def = self.update_def(&record, output)?;
        WriteBatch::new(vec![QueryDef::Update(def)], None).prepare(ctx, &self.output_option(output))
    }

    /// Updates the rows matching the WHERE clause, or inserts `insert` (the
    /// update record when `None`) when none match.
    pub async fn upsert<F>(&self, ctx: &DbContext, update: F, insert: Option<Record>) -> Result<()>
    where
        F: FnOnce(&Entity) -> Record,
    {
        self.upsert_returning::<Value, F>(ctx, update, insert, &[]).await?;
        Ok(())
    }

    /// [`QueryGraph::upsert`] returning the `output` columns of the affected
    /// row.
    pub async fn upsert_returning<R, F>(
        &self,
        ctx: &DbContext,
        update: F,
        insert: Option<Record>,
        output: &[&str],
    ) -> Result<Vec<R>>
    where
        R: DeserializeOwned,
        F: FnOnce(&Entity) -> Record,
    {
        let update = update(&self.entity);
        let batch = self.upsert_batch(&update, insert.as_ref(), output)?;
        decode(batch.execute(ctx, &self.output_option(output)).await?)
    }

    /// Queues an upsert for [`DbContext::execute_prepared`].
    pub fn upsert_prepare<F>(
        &self,
        ctx: &DbContext,
        update: F,
        insert: Option<Record>,
        output: &[&str],
    ) -> Result<()>
    where
        F: FnOnce(&Entity) -> Record,
    {
        let update = update(&self.entity);
        self.upsert_batch(&update, insert.as_ref(), output)?
            .prepare(ctx, &self.output_option(output))
    }

    /// Deletes the selected rows.
    pub async fn delete(&self, ctx: &DbContext) -> Result<()> {
        self.delete_returning::<Value>(ctx, &[]).await?;
        Ok(())
    }

    /// Deletes the selected rows and returns their `output` columns.
    pub async fn delete_returning<R: DeserializeOwned>(
        &self,
        ctx: &DbContext,
        output: &[&str],
    ) -> Result<Vec<R>> {
        let def = self.delete_def(output)?;
        let batch = WriteBatch::new(vec![QueryDef::Delete(def)], None);
        decode(batch.execute(ctx, &self.output_option(output)).await?)
    }

    /// Queues a delete for [`DbContext::execute_prepared`].
    pub fn delete_prepare(&self, ctx: &DbContext, output: &[&str]) -> Result<()> {
        let def = self.delete_def(output)?;
        WriteBatch::new(vec![QueryDef::Delete(def)], None).prepare(ctx, &self.output_option(output))
    }

    /// Loads serializable items through the executor's bulk path. Fields
    /// that are not columns are ignored; keys are mapped to column names.
    pub async fn bulk_insert<S: Serialize>(&self, ctx: &DbContext, items: &[S]) -> Result<()> {
        let meta = self.table.ok_or(OrmError::NoTable {
            statement: "BULK INSERT",
        })?;
        if items.is_empty() {
            return Ok(());
        }
        let dialect = self.scope.dialect();
        let columns: Vec<BulkColumn> = meta
            .columns
            .iter()
            .map(|column| BulkColumn {
                name: column.name.clone(),
                data_type: dialect.column_type_name(column),
                nullable: column.nullable,
                auto_increment: column.auto_increment,
            })
            .collect();

        let rows = items
            .iter()
            .map(|item| {
                let Value::Object(mut object) = serde_json::to_value(item)? else {
                    return Err(OrmError::Config(format!(
                        "bulk insert into '{}' expects objects",
                        meta.name
                    )));
                };
                Ok(meta
                    .columns
                    .iter()
                    .filter_map(|column| {
                        object
                            .remove(&column.property_key)
                            .map(|value| (column.name.clone(), value))
                    })
                    .collect::<Row>())
            })
            .collect::<Result<Vec<_>>>()?;

        ctx.bulk_insert(&self.scope.table_name(meta), &columns, &rows)
            .await
    }

    /// Queues `SET IDENTITY_INSERT` for this graph's table. The toggle
    /// contributes no result to [`DbContext::execute_prepared`].
    pub fn configure_identity_insert(&self, ctx: &DbContext, enabled: bool) -> Result<()> {
        let meta = self.table.ok_or(OrmError::NoTable {
            statement: "SET IDENTITY_INSERT",
        })?;
        let def = WriteBatch::toggle(&self.scope.table_name(meta), enabled);
        ctx.prepare(&def, None, false)
    }
}

impl<T: DeserializeOwned> QueryGraph<T> {
    /// Runs the select and returns every reconstructed row.
    pub async fn result(&self, ctx: &DbContext) -> Result<Vec<T>> {
        let def = self.select_def()?;
        let option = ParseOption::from_entity(&self.entity, None);
        let mut results = ctx
            .execute_defs(&[QueryDef::Select(def)], &[Some(option)])
            .await?;
        decode(results.pop().unwrap_or_default())
    }

    /// Runs the select and returns its only row, if any.
    ///
    /// Fails with [`OrmError::MultipleRows`] when several rows come back.
    pub async fn single(&self, ctx: &DbContext) -> Result<Option<T>> {
        let mut rows = self.result(ctx).await?;
        if rows.len() > 1 {
            return Err(OrmError::MultipleRows(rows.len()));
        }
        Ok(rows.pop())
    }
}
