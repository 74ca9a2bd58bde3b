//! INSERT, UPDATE, MERGE and DELETE.

use super::QueryCompiler;
use crate::error::{QueryError, Result};
use crate::query::{DeleteDef, InsertDef, UpdateDef, UpsertDef};

fn output_clause(prefix: &str, output: &[String]) -> String {
    if output.is_empty() {
        return String::new();
    }
    let columns = output
        .iter()
        .map(|c| format!("{prefix}.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OUTPUT {columns}\n")
}

fn top_clause(top: Option<u64>) -> String {
    top.map(|n| format!(" TOP ({n})")).unwrap_or_default()
}

impl QueryCompiler {
    /// Compiles an INSERT.
    pub fn insert(&self, def: &InsertDef) -> Result<String> {
        if def.record.is_empty() {
            return Err(QueryError::EmptyRecord { statement: "INSERT" });
        }
        let table = self.dialect.quote_table_name(&def.from)?;
        let (keys, values) = self.record_lists(&def.record)?;

        let mut q = format!("INSERT INTO {table} ({keys})\n");
        q.push_str(&output_clause("INSERTED", &def.output));
        q.push_str(&format!("VALUES ({values})"));
        Ok(format!("{};", q.trim()))
    }

    /// Compiles an UPDATE.
    pub fn update(&self, def: &UpdateDef) -> Result<String> {
        if def.record.is_empty() {
            return Err(QueryError::EmptyRecord { statement: "UPDATE" });
        }
        let table = self.dialect.quote_table_name(&def.from)?;
        let alias = &def.alias;

        let mut q = format!("UPDATE{} {alias} SET\n", top_clause(def.top));
        let sets = def
            .record
            .iter()
            .map(|(k, v)| Ok(format!("  {alias}.{k} = {}", self.value(v)?)))
            .collect::<Result<Vec<_>>>()?;
        q.push_str(&sets.join(",\n"));
        q.push('\n');
        q.push_str(&output_clause("INSERTED", &def.output));
        q.push_str(&format!("FROM {table} as {alias}\n"));
        for join in &def.joins {
            q.push_str(&self.join(join)?);
            q.push('\n');
        }
        if let Some(tokens) = def.where_clause.as_ref().filter(|t| !t.is_empty()) {
            q.push_str(&format!("WHERE {}\n", self.tokens(tokens)?));
        }
        Ok(format!("{};", q.trim()))
    }

    /// Compiles a MERGE that updates the matched row or inserts a new one.
    pub fn upsert(&self, def: &UpsertDef) -> Result<String> {
        if def.where_clause.is_empty() {
            return Err(QueryError::UpsertWithoutWhere);
        }
        if def.insert_record.is_empty() {
            return Err(QueryError::EmptyRecord { statement: "UPSERT" });
        }
        let table = self.dialect.quote_table_name(&def.from)?;
        let alias = &def.alias;

        let mut q = format!("MERGE {table} as {alias}\n");
        q.push_str("USING (SELECT 0 as _using) as _using\n");
        q.push_str(&format!("ON {}\n", self.tokens(&def.where_clause)?));
        if !def.update_record.is_empty() {
            q.push_str("WHEN MATCHED THEN\n");
            q.push_str("  UPDATE SET\n");
            let sets = def
                .update_record
                .iter()
                .map(|(k, v)| Ok(format!("    {k} = {}", self.value(v)?)))
                .collect::<Result<Vec<_>>>()?;
            q.push_str(&sets.join(",\n"));
            q.push('\n');
        }
        let (keys, values) = self.record_lists(&def.insert_record)?;
        q.push_str("WHEN NOT MATCHED THEN\n");
        q.push_str(&format!("  INSERT ({keys})\n"));
        q.push_str(&format!("  VALUES ({values})\n"));
        q.push_str(&output_clause("INSERTED", &def.output));
        Ok(format!("{};", q.trim()))
    }

    /// Compiles a DELETE.
    pub fn delete(&self, def: &DeleteDef) -> Result<String> {
        let table = self.dialect.quote_table_name(&def.from)?;
        let alias = &def.alias;

        let mut q = format!("DELETE{} {alias}\n", top_clause(def.top));
        q.push_str(&output_clause("DELETED", &def.output));
        q.push_str(&format!("FROM {table} as {alias}\n"));
        for join in &def.joins {
            q.push_str(&self.join(join)?);
            q.push('\n');
        }
        if let Some(tokens) = def.where_clause.as_ref().filter(|t| !t.is_empty()) {
            q.push_str(&format!("WHERE {}\n", self.tokens(tokens)?));
        }
        Ok(format!("{};", q.trim()))
    }
}
