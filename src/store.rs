/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2025 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use rusqlite::{
    types::{ToSql, Value},
    Connection, Transaction,
};
use tracing::{debug, error};

use crate::error::{StoreError, StoreResult};

pub type StorePtr = Arc<GovStore>;

/// Structure representing base governance database operations.
/// A single instance is shared by every component, statements are
/// serialized through the connection lock.
pub struct GovStore {
    /// Connection to the SQLite database.
    pub conn: Mutex<Connection>,
}

impl GovStore {
    /// Create a new governance database handler. If `path` is `None`,
    /// create it in memory.
    pub fn new(path: Option<PathBuf>) -> StoreResult<StorePtr> {
        let Ok(conn) = (match path.clone() {
            Some(p) => Connection::open(p),
            None => Connection::open_in_memory(),
        }) else {
            return Err(StoreError::ConnectionFailed);
        };

        if let Err(e) = conn.pragma_update(None, "foreign_keys", "ON") {
            error!(target: "store::new", "[GovStore] Pragma update failed: {e}");
            return Err(StoreError::PragmaUpdateError);
        };

        debug!(target: "store::new", "[GovStore] Opened Sqlite connection at \"{path:?}\"");
        Ok(Arc::new(Self { conn: Mutex::new(conn) }))
    }

    /// Execute a given SQL query that contains multiple SQL statements,
    /// without any parameters. Used to initialize the table schema.
    pub fn exec_batch_sql(&self, query: &str) -> StoreResult<()> {
        debug!(target: "store::exec_batch_sql", "[GovStore] Executing batch SQL query:\n{query}");
        let Ok(conn) = self.conn.lock() else { return Err(StoreError::FailedToAcquireLock) };
        if let Err(e) = conn.execute_batch(query) {
            error!(target: "store::exec_batch_sql", "[GovStore] Query failed: {e}");
            return Err(StoreError::QueryExecutionFailed)
        };

        Ok(())
    }

    /// Execute a single parameterized SQL statement, returning the number
    /// of rows it changed.
    pub fn exec_sql(&self, query: &str, params: &[&dyn ToSql]) -> StoreResult<usize> {
        debug!(target: "store::exec_sql", "[GovStore] Executing SQL query:\n{query}");
        let Ok(conn) = self.conn.lock() else { return Err(StoreError::FailedToAcquireLock) };

        // If no params are provided, execute directly
        if params.is_empty() {
            match conn.execute(query, ()) {
                Ok(changed) => return Ok(changed),
                Err(e) => {
                    error!(target: "store::exec_sql", "[GovStore] Query failed: {e}");
                    return Err(StoreError::QueryExecutionFailed)
                }
            }
        }

        // First we prepare the query
        let Ok(mut stmt) = conn.prepare(query) else {
            return Err(StoreError::QueryPreparationFailed)
        };

        // Execute the query using provided params
        let changed = match stmt.execute(params) {
            Ok(changed) => changed,
            Err(e) => {
                error!(target: "store::exec_sql", "[GovStore] Query failed: {e}");
                return Err(StoreError::QueryExecutionFailed)
            }
        };

        // Finalize query and drop connection lock
        if let Err(e) = stmt.finalize() {
            error!(target: "store::exec_sql", "[GovStore] Query finalization failed: {e}");
            return Err(StoreError::QueryFinalizationFailed)
        };
        drop(conn);

        Ok(changed)
    }

    /// Execute the provided closure with all its statements inside a single
    /// SQL transaction, so a failure in any of them rolls back the ones
    /// already executed. Multi-statement ledger mutations must go through
    /// here, never through sequential `exec_sql` calls.
    pub fn exec_txn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction) -> StoreResult<T>,
    {
        let Ok(mut conn) = self.conn.lock() else { return Err(StoreError::FailedToAcquireLock) };
        let Ok(tx) = conn.transaction() else { return Err(StoreError::TransactionBeginFailed) };

        // Dropping the transaction on the error path rolls it back
        let result = f(&tx)?;

        if let Err(e) = tx.commit() {
            error!(target: "store::exec_txn", "[GovStore] Transaction commit failed: {e}");
            return Err(StoreError::TransactionCommitFailed)
        };

        Ok(result)
    }

    /// Generate a `SELECT` query for provided table from selected column names and
    /// provided `WHERE` clauses. Named parameters are supported in the `WHERE` clauses,
    /// assuming they follow the normal formatting ":{column_name}".
    fn generate_select_query(
        &self,
        table: &str,
        col_names: &[&str],
        params: &[(&str, &dyn ToSql)],
    ) -> String {
        let mut query = if col_names.is_empty() {
            format!("SELECT * FROM {table}")
        } else {
            format!("SELECT {} FROM {table}", col_names.join(", "))
        };
        if params.is_empty() {
            return query
        }

        let mut where_str = Vec::with_capacity(params.len());
        for (k, _) in params {
            let col = &k[1..];
            where_str.push(format!("{col} = {k}"));
        }
        query.push_str(&format!(" WHERE {}", where_str.join(" AND ")));

        query
    }

    /// Auxiliary function to grab the values of a returned row, either for
    /// all its columns or the selected ones.
    fn parse_row(row: &rusqlite::Row, col_names: &[&str]) -> StoreResult<Vec<Value>> {
        let mut values = vec![];
        if col_names.is_empty() {
            let mut idx = 0;
            loop {
                let Ok(value) = row.get(idx) else { break };
                values.push(value);
                idx += 1;
            }
            return Ok(values)
        }

        for col in col_names {
            let Ok(value) = row.get(*col) else { return Err(StoreError::ParseColumnValueError) };
            values.push(value);
        }

        Ok(values)
    }

    /// Query provided table from selected column names and provided `WHERE` clauses,
    /// for a single row.
    pub fn query_single(
        &self,
        table: &str,
        col_names: &[&str],
        params: &[(&str, &dyn ToSql)],
    ) -> StoreResult<Vec<Value>> {
        // Generate `SELECT` query
        let query = self.generate_select_query(table, col_names, params);
        debug!(target: "store::query_single", "[GovStore] Executing SQL query:\n{query}");

        // First we prepare the query
        let Ok(conn) = self.conn.lock() else { return Err(StoreError::FailedToAcquireLock) };
        let Ok(mut stmt) = conn.prepare(&query) else {
            return Err(StoreError::QueryPreparationFailed)
        };

        // Execute the query using provided params
        let Ok(mut rows) = stmt.query(params) else {
            return Err(StoreError::QueryExecutionFailed)
        };

        // Check if row exists
        let Ok(next) = rows.next() else { return Err(StoreError::QueryExecutionFailed) };
        let row = match next {
            Some(row_result) => row_result,
            None => return Err(StoreError::RowNotFound),
        };

        Self::parse_row(row, col_names)
    }

    /// Query provided table from selected column names and provided `WHERE` clauses,
    /// for multiple rows.
    pub fn query_multiple(
        &self,
        table: &str,
        col_names: &[&str],
        params: &[(&str, &dyn ToSql)],
    ) -> StoreResult<Vec<Vec<Value>>> {
        // Generate `SELECT` query
        let query = self.generate_select_query(table, col_names, params);
        debug!(target: "store::query_multiple", "[GovStore] Executing SQL query:\n{query}");

        // First we prepare the query
        let Ok(conn) = self.conn.lock() else { return Err(StoreError::FailedToAcquireLock) };
        let Ok(mut stmt) = conn.prepare(&query) else {
            return Err(StoreError::QueryPreparationFailed)
        };

        // Execute the query using provided params
        let Ok(mut rows) = stmt.query(params) else {
            return Err(StoreError::QueryExecutionFailed)
        };

        // Loop over returned rows and parse them
        let mut result = vec![];
        loop {
            let row = match rows.next() {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(_) => return Err(StoreError::QueryExecutionFailed),
            };

            result.push(Self::parse_row(row, col_names)?);
        }

        Ok(result)
    }

    /// Query the database using provided raw query, for multiple rows.
    pub fn query_custom(
        &self,
        query: &str,
        params: &[&dyn ToSql],
    ) -> StoreResult<Vec<Vec<Value>>> {
        debug!(target: "store::query_custom", "[GovStore] Executing SQL query:\n{query}");

        // First we prepare the query
        let Ok(conn) = self.conn.lock() else { return Err(StoreError::FailedToAcquireLock) };
        let Ok(mut stmt) = conn.prepare(query) else {
            return Err(StoreError::QueryPreparationFailed)
        };

        // Execute the query using provided params
        let Ok(mut rows) = stmt.query(params) else {
            return Err(StoreError::QueryExecutionFailed)
        };

        // Loop over returned rows and parse them
        let mut result = vec![];
        loop {
            let row = match rows.next() {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(_) => return Err(StoreError::QueryExecutionFailed),
            };

            result.push(Self::parse_row(row, &[])?);
        }

        Ok(result)
    }
}

/// Auxiliary function to execute a statement inside an `exec_txn` closure,
/// mapping the driver error to a `StoreError` and returning the changed
/// rows count.
pub fn txn_exec(tx: &Transaction, query: &str, params: &[&dyn ToSql]) -> StoreResult<usize> {
    debug!(target: "store::txn_exec", "[GovStore] Executing SQL query:\n{query}");
    match tx.execute(query, params) {
        Ok(changed) => Ok(changed),
        Err(e) => {
            error!(target: "store::txn_exec", "[GovStore] Query failed: {e}");
            Err(StoreError::QueryExecutionFailed)
        }
    }
}

/// Custom implementation of rusqlite::named_params! to use `expr` instead of `literal` as `$param_name`,
/// and append the ":" named parameters prefix.
#[macro_export]
macro_rules! convert_named_params {
    () => {
        &[] as &[(&str, &dyn rusqlite::types::ToSql)]
    };
    ($(($param_name:expr, $param_val:expr)),+ $(,)?) => {
        &[$((format!(":{}", $param_name).as_str(), &$param_val as &dyn rusqlite::types::ToSql)),+] as &[(&str, &dyn rusqlite::types::ToSql)]
    };
}

#[cfg(test)]
mod tests {
    use rusqlite::types::Value;

    use super::{txn_exec, GovStore};
    use crate::error::StoreError;

    #[test]
    fn test_mem_store() {
        let store = GovStore::new(None).unwrap();
        store
            .exec_batch_sql(
                "CREATE TABLE gov ( seats INTEGER ); INSERT INTO gov ( seats ) VALUES ( 42 );",
            )
            .unwrap();

        let ret = store.query_single("gov", &["seats"], &[]).unwrap();
        assert_eq!(ret.len(), 1);
        assert_eq!(ret[0], Value::Integer(42));

        let ret = store.query_custom("SELECT seats FROM gov;", &[]).unwrap();
        assert_eq!(ret.len(), 1);
        assert_eq!(ret[0].len(), 1);
        assert_eq!(ret[0][0], Value::Integer(42));
    }

    #[test]
    fn test_query_filters() {
        let store = GovStore::new(None).unwrap();
        store
            .exec_batch_sql("CREATE TABLE ledger ( sender TEXT, receiver TEXT, amount INTEGER );")
            .unwrap();

        let sender = "alice".to_string();
        let receiver = "bob".to_string();

        let changed = store
            .exec_sql(
                "INSERT INTO ledger ( sender, receiver, amount ) VALUES (?1, ?2, ?3);",
                rusqlite::params![sender, receiver, 66],
            )
            .unwrap();
        assert_eq!(changed, 1);
        store
            .exec_sql(
                "INSERT INTO ledger ( sender, receiver, amount ) VALUES (?1, ?2, ?3);",
                rusqlite::params![sender, receiver, 34],
            )
            .unwrap();

        let ret = store.query_single("ledger", &["amount"], &[(":sender", &sender)]).unwrap();
        assert_eq!(ret.len(), 1);
        assert_eq!(ret[0], Value::Integer(66));

        let ret = store
            .query_multiple(
                "ledger",
                &["amount"],
                convert_named_params! {("sender", sender), ("receiver", receiver)},
            )
            .unwrap();
        assert_eq!(ret.len(), 2);
        assert_eq!(ret[0][0], Value::Integer(66));
        assert_eq!(ret[1][0], Value::Integer(34));

        let ret = store.query_single("ledger", &["amount"], &[(":sender", &"carol")]);
        assert_eq!(ret, Err(StoreError::RowNotFound));
    }

    #[test]
    fn test_txn_rollback() {
        let store = GovStore::new(None).unwrap();
        store
            .exec_batch_sql(
                "CREATE TABLE balances ( address TEXT PRIMARY KEY, balance INTEGER NOT NULL );
                 INSERT INTO balances ( address, balance ) VALUES ( 'treasury', 100 );",
            )
            .unwrap();

        // Second statement violates the primary key, the first must roll back
        let result = store.exec_txn(|tx| {
            txn_exec(
                tx,
                "UPDATE balances SET balance = balance - 40 WHERE address = 'treasury';",
                &[],
            )?;
            txn_exec(tx, "INSERT INTO balances ( address ) VALUES ( 'treasury' );", &[])?;
            Ok(())
        });
        assert_eq!(result, Err(StoreError::QueryExecutionFailed));

        let ret = store.query_single("balances", &["balance"], &[(":address", &"treasury")]).unwrap();
        assert_eq!(ret[0], Value::Integer(100));
    }
}
