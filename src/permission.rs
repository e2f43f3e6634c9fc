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

use rusqlite::types::Value;
use tracing::debug;

use crate::{
    error::{Error, Result, StoreResult},
    Daod,
};

// Governance SQL table constant names. These have to represent
// the `gov.sql` schema.
pub const PERMISSION_TABLE: &str = "Permission";

// PERMISSION_TABLE columns
pub const PERMISSION_COL_WHO: &str = "who";
pub const PERMISSION_COL_FUNCTION: &str = "function";
pub const PERMISSION_COL_PERMISSION_ID: &str = "permissionId";

/// External evaluator for permissions granted with a condition reference.
/// Conditional evaluation is an external collaborator, the permission store
/// only records the base grant.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `condition` for the given permission triple and optional
    /// request data.
    fn evaluate(
        &self,
        condition: &str,
        target: &str,
        who: &str,
        permission_id: u64,
        data: Option<&serde_json::Value>,
    ) -> Result<bool>;
}

/// Default evaluator accepting every condition, so `check_condition`
/// reduces to the base permission lookup until a real evaluator is wired in.
pub struct PassthroughCondition;

impl ConditionEvaluator for PassthroughCondition {
    fn evaluate(
        &self,
        _condition: &str,
        _target: &str,
        _who: &str,
        _permission_id: u64,
        _data: Option<&serde_json::Value>,
    ) -> Result<bool> {
        Ok(true)
    }
}

impl Daod {
    /// Grant `who` the permission to call `target` under the given
    /// permission identifier. Granting an already granted triple is a no-op.
    pub fn grant(&self, target: &str, who: &str, permission_id: u64) -> StoreResult<()> {
        debug!(target: "permission::grant", "[Daod] Granting {permission_id} on {target} to {who}");
        let query = format!(
            "INSERT OR IGNORE INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3);",
            PERMISSION_TABLE,
            PERMISSION_COL_WHO,
            PERMISSION_COL_FUNCTION,
            PERMISSION_COL_PERMISSION_ID,
        );
        self.store.exec_sql(&query, rusqlite::params![who, target, permission_id])?;

        Ok(())
    }

    /// Grant a permission gated by the referenced condition. The condition
    /// itself is not persisted, callers evaluate it through
    /// `check_condition` and the configured `ConditionEvaluator`.
    pub fn grant_with_condition(
        &self,
        target: &str,
        who: &str,
        permission_id: u64,
        condition: &str,
    ) -> StoreResult<()> {
        debug!(
            target: "permission::grant_with_condition",
            "[Daod] Granting {permission_id} on {target} to {who} with condition {condition}"
        );
        self.grant(target, who, permission_id)
    }

    /// Revoke a permission triple. Revoking a non-existent grant is a no-op.
    pub fn revoke(&self, target: &str, who: &str, permission_id: u64) -> StoreResult<()> {
        debug!(target: "permission::revoke", "[Daod] Revoking {permission_id} on {target} from {who}");
        let query = format!(
            "DELETE FROM {} WHERE {} = ?1 AND {} = ?2 AND {} = ?3;",
            PERMISSION_TABLE,
            PERMISSION_COL_WHO,
            PERMISSION_COL_FUNCTION,
            PERMISSION_COL_PERMISSION_ID,
        );
        self.store.exec_sql(&query, rusqlite::params![who, target, permission_id])?;

        Ok(())
    }

    /// Check if `who` holds the permission triple, by existence count.
    pub fn is_granted(&self, target: &str, who: &str, permission_id: u64) -> Result<bool> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND {} = ?2 AND {} = ?3;",
            PERMISSION_TABLE,
            PERMISSION_COL_WHO,
            PERMISSION_COL_FUNCTION,
            PERMISSION_COL_PERMISSION_ID,
        );
        let rows = match self
            .store
            .query_custom(&query, rusqlite::params![who, target, permission_id])
        {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[is_granted] Permission lookup failed: {e:?}"
                )))
            }
        };

        let Value::Integer(count) = rows[0][0] else {
            return Err(Error::ParseFailed("[is_granted] Permission count parsing failed"))
        };

        Ok(count > 0)
    }

    /// Registry-facing alias of `is_granted`, the ERC-4824 surface names
    /// the same predicate `hasPermission`.
    pub fn has_permission(&self, target: &str, who: &str, permission_id: u64) -> Result<bool> {
        self.is_granted(target, who, permission_id)
    }

    /// Check a conditionally granted permission: the base triple must exist
    /// and the configured `ConditionEvaluator` must accept the condition.
    pub fn check_condition(
        &self,
        condition: &str,
        target: &str,
        who: &str,
        permission_id: u64,
        data: Option<&serde_json::Value>,
    ) -> Result<bool> {
        if !self.is_granted(target, who, permission_id)? {
            return Ok(false)
        }

        self.condition_eval.evaluate(condition, target, who, permission_id, data)
    }
}
