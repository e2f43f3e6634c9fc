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

use std::{path::PathBuf, sync::Arc};

/// Error codes
pub mod error;
use error::{Error, Result, StoreResult};

/// Governance database operations handler
pub mod store;
use store::{GovStore, StorePtr};

/// DAO registry
pub mod dao;

/// Permission store
pub mod permission;
use permission::{ConditionEvaluator, PassthroughCondition};

/// Membership checks
pub mod member;

/// Proposal store
pub mod proposal;

/// Voting settings and majority evaluation
pub mod voting;
use voting::{EarlyDecisionEvaluator, PassthroughEarlyDecision};

/// Multisig allow-list voting
pub mod multisig;

/// Token ledger
pub mod token;

/// Typed action payloads and dispatch
pub mod action;

/// Request handler structure, the single entry point the external rollup
/// dispatcher talks to. All component operations are methods on this type,
/// sharing one database handle.
pub struct Daod {
    /// Governance database operations handler
    pub store: StorePtr,
    /// Address accepted as the DAO initializer and first member
    pub trusted_delegate: Option<String>,
    /// Condition evaluator consulted by `check_condition`
    pub condition_eval: Arc<dyn ConditionEvaluator>,
    /// Early decision evaluator consulted by `is_support_threshold_reached_early`
    pub early_eval: Arc<dyn EarlyDecisionEvaluator>,
}

impl Daod {
    /// Create a new request handler over the database at `db_path`, or over
    /// an in-memory database if `None`. The default capability evaluators
    /// are pass-through, external ones can be swapped in by the embedder.
    pub fn new(db_path: Option<PathBuf>, trusted_delegate: Option<String>) -> Result<Self> {
        let store = match GovStore::new(db_path) {
            Ok(store) => store,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[Daod::new] Store initialization failed: {e}"
                )))
            }
        };

        Ok(Self {
            store,
            trusted_delegate,
            condition_eval: Arc::new(PassthroughCondition),
            early_eval: Arc::new(PassthroughEarlyDecision),
        })
    }

    /// Initialize the database with the governance table schema.
    pub fn initialize_tables(&self) -> StoreResult<()> {
        self.store.exec_batch_sql(include_str!("../gov.sql"))
    }
}
