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

use std::fmt;

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    action::GovAction,
    convert_named_params,
    error::{Error, Result, StoreError},
    store::txn_exec,
    Daod,
};

// Governance SQL table constant names. These have to represent
// the `gov.sql` schema.
pub const PROPOSALS_TABLE: &str = "Proposals";
pub const ACTIONS_TABLE: &str = "Actions";

// PROPOSALS_TABLE columns
pub const PROPOSALS_COL_PROPOSAL_ID: &str = "ProposalID";
pub const PROPOSALS_COL_PROPOSER: &str = "Proposer";
pub const PROPOSALS_COL_TITLE: &str = "Title";
pub const PROPOSALS_COL_DESCRIPTION: &str = "Description";
pub const PROPOSALS_COL_STATUS: &str = "Status";
pub const PROPOSALS_COL_START_DATE: &str = "StartDate";
pub const PROPOSALS_COL_END_DATE: &str = "EndDate";

// ACTIONS_TABLE columns
pub const ACTIONS_COL_ACTION_ID: &str = "ActionID";
pub const ACTIONS_COL_PROPOSAL_ID: &str = "ProposalID";
pub const ACTIONS_COL_ACTION_OBJECT: &str = "ActionObject";
pub const ACTIONS_COL_STATUS: &str = "Status";
pub const ACTIONS_COL_RESULT: &str = "Result";

// Proposal and action lifecycle status values
pub const PROPOSAL_STATUS_PROPOSED: &str = "Proposed";
pub const PROPOSAL_STATUS_EXECUTED: &str = "Executed";
pub const ACTION_STATUS_PENDING: &str = "Pending";
pub const ACTION_STATUS_EXECUTED: &str = "Executed";

/// Metadata describing a proposal. The description usually carries the
/// forum link for off-chain discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMetadata {
    pub title: String,
    pub description: String,
}

/// Structure representing a `PROPOSALS_TABLE` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    /// Content-addressed identifier, the hex encoded SHA-256 digest of the title
    pub proposal_id: String,
    /// Address of the proposer
    pub proposer: Option<String>,
    /// Proposal title
    pub title: String,
    /// Proposal description
    pub description: Option<String>,
    /// Lifecycle status
    pub status: String,
    /// Start date of the voting period
    pub start_date: Option<String>,
    /// End date of the voting period
    pub end_date: Option<String>,
}

impl fmt::Display for ProposalRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = format!(
            concat!(
                "Proposal parameters\n",
                "===================\n",
                "Proposal ID: {}\n",
                "Proposer: {:?}\n",
                "Title: {}\n",
                "Description: {:?}\n",
                "Status: {}\n",
                "Start date: {:?}\n",
                "End date: {:?}",
            ),
            self.proposal_id,
            self.proposer,
            self.title,
            self.description,
            self.status,
            self.start_date,
            self.end_date,
        );

        write!(f, "{s}")
    }
}

/// Compute the content-addressed proposal identifier, the hex encoded
/// SHA-256 digest of the proposal title. Identical titles map to the same
/// identifier, a repeat submission is a collision rather than a new record.
pub fn proposal_id_for_title(title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hex::encode(hasher.finalize())
}

/// Auxiliary function to parse an optional text column.
fn parse_text_option(value: &Value, err: &'static str) -> Result<Option<String>> {
    match value {
        Value::Text(s) => Ok(Some(s.clone())),
        Value::Null => Ok(None),
        _ => Err(Error::ParseFailed(err)),
    }
}

/// Auxiliary function to parse a `PROPOSALS_TABLE` record.
fn parse_proposal_record(row: &[Value]) -> Result<ProposalRecord> {
    let Value::Text(ref proposal_id) = row[0] else {
        return Err(Error::ParseFailed("[parse_proposal_record] Proposal ID parsing failed"))
    };

    let proposer =
        parse_text_option(&row[1], "[parse_proposal_record] Proposer parsing failed")?;

    let Value::Text(ref title) = row[2] else {
        return Err(Error::ParseFailed("[parse_proposal_record] Title parsing failed"))
    };

    let description =
        parse_text_option(&row[3], "[parse_proposal_record] Description parsing failed")?;

    let Value::Text(ref status) = row[4] else {
        return Err(Error::ParseFailed("[parse_proposal_record] Status parsing failed"))
    };

    let start_date =
        parse_text_option(&row[5], "[parse_proposal_record] Start date parsing failed")?;
    let end_date = parse_text_option(&row[6], "[parse_proposal_record] End date parsing failed")?;

    Ok(ProposalRecord {
        proposal_id: proposal_id.clone(),
        proposer,
        title: title.clone(),
        description,
        status: status.clone(),
        start_date,
        end_date,
    })
}

impl Daod {
    /// Count all known proposals.
    pub fn proposal_count(&self) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {};", PROPOSALS_TABLE);
        let rows = match self.store.query_custom(&query, &[]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[proposal_count] Proposals count failed: {e:?}"
                )))
            }
        };

        let Value::Integer(count) = rows[0][0] else {
            return Err(Error::ParseFailed("[proposal_count] Proposals count parsing failed"))
        };

        Ok(count as u64)
    }

    /// Check if a proposal with the given identifier exists.
    pub fn proposal_exists(&self, proposal_id: &str) -> Result<bool> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1;",
            PROPOSALS_TABLE, PROPOSALS_COL_PROPOSAL_ID,
        );
        let rows = match self.store.query_custom(&query, rusqlite::params![proposal_id]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[proposal_exists] Proposal lookup failed: {e:?}"
                )))
            }
        };

        let Value::Integer(count) = rows[0][0] else {
            return Err(Error::ParseFailed("[proposal_exists] Proposal count parsing failed"))
        };

        Ok(count > 0)
    }

    /// Create a new proposal with its ordered action objects, in a single
    /// transaction so a failed action insert leaves no partial record.
    /// Returns the content-addressed proposal identifier. Submitting a
    /// title that already exists returns the existing identifier without
    /// touching the stored record or appending duplicate actions.
    pub fn create_proposal(
        &self,
        proposer: &str,
        metadata: &ProposalMetadata,
        start_date: &str,
        end_date: &str,
        actions: &[GovAction],
    ) -> Result<String> {
        let proposal_id = proposal_id_for_title(&metadata.title);
        debug!(target: "proposal::create_proposal", "[Daod] Creating proposal {proposal_id}");

        // Serialize the action objects upfront, outside the transaction
        let mut serialized = Vec::with_capacity(actions.len());
        for action in actions {
            serialized.push(serde_json::to_string(action)?);
        }

        let result = self.store.exec_txn(|tx| {
            let query = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?1;",
                PROPOSALS_TABLE, PROPOSALS_COL_PROPOSAL_ID,
            );
            let count: i64 = tx
                .query_row(&query, rusqlite::params![proposal_id], |row| row.get(0))
                .map_err(|_| StoreError::QueryExecutionFailed)?;
            // Same title, same record. Collision, not an error.
            if count > 0 {
                return Ok(())
            }

            let query = format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                PROPOSALS_TABLE,
                PROPOSALS_COL_PROPOSAL_ID,
                PROPOSALS_COL_PROPOSER,
                PROPOSALS_COL_TITLE,
                PROPOSALS_COL_DESCRIPTION,
                PROPOSALS_COL_START_DATE,
                PROPOSALS_COL_END_DATE,
            );
            txn_exec(
                tx,
                &query,
                rusqlite::params![
                    proposal_id,
                    proposer,
                    metadata.title,
                    metadata.description,
                    start_date,
                    end_date
                ],
            )?;

            let query = format!(
                "INSERT INTO {} ({}, {}) VALUES (?1, ?2);",
                ACTIONS_TABLE, ACTIONS_COL_PROPOSAL_ID, ACTIONS_COL_ACTION_OBJECT,
            );
            for action in &serialized {
                txn_exec(tx, &query, rusqlite::params![proposal_id, action])?;
            }

            Ok(())
        });

        match result {
            Ok(()) => Ok(proposal_id),
            Err(e) => {
                Err(Error::DatabaseError(format!("[create_proposal] Proposal insert failed: {e:?}")))
            }
        }
    }

    /// Fetch the ordered, deserialized action objects attached to a proposal.
    pub fn get_action_objects(&self, proposal_id: &str) -> Result<Vec<GovAction>> {
        let rows = self.get_raw_actions(proposal_id)?;

        let mut ret = Vec::with_capacity(rows.len());
        for (_, action_object) in rows {
            ret.push(serde_json::from_str(&action_object)?);
        }

        Ok(ret)
    }

    /// Fetch the ordered `(ActionID, ActionObject)` pairs attached to a
    /// proposal, without deserializing them. The execution path uses the
    /// row identifiers to record per-action results.
    pub(crate) fn get_raw_actions(&self, proposal_id: &str) -> Result<Vec<(u64, String)>> {
        let query = format!(
            "SELECT {}, {} FROM {} WHERE {} = ?1 ORDER BY {} ASC;",
            ACTIONS_COL_ACTION_ID,
            ACTIONS_COL_ACTION_OBJECT,
            ACTIONS_TABLE,
            ACTIONS_COL_PROPOSAL_ID,
            ACTIONS_COL_ACTION_ID,
        );
        let rows = match self.store.query_custom(&query, rusqlite::params![proposal_id]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_raw_actions] Actions retrieval failed: {e:?}"
                )))
            }
        };

        let mut ret = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Integer(action_id) = row[0] else {
                return Err(Error::ParseFailed("[get_raw_actions] Action ID parsing failed"))
            };
            let Value::Text(ref action_object) = row[1] else {
                return Err(Error::ParseFailed("[get_raw_actions] Action object parsing failed"))
            };
            ret.push((action_id as u64, action_object.clone()));
        }

        Ok(ret)
    }

    /// Fetch the full proposal record for the given identifier.
    pub fn get_proposal(&self, proposal_id: &str) -> Result<ProposalRecord> {
        let row = match self.store.query_single(
            PROPOSALS_TABLE,
            &[
                PROPOSALS_COL_PROPOSAL_ID,
                PROPOSALS_COL_PROPOSER,
                PROPOSALS_COL_TITLE,
                PROPOSALS_COL_DESCRIPTION,
                PROPOSALS_COL_STATUS,
                PROPOSALS_COL_START_DATE,
                PROPOSALS_COL_END_DATE,
            ],
            convert_named_params! {(PROPOSALS_COL_PROPOSAL_ID, proposal_id)},
        ) {
            Ok(row) => row,
            Err(StoreError::RowNotFound) => {
                return Err(Error::ProposalNotFound(proposal_id.to_string()))
            }
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_proposal] Proposal retrieval failed: {e:?}"
                )))
            }
        };

        parse_proposal_record(&row)
    }
}
