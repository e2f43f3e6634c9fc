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

use std::{fmt, str::FromStr};

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Error, Result, StoreError, StoreResult},
    Daod,
};

// Governance SQL table constant names. These have to represent
// the `gov.sql` schema.
pub const VOTES_TABLE: &str = "Votes";
pub const VOTING_SETTINGS_TABLE: &str = "VotingSettings";

// VOTES_TABLE columns
pub const VOTES_COL_VOTE_ID: &str = "VoteID";
pub const VOTES_COL_PROPOSAL_ID: &str = "ProposalID";
pub const VOTES_COL_VOTE_OPTION: &str = "VoteOption";

// VOTING_SETTINGS_TABLE columns. Only the first two are read by the
// majority evaluation, the rest are persisted for external tallying
// configurations.
pub const VOTING_SETTINGS_COL_ID: &str = "id";
pub const VOTING_SETTINGS_COL_SUPPORT_THRESHOLD: &str = "SupportThreshold";
pub const VOTING_SETTINGS_COL_MIN_PARTICIPATION: &str = "MinParticipation";
pub const VOTING_SETTINGS_COL_QUORUM_REQUIREMENT: &str = "QuorumRequirement";
pub const VOTING_SETTINGS_COL_VOTE_DURATION: &str = "VoteDuration";
pub const VOTING_SETTINGS_COL_GRACE_PERIOD: &str = "GracePeriod";
pub const VOTING_SETTINGS_COL_VOTE_POWER_DISTRIBUTION: &str = "VotePowerDistribution";
pub const VOTING_SETTINGS_COL_VOTE_WEIGHTS: &str = "VoteWeights";
pub const VOTING_SETTINGS_COL_EXECUTION_THRESHOLD: &str = "ExecutionThreshold";
pub const VOTING_SETTINGS_COL_VOTE_DECAY: &str = "VoteDecay";
pub const VOTING_SETTINGS_COL_DELEGATED_VOTING: &str = "DelegatedVoting";
pub const VOTING_SETTINGS_COL_TALLYING_ALGORITHM: &str = "TallyingAlgorithm";
pub const VOTING_SETTINGS_COL_VOTE_FINALITY: &str = "VoteFinality";
pub const VOTING_SETTINGS_COL_VOTE_REVEAL_PERIOD: &str = "VoteRevealPeriod";
pub const VOTING_SETTINGS_COL_VOTE_LOCKING: &str = "VoteLocking";

/// Closed set of vote options, stored as text in the votes table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteOption {
    Approve,
    Reject,
    Abstain,
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Approve => "Approve",
            Self::Reject => "Reject",
            Self::Abstain => "Abstain",
        };
        write!(f, "{s}")
    }
}

impl FromStr for VoteOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Approve" => Ok(Self::Approve),
            "Reject" => Ok(Self::Reject),
            "Abstain" => Ok(Self::Abstain),
            _ => Err(Error::ParseFailed("Unknown vote option")),
        }
    }
}

/// Worst-case early decision over an open voting period. The recorded-votes
/// threshold predicate is the fallback, a real evaluator knowing the total
/// voting power can decide before the period ends.
pub trait EarlyDecisionEvaluator: Send + Sync {
    fn is_reached_early(&self, daod: &Daod, proposal_id: &str) -> Result<bool>;
}

/// Default evaluator, decides exactly like the plain support threshold
/// predicate over the recorded votes.
pub struct PassthroughEarlyDecision;

impl EarlyDecisionEvaluator for PassthroughEarlyDecision {
    fn is_reached_early(&self, daod: &Daod, proposal_id: &str) -> Result<bool> {
        daod.is_support_threshold_reached(proposal_id)
    }
}

/// Structure representing the single `VOTING_SETTINGS_TABLE` row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VotingSettingsRecord {
    pub support_threshold: Option<u64>,
    pub min_participation: Option<u64>,
    pub quorum_requirement: Option<u64>,
    /// Voting period duration in seconds
    pub vote_duration: Option<u64>,
    /// Grace period after the official end of the vote in seconds
    pub grace_period: Option<u64>,
    /// How voting power is distributed, e.g. "Linear" or "Quadratic"
    pub vote_power_distribution: Option<String>,
    /// JSON array specifying vote weights based on criteria
    pub vote_weights: Option<String>,
    pub execution_threshold: Option<u64>,
    /// Decay rate for votes over time in seconds
    pub vote_decay: Option<u64>,
    pub delegated_voting: Option<bool>,
    /// Algorithm for the final tally, e.g. "SimpleMajority" or "Supermajority"
    pub tallying_algorithm: Option<String>,
    pub vote_finality: Option<bool>,
    /// Period for revealing secret votes in seconds
    pub vote_reveal_period: Option<u64>,
    pub vote_locking: Option<bool>,
}

/// Auxiliary function to parse an optional integer column.
fn parse_int_option(value: &Value, err: &'static str) -> Result<Option<u64>> {
    match value {
        Value::Integer(i) => {
            let Ok(i) = u64::try_from(*i) else { return Err(Error::ParseFailed(err)) };
            Ok(Some(i))
        }
        Value::Null => Ok(None),
        _ => Err(Error::ParseFailed(err)),
    }
}

/// Auxiliary function to parse an optional boolean column.
fn parse_bool_option(value: &Value, err: &'static str) -> Result<Option<bool>> {
    match value {
        Value::Integer(i) => Ok(Some(*i != 0)),
        Value::Null => Ok(None),
        _ => Err(Error::ParseFailed(err)),
    }
}

/// Auxiliary function to parse an optional text column.
fn parse_text_option(value: &Value, err: &'static str) -> Result<Option<String>> {
    match value {
        Value::Text(s) => Ok(Some(s.clone())),
        Value::Null => Ok(None),
        _ => Err(Error::ParseFailed(err)),
    }
}

impl Daod {
    /// Read one voting settings field from the single settings row.
    /// `None` when the row does not exist or the field is unset.
    fn voting_settings_field(&self, col: &str) -> Result<Option<u64>> {
        let row = match self.store.query_single(VOTING_SETTINGS_TABLE, &[col], &[]) {
            Ok(row) => row,
            Err(StoreError::RowNotFound) => return Ok(None),
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[voting_settings_field] Settings retrieval failed: {e:?}"
                )))
            }
        };

        parse_int_option(&row[0], "[voting_settings_field] Settings field parsing failed")
    }

    /// Upsert one voting settings field into the single settings row.
    fn set_voting_settings_field(&self, col: &str, value: u64) -> StoreResult<()> {
        let query = format!(
            "INSERT INTO {} ({}, {}) VALUES (1, ?1) ON CONFLICT({}) DO UPDATE SET {} = excluded.{};",
            VOTING_SETTINGS_TABLE, VOTING_SETTINGS_COL_ID, col, VOTING_SETTINGS_COL_ID, col, col,
        );
        self.store.exec_sql(&query, rusqlite::params![value])?;

        Ok(())
    }

    /// The support threshold parameter stored in the voting settings.
    pub fn support_threshold(&self) -> Result<Option<u64>> {
        self.voting_settings_field(VOTING_SETTINGS_COL_SUPPORT_THRESHOLD)
    }

    /// The minimum participation parameter stored in the voting settings.
    pub fn min_participation(&self) -> Result<Option<u64>> {
        self.voting_settings_field(VOTING_SETTINGS_COL_MIN_PARTICIPATION)
    }

    /// Set the support threshold in the voting settings.
    pub fn set_support_threshold(&self, value: u64) -> StoreResult<()> {
        debug!(target: "voting::set_support_threshold", "[Daod] Setting support threshold to {value}");
        self.set_voting_settings_field(VOTING_SETTINGS_COL_SUPPORT_THRESHOLD, value)
    }

    /// Set the minimum participation in the voting settings.
    pub fn set_min_participation(&self, value: u64) -> StoreResult<()> {
        debug!(target: "voting::set_min_participation", "[Daod] Setting min participation to {value}");
        self.set_voting_settings_field(VOTING_SETTINGS_COL_MIN_PARTICIPATION, value)
    }

    /// Record a vote on a proposal. One row per (voter, proposal) pair is
    /// enforced by the votes unique constraint, a repeated vote from the
    /// same voter is an error.
    pub fn vote(
        &self,
        voter: &str,
        proposal_id: &str,
        vote_option: VoteOption,
    ) -> StoreResult<()> {
        debug!(target: "voting::vote", "[Daod] Recording {vote_option} vote by {voter} on {proposal_id}");
        let query = format!(
            "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3);",
            VOTES_TABLE, VOTES_COL_VOTE_ID, VOTES_COL_PROPOSAL_ID, VOTES_COL_VOTE_OPTION,
        );
        self.store
            .exec_sql(&query, rusqlite::params![voter, proposal_id, vote_option.to_string()])?;

        Ok(())
    }

    /// The vote option cast by `account` on a proposal, or `None` if no
    /// vote is recorded.
    pub fn get_vote_option(&self, proposal_id: &str, account: &str) -> Result<Option<VoteOption>> {
        let query = format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2;",
            VOTES_COL_VOTE_OPTION, VOTES_TABLE, VOTES_COL_PROPOSAL_ID, VOTES_COL_VOTE_ID,
        );
        let rows = match self.store.query_custom(&query, rusqlite::params![proposal_id, account]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_vote_option] Vote retrieval failed: {e:?}"
                )))
            }
        };

        let Some(row) = rows.first() else { return Ok(None) };
        let Value::Text(ref option) = row[0] else {
            return Err(Error::ParseFailed("[get_vote_option] Vote option parsing failed"))
        };

        Ok(Some(option.parse()?))
    }

    /// Count the recorded votes on a proposal, regardless of option.
    pub(crate) fn proposal_vote_count(&self, proposal_id: &str) -> Result<i64> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1;",
            VOTES_TABLE, VOTES_COL_PROPOSAL_ID,
        );
        let rows = match self.store.query_custom(&query, rusqlite::params![proposal_id]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[proposal_vote_count] Votes count failed: {e:?}"
                )))
            }
        };

        let Value::Integer(count) = rows[0][0] else {
            return Err(Error::ParseFailed("[proposal_vote_count] Votes count parsing failed"))
        };

        Ok(count)
    }

    /// Check if the recorded vote count on a proposal strictly exceeds the
    /// support threshold. An unset threshold counts as zero. Every recorded
    /// vote counts towards support, regardless of its option.
    pub fn is_support_threshold_reached(&self, proposal_id: &str) -> Result<bool> {
        let count = self.proposal_vote_count(proposal_id)?;
        let threshold = self.support_threshold()?.unwrap_or(0);

        Ok(count > threshold as i64)
    }

    /// Check if the support threshold is already decided while the voting
    /// period is still open, through the configured early decision
    /// evaluator.
    pub fn is_support_threshold_reached_early(&self, proposal_id: &str) -> Result<bool> {
        self.early_eval.is_reached_early(self, proposal_id)
    }

    /// Check if the recorded vote count on a proposal reaches the minimum
    /// participation, inclusive. `false` while the parameter is unset.
    pub fn is_min_participation_reached(&self, proposal_id: &str) -> Result<bool> {
        let count = self.proposal_vote_count(proposal_id)?;
        let Some(min_participation) = self.min_participation()? else { return Ok(false) };

        Ok(count >= min_participation as i64)
    }

    /// Upsert the full voting settings row.
    pub fn put_voting_settings(&self, settings: &VotingSettingsRecord) -> StoreResult<()> {
        let query = format!(
            "INSERT OR REPLACE INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
            VOTING_SETTINGS_TABLE,
            VOTING_SETTINGS_COL_ID,
            VOTING_SETTINGS_COL_SUPPORT_THRESHOLD,
            VOTING_SETTINGS_COL_MIN_PARTICIPATION,
            VOTING_SETTINGS_COL_QUORUM_REQUIREMENT,
            VOTING_SETTINGS_COL_VOTE_DURATION,
            VOTING_SETTINGS_COL_GRACE_PERIOD,
            VOTING_SETTINGS_COL_VOTE_POWER_DISTRIBUTION,
            VOTING_SETTINGS_COL_VOTE_WEIGHTS,
            VOTING_SETTINGS_COL_EXECUTION_THRESHOLD,
            VOTING_SETTINGS_COL_VOTE_DECAY,
            VOTING_SETTINGS_COL_DELEGATED_VOTING,
            VOTING_SETTINGS_COL_TALLYING_ALGORITHM,
            VOTING_SETTINGS_COL_VOTE_FINALITY,
            VOTING_SETTINGS_COL_VOTE_REVEAL_PERIOD,
            VOTING_SETTINGS_COL_VOTE_LOCKING,
        );
        self.store.exec_sql(
            &query,
            rusqlite::params![
                settings.support_threshold,
                settings.min_participation,
                settings.quorum_requirement,
                settings.vote_duration,
                settings.grace_period,
                settings.vote_power_distribution,
                settings.vote_weights,
                settings.execution_threshold,
                settings.vote_decay,
                settings.delegated_voting,
                settings.tallying_algorithm,
                settings.vote_finality,
                settings.vote_reveal_period,
                settings.vote_locking
            ],
        )?;

        Ok(())
    }

    /// Fetch the full voting settings row, or `None` if none was written.
    pub fn get_voting_settings(&self) -> Result<Option<VotingSettingsRecord>> {
        let row = match self.store.query_single(
            VOTING_SETTINGS_TABLE,
            &[
                VOTING_SETTINGS_COL_SUPPORT_THRESHOLD,
                VOTING_SETTINGS_COL_MIN_PARTICIPATION,
                VOTING_SETTINGS_COL_QUORUM_REQUIREMENT,
                VOTING_SETTINGS_COL_VOTE_DURATION,
                VOTING_SETTINGS_COL_GRACE_PERIOD,
                VOTING_SETTINGS_COL_VOTE_POWER_DISTRIBUTION,
                VOTING_SETTINGS_COL_VOTE_WEIGHTS,
                VOTING_SETTINGS_COL_EXECUTION_THRESHOLD,
                VOTING_SETTINGS_COL_VOTE_DECAY,
                VOTING_SETTINGS_COL_DELEGATED_VOTING,
                VOTING_SETTINGS_COL_TALLYING_ALGORITHM,
                VOTING_SETTINGS_COL_VOTE_FINALITY,
                VOTING_SETTINGS_COL_VOTE_REVEAL_PERIOD,
                VOTING_SETTINGS_COL_VOTE_LOCKING,
            ],
            &[],
        ) {
            Ok(row) => row,
            Err(StoreError::RowNotFound) => return Ok(None),
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_voting_settings] Settings retrieval failed: {e:?}"
                )))
            }
        };

        Ok(Some(VotingSettingsRecord {
            support_threshold: parse_int_option(
                &row[0],
                "[get_voting_settings] Support threshold parsing failed",
            )?,
            min_participation: parse_int_option(
                &row[1],
                "[get_voting_settings] Min participation parsing failed",
            )?,
            quorum_requirement: parse_int_option(
                &row[2],
                "[get_voting_settings] Quorum requirement parsing failed",
            )?,
            vote_duration: parse_int_option(
                &row[3],
                "[get_voting_settings] Vote duration parsing failed",
            )?,
            grace_period: parse_int_option(
                &row[4],
                "[get_voting_settings] Grace period parsing failed",
            )?,
            vote_power_distribution: parse_text_option(
                &row[5],
                "[get_voting_settings] Vote power distribution parsing failed",
            )?,
            vote_weights: parse_text_option(
                &row[6],
                "[get_voting_settings] Vote weights parsing failed",
            )?,
            execution_threshold: parse_int_option(
                &row[7],
                "[get_voting_settings] Execution threshold parsing failed",
            )?,
            vote_decay: parse_int_option(
                &row[8],
                "[get_voting_settings] Vote decay parsing failed",
            )?,
            delegated_voting: parse_bool_option(
                &row[9],
                "[get_voting_settings] Delegated voting parsing failed",
            )?,
            tallying_algorithm: parse_text_option(
                &row[10],
                "[get_voting_settings] Tallying algorithm parsing failed",
            )?,
            vote_finality: parse_bool_option(
                &row[11],
                "[get_voting_settings] Vote finality parsing failed",
            )?,
            vote_reveal_period: parse_int_option(
                &row[12],
                "[get_voting_settings] Vote reveal period parsing failed",
            )?,
            vote_locking: parse_bool_option(
                &row[13],
                "[get_voting_settings] Vote locking parsing failed",
            )?,
        }))
    }
}
