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

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Error, Result, StoreError},
    proposal::{
        ProposalMetadata, ACTIONS_COL_ACTION_ID, ACTIONS_COL_RESULT, ACTIONS_COL_STATUS,
        ACTIONS_TABLE, ACTION_STATUS_EXECUTED, PROPOSALS_COL_PROPOSAL_ID, PROPOSALS_COL_STATUS,
        PROPOSALS_TABLE, PROPOSAL_STATUS_EXECUTED,
    },
    voting::VoteOption,
    Daod,
};

/// Inspect query recognized by `handle_inspect`.
pub const INSPECT_PROTOCOL_VERSION: &str = "protocol-version";

/// Closed set of governance actions accepted from the rollup dispatcher.
/// The wire shape is `{"action": "...", "params": {...}}` with named
/// fields, unknown actions and malformed params fail parsing explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params")]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GovAction {
    Initialize { dao_address: String, dao_uri: String, version: String },
    SetDaoUri { dao_uri: String, version: String },
    Grant { target: String, who: String, permission_id: u64 },
    GrantWithCondition { target: String, who: String, permission_id: u64, condition: String },
    Revoke { target: String, who: String, permission_id: u64 },
    CreateProposal {
        proposer: String,
        metadata: ProposalMetadata,
        start_date: String,
        end_date: String,
        actions: Vec<GovAction>,
    },
    GetActionObject { proposal_id: String },
    Vote { voter: String, proposal_id: String, vote_option: VoteOption },
    Approve { voter: String, proposal_id: String },
    AddAddresses { member: String },
    RemoveAddresses { member: String },
    Execute { proposal_id: String },
    Mint { receiver: String, amount: u64 },
    Issue { amount: u64 },
    Assign { receiver: String, amount: u64 },
    Burn { holder: String, amount: u64 },
    AssignVested {
        receiver: String,
        amount: u64,
        start: String,
        cliff: String,
        vested: String,
        revokable: bool,
    },
    RevokeVesting { holder: String, vesting_id: Option<u64> },
}

/// Typed reply returned to the dispatcher after an action is handled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionOutcome {
    Accepted,
    ProposalCreated { proposal_id: String },
    ActionObjects { actions: Vec<GovAction> },
    VestingAssigned { vesting_id: u64 },
    Executed { results: Vec<String> },
}

/// Parse a decoded rollup payload into a governance action.
pub fn parse_action(payload: &str) -> Result<GovAction> {
    Ok(serde_json::from_str(payload)?)
}

/// Auxiliary function to wrap a store error with its calling context.
fn db_err(ctx: &str, e: StoreError) -> Error {
    Error::DatabaseError(format!("[{ctx}] Operation failed: {e:?}"))
}

impl Daod {
    /// Handle a governance action on behalf of `sender`.
    ///
    /// `Initialize` is accepted only from the configured trusted delegate
    /// and only while the registry is empty, the delegate is then enrolled
    /// as the first member. Every other action requires the sender to be a
    /// member.
    pub fn handle_action(&self, sender: &str, action: GovAction) -> Result<ActionOutcome> {
        debug!(target: "action::handle_action", "[Daod] Handling action from {sender}: {action:?}");

        // Everything except initialization requires an enrolled sender
        if !matches!(action, GovAction::Initialize { .. }) && !self.is_member(sender)? {
            return Err(Error::Unauthorized(format!("Sender address {sender} is not a member")))
        }

        match action {
            GovAction::Initialize { dao_address, dao_uri, version } => {
                let Some(delegate) = &self.trusted_delegate else {
                    return Err(Error::Unauthorized("No trusted delegate configured".to_string()))
                };
                if sender != delegate {
                    return Err(Error::Unauthorized(format!(
                        "Unaccepted initializer address {sender}"
                    )))
                }
                if self.protocol_version()?.is_some() {
                    return Err(Error::Custom("DAO already initialized".to_string()))
                }

                self.initialize_dao(&dao_address, &dao_uri, &version)
                    .map_err(|e| db_err("handle_action", e))?;
                self.add_addresses(sender).map_err(|e| db_err("handle_action", e))?;
                info!(target: "action::handle_action", "[Daod] DAO initialized at version {version}");

                Ok(ActionOutcome::Accepted)
            }

            GovAction::SetDaoUri { dao_uri, version } => {
                self.set_dao_uri(&dao_uri, &version).map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Grant { target, who, permission_id } => {
                self.grant(&target, &who, permission_id).map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::GrantWithCondition { target, who, permission_id, condition } => {
                self.grant_with_condition(&target, &who, permission_id, &condition)
                    .map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Revoke { target, who, permission_id } => {
                self.revoke(&target, &who, permission_id)
                    .map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::CreateProposal { proposer, metadata, start_date, end_date, actions } => {
                let proposal_id =
                    self.create_proposal(&proposer, &metadata, &start_date, &end_date, &actions)?;
                Ok(ActionOutcome::ProposalCreated { proposal_id })
            }

            GovAction::GetActionObject { proposal_id } => {
                let actions = self.get_action_objects(&proposal_id)?;
                Ok(ActionOutcome::ActionObjects { actions })
            }

            GovAction::Vote { voter, proposal_id, vote_option } => {
                self.vote(&voter, &proposal_id, vote_option)
                    .map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Approve { voter, proposal_id } => {
                self.approve(&voter, &proposal_id)?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::AddAddresses { member } => {
                self.add_addresses(&member).map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::RemoveAddresses { member } => {
                self.remove_addresses(&member).map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Execute { proposal_id } => {
                let results = self.execute_proposal(&proposal_id)?;
                Ok(ActionOutcome::Executed { results })
            }

            GovAction::Mint { receiver, amount } => {
                self.mint(&receiver, amount)?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Issue { amount } => {
                self.issue(amount)?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Assign { receiver, amount } => {
                self.assign(&receiver, amount)?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::Burn { holder, amount } => {
                self.burn(&holder, amount)?;
                Ok(ActionOutcome::Accepted)
            }

            GovAction::AssignVested { receiver, amount, start, cliff, vested, revokable } => {
                let vesting_id =
                    self.assign_vested(&receiver, amount, &start, &cliff, &vested, revokable)?;
                Ok(ActionOutcome::VestingAssigned { vesting_id })
            }

            GovAction::RevokeVesting { holder, vesting_id } => {
                self.revoke_vesting(&holder, vesting_id)
                    .map_err(|e| db_err("handle_action", e))?;
                Ok(ActionOutcome::Accepted)
            }
        }
    }

    /// Handle a read-only inspect query from the rollup dispatcher.
    pub fn handle_inspect(&self, query: &str) -> Result<String> {
        debug!(target: "action::handle_inspect", "[Daod] Handling inspect query: {query}");
        match query {
            INSPECT_PROTOCOL_VERSION => {
                Ok(self.protocol_version()?.unwrap_or_else(|| "DAO not initialized".to_string()))
            }
            _ => Err(Error::UnknownInspectQuery(query.to_string())),
        }
    }

    /// Execute the ordered action objects of a proposal, recording each
    /// action's result on its row and marking the proposal executed.
    /// Only membership actions are executable in proposal context, other
    /// action objects are recorded as unsupported.
    pub fn execute_proposal(&self, proposal_id: &str) -> Result<Vec<String>> {
        if !self.proposal_exists(proposal_id)? {
            return Err(Error::ProposalNotFound(proposal_id.to_string()))
        }

        let actions = self.get_raw_actions(proposal_id)?;
        let mut results = Vec::with_capacity(actions.len());

        for (action_id, raw) in actions {
            let outcome = match serde_json::from_str::<GovAction>(&raw) {
                Ok(GovAction::AddAddresses { member }) => match self.add_addresses(&member) {
                    Ok(()) => format!("Added member {member}"),
                    Err(e) => format!("Adding member {member} failed: {e}"),
                },
                Ok(GovAction::RemoveAddresses { member }) => {
                    match self.remove_addresses(&member) {
                        Ok(()) => format!("Removed member {member}"),
                        Err(e) => format!("Removing member {member} failed: {e}"),
                    }
                }
                Ok(action) => format!("Unsupported proposal action: {action:?}"),
                Err(e) => format!("Malformed action object: {e}"),
            };

            let query = format!(
                "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3;",
                ACTIONS_TABLE, ACTIONS_COL_STATUS, ACTIONS_COL_RESULT, ACTIONS_COL_ACTION_ID,
            );
            self.store
                .exec_sql(&query, rusqlite::params![ACTION_STATUS_EXECUTED, outcome, action_id])
                .map_err(|e| db_err("execute_proposal", e))?;

            results.push(outcome);
        }

        let query = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2;",
            PROPOSALS_TABLE, PROPOSALS_COL_STATUS, PROPOSALS_COL_PROPOSAL_ID,
        );
        self.store
            .exec_sql(&query, rusqlite::params![PROPOSAL_STATUS_EXECUTED, proposal_id])
            .map_err(|e| db_err("execute_proposal", e))?;

        info!(target: "action::execute_proposal", "[Daod] Executed proposal {proposal_id}");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_action, GovAction};
    use crate::voting::VoteOption;

    #[test]
    fn test_parse_action() {
        let action = parse_action(
            r#"{"action": "vote", "params": {"voter": "0xBEEF", "proposalId": "cafe", "voteOption": "Reject"}}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            GovAction::Vote {
                voter: "0xBEEF".to_string(),
                proposal_id: "cafe".to_string(),
                vote_option: VoteOption::Reject,
            }
        );

        let action = parse_action(
            r#"{"action": "createProposal", "params": {
                "proposer": "0xBEEF",
                "metadata": {"title": "Onboard carol", "description": "See forum"},
                "startDate": "2024-01-01",
                "endDate": "2024-02-01",
                "actions": [{"action": "addAddresses", "params": {"member": "0xCA01"}}]
            }}"#,
        )
        .unwrap();
        let GovAction::CreateProposal { actions, .. } = action else {
            panic!("Wrong action variant")
        };
        assert_eq!(actions, vec![GovAction::AddAddresses { member: "0xCA01".to_string() }]);
    }

    #[test]
    fn test_parse_action_rejects_unknown() {
        // Unknown action name
        assert!(parse_action(r#"{"action": "selfDestruct", "params": {}}"#).is_err());
        // Missing param field
        assert!(parse_action(r#"{"action": "issue", "params": {}}"#).is_err());
        // Unknown vote option
        assert!(parse_action(
            r#"{"action": "vote", "params": {"voter": "a", "proposalId": "b", "voteOption": "Maybe"}}"#
        )
        .is_err());
    }
}
