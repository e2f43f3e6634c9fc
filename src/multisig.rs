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

use tracing::debug;

use crate::{
    error::{Error, Result, StoreResult},
    member::{MEMBERS_COL_ADDRESS, MEMBERS_TABLE},
    voting::VoteOption,
    Daod,
};

impl Daod {
    /// Add a new member to the address list.
    pub fn add_addresses(&self, member: &str) -> StoreResult<()> {
        debug!(target: "multisig::add_addresses", "[Daod] Adding member {member}");
        let query =
            format!("INSERT INTO {} ({}) VALUES (?1);", MEMBERS_TABLE, MEMBERS_COL_ADDRESS);
        self.store.exec_sql(&query, rusqlite::params![member])?;

        Ok(())
    }

    /// Remove an existing member from the address list. Removing an
    /// unknown address is a no-op.
    pub fn remove_addresses(&self, member: &str) -> StoreResult<()> {
        debug!(target: "multisig::remove_addresses", "[Daod] Removing member {member}");
        let query =
            format!("DELETE FROM {} WHERE {} = ?1;", MEMBERS_TABLE, MEMBERS_COL_ADDRESS);
        self.store.exec_sql(&query, rusqlite::params![member])?;

        Ok(())
    }

    /// Approve a proposal: validate it exists, then record an `Approve`
    /// vote for the voter.
    pub fn approve(&self, voter: &str, proposal_id: &str) -> Result<()> {
        // Validate the proposal
        self.get_proposal(proposal_id)?;

        if let Err(e) = self.vote(voter, proposal_id, VoteOption::Approve) {
            return Err(Error::DatabaseError(format!("[approve] Approve vote failed: {e:?}")))
        }

        Ok(())
    }
}
