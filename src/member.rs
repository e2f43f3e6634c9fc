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

use crate::{
    error::{Error, Result},
    Daod,
};

// Governance SQL table constant names. These have to represent
// the `gov.sql` schema.
pub const MEMBERS_TABLE: &str = "Members";

// MEMBERS_TABLE columns
pub const MEMBERS_COL_ADDRESS: &str = "address";
pub const MEMBERS_COL_BALANCE: &str = "balance";
pub const MEMBERS_COL_VESTING_ID: &str = "vestingId";

/// Structure representing a `MEMBERS_TABLE` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    /// Member address
    pub address: String,
    /// Token balance held by this member
    pub balance: i64,
    /// Reference to vesting information, if applicable
    pub vesting_id: Option<u64>,
}

/// Auxiliary function to parse a `MEMBERS_TABLE` record.
fn parse_member_record(row: &[Value]) -> Result<MemberRecord> {
    let Value::Text(ref address) = row[0] else {
        return Err(Error::ParseFailed("[parse_member_record] Address parsing failed"))
    };

    let Value::Integer(balance) = row[1] else {
        return Err(Error::ParseFailed("[parse_member_record] Balance parsing failed"))
    };

    let vesting_id = match row[2] {
        Value::Integer(id) => {
            let Ok(id) = u64::try_from(id) else {
                return Err(Error::ParseFailed("[parse_member_record] Vesting ID parsing failed"))
            };
            Some(id)
        }
        Value::Null => None,
        _ => return Err(Error::ParseFailed("[parse_member_record] Vesting ID parsing failed")),
    };

    Ok(MemberRecord { address: address.clone(), balance, vesting_id })
}

impl Daod {
    /// Check if the given address is enrolled as a member.
    pub fn is_member(&self, address: &str) -> Result<bool> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1;",
            MEMBERS_TABLE, MEMBERS_COL_ADDRESS,
        );
        let rows = match self.store.query_custom(&query, rusqlite::params![address]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[is_member] Membership lookup failed: {e:?}"
                )))
            }
        };

        let Value::Integer(count) = rows[0][0] else {
            return Err(Error::ParseFailed("[is_member] Member count parsing failed"))
        };

        Ok(count > 0)
    }

    /// Fetch all known members.
    pub fn get_members(&self) -> Result<Vec<MemberRecord>> {
        let rows = match self.store.query_multiple(
            MEMBERS_TABLE,
            &[MEMBERS_COL_ADDRESS, MEMBERS_COL_BALANCE, MEMBERS_COL_VESTING_ID],
            &[],
        ) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_members] Members retrieval failed: {e:?}"
                )))
            }
        };

        let mut ret = Vec::with_capacity(rows.len());
        for row in rows {
            ret.push(parse_member_record(&row)?);
        }

        Ok(ret)
    }
}
