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
use tracing::debug;

use crate::{
    convert_named_params,
    error::{Error, Result, StoreError, StoreResult},
    Daod,
};

// Governance SQL table constant names. These have to represent
// the `gov.sql` schema.
pub const DAO_TABLE: &str = "Dao";

// DAO_TABLE columns
pub const DAO_COL_ID: &str = "id";
pub const DAO_COL_ADDRESS: &str = "daoAddress";
pub const DAO_COL_URI: &str = "daoURI";
pub const DAO_COL_VERSION: &str = "version";

/// Structure representing a `DAO_TABLE` record.
#[derive(Debug, Clone)]
pub struct DaoRecord {
    /// Registry row identifier
    pub id: u64,
    /// The address of the DAO contract
    pub dao_address: String,
    /// The DAO URI, conforming to ERC-4824
    pub dao_uri: Option<String>,
    /// Protocol version this row describes
    pub version: String,
}

impl fmt::Display for DaoRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dao_uri = match &self.dao_uri {
            Some(uri) => uri.as_str(),
            None => "None",
        };
        write!(
            f,
            "DAO registry record\n===================\nAddress: {}\nURI: {}\nVersion: {}",
            self.dao_address, dao_uri, self.version,
        )
    }
}

/// Auxiliary function to parse a `DAO_TABLE` record.
fn parse_dao_record(row: &[Value]) -> Result<DaoRecord> {
    let Value::Integer(id) = row[0] else {
        return Err(Error::ParseFailed("[parse_dao_record] Row ID parsing failed"))
    };
    let Ok(id) = u64::try_from(id) else {
        return Err(Error::ParseFailed("[parse_dao_record] Row ID parsing failed"))
    };

    let Value::Text(ref dao_address) = row[1] else {
        return Err(Error::ParseFailed("[parse_dao_record] DAO address parsing failed"))
    };

    let dao_uri = match row[2] {
        Value::Text(ref uri) => Some(uri.clone()),
        Value::Null => None,
        _ => return Err(Error::ParseFailed("[parse_dao_record] DAO URI parsing failed")),
    };

    let Value::Text(ref version) = row[3] else {
        return Err(Error::ParseFailed("[parse_dao_record] Version parsing failed"))
    };

    Ok(DaoRecord { id, dao_address: dao_address.clone(), dao_uri, version: version.clone() })
}

impl Daod {
    /// Insert a new protocol version row into the DAO registry.
    /// A duplicate version violates the registry unique constraint.
    pub fn initialize_dao(
        &self,
        dao_address: &str,
        dao_uri: &str,
        version: &str,
    ) -> StoreResult<()> {
        debug!(target: "dao::initialize_dao", "[Daod] Initializing DAO version {version}");
        let query = format!(
            "INSERT INTO {} ({}, {}, {}) VALUES (?1, ?2, ?3);",
            DAO_TABLE, DAO_COL_ADDRESS, DAO_COL_URI, DAO_COL_VERSION,
        );
        self.store.exec_sql(&query, rusqlite::params![dao_address, dao_uri, version])?;

        Ok(())
    }

    /// Set a new DAO URI for an existing protocol version.
    pub fn set_dao_uri(&self, dao_uri: &str, version: &str) -> StoreResult<()> {
        debug!(target: "dao::set_dao_uri", "[Daod] Setting DAO URI for version {version}");
        let query = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2;",
            DAO_TABLE, DAO_COL_URI, DAO_COL_VERSION,
        );
        let changed = self.store.exec_sql(&query, rusqlite::params![dao_uri, version])?;
        if changed == 0 {
            return Err(StoreError::RowNotFound)
        }

        Ok(())
    }

    /// Fetch the DAO URI for the given protocol version.
    /// Returns `None` when the version is absent from the registry.
    pub fn dao_uri(&self, version: &str) -> Result<Option<String>> {
        let row = match self.store.query_single(
            DAO_TABLE,
            &[DAO_COL_URI],
            convert_named_params! {(DAO_COL_VERSION, version)},
        ) {
            Ok(row) => row,
            Err(StoreError::RowNotFound) => return Ok(None),
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[dao_uri] DAO URI retrieval failed: {e:?}"
                )))
            }
        };

        match row[0] {
            Value::Text(ref uri) => Ok(Some(uri.clone())),
            Value::Null => Ok(None),
            _ => Err(Error::ParseFailed("[dao_uri] DAO URI parsing failed")),
        }
    }

    /// Fetch the version string of the newest registry row, or `None` if
    /// the registry is empty. The external dispatcher uses this as its
    /// "is the DAO initialized" probe.
    pub fn protocol_version(&self) -> Result<Option<String>> {
        let query =
            format!("SELECT {} FROM {} ORDER BY {} DESC LIMIT 1;", DAO_COL_VERSION, DAO_TABLE, DAO_COL_VERSION);
        let rows = match self.store.query_custom(&query, &[]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[protocol_version] Version retrieval failed: {e:?}"
                )))
            }
        };

        let Some(row) = rows.first() else { return Ok(None) };
        let Value::Text(ref version) = row[0] else {
            return Err(Error::ParseFailed("[protocol_version] Version parsing failed"))
        };

        Ok(Some(version.clone()))
    }

    /// Fetch the full registry record for the given protocol version.
    pub fn get_dao(&self, version: &str) -> Result<DaoRecord> {
        let row = match self.store.query_single(
            DAO_TABLE,
            &[DAO_COL_ID, DAO_COL_ADDRESS, DAO_COL_URI, DAO_COL_VERSION],
            convert_named_params! {(DAO_COL_VERSION, version)},
        ) {
            Ok(row) => row,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_dao] DAO record retrieval failed: {e:?}"
                )))
            }
        };

        parse_dao_record(&row)
    }
}
