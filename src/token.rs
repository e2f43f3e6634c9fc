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

use rusqlite::{types::Value, OptionalExtension, Transaction};
use tracing::debug;

use crate::{
    error::{Error, Result, StoreError, StoreResult},
    member::{MEMBERS_COL_ADDRESS, MEMBERS_COL_BALANCE, MEMBERS_TABLE},
    store::txn_exec,
    Daod,
};

// Governance SQL table constant names. These have to represent
// the `gov.sql` schema.
pub const TOKEN_TABLE: &str = "Token";
pub const TREASURY_TABLE: &str = "Treasury";
pub const VESTING_TABLE: &str = "Vesting";

// TOKEN_TABLE columns
pub const TOKEN_COL_ID: &str = "id";
pub const TOKEN_COL_NAME: &str = "name";
pub const TOKEN_COL_SYMBOL: &str = "symbol";
pub const TOKEN_COL_TOTAL_SUPPLY: &str = "totalSupply";

// TREASURY_TABLE columns
pub const TREASURY_COL_TRANSACTION_ID: &str = "TransactionID";
pub const TREASURY_COL_SENDER_ADDRESS: &str = "SenderAddress";
pub const TREASURY_COL_RECEIVER_ADDRESS: &str = "ReceiverAddress";
pub const TREASURY_COL_AMOUNT: &str = "Amount";
pub const TREASURY_COL_PURPOSE: &str = "Purpose";

// VESTING_TABLE columns
pub const VESTING_COL_VESTING_ID: &str = "VestingID";
pub const VESTING_COL_HOLDER_ADDRESS: &str = "HolderAddress";
pub const VESTING_COL_AMOUNT: &str = "Amount";
pub const VESTING_COL_START_DATE: &str = "StartDate";
pub const VESTING_COL_CLIFF_DATE: &str = "CliffDate";
pub const VESTING_COL_VESTED_DATE: &str = "VestedDate";
pub const VESTING_COL_REVOKABLE: &str = "Revokable";
pub const VESTING_COL_REVOKED: &str = "Revoked";

/// Canonical member address holding the unassigned token manager balance.
pub const TOKEN_MANAGER_ADDRESS: &str = "Token Manager";

/// Sink address recorded as the receiver of burned tokens in the audit trail.
pub const BURN_ADDRESS: &str = "Burned Tokens";

/// Purpose tag recorded with every audit trail row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPurpose {
    Mint,
    Issue,
    Assign,
    Burn,
}

impl fmt::Display for TransferPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Mint => "Mint",
            Self::Issue => "Issue",
            Self::Assign => "Assign",
            Self::Burn => "Burn",
        };
        write!(f, "{s}")
    }
}

/// Structure representing the single `TOKEN_TABLE` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub name: String,
    pub symbol: String,
    pub total_supply: u64,
}

/// Structure representing a `TREASURY_TABLE` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreasuryRow {
    pub transaction_id: u64,
    pub sender_address: String,
    pub receiver_address: String,
    pub amount: u64,
    pub purpose: String,
}

/// Structure representing a `VESTING_TABLE` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VestingRecord {
    pub vesting_id: u64,
    pub holder_address: String,
    pub amount: u64,
    /// Date the vesting calculations start
    pub start_date: Option<String>,
    /// Date when the initial portion of tokens is transferable
    pub cliff_date: Option<String>,
    /// Date when all tokens are transferable
    pub vested_date: Option<String>,
    pub revokable: bool,
    pub revoked: bool,
}

/// Append an audit trail row inside a ledger transaction.
fn append_audit_row(
    tx: &Transaction,
    sender: &str,
    receiver: &str,
    amount: u64,
    purpose: TransferPurpose,
) -> StoreResult<()> {
    let query = format!(
        "INSERT INTO {} ({}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4);",
        TREASURY_TABLE,
        TREASURY_COL_SENDER_ADDRESS,
        TREASURY_COL_RECEIVER_ADDRESS,
        TREASURY_COL_AMOUNT,
        TREASURY_COL_PURPOSE,
    );
    txn_exec(tx, &query, rusqlite::params![sender, receiver, amount, purpose.to_string()])?;

    Ok(())
}

/// Bump the token total supply by `delta` inside a ledger transaction.
/// Errors with `RowNotFound` when the token manager was never initialized.
fn update_total_supply(tx: &Transaction, delta: i64) -> StoreResult<()> {
    let query = format!(
        "UPDATE {} SET {} = {} + ?1 WHERE {} = 1;",
        TOKEN_TABLE, TOKEN_COL_TOTAL_SUPPLY, TOKEN_COL_TOTAL_SUPPLY, TOKEN_COL_ID,
    );
    if txn_exec(tx, &query, rusqlite::params![delta])? == 0 {
        return Err(StoreError::RowNotFound)
    }

    Ok(())
}

/// Credit `amount` to a member balance inside a ledger transaction,
/// creating the member row when absent.
fn credit_balance(tx: &Transaction, address: &str, amount: u64) -> StoreResult<()> {
    let query = format!(
        "INSERT INTO {} ({}, {}) VALUES (?1, ?2) ON CONFLICT({}) DO UPDATE SET {} = {} + ?2;",
        MEMBERS_TABLE,
        MEMBERS_COL_ADDRESS,
        MEMBERS_COL_BALANCE,
        MEMBERS_COL_ADDRESS,
        MEMBERS_COL_BALANCE,
        MEMBERS_COL_BALANCE,
    );
    txn_exec(tx, &query, rusqlite::params![address, amount])?;

    Ok(())
}

/// Read a member balance inside a ledger transaction, `None` when the
/// member row is absent.
fn read_balance(tx: &Transaction, address: &str) -> StoreResult<Option<i64>> {
    let query = format!(
        "SELECT {} FROM {} WHERE {} = ?1;",
        MEMBERS_COL_BALANCE, MEMBERS_TABLE, MEMBERS_COL_ADDRESS,
    );
    tx.query_row(&query, rusqlite::params![address], |row| row.get(0))
        .optional()
        .map_err(|_| StoreError::QueryExecutionFailed)
}

/// Auxiliary function to parse a `VESTING_TABLE` record.
fn parse_vesting_record(row: &[Value]) -> Result<VestingRecord> {
    let Value::Integer(vesting_id) = row[0] else {
        return Err(Error::ParseFailed("[parse_vesting_record] Vesting ID parsing failed"))
    };

    let Value::Text(ref holder_address) = row[1] else {
        return Err(Error::ParseFailed("[parse_vesting_record] Holder address parsing failed"))
    };

    let Value::Integer(amount) = row[2] else {
        return Err(Error::ParseFailed("[parse_vesting_record] Amount parsing failed"))
    };

    let mut dates = Vec::with_capacity(3);
    for value in &row[3..6] {
        match value {
            Value::Text(s) => dates.push(Some(s.clone())),
            Value::Null => dates.push(None),
            _ => return Err(Error::ParseFailed("[parse_vesting_record] Date parsing failed")),
        }
    }

    let Value::Integer(revokable) = row[6] else {
        return Err(Error::ParseFailed("[parse_vesting_record] Revokable parsing failed"))
    };
    let Value::Integer(revoked) = row[7] else {
        return Err(Error::ParseFailed("[parse_vesting_record] Revoked parsing failed"))
    };

    Ok(VestingRecord {
        vesting_id: vesting_id as u64,
        holder_address: holder_address.clone(),
        amount: amount as u64,
        start_date: dates[0].clone(),
        cliff_date: dates[1].clone(),
        vested_date: dates[2].clone(),
        revokable: revokable != 0,
        revoked: revoked != 0,
    })
}

impl Daod {
    /// Create the singleton token metadata row and, when absent, the
    /// canonical treasury member holding the initial supply.
    pub fn initialize_token_manager(
        &self,
        name: &str,
        symbol: &str,
        initial_supply: u64,
    ) -> Result<()> {
        debug!(target: "token::initialize_token_manager", "[Daod] Initializing token {symbol}");
        let result = self.store.exec_txn(|tx| {
            let query = format!(
                "INSERT INTO {} ({}, {}, {}, {}) VALUES (1, ?1, ?2, ?3);",
                TOKEN_TABLE, TOKEN_COL_ID, TOKEN_COL_NAME, TOKEN_COL_SYMBOL, TOKEN_COL_TOTAL_SUPPLY,
            );
            txn_exec(tx, &query, rusqlite::params![name, symbol, initial_supply])?;

            let query = format!(
                "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2);",
                MEMBERS_TABLE, MEMBERS_COL_ADDRESS, MEMBERS_COL_BALANCE,
            );
            txn_exec(tx, &query, rusqlite::params![TOKEN_MANAGER_ADDRESS, initial_supply])?;

            Ok(())
        });

        if let Err(e) = result {
            return Err(Error::DatabaseError(format!(
                "[initialize_token_manager] Token manager initialization failed: {e:?}"
            )))
        }

        Ok(())
    }

    /// Mint `amount` new tokens for `receiver`, which cannot be the token
    /// manager itself (use `issue` instead). Increments the total supply
    /// and the receiver balance, and appends an audit trail row, in one
    /// transaction.
    pub fn mint(&self, receiver: &str, amount: u64) -> Result<()> {
        if receiver == TOKEN_MANAGER_ADDRESS {
            return Err(Error::MintToTreasury)
        }

        debug!(target: "token::mint", "[Daod] Minting {amount} tokens for {receiver}");
        let result = self.store.exec_txn(|tx| {
            update_total_supply(tx, amount as i64)?;
            credit_balance(tx, receiver, amount)?;
            append_audit_row(tx, TOKEN_MANAGER_ADDRESS, receiver, amount, TransferPurpose::Mint)
        });

        match result {
            Ok(()) => Ok(()),
            Err(StoreError::RowNotFound) => Err(Error::TokenNotInitialized),
            Err(e) => Err(Error::DatabaseError(format!("[mint] Mint failed: {e:?}"))),
        }
    }

    /// Mint `amount` new tokens for the token manager itself.
    pub fn issue(&self, amount: u64) -> Result<()> {
        debug!(target: "token::issue", "[Daod] Issuing {amount} tokens to the token manager");
        let result = self.store.exec_txn(|tx| {
            update_total_supply(tx, amount as i64)?;
            let query = format!(
                "UPDATE {} SET {} = {} + ?1 WHERE {} = ?2;",
                MEMBERS_TABLE, MEMBERS_COL_BALANCE, MEMBERS_COL_BALANCE, MEMBERS_COL_ADDRESS,
            );
            if txn_exec(tx, &query, rusqlite::params![amount, TOKEN_MANAGER_ADDRESS])? == 0 {
                return Err(StoreError::RowNotFound)
            }
            append_audit_row(
                tx,
                TOKEN_MANAGER_ADDRESS,
                TOKEN_MANAGER_ADDRESS,
                amount,
                TransferPurpose::Issue,
            )
        });

        match result {
            Ok(()) => Ok(()),
            Err(StoreError::RowNotFound) => Err(Error::TokenNotInitialized),
            Err(e) => Err(Error::DatabaseError(format!("[issue] Issue failed: {e:?}"))),
        }
    }

    /// Move `amount` tokens from the token manager holdings to `receiver`.
    /// Rejects when the treasury balance is smaller than `amount`, leaving
    /// the ledger untouched.
    pub fn assign(&self, receiver: &str, amount: u64) -> Result<()> {
        debug!(target: "token::assign", "[Daod] Assigning {amount} tokens to {receiver}");
        let result = self.store.exec_txn(|tx| {
            let Some(balance) = read_balance(tx, TOKEN_MANAGER_ADDRESS)? else {
                return Err(StoreError::RowNotFound)
            };
            if balance < amount as i64 {
                return Ok(false)
            }

            let query = format!(
                "UPDATE {} SET {} = {} - ?1 WHERE {} = ?2;",
                MEMBERS_TABLE, MEMBERS_COL_BALANCE, MEMBERS_COL_BALANCE, MEMBERS_COL_ADDRESS,
            );
            txn_exec(tx, &query, rusqlite::params![amount, TOKEN_MANAGER_ADDRESS])?;
            credit_balance(tx, receiver, amount)?;
            append_audit_row(tx, TOKEN_MANAGER_ADDRESS, receiver, amount, TransferPurpose::Assign)?;

            Ok(true)
        });

        match result {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::InsufficientTreasuryBalance),
            Err(StoreError::RowNotFound) => Err(Error::TokenNotInitialized),
            Err(e) => Err(Error::DatabaseError(format!("[assign] Assign failed: {e:?}"))),
        }
    }

    /// Burn `amount` tokens from `holder`, decrementing the total supply
    /// and the holder balance. The resulting balance is not checked for
    /// negativity, overdraft protection is the caller's responsibility.
    pub fn burn(&self, holder: &str, amount: u64) -> Result<()> {
        debug!(target: "token::burn", "[Daod] Burning {amount} tokens from {holder}");
        let result = self.store.exec_txn(|tx| {
            update_total_supply(tx, -(amount as i64))?;
            let query = format!(
                "UPDATE {} SET {} = {} - ?1 WHERE {} = ?2;",
                MEMBERS_TABLE, MEMBERS_COL_BALANCE, MEMBERS_COL_BALANCE, MEMBERS_COL_ADDRESS,
            );
            if txn_exec(tx, &query, rusqlite::params![amount, holder])? == 0 {
                // Unknown holder, the supply decrement must roll back
                return Err(StoreError::GenericError)
            }
            append_audit_row(tx, holder, BURN_ADDRESS, amount, TransferPurpose::Burn)
        });

        match result {
            Ok(()) => Ok(()),
            Err(StoreError::GenericError) => {
                Err(Error::Custom(format!("[burn] Unknown holder {holder}")))
            }
            Err(StoreError::RowNotFound) => Err(Error::TokenNotInitialized),
            Err(e) => Err(Error::DatabaseError(format!("[burn] Burn failed: {e:?}"))),
        }
    }

    /// Assign `amount` tokens to `receiver` with a vesting schedule.
    /// Returns the identifier of the new vesting row.
    pub fn assign_vested(
        &self,
        receiver: &str,
        amount: u64,
        start: &str,
        cliff: &str,
        vested: &str,
        revokable: bool,
    ) -> Result<u64> {
        debug!(target: "token::assign_vested", "[Daod] Vesting {amount} tokens for {receiver}");
        let result = self.store.exec_txn(|tx| {
            let query = format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                VESTING_TABLE,
                VESTING_COL_HOLDER_ADDRESS,
                VESTING_COL_AMOUNT,
                VESTING_COL_START_DATE,
                VESTING_COL_CLIFF_DATE,
                VESTING_COL_VESTED_DATE,
                VESTING_COL_REVOKABLE,
            );
            txn_exec(tx, &query, rusqlite::params![receiver, amount, start, cliff, vested, revokable])?;
            Ok(tx.last_insert_rowid() as u64)
        });

        match result {
            Ok(vesting_id) => Ok(vesting_id),
            Err(e) => {
                Err(Error::DatabaseError(format!("[assign_vested] Vesting insert failed: {e:?}")))
            }
        }
    }

    /// Revoke the matching vesting row, or every vesting row of the holder
    /// when no identifier is given.
    pub fn revoke_vesting(&self, holder: &str, vesting_id: Option<u64>) -> StoreResult<()> {
        debug!(target: "token::revoke_vesting", "[Daod] Revoking vesting of {holder}");
        match vesting_id {
            Some(vesting_id) => {
                let query = format!(
                    "UPDATE {} SET {} = 1 WHERE {} = ?1 AND {} = ?2;",
                    VESTING_TABLE, VESTING_COL_REVOKED, VESTING_COL_VESTING_ID, VESTING_COL_HOLDER_ADDRESS,
                );
                self.store.exec_sql(&query, rusqlite::params![vesting_id, holder])?;
            }
            None => {
                let query = format!(
                    "UPDATE {} SET {} = 1 WHERE {} = ?1;",
                    VESTING_TABLE, VESTING_COL_REVOKED, VESTING_COL_HOLDER_ADDRESS,
                );
                self.store.exec_sql(&query, rusqlite::params![holder])?;
            }
        }

        Ok(())
    }

    /// Fetch the vesting rows of a holder, optionally narrowed down to a
    /// single vesting identifier.
    pub fn get_vesting(&self, holder: &str, vesting_id: Option<u64>) -> Result<Vec<VestingRecord>> {
        let cols = format!(
            "{}, {}, {}, {}, {}, {}, {}, {}",
            VESTING_COL_VESTING_ID,
            VESTING_COL_HOLDER_ADDRESS,
            VESTING_COL_AMOUNT,
            VESTING_COL_START_DATE,
            VESTING_COL_CLIFF_DATE,
            VESTING_COL_VESTED_DATE,
            VESTING_COL_REVOKABLE,
            VESTING_COL_REVOKED,
        );

        let rows = match vesting_id {
            Some(vesting_id) => {
                let query = format!(
                    "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2;",
                    cols, VESTING_TABLE, VESTING_COL_HOLDER_ADDRESS, VESTING_COL_VESTING_ID,
                );
                self.store.query_custom(&query, rusqlite::params![holder, vesting_id])
            }
            None => {
                let query = format!(
                    "SELECT {} FROM {} WHERE {} = ?1;",
                    cols, VESTING_TABLE, VESTING_COL_HOLDER_ADDRESS,
                );
                self.store.query_custom(&query, rusqlite::params![holder])
            }
        };

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_vesting] Vesting retrieval failed: {e:?}"
                )))
            }
        };

        let mut ret = Vec::with_capacity(rows.len());
        for row in rows {
            ret.push(parse_vesting_record(&row)?);
        }

        Ok(ret)
    }

    /// The spendable balance of a holder, zero for unknown addresses.
    /// Unvested amounts are not subtracted, the vesting schedule only
    /// gates external transfers.
    pub fn spendable_balance_of(&self, holder: &str) -> Result<i64> {
        let query = format!(
            "SELECT {} FROM {} WHERE {} = ?1;",
            MEMBERS_COL_BALANCE, MEMBERS_TABLE, MEMBERS_COL_ADDRESS,
        );
        let rows = match self.store.query_custom(&query, rusqlite::params![holder]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[spendable_balance_of] Balance retrieval failed: {e:?}"
                )))
            }
        };

        let Some(row) = rows.first() else { return Ok(0) };
        let Value::Integer(balance) = row[0] else {
            return Err(Error::ParseFailed("[spendable_balance_of] Balance parsing failed"))
        };

        Ok(balance)
    }

    /// The current total token supply.
    pub fn total_supply(&self) -> Result<u64> {
        Ok(self.token_info()?.total_supply)
    }

    /// Fetch the token metadata row.
    pub fn token_info(&self) -> Result<TokenRecord> {
        let row = match self.store.query_single(
            TOKEN_TABLE,
            &[TOKEN_COL_NAME, TOKEN_COL_SYMBOL, TOKEN_COL_TOTAL_SUPPLY],
            &[],
        ) {
            Ok(row) => row,
            Err(StoreError::RowNotFound) => return Err(Error::TokenNotInitialized),
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[token_info] Token retrieval failed: {e:?}"
                )))
            }
        };

        let Value::Text(ref name) = row[0] else {
            return Err(Error::ParseFailed("[token_info] Token name parsing failed"))
        };
        let Value::Text(ref symbol) = row[1] else {
            return Err(Error::ParseFailed("[token_info] Token symbol parsing failed"))
        };
        let Value::Integer(total_supply) = row[2] else {
            return Err(Error::ParseFailed("[token_info] Total supply parsing failed"))
        };

        Ok(TokenRecord {
            name: name.clone(),
            symbol: symbol.clone(),
            total_supply: total_supply as u64,
        })
    }

    /// Fetch the full audit trail of token movements, in recording order.
    pub fn treasury_history(&self) -> Result<Vec<TreasuryRow>> {
        let query = format!(
            "SELECT {}, {}, {}, {}, {} FROM {} ORDER BY {} ASC;",
            TREASURY_COL_TRANSACTION_ID,
            TREASURY_COL_SENDER_ADDRESS,
            TREASURY_COL_RECEIVER_ADDRESS,
            TREASURY_COL_AMOUNT,
            TREASURY_COL_PURPOSE,
            TREASURY_TABLE,
            TREASURY_COL_TRANSACTION_ID,
        );
        let rows = match self.store.query_custom(&query, &[]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[treasury_history] History retrieval failed: {e:?}"
                )))
            }
        };

        let mut ret = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Integer(transaction_id) = row[0] else {
                return Err(Error::ParseFailed("[treasury_history] Transaction ID parsing failed"))
            };
            let Value::Text(ref sender_address) = row[1] else {
                return Err(Error::ParseFailed("[treasury_history] Sender parsing failed"))
            };
            let Value::Text(ref receiver_address) = row[2] else {
                return Err(Error::ParseFailed("[treasury_history] Receiver parsing failed"))
            };
            let Value::Integer(amount) = row[3] else {
                return Err(Error::ParseFailed("[treasury_history] Amount parsing failed"))
            };
            let Value::Text(ref purpose) = row[4] else {
                return Err(Error::ParseFailed("[treasury_history] Purpose parsing failed"))
            };

            ret.push(TreasuryRow {
                transaction_id: transaction_id as u64,
                sender_address: sender_address.clone(),
                receiver_address: receiver_address.clone(),
                amount: amount as u64,
                purpose: purpose.clone(),
            });
        }

        Ok(ret)
    }
}
