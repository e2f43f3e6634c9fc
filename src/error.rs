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

/// Result type used in the governance store module
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Custom governance store errors available for daod.
/// Please sort them sensefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    // Connection related errors
    ConnectionFailed = -32100,
    FailedToAcquireLock = -32101,

    // Configuration related errors
    PragmaUpdateError = -32110,

    // Query execution related errors
    QueryPreparationFailed = -32120,
    QueryExecutionFailed = -32121,
    QueryFinalizationFailed = -32122,
    ParseColumnValueError = -32123,
    RowNotFound = -32124,

    // Transaction related errors
    TransactionBeginFailed = -32130,
    TransactionCommitFailed = -32131,

    // Generic error
    GenericError = -32140,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::ConnectionFailed => "Connection failed",
            Self::FailedToAcquireLock => "Failed to acquire connection lock",
            Self::PragmaUpdateError => "Pragma update failed",
            Self::QueryPreparationFailed => "Query preparation failed",
            Self::QueryExecutionFailed => "Query execution failed",
            Self::QueryFinalizationFailed => "Query finalization failed",
            Self::ParseColumnValueError => "Column value parsing failed",
            Self::RowNotFound => "Row not found",
            Self::TransactionBeginFailed => "Transaction begin failed",
            Self::TransactionCommitFailed => "Transaction commit failed",
            Self::GenericError => "Generic error",
        };

        write!(f, "{s}")
    }
}

impl std::error::Error for StoreError {}

/// Main result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// General governance errors used throughout the crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // ==============
    // Parsing errors
    // ==============
    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error("serde_json error: {0}")]
    SerdeJsonError(String),

    // ==============
    // Storage errors
    // ==============
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =======================
    // Governance logic errors
    // =======================
    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Cannot mint to the token manager address, use issue instead")]
    MintToTreasury,

    #[error("Insufficient treasury balance")]
    InsufficientTreasuryBalance,

    #[error("Token manager is not initialized")]
    TokenNotInitialized,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unknown inspect query: {0}")]
    UnknownInspectQuery(String),

    // ===========
    // Misc errors
    // ===========
    #[error("Custom error: {0}")]
    Custom(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerdeJsonError(err.to_string())
    }
}
