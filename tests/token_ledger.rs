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

use daod::{error::Error, token::TOKEN_MANAGER_ADDRESS, Daod};

fn harness() -> Daod {
    let daod = Daod::new(None, None).unwrap();
    daod.initialize_tables().unwrap();
    daod
}

#[test]
fn test_uninitialized_ledger() {
    let daod = harness();

    assert!(matches!(daod.total_supply(), Err(Error::TokenNotInitialized)));
    assert!(matches!(daod.mint("0xA11CE", 10), Err(Error::TokenNotInitialized)));
    assert!(matches!(daod.issue(10), Err(Error::TokenNotInitialized)));
    assert!(matches!(daod.assign("0xA11CE", 10), Err(Error::TokenNotInitialized)));
    assert!(matches!(daod.burn("0xA11CE", 10), Err(Error::TokenNotInitialized)));

    // Unknown holders simply hold nothing
    assert_eq!(daod.spendable_balance_of("0xA11CE").unwrap(), 0);
}

#[test]
fn test_initialize_token_manager() {
    let daod = harness();

    daod.initialize_token_manager("Governance Token", "GOV", 1000).unwrap();
    assert_eq!(daod.total_supply().unwrap(), 1000);
    assert_eq!(daod.spendable_balance_of(TOKEN_MANAGER_ADDRESS).unwrap(), 1000);

    let info = daod.token_info().unwrap();
    assert_eq!(info.name, "Governance Token");
    assert_eq!(info.symbol, "GOV");
    assert_eq!(info.total_supply, 1000);

    // The singleton row cannot be recreated
    assert!(daod.initialize_token_manager("Governance Token", "GOV", 1000).is_err());
}

#[test]
fn test_issue_mint_assign_burn() {
    let daod = harness();
    daod.initialize_token_manager("Governance Token", "GOV", 1000).unwrap();

    daod.issue(100).unwrap();
    assert_eq!(daod.total_supply().unwrap(), 1100);
    assert_eq!(daod.spendable_balance_of(TOKEN_MANAGER_ADDRESS).unwrap(), 1100);

    // Minting creates the member row when absent
    daod.mint("0xA11CE", 50).unwrap();
    assert_eq!(daod.total_supply().unwrap(), 1150);
    assert_eq!(daod.spendable_balance_of("0xA11CE").unwrap(), 50);
    assert_eq!(daod.spendable_balance_of(TOKEN_MANAGER_ADDRESS).unwrap(), 1100);

    // Minting to the treasury itself must fail without mutating state
    assert!(matches!(
        daod.mint(TOKEN_MANAGER_ADDRESS, 50),
        Err(Error::MintToTreasury)
    ));
    assert_eq!(daod.total_supply().unwrap(), 1150);
    assert_eq!(daod.spendable_balance_of(TOKEN_MANAGER_ADDRESS).unwrap(), 1100);

    // Assignment moves holdings without touching the supply
    daod.assign("0xB0B", 200).unwrap();
    assert_eq!(daod.total_supply().unwrap(), 1150);
    assert_eq!(daod.spendable_balance_of(TOKEN_MANAGER_ADDRESS).unwrap(), 900);
    assert_eq!(daod.spendable_balance_of("0xB0B").unwrap(), 200);

    // Overdrawing the treasury rejects and leaves every balance untouched
    assert!(matches!(
        daod.assign("0xB0B", 10_000),
        Err(Error::InsufficientTreasuryBalance)
    ));
    assert_eq!(daod.spendable_balance_of(TOKEN_MANAGER_ADDRESS).unwrap(), 900);
    assert_eq!(daod.spendable_balance_of("0xB0B").unwrap(), 200);

    daod.burn("0xB0B", 50).unwrap();
    assert_eq!(daod.total_supply().unwrap(), 1100);
    assert_eq!(daod.spendable_balance_of("0xB0B").unwrap(), 150);

    // Burning from an unknown holder rolls back the supply decrement
    assert!(daod.burn("0xEVE", 50).is_err());
    assert_eq!(daod.total_supply().unwrap(), 1100);

    let history = daod.treasury_history().unwrap();
    let purposes: Vec<&str> = history.iter().map(|row| row.purpose.as_str()).collect();
    assert_eq!(purposes, vec!["Issue", "Mint", "Assign", "Burn"]);
    assert_eq!(history[2].sender_address, TOKEN_MANAGER_ADDRESS);
    assert_eq!(history[2].receiver_address, "0xB0B");
    assert_eq!(history[2].amount, 200);
}

#[test]
fn test_vesting() {
    let daod = harness();
    daod.initialize_token_manager("Governance Token", "GOV", 1000).unwrap();

    let first = daod
        .assign_vested("0xB0B", 100, "2024-01-01", "2024-06-01", "2025-01-01", true)
        .unwrap();
    let second = daod
        .assign_vested("0xB0B", 200, "2024-02-01", "2024-07-01", "2025-02-01", false)
        .unwrap();
    assert_ne!(first, second);

    let rows = daod.get_vesting("0xB0B", Some(first)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, 100);
    assert_eq!(rows[0].start_date, Some("2024-01-01".to_string()));
    assert!(rows[0].revokable);
    assert!(!rows[0].revoked);

    daod.revoke_vesting("0xB0B", Some(first)).unwrap();
    let rows = daod.get_vesting("0xB0B", Some(first)).unwrap();
    assert!(rows[0].revoked);
    let rows = daod.get_vesting("0xB0B", Some(second)).unwrap();
    assert!(!rows[0].revoked);

    // Without an identifier, every vesting of the holder is revoked
    daod.revoke_vesting("0xB0B", None).unwrap();
    let rows = daod.get_vesting("0xB0B", None).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.revoked));

    // The vesting schedule does not reduce the spendable balance
    assert_eq!(daod.spendable_balance_of("0xB0B").unwrap(), 0);
    assert!(daod.get_vesting("0xEVE", None).unwrap().is_empty());
}
