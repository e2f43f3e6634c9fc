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

use daod::{
    action::{parse_action, ActionOutcome, GovAction},
    error::{Error, StoreError},
    proposal::{proposal_id_for_title, ProposalMetadata},
    voting::VoteOption,
    Daod,
};

const DELEGATE: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

fn harness() -> Daod {
    let daod = Daod::new(None, Some(DELEGATE.to_string())).unwrap();
    daod.initialize_tables().unwrap();
    daod
}

fn metadata(title: &str) -> ProposalMetadata {
    ProposalMetadata { title: title.to_string(), description: "See forum".to_string() }
}

#[test]
fn test_dao_registry_lifecycle() {
    let daod = harness();

    // Empty registry
    assert_eq!(daod.protocol_version().unwrap(), None);
    assert_eq!(daod.dao_uri("v1").unwrap(), None);

    daod.initialize_dao("0xAAA", "https://x", "v1").unwrap();
    assert_eq!(daod.protocol_version().unwrap(), Some("v1".to_string()));
    assert_eq!(daod.dao_uri("v1").unwrap(), Some("https://x".to_string()));

    daod.set_dao_uri("https://y", "v1").unwrap();
    assert_eq!(daod.dao_uri("v1").unwrap(), Some("https://y".to_string()));

    // Unknown version
    assert_eq!(daod.set_dao_uri("https://z", "v9"), Err(StoreError::RowNotFound));

    // Duplicate version violates the registry unique constraint
    assert!(daod.initialize_dao("0xAAA", "https://x", "v1").is_err());

    let record = daod.get_dao("v1").unwrap();
    assert_eq!(record.dao_address, "0xAAA");
    assert_eq!(record.dao_uri, Some("https://y".to_string()));
    assert_eq!(record.version, "v1");

    // A newer version becomes the current one
    daod.initialize_dao("0xAAA", "https://z", "v2").unwrap();
    assert_eq!(daod.protocol_version().unwrap(), Some("v2".to_string()));
}

#[test]
fn test_permission_grant_revoke() {
    let daod = harness();

    assert!(!daod.is_granted("createProposal", "0xB0B", 1).unwrap());

    daod.grant("createProposal", "0xB0B", 1).unwrap();
    assert!(daod.is_granted("createProposal", "0xB0B", 1).unwrap());
    assert!(daod.has_permission("createProposal", "0xB0B", 1).unwrap());

    // The triple is scoped, other ids and targets stay ungranted
    assert!(!daod.is_granted("createProposal", "0xB0B", 2).unwrap());
    assert!(!daod.is_granted("mint", "0xB0B", 1).unwrap());

    // Granting the same triple twice is a no-op
    daod.grant("createProposal", "0xB0B", 1).unwrap();
    daod.revoke("createProposal", "0xB0B", 1).unwrap();
    assert!(!daod.is_granted("createProposal", "0xB0B", 1).unwrap());

    // Revoking a non-existent grant is a no-op
    daod.revoke("createProposal", "0xB0B", 1).unwrap();

    // Conditional grants pass through the default evaluator
    daod.grant_with_condition("mint", "0xB0B", 7, "balance-above-100").unwrap();
    assert!(daod.check_condition("balance-above-100", "mint", "0xB0B", 7, None).unwrap());
    assert!(!daod.check_condition("balance-above-100", "mint", "0xEVE", 7, None).unwrap());
}

#[test]
fn test_proposal_content_addressing() {
    let daod = harness();

    assert_eq!(daod.proposal_count().unwrap(), 0);
    let actions = vec![
        GovAction::AddAddresses { member: "0xCA01".to_string() },
        GovAction::RemoveAddresses { member: "0xMA11".to_string() },
    ];

    // The identifier is the SHA-256 digest of the title alone
    let proposal_id =
        daod.create_proposal("0xB0B", &metadata("abc"), "2024-01-01", "2024-02-01", &actions).unwrap();
    assert_eq!(proposal_id, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    assert_eq!(proposal_id, proposal_id_for_title("abc"));

    assert!(daod.proposal_exists(&proposal_id).unwrap());
    assert_eq!(daod.proposal_count().unwrap(), 1);

    // A repeat title is a collision, not an error, and appends nothing
    let repeat_id = daod
        .create_proposal("0xEVE", &metadata("abc"), "2024-03-01", "2024-04-01", &[])
        .unwrap();
    assert_eq!(repeat_id, proposal_id);
    assert_eq!(daod.proposal_count().unwrap(), 1);

    // Action objects come back in insertion order
    assert_eq!(daod.get_action_objects(&proposal_id).unwrap(), actions);

    let record = daod.get_proposal(&proposal_id).unwrap();
    assert_eq!(record.proposer, Some("0xB0B".to_string()));
    assert_eq!(record.title, "abc");
    assert_eq!(record.status, "Proposed");
    assert_eq!(record.start_date, Some("2024-01-01".to_string()));

    assert!(matches!(daod.get_proposal("missing"), Err(Error::ProposalNotFound(_))));
}

#[test]
fn test_majority_thresholds() {
    let daod = harness();

    let proposal_id =
        daod.create_proposal("0xB0B", &metadata("Raise quorum"), "", "", &[]).unwrap();

    // Unset threshold counts as zero, a single vote exceeds it
    assert!(!daod.is_support_threshold_reached(&proposal_id).unwrap());
    daod.vote("0xV01", &proposal_id, VoteOption::Approve).unwrap();
    assert!(daod.is_support_threshold_reached(&proposal_id).unwrap());

    daod.set_support_threshold(2).unwrap();
    assert_eq!(daod.support_threshold().unwrap(), Some(2));

    // Strictly greater: count == threshold is not enough
    daod.vote("0xV02", &proposal_id, VoteOption::Reject).unwrap();
    assert!(!daod.is_support_threshold_reached(&proposal_id).unwrap());
    daod.vote("0xV03", &proposal_id, VoteOption::Abstain).unwrap();
    assert!(daod.is_support_threshold_reached(&proposal_id).unwrap());

    // The default early decision evaluates the same predicate
    assert!(daod.is_support_threshold_reached_early(&proposal_id).unwrap());

    // Unset participation is never reached, the set one is inclusive
    assert!(!daod.is_min_participation_reached(&proposal_id).unwrap());
    daod.set_min_participation(3).unwrap();
    assert!(daod.is_min_participation_reached(&proposal_id).unwrap());
    daod.set_min_participation(4).unwrap();
    assert!(!daod.is_min_participation_reached(&proposal_id).unwrap());

    // Both settings live in the same row
    assert_eq!(daod.support_threshold().unwrap(), Some(2));
    assert_eq!(daod.min_participation().unwrap(), Some(4));

    assert_eq!(
        daod.get_vote_option(&proposal_id, "0xV02").unwrap(),
        Some(VoteOption::Reject)
    );
    assert_eq!(daod.get_vote_option(&proposal_id, "0xV09").unwrap(), None);

    // One vote per (voter, proposal) pair
    assert!(daod.vote("0xV01", &proposal_id, VoteOption::Reject).is_err());
}

#[test]
fn test_multisig_approve() {
    let daod = harness();

    assert!(matches!(daod.approve("0xB0B", "missing"), Err(Error::ProposalNotFound(_))));

    daod.add_addresses("0xB0B").unwrap();
    assert!(daod.is_member("0xB0B").unwrap());

    // Enrolling the same address twice violates the members key
    assert!(daod.add_addresses("0xB0B").is_err());

    let proposal_id =
        daod.create_proposal("0xB0B", &metadata("Fund the relay"), "", "", &[]).unwrap();
    daod.approve("0xB0B", &proposal_id).unwrap();
    assert_eq!(
        daod.get_vote_option(&proposal_id, "0xB0B").unwrap(),
        Some(VoteOption::Approve)
    );

    daod.remove_addresses("0xB0B").unwrap();
    assert!(!daod.is_member("0xB0B").unwrap());

    // Removing an unknown address is a no-op
    daod.remove_addresses("0xB0B").unwrap();
}

#[test]
fn test_action_dispatch() {
    let daod = harness();

    let initialize = GovAction::Initialize {
        dao_address: "0xAAA".to_string(),
        dao_uri: "https://x".to_string(),
        version: "v1".to_string(),
    };

    // Only the trusted delegate may initialize
    assert!(matches!(
        daod.handle_action("0xEVE", initialize.clone()),
        Err(Error::Unauthorized(_))
    ));

    assert_eq!(daod.handle_action(DELEGATE, initialize.clone()).unwrap(), ActionOutcome::Accepted);
    assert!(daod.is_member(DELEGATE).unwrap());
    assert_eq!(daod.handle_inspect("protocol-version").unwrap(), "v1");

    // Initialization is one-shot
    assert!(matches!(daod.handle_action(DELEGATE, initialize), Err(Error::Custom(_))));

    // Non-members cannot submit actions
    assert!(matches!(
        daod.handle_action("0xEVE", GovAction::Issue { amount: 1 }),
        Err(Error::Unauthorized(_))
    ));

    // A proposal carrying a membership action, submitted over the wire shape
    let payload = format!(
        r#"{{"action": "createProposal", "params": {{
            "proposer": "{DELEGATE}",
            "metadata": {{"title": "Onboard carol", "description": "See forum"}},
            "startDate": "2024-01-01",
            "endDate": "2024-02-01",
            "actions": [{{"action": "addAddresses", "params": {{"member": "0xCA01"}}}}]
        }}}}"#
    );
    let action = parse_action(&payload).unwrap();
    let ActionOutcome::ProposalCreated { proposal_id } =
        daod.handle_action(DELEGATE, action).unwrap()
    else {
        panic!("Wrong action outcome")
    };

    let outcome = daod
        .handle_action(
            DELEGATE,
            GovAction::Approve { voter: DELEGATE.to_string(), proposal_id: proposal_id.clone() },
        )
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Accepted);

    // Execution applies the stored membership action and records results
    let outcome = daod
        .handle_action(DELEGATE, GovAction::Execute { proposal_id: proposal_id.clone() })
        .unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::Executed { results: vec!["Added member 0xCA01".to_string()] }
    );
    assert!(daod.is_member("0xCA01").unwrap());
    assert_eq!(daod.get_proposal(&proposal_id).unwrap().status, "Executed");

    // The freshly added member can now act
    let outcome = daod
        .handle_action(
            "0xCA01",
            GovAction::GetActionObject { proposal_id: proposal_id.clone() },
        )
        .unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::ActionObjects {
            actions: vec![GovAction::AddAddresses { member: "0xCA01".to_string() }]
        }
    );

    assert!(matches!(
        daod.handle_inspect("total-supply"),
        Err(Error::UnknownInspectQuery(_))
    ));
}
