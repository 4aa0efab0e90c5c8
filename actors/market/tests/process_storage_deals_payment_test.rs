// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use num_traits::Zero;

use storage_market_actor::ext::power::IS_MINER_METHOD;
use storage_market_actor::State;
use storage_market_runtime::test_utils::*;
use storage_market_runtime::STORAGE_POWER_ACTOR_ADDR;


use harness::*;

const PROVING_PERIOD: i64 = 100;

fn setup_active_deal() -> (MockRuntime, u64) {
    let rt = setup_with_proving_period(PROVING_PERIOD);
    add_participant_funds(&rt, CLIENT_ADDR, TokenAmount::from_atto(1000));
    add_participant_funds(&rt, PROVIDER_ADDR, TokenAmount::from_atto(500));
    let deal = generate_deal(CLIENT_ADDR, PROVIDER_ADDR, 100, 50);
    let id = publish_deals(&rt, PROVIDER_ADDR, &[deal])[0];
    rt.set_epoch(50);
    activate_deals(&rt, PROVIDER_ADDR, &[id]);
    (rt, id)
}

#[test]
fn payment_moves_one_period_share() {
    let (rt, id) = setup_active_deal();

    rt.set_epoch(60);
    process_payment(&rt, PROVIDER_ADDR, &[id]);

    assert_eq!(balance(50, 900), get_balance(&rt, &CLIENT_ADDR));
    assert_eq!(balance(50, 500), get_balance(&rt, &PROVIDER_ADDR));
    check_state(&rt);
}

#[test]
fn payments_stop_when_locked_funds_run_out() {
    let (rt, id) = setup_active_deal();

    rt.set_epoch(60);
    process_payment(&rt, PROVIDER_ADDR, &[id]);
    process_payment(&rt, PROVIDER_ADDR, &[id]);
    assert_eq!(balance(0, 900), get_balance(&rt, &CLIENT_ADDR));
    assert_eq!(balance(50, 550), get_balance(&rt, &PROVIDER_ADDR));

    let before = *rt.state.borrow();
    expect_is_miner(&rt, PROVIDER_ADDR, true);
    expect_abort(ExitCode::USR_INSUFFICIENT_FUNDS, process_payment_raw(&rt, PROVIDER_ADDR, &[id]));
    rt.verify();
    assert_eq!(before, *rt.state.borrow());
    check_state(&rt);
}

#[test]
fn self_deal_payment_unlocks_own_funds() {
    let rt = setup_with_proving_period(PROVING_PERIOD);
    add_participant_funds(&rt, PROVIDER_ADDR, TokenAmount::from_atto(150));
    let deal = generate_deal(PROVIDER_ADDR, PROVIDER_ADDR, 100, 50);
    let id = publish_deals(&rt, PROVIDER_ADDR, &[deal])[0];

    rt.set_epoch(10);
    process_payment(&rt, PROVIDER_ADDR, &[id]);
    assert_eq!(balance(100, 50), get_balance(&rt, &PROVIDER_ADDR));
    check_state(&rt);
}

#[test]
fn caller_must_be_storage_provider() {
    let (rt, id) = setup_active_deal();
    let before = *rt.state.borrow();

    rt.set_epoch(60);
    expect_is_miner(&rt, OTHER_ADDR, false);
    expect_abort(ExitCode::USR_FORBIDDEN, process_payment_raw(&rt, OTHER_ADDR, &[id]));
    rt.verify();
    assert_eq!(before, *rt.state.borrow());
}

#[test]
fn power_actor_failure_propagates() {
    let (rt, id) = setup_active_deal();

    rt.set_epoch(60);
    rt.expect_send_simple(
        STORAGE_POWER_ACTOR_ADDR,
        IS_MINER_METHOD,
        is_miner_params(PROVIDER_ADDR),
        TokenAmount::zero(),
        None,
        ExitCode::USR_ILLEGAL_ARGUMENT,
    );
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_ARGUMENT,
        "failed to query power actor",
        process_payment_raw(&rt, PROVIDER_ADDR, &[id]),
    );
    rt.verify();
    assert_eq!(balance(100, 900), get_balance(&rt, &CLIENT_ADDR));
}

#[test]
fn missing_deal_fails_before_query() {
    let (rt, id) = setup_active_deal();

    rt.set_epoch(60);
    expect_abort(ExitCode::USR_NOT_FOUND, process_payment_raw(&rt, PROVIDER_ADDR, &[id + 1]));
    rt.verify();
}

#[test]
fn expired_deal_ends_processing_without_changes() {
    let (rt, id) = setup_active_deal();
    let before = *rt.state.borrow();

    rt.set_epoch(PROPOSAL_EXPIRATION + 1);
    process_payment(&rt, PROVIDER_ADDR, &[id]);
    assert_eq!(before, *rt.state.borrow());
    assert_eq!(balance(100, 900), get_balance(&rt, &CLIENT_ADDR));
}

#[test]
fn expired_deal_discards_earlier_payments_in_batch() {
    let rt = setup_with_proving_period(PROVING_PERIOD);
    add_participant_funds(&rt, CLIENT_ADDR, TokenAmount::from_atto(200));
    add_participant_funds(&rt, PROVIDER_ADDR, TokenAmount::from_atto(100));

    let mut long_lived = generate_proposal(
        CLIENT_ADDR,
        PROVIDER_ADDR,
        TokenAmount::from_atto(100),
        TokenAmount::from_atto(50),
    );
    long_lived.proposal_expiration = 2 * PROPOSAL_EXPIRATION;
    let short_lived = generate_deal(CLIENT_ADDR, PROVIDER_ADDR, 100, 50);
    let ids = publish_deals(&rt, PROVIDER_ADDR, &[sign_deal(long_lived), short_lived]);
    let before = *rt.state.borrow();

    rt.set_epoch(PROPOSAL_EXPIRATION + 1);
    process_payment(&rt, PROVIDER_ADDR, &ids);
    assert_eq!(before, *rt.state.borrow());
    assert_eq!(balance(200, 0), get_balance(&rt, &CLIENT_ADDR));
    check_state(&rt);
}

#[test]
fn reentrant_state_change_aborts_payment() {
    let (rt, id) = setup_active_deal();
    let before = *rt.state.borrow();

    // Simulate the power actor calling back into the market and moving its head.
    let mut moved: State = rt.get_state();
    moved.next_deal_id += 10;
    rt.replace_state(&moved);
    let reentered = *rt.state.borrow();
    rt.state.replace(before);

    rt.set_epoch(60);
    rt.expect_send(ExpectedMessage {
        to: STORAGE_POWER_ACTOR_ADDR,
        method: IS_MINER_METHOD,
        params: is_miner_params(PROVIDER_ADDR),
        value: TokenAmount::zero(),
        send_return: IS_MINER_RESPONSE.clone(),
        exit_code: ExitCode::OK,
        send_error: None,
        reenter_with_state: Some(reentered),
    });
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_STATE,
        "state changed during invocation",
        process_payment_raw(&rt, PROVIDER_ADDR, &[id]),
    );
    rt.verify();
    assert_eq!(before, *rt.state.borrow());
    assert_eq!(balance(100, 900), get_balance(&rt, &CLIENT_ADDR));
}
