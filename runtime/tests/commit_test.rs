// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::{ErrorNumber, ExitCode};
use fvm_shared::METHOD_CONSTRUCTOR;
use num_derive::FromPrimitive;
use num_traits::Zero;

use storage_market_runtime::runtime::{ActorCode, Runtime};
use storage_market_runtime::test_utils::*;
use storage_market_runtime::{actor_dispatch, extract_send_result, ActorError};

const PEER: Address = Address::new_id(1000);
const PING_METHOD: u64 = 2;

#[derive(Serialize_tuple, Deserialize_tuple, Debug, PartialEq, Eq)]
struct CounterState {
    count: u64,
}

#[derive(FromPrimitive)]
#[repr(u64)]
enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Increment = 2,
    IncrementAroundPing = 3,
}

struct CounterActor;

impl CounterActor {
    fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        rt.create(&CounterState { count: 0 })
    }

    fn increment(rt: &impl Runtime) -> Result<u64, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let old = rt.get_state_root()?;
        let mut st: CounterState = rt.load_state(&old)?;
        st.count += 1;
        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;
        Ok(st.count)
    }

    fn increment_around_ping(rt: &impl Runtime) -> Result<u64, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let old = rt.get_state_root()?;
        let mut st: CounterState = rt.load_state(&old)?;
        st.count += 1;
        extract_send_result(rt.send(&PEER, PING_METHOD, None, TokenAmount::zero()))?;
        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;
        Ok(st.count)
    }
}

impl ActorCode for CounterActor {
    type Methods = Method;

    fn name() -> &'static str {
        "Counter"
    }

    actor_dispatch! {
        Constructor => constructor,
        Increment => increment,
        IncrementAroundPing => increment_around_ping,
    }
}

fn setup() -> MockRuntime {
    let rt = MockRuntime::new(Address::new_id(500));
    rt.expect_validate_caller_any();
    expect_empty(rt.call::<CounterActor>(Method::Constructor as u64, None).unwrap());
    rt.verify();
    rt
}

fn increment(rt: &MockRuntime, method: Method) -> Result<u64, ActorError> {
    rt.expect_validate_caller_any();
    let ret = rt.call::<CounterActor>(method as u64, None)?;
    Ok(ret.unwrap().deserialize().unwrap())
}

#[test]
fn commit_publishes_new_root() {
    let rt = setup();
    assert_eq!(1, increment(&rt, Method::Increment).unwrap());
    assert_eq!(2, increment(&rt, Method::Increment).unwrap());
    rt.verify();
    assert_eq!(CounterState { count: 2 }, rt.get_state());
}

#[test]
fn create_twice_fails() {
    let rt = setup();
    rt.expect_validate_caller_any();
    expect_abort(
        ExitCode::USR_ILLEGAL_STATE,
        rt.call::<CounterActor>(Method::Constructor as u64, None),
    );
}

#[test]
fn stale_commit_aborts_and_rolls_back() {
    let rt = setup();
    increment(&rt, Method::Increment).unwrap();
    let before = *rt.state.borrow();

    // A nested call re-enters and replaces the head with some other state.
    rt.replace_state(&CounterState { count: 40 });
    let reentered = *rt.state.borrow();
    rt.state.replace(before);

    rt.expect_send(ExpectedMessage {
        to: PEER,
        method: PING_METHOD,
        params: None,
        value: TokenAmount::zero(),
        send_return: None,
        exit_code: ExitCode::OK,
        send_error: None,
        reenter_with_state: Some(reentered),
    });
    expect_abort_contains_message(
        ExitCode::USR_ILLEGAL_STATE,
        "state changed during invocation",
        increment(&rt, Method::IncrementAroundPing),
    );
    rt.verify();
    assert_eq!(before, *rt.state.borrow());
    assert_eq!(CounterState { count: 1 }, rt.get_state());
}

#[test]
fn callee_abort_propagates_exit_code() {
    let rt = setup();
    rt.expect_send_simple(PEER, PING_METHOD, None, TokenAmount::zero(), None, ExitCode::USR_FORBIDDEN);
    expect_abort(ExitCode::USR_FORBIDDEN, increment(&rt, Method::IncrementAroundPing));
    rt.verify();
    assert_eq!(CounterState { count: 0 }, rt.get_state());
}

#[test]
fn undeliverable_send_maps_error_number() {
    let rt = setup();
    rt.expect_send(ExpectedMessage {
        to: PEER,
        method: PING_METHOD,
        params: None,
        value: TokenAmount::zero(),
        send_return: None,
        exit_code: ExitCode::OK,
        send_error: Some(ErrorNumber::NotFound),
        reenter_with_state: None,
    });
    expect_abort(ExitCode::USR_NOT_FOUND, increment(&rt, Method::IncrementAroundPing));
    rt.verify();
}

#[test]
fn unknown_method_is_unhandled() {
    let rt = setup();
    expect_abort(ExitCode::USR_UNHANDLED_MESSAGE, rt.call::<CounterActor>(99, None));
}
