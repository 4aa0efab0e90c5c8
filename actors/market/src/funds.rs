// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Fund arithmetic on participant balances. None of these check bounds;
//! callers establish sufficiency first.

use fvm_shared::econ::TokenAmount;

use crate::balance_table::ParticipantBalance;

/// Moves `amount` from `from` to `to`, returning the updated pair.
pub fn transfer(
    from: &TokenAmount,
    to: &TokenAmount,
    amount: &TokenAmount,
) -> (TokenAmount, TokenAmount) {
    (from - amount, to + amount)
}

/// Moves `amount` from available into locked.
pub fn lock_funds(balance: &ParticipantBalance, amount: &TokenAmount) -> ParticipantBalance {
    let (available, locked) = transfer(&balance.available, &balance.locked, amount);
    ParticipantBalance { locked, available }
}

pub fn deposit(balance: &ParticipantBalance, amount: &TokenAmount) -> ParticipantBalance {
    ParticipantBalance { locked: balance.locked.clone(), available: &balance.available + amount }
}

pub fn withdraw(balance: &ParticipantBalance, amount: &TokenAmount) -> ParticipantBalance {
    ParticipantBalance { locked: balance.locked.clone(), available: &balance.available - amount }
}
