// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;

use storage_market_runtime::{actor_error, ActorContext, ActorError, Map};

use crate::funds::transfer;

pub const BALANCE_TABLE_BITWIDTH: u32 = 6;

/// Funds a participant holds in escrow with the market.
/// Absent entries read as zero in both fields; entries are never deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ParticipantBalance {
    /// Committed to published deals.
    pub locked: TokenAmount,
    /// Free to withdraw or commit to new deals.
    pub available: TokenAmount,
}

impl ParticipantBalance {
    pub fn total(&self) -> TokenAmount {
        &self.locked + &self.available
    }
}

/// Balance table which handles getting and updating participant balances specifically
pub struct BalanceTable<BS: Blockstore>(Map<BS, Address, ParticipantBalance>);

impl<BS> BalanceTable<BS>
where
    BS: Blockstore,
{
    /// Initializes a new empty balance table
    pub fn new(bs: BS) -> Self {
        Self(Map::empty(bs, BALANCE_TABLE_BITWIDTH, "balance table"))
    }

    /// Initializes a balance table from a root Cid
    pub fn load(bs: BS, cid: &Cid) -> Result<Self, ActorError> {
        Ok(Self(Map::load(bs, cid, BALANCE_TABLE_BITWIDTH, "balance table")?))
    }

    /// Writes pending changes and returns the new root.
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.0.flush()
    }

    /// Gets the balance for an address, or zero if it has never held funds.
    pub fn get(&self, key: &Address) -> Result<ParticipantBalance, ActorError> {
        Ok(self.0.get(key)?.cloned().unwrap_or_default())
    }

    /// Gets balances for several addresses in order, defaulting missing ones to zero.
    pub fn get_many(&self, keys: &[Address]) -> Result<Vec<ParticipantBalance>, ActorError> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    /// Replaces the balance for an address.
    pub fn set(&mut self, key: &Address, balance: ParticipantBalance) -> Result<(), ActorError> {
        if balance.locked.is_negative() || balance.available.is_negative() {
            return Err(actor_error!(
                illegal_state,
                "balance for {} cannot be negative: locked {}, available {}",
                key,
                balance.locked,
                balance.available
            ));
        }
        self.0.set(key, balance)?;
        Ok(())
    }

    /// Replaces several balances, applied in order. Nothing is flushed.
    pub fn set_many(
        &mut self,
        entries: impl IntoIterator<Item = (Address, ParticipantBalance)>,
    ) -> Result<(), ActorError> {
        entries.into_iter().try_for_each(|(k, v)| self.set(&k, v))
    }

    /// Moves `amount` out of the payer's locked funds into the payee's available funds.
    /// The payer and payee may be the same participant.
    pub fn pay_from_locked(
        &mut self,
        payer: &Address,
        payee: &Address,
        amount: &TokenAmount,
    ) -> Result<(), ActorError> {
        let mut from = self.get(payer)?;
        if from.locked < *amount {
            return Err(actor_error!(
                insufficient_funds,
                "locked balance {} of {} cannot cover payment {}",
                from.locked,
                payer,
                amount
            ));
        }

        if payer == payee {
            (from.locked, from.available) = transfer(&from.locked, &from.available, amount);
            return self.set(payer, from);
        }

        let mut to = self.get(payee)?;
        (from.locked, to.available) = transfer(&from.locked, &to.available, amount);
        self.set(payer, from)?;
        self.set(payee, to)
    }

    /// Iterates over every participant that has held funds.
    pub fn for_each<F>(&self, f: F) -> Result<(), ActorError>
    where
        F: FnMut(Address, &ParticipantBalance) -> Result<(), ActorError>,
    {
        self.0.for_each(f)
    }

    /// Returns the total amount held across all participants, locked and available.
    pub fn total(&self) -> Result<TokenAmount, ActorError> {
        let mut total = TokenAmount::default();
        self.for_each(|_, balance| {
            total += balance.total();
            Ok(())
        })
        .context("failed to sum balance table")?;
        Ok(total)
    }
}
