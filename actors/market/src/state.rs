// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::deal::DealID;
use fvm_shared::error::ExitCode;

use storage_market_runtime::{actor_error, ActorError, Array, AsActorError};

use crate::balance_table::BalanceTable;
use crate::deal::OnChainDeal;

pub const DEALS_AMT_BITWIDTH: u32 = 5;

pub type DealArray<BS> = Array<BS, OnChainDeal>;

/// Market actor state
#[derive(Clone, Default, Serialize_tuple, Deserialize_tuple, Debug, PartialEq, Eq)]
pub struct State {
    /// Escrowed funds, locked and available, indexed by participant address.
    /// Map<Address, ParticipantBalance>
    pub balances: Cid,

    /// Published deals indexed by the ID assigned at publication.
    /// Array<DealID, OnChainDeal>
    pub deals: Cid,

    /// ID the next published deal receives. Never decreases.
    pub next_deal_id: DealID,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<Self, ActorError> {
        let empty_balances = BalanceTable::new(store)
            .flush()
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to create empty balance table")?;
        let empty_deals = DealArray::flush_empty(store, DEALS_AMT_BITWIDTH, "deals")
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to create empty deals array")?;

        Ok(Self { balances: empty_balances, deals: empty_deals, next_deal_id: 0 })
    }

    pub fn load_balances<BS: Blockstore>(&self, store: BS) -> Result<BalanceTable<BS>, ActorError> {
        BalanceTable::load(store, &self.balances)
    }

    pub fn save_balances<BS: Blockstore>(
        &mut self,
        balances: &mut BalanceTable<BS>,
    ) -> Result<(), ActorError> {
        self.balances = balances.flush()?;
        Ok(())
    }

    pub fn load_deals<BS: Blockstore>(&self, store: BS) -> Result<DealArray<BS>, ActorError> {
        DealArray::load(store, &self.deals, "deals")
    }

    pub fn save_deals<BS: Blockstore>(
        &mut self,
        deals: &mut DealArray<BS>,
    ) -> Result<(), ActorError> {
        self.deals = deals.flush()?;
        Ok(())
    }

    /// Returns the next deal ID and advances the counter.
    pub fn generate_deal_id(&mut self) -> DealID {
        let id = self.next_deal_id;
        self.next_deal_id += 1;
        id
    }
}

pub fn find_deal<BS: Blockstore>(
    deals: &DealArray<BS>,
    id: DealID,
) -> Result<OnChainDeal, ActorError> {
    deals.get(id)?.cloned().ok_or_else(|| actor_error!(not_found, "no such deal {}", id))
}
