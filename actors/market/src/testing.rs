use std::collections::BTreeMap;

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use storage_market_runtime::MessageAccumulator;

use crate::balance_table::{BalanceTable, ParticipantBalance};
use crate::State;

#[derive(Clone, Debug)]
pub struct DealSummary {
    pub client: Address,
    pub provider: Address,
    pub activation_epoch: ChainEpoch,
}

#[derive(Clone, Debug, Default)]
pub struct StateSummary {
    pub deals: BTreeMap<DealID, DealSummary>,
    pub balances: BTreeMap<Address, ParticipantBalance>,
    pub total_locked: TokenAmount,
    pub total_available: TokenAmount,
}

/// Checks internal invariants of market state
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
    balance: &TokenAmount,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();
    let mut summary = StateSummary::default();

    // Balances
    match BalanceTable::load(store, &state.balances) {
        Ok(balances) => {
            let mut total_locked = TokenAmount::zero();
            let mut total_available = TokenAmount::zero();
            let ret = balances.for_each(|addr, b| {
                acc.require(
                    !b.locked.is_negative(),
                    &format!("negative locked balance for {addr}: {}", b.locked),
                );
                acc.require(
                    !b.available.is_negative(),
                    &format!("negative available balance for {addr}: {}", b.available),
                );
                total_locked += &b.locked;
                total_available += &b.available;
                summary.balances.insert(addr, b.clone());
                Ok(())
            });
            acc.require_no_error(ret, "error iterating balance table");

            let total = &total_locked + &total_available;
            acc.require(
                total <= *balance,
                &format!("total escrow {total} exceeds actor balance {balance}"),
            );
            summary.total_locked = total_locked;
            summary.total_available = total_available;
        }
        Err(e) => acc.add(&format!("error loading balance table: {e}")),
    }

    // Deals
    match state.load_deals(store) {
        Ok(deals) => {
            let ret = deals.for_each(|deal_id, deal| {
                let proposal = deal.proposal();
                acc.require(
                    deal_id < state.next_deal_id,
                    &format!("deal id {deal_id} not less than next id {}", state.next_deal_id),
                );
                acc.require(
                    deal.activation_epoch >= 0,
                    &format!("deal {deal_id} has negative activation epoch {}", deal.activation_epoch),
                );
                acc.require(
                    proposal.is_signed(),
                    &format!("deal {deal_id} stored without a proposer signature"),
                );
                summary.deals.insert(
                    deal_id,
                    DealSummary {
                        client: proposal.client,
                        provider: proposal.provider,
                        activation_epoch: deal.activation_epoch,
                    },
                );
                Ok(())
            });
            acc.require_no_error(ret, "error iterating deals");
        }
        Err(e) => acc.add(&format!("error loading deals: {e}")),
    }

    (summary, acc)
}
