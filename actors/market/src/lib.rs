// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR, METHOD_SEND};
use log::{debug, info, warn};
use num_derive::FromPrimitive;
use num_traits::Zero;

use storage_market_runtime::runtime::{ActorCode, Runtime};
use storage_market_runtime::{
    actor_dispatch, actor_error, deserialize_block, extract_send_result, ActorContext, ActorError,
    STORAGE_POWER_ACTOR_ADDR, SYSTEM_ACTOR_ADDR,
};

use crate::balance_table::BalanceTable;
use crate::funds::{deposit, lock_funds, withdraw};

pub use self::deal::*;
use self::policy::*;
pub use self::state::*;
pub use self::types::*;

// exports for testing
pub mod balance_table;
#[doc(hidden)]
pub mod ext;
pub mod funds;
pub mod policy;
pub mod testing;

mod deal;
mod state;
mod types;

#[cfg(feature = "fil-actor")]
storage_market_runtime::wasm_trampoline!(Actor);

// A proposal was published or used after its expiration epoch.
pub const EX_PROPOSAL_EXPIRED: ExitCode = ExitCode::new(32);
// A deal was activated a second time.
pub const EX_DEAL_ALREADY_ACTIVE: ExitCode = ExitCode::new(33);

/// Market actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    WithdrawBalance = 2,
    AddBalance = 3,
    CheckLockedBalance = 4,
    PublishStorageDeals = 5,
    HandleCronAction = 6,
    SettleExpiredDeals = 7,
    ProcessStorageDealsPayment = 8,
    SlashStorageDealCollateral = 9,
    GetLastExpirationFromDealIDs = 10,
    ActivateStorageDeals = 11,
}

/// Market Actor
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;

        let st = State::new(rt.store())?;
        rt.create(&st)?;
        Ok(())
    }

    /// Deposits the received value into the caller's available balance.
    fn add_balance(rt: &impl Runtime) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let msg_value = rt.message().value_received();
        if msg_value.is_negative() {
            return Err(actor_error!(illegal_argument, "negative balance to add: {}", msg_value));
        }
        let caller = rt.message().caller();

        let old = rt.get_state_root()?;
        let mut st: State = rt.load_state(&old)?;
        let mut balances = st.load_balances(rt.store())?;
        let balance = balances.get(&caller)?;
        balances.set(&caller, deposit(&balance, &msg_value))?;
        st.save_balances(&mut balances)?;

        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;
        Ok(())
    }

    /// Withdraws from the caller's available balance and sends the funds to the caller.
    fn withdraw_balance(rt: &impl Runtime, params: WithdrawBalanceParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        if params.amount.is_negative() {
            return Err(actor_error!(illegal_argument, "negative amount: {}", params.amount));
        }
        let caller = rt.message().caller();

        let old = rt.get_state_root()?;
        let mut st: State = rt.load_state(&old)?;
        let mut balances = st.load_balances(rt.store())?;
        let balance = balances.get(&caller)?;
        if params.amount > balance.available {
            return Err(actor_error!(
                insufficient_funds,
                "cannot withdraw {} from available balance {} of {}",
                params.amount,
                balance.available,
                caller
            ));
        }
        balances.set(&caller, withdraw(&balance, &params.amount))?;
        st.save_balances(&mut balances)?;

        extract_send_result(rt.send(&caller, METHOD_SEND, None, params.amount.clone()))
            .with_context(|| format!("failed to send {} to {}", params.amount, caller))?;

        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;
        Ok(())
    }

    /// Validates a batch of deals, escrows their price and collateral, and stores them
    /// under fresh IDs. Any invalid deal aborts the whole batch.
    fn publish_storage_deals(
        rt: &impl Runtime,
        params: PublishStorageDealsParams,
    ) -> Result<PublishStorageDealsReturn, ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let caller = rt.message().caller();
        let curr_epoch = rt.curr_epoch();

        let old = rt.get_state_root()?;
        let mut st: State = rt.load_state(&old)?;
        let mut deals = st.load_deals(rt.store())?;
        let mut ids = Vec::with_capacity(params.deals.len());

        for (di, deal) in params.deals.into_iter().enumerate() {
            validate_and_lock_deal(rt, &mut st, &deal, curr_epoch, &caller)
                .with_context(|| format!("invalid deal {}", di))?;

            let id = st.generate_deal_id();
            deals.set(id, OnChainDeal::new(deal))?;
            ids.push(id);
        }
        st.save_deals(&mut deals)?;

        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;

        info!("published {} deals at epoch {}: {:?}", ids.len(), curr_epoch, ids);
        Ok(PublishStorageDealsReturn { ids })
    }

    /// Marks published deals as active from the current epoch. Only the provider may
    /// activate a deal, and only once.
    fn activate_storage_deals(
        rt: &impl Runtime,
        params: ActivateStorageDealsParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let caller = rt.message().caller();
        let curr_epoch = rt.curr_epoch();

        let old = rt.get_state_root()?;
        let mut st: State = rt.load_state(&old)?;
        let mut deals = st.load_deals(rt.store())?;

        for id in params.deal_ids {
            let mut deal = find_deal(&deals, id)?;
            let proposal = deal.proposal();
            if caller != proposal.provider {
                return Err(actor_error!(
                    forbidden,
                    "caller {} is not the provider {} of deal {}",
                    caller,
                    proposal.provider,
                    id
                ));
            }
            if curr_epoch > proposal.proposal_expiration {
                return Err(ActorError::unchecked(
                    EX_PROPOSAL_EXPIRED,
                    format!(
                        "deal {} proposal expired at {}, current epoch {}",
                        id, proposal.proposal_expiration, curr_epoch
                    ),
                ));
            }
            if deal.is_active() {
                return Err(ActorError::unchecked(
                    EX_DEAL_ALREADY_ACTIVE,
                    format!("deal {} already active since {}", id, deal.activation_epoch),
                ));
            }

            deal.activation_epoch = curr_epoch;
            deals.set(id, deal)?;
            debug!("activated deal {} at epoch {}", id, curr_epoch);
        }
        st.save_deals(&mut deals)?;

        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;
        Ok(())
    }

    /// Pays providers one proving period's share of each deal's price out of the
    /// client's locked funds. The caller must be a registered storage provider.
    fn process_storage_deals_payment(
        rt: &impl Runtime,
        params: ProcessStorageDealsPaymentParams,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let caller = rt.message().caller();
        let curr_epoch = rt.curr_epoch();
        let proving_period = rt.policy().proving_period_duration;

        let old = rt.get_state_root()?;
        let mut st: State = rt.load_state(&old)?;
        let deals = st.load_deals(rt.store())?;

        for id in params.deal_ids {
            let deal = find_deal(&deals, id)?;
            if !request_is_miner(rt, &caller)? {
                return Err(actor_error!(
                    forbidden,
                    "caller {} is not a storage provider, cannot process payment for deal {}",
                    caller,
                    id
                ));
            }

            let proposal = deal.proposal();
            if curr_epoch > proposal.proposal_expiration {
                // Nothing processed in this call is kept.
                warn!(
                    "deal {} expired at {}, ending payment processing at epoch {} without changes",
                    id, proposal.proposal_expiration, curr_epoch
                );
                return Ok(());
            }

            let to_pay =
                deal_payment_for_period(&proposal.storage_price, proving_period, proposal.duration)
                    .with_context(|| format!("failed to compute payment for deal {}", id))?;

            let mut balances = st.load_balances(rt.store())?;
            balances
                .pay_from_locked(&proposal.client, &proposal.provider, &to_pay)
                .with_context(|| format!("failed to pay for deal {}", id))?;
            st.save_balances(&mut balances)?;
            debug!("paid {} from {} to {} for deal {}", to_pay, proposal.client, proposal.provider, id);
        }

        let new = rt.put_state(&st)?;
        rt.commit(&old, &new)?;
        Ok(())
    }

    /// Catches method numbers that are assigned but carry no behavior.
    fn reserved_method(
        _rt: &impl Runtime,
        method: MethodNum,
        _params: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        Err(actor_error!(unhandled_message, "method {} is reserved", method))
    }
}

/// Checks a deal against the current epoch and caller, then escrows the client's price and
/// the provider's collateral. The new balances are flushed into `st` but not committed.
fn validate_and_lock_deal(
    rt: &impl Runtime,
    st: &mut State,
    deal: &StorageDeal,
    curr_epoch: ChainEpoch,
    caller: &Address,
) -> Result<(), ActorError> {
    let proposal = &deal.proposal;
    if curr_epoch >= proposal.proposal_expiration {
        return Err(ActorError::unchecked(
            EX_PROPOSAL_EXPIRED,
            format!(
                "proposal expired at {}, current epoch {}",
                proposal.proposal_expiration, curr_epoch
            ),
        ));
    }

    validate_deal_terms(proposal)?;
    validate_deal_signatures(rt, deal)?;

    if *caller != proposal.client && *caller != proposal.provider {
        return Err(actor_error!(
            forbidden,
            "caller {} is neither client {} nor provider {}",
            caller,
            proposal.client,
            proposal.provider
        ));
    }

    let mut balances = st.load_balances(rt.store())?;
    lock_participant_funds(&mut balances, &proposal.client, &proposal.storage_price, "client")?;
    lock_participant_funds(
        &mut balances,
        &proposal.provider,
        &proposal.storage_collateral,
        "provider",
    )?;
    st.save_balances(&mut balances)
}

// Both locks go through the table so a self-deal sees its own first lock.
fn lock_participant_funds<BS: Blockstore>(
    balances: &mut BalanceTable<BS>,
    who: &Address,
    amount: &TokenAmount,
    role: &str,
) -> Result<(), ActorError> {
    let balance = balances.get(who)?;
    if balance.available < *amount {
        return Err(actor_error!(
            insufficient_funds,
            "{} {} available balance {} less than required {}",
            role,
            who,
            balance.available,
            amount
        ));
    }
    balances.set(who, lock_funds(&balance, amount))
}

fn validate_deal_terms(proposal: &DealProposal) -> Result<(), ActorError> {
    if proposal.storage_price.is_negative() {
        return Err(actor_error!(
            illegal_argument,
            "negative storage price {}",
            proposal.storage_price
        ));
    }
    if proposal.storage_collateral.is_negative() {
        return Err(actor_error!(
            illegal_argument,
            "negative storage collateral {}",
            proposal.storage_collateral
        ));
    }
    if proposal.duration <= 0 {
        return Err(actor_error!(
            illegal_argument,
            "deal duration {} must be positive",
            proposal.duration
        ));
    }
    Ok(())
}

fn validate_deal_signatures(rt: &impl Runtime, deal: &StorageDeal) -> Result<(), ActorError> {
    let proposal = &deal.proposal;
    let proposer_signature = proposal
        .proposer_signature
        .as_ref()
        .ok_or_else(|| actor_error!(illegal_argument, "proposal is not signed by the client"))?;

    let signing_bytes = proposal.signing_bytes().map_err(|e| {
        actor_error!(serialization, "failed to serialize proposal for signing: {}", e)
    })?;
    rt.verify_signature(proposer_signature, &proposal.client, &signing_bytes).map_err(|e| {
        actor_error!(illegal_argument, "invalid client signature on proposal: {}", e)
    })?;

    let counter_signing_bytes = StorageDeal::counter_signing_bytes(proposal).map_err(|e| {
        actor_error!(serialization, "failed to serialize proposal for counter-signing: {}", e)
    })?;
    rt.verify_signature(&deal.counter_signature, &proposal.provider, &counter_signing_bytes)
        .map_err(|e| actor_error!(illegal_argument, "invalid provider counter-signature: {}", e))
}

/// Asks the power actor whether `address` is a registered storage provider.
fn request_is_miner(rt: &impl Runtime, address: &Address) -> Result<bool, ActorError> {
    let ret = extract_send_result(rt.send(
        &STORAGE_POWER_ACTOR_ADDR,
        ext::power::IS_MINER_METHOD,
        IpldBlock::serialize_cbor(&ext::power::IsMinerParams { address: *address })?,
        TokenAmount::zero(),
    ))
    .context("failed to query power actor")?;
    deserialize_block(ret)
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "StorageMarket"
    }

    actor_dispatch! {
        Constructor => constructor,
        WithdrawBalance => withdraw_balance,
        AddBalance => add_balance,
        PublishStorageDeals => publish_storage_deals,
        ActivateStorageDeals => activate_storage_deals,
        ProcessStorageDealsPayment => process_storage_deals_payment,
        CheckLockedBalance
        | HandleCronAction
        | SettleExpiredDeals
        | SlashStorageDealCollateral
        | GetLastExpirationFromDealIDs => reserved_method [raw],
    }
}
