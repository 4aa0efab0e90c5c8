// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::multihash::Code;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::{ErrorNumber, ExitCode};
use fvm_shared::{MethodNum, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use self::actor_code::*;
pub use self::empty::EMPTY_ARR_CID;
pub use self::policy::*;
use crate::{actor_error, ActorError, AsActorError};

mod actor_code;
mod empty;
pub mod policy;

#[cfg(feature = "fil-actor")]
mod actor_blockstore;
#[cfg(feature = "fil-actor")]
pub mod fvm;

/// Runtime is the VM's internal runtime object.
/// this is everything that is accessible to actors, beyond parameters.
///
/// State changes follow a load-mutate-commit cycle: a method reads the head root once on
/// entry, derives working copies of its structures from it, writes the new state with
/// [`Runtime::put_state`], and publishes it exactly once with [`Runtime::commit`].
pub trait Runtime: Primitives + RuntimePolicy {
    type Blockstore: Blockstore;

    /// Information related to the current message being executed.
    fn message(&self) -> &dyn MessageInfo;

    /// The current chain epoch number. The genesis block has epoch zero.
    fn curr_epoch(&self) -> ChainEpoch;

    /// Validates the caller against some predicate.
    /// Exported actor methods must invoke at least one caller validation before returning.
    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError>;
    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>;

    /// Initializes the state object.
    /// This is only valid when the state has not yet been initialized.
    fn create<T: Serialize>(&self, obj: &T) -> Result<(), ActorError> {
        let root = self.get_state_root()?;
        if root != *EMPTY_ARR_CID {
            return Err(
                actor_error!(illegal_state; "failed to create state; expected empty array CID, got: {}", root),
            );
        }
        let new_root = self.put_state(obj)?;
        self.set_state_root(&new_root)
    }

    /// Loads the state object stored under `root`.
    fn load_state<T: DeserializeOwned>(&self, root: &Cid) -> Result<T, ActorError> {
        self.store()
            .get_cbor(root)
            .with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                format!("failed to load state at {}", root)
            })?
            .with_context_code(ExitCode::USR_ILLEGAL_STATE, || format!("no state at {}", root))
    }

    /// Writes a state object to the store without publishing it, returning its root.
    fn put_state<T: Serialize>(&self, obj: &T) -> Result<Cid, ActorError> {
        self.store()
            .put_cbor(obj, Code::Blake2b256)
            .context_code(ExitCode::USR_ILLEGAL_STATE, "failed to write state")
    }

    /// Gets the state-root.
    fn get_state_root(&self) -> Result<Cid, ActorError>;

    /// Sets the state-root.
    fn set_state_root(&self, root: &Cid) -> Result<(), ActorError>;

    /// Publishes `new` as the state root, provided the head is still `expected`.
    ///
    /// A nested send may re-enter the receiver and move the head. In that case the
    /// commit fails with `USR_ILLEGAL_STATE` and nothing is written, so the invocation aborts
    /// and the environment rolls back every effect it had, transfers included.
    fn commit(&self, expected: &Cid, new: &Cid) -> Result<(), ActorError> {
        let head = self.get_state_root()?;
        if head != *expected {
            return Err(actor_error!(illegal_state;
                "state changed during invocation: expected root {}, found {}", expected, head));
        }
        self.set_state_root(new)
    }

    /// Returns reference to blockstore
    fn store(&self) -> &Self::Blockstore;

    /// Sends a message to another actor, returning the exit code and return value envelope.
    /// If the invoked method does not return successfully, its state changes
    /// (and that of any messages it sent in turn) will be rolled back.
    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Response, SendError>;
}

/// Message information available to the actor about executing message.
pub trait MessageInfo {
    /// The address of the immediate calling actor. Always an ID-address.
    fn caller(&self) -> Address;

    /// The value attached to the message being processed, implicitly
    /// added to the receiver's balance before method invocation.
    fn value_received(&self) -> TokenAmount;
}

/// Pure functions implemented as primitives by the runtime.
pub trait Primitives {
    /// Verifies that a signature is valid for an address and plaintext.
    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> Result<(), anyhow::Error>;
}

pub trait RuntimePolicy {
    fn policy(&self) -> &Policy;
}

/// A send that could not be delivered at all, as opposed to one the callee aborted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("send failed with error number {0:?}")]
pub struct SendError(pub ErrorNumber);

impl From<SendError> for ActorError {
    fn from(s: SendError) -> Self {
        match s.0 {
            ErrorNumber::InsufficientFunds => {
                actor_error!(insufficient_funds; "not enough funds to send: {}", s)
            }
            ErrorNumber::NotFound => actor_error!(not_found; "send target not found: {}", s),
            _ => actor_error!(assertion_failed; "{}", s),
        }
    }
}

/// Converts a send outcome into the callee's return block, failing with the callee's
/// exit code if it aborted.
pub fn extract_send_result(
    res: Result<Response, SendError>,
) -> Result<Option<IpldBlock>, ActorError> {
    let ret = res?;
    if ret.exit_code.is_success() {
        Ok(ret.return_data)
    } else {
        Err(ActorError::unchecked(
            ret.exit_code,
            format!("send aborted with code {}", ret.exit_code),
        ))
    }
}
