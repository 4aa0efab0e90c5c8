// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cell::Cell;

use anyhow::Error;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_sdk as fvm;
use fvm_sdk::NO_DATA_BLOCK_ID;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::sys::SendFlags;
use fvm_shared::{MethodNum, Response};

use crate::runtime::actor_blockstore::ActorBlockstore;
use crate::runtime::{ActorCode, MessageInfo, Policy, Primitives, RuntimePolicy};
use crate::{actor_error, ActorError, Runtime, SendError};

/// A runtime that bridges to the FVM environment through the FVM SDK.
pub struct FvmRuntime<B = ActorBlockstore> {
    blockstore: B,
    /// Indicates that the caller has been validated.
    caller_validated: Cell<bool>,
    /// The runtime policy
    policy: Policy,
}

impl Default for FvmRuntime {
    fn default() -> Self {
        FvmRuntime {
            blockstore: ActorBlockstore,
            caller_validated: Cell::new(false),
            policy: Policy::default(),
        }
    }
}

impl<B> FvmRuntime<B> {
    fn assert_not_validated(&self) -> Result<(), ActorError> {
        if self.caller_validated.get() {
            return Err(actor_error!(
                assertion_failed,
                "Method must validate caller identity exactly once"
            ));
        }
        Ok(())
    }
}

/// A stub MessageInfo implementation performing FVM syscalls to obtain its fields.
struct FvmMessage;

impl MessageInfo for FvmMessage {
    fn caller(&self) -> Address {
        Address::new_id(fvm::message::caller())
    }

    fn value_received(&self) -> TokenAmount {
        fvm::message::value_received()
    }
}

impl<B> Runtime for FvmRuntime<B>
where
    B: Blockstore,
{
    type Blockstore = B;

    fn message(&self) -> &dyn MessageInfo {
        &FvmMessage
    }

    fn curr_epoch(&self) -> ChainEpoch {
        fvm::network::curr_epoch()
    }

    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError> {
        self.assert_not_validated()?;
        self.caller_validated.set(true);
        Ok(())
    }

    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.assert_not_validated()?;
        let caller_addr = self.message().caller();
        if addresses.into_iter().any(|a| *a == caller_addr) {
            self.caller_validated.set(true);
            Ok(())
        } else {
            Err(actor_error!(forbidden;
                "caller {} is not one of supported", caller_addr
            ))
        }
    }

    fn get_state_root(&self) -> Result<Cid, ActorError> {
        Ok(fvm::sself::root()?)
    }

    fn set_state_root(&self, root: &Cid) -> Result<(), ActorError> {
        Ok(fvm::sself::set_root(root)?)
    }

    fn store(&self) -> &B {
        &self.blockstore
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
    ) -> Result<Response, SendError> {
        fvm::send::send(to, method, params, value, None, SendFlags::empty()).map_err(SendError)
    }
}

impl<B> Primitives for FvmRuntime<B>
where
    B: Blockstore,
{
    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        plaintext: &[u8],
    ) -> Result<(), Error> {
        match fvm::crypto::verify_signature(signature, signer, plaintext) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(Error::msg("invalid signature")),
        }
    }
}

impl<B> RuntimePolicy for FvmRuntime<B>
where
    B: Blockstore,
{
    fn policy(&self) -> &Policy {
        &self.policy
    }
}

/// A convenience function that built-in actors can delegate their execution to.
///
/// The trampoline takes care of boilerplate:
///
/// 0.  Initialize logging if debugging is enabled.
/// 1.  Obtains the parameter data from the FVM by fetching the parameters block.
/// 2.  Obtains the method number for the invocation.
/// 3.  Creates an FVM runtime shim.
/// 4.  Invokes the target method.
/// 5a. In case of error, aborts the execution with the emitted exit code, or
/// 5b. In case of success, stores the return data as a block and returns the latter.
pub fn trampoline<C: ActorCode>(params: u32) -> u32 {
    init_logging();

    std::panic::set_hook(Box::new(|info| {
        fvm::vm::abort(ExitCode::USR_ASSERTION_FAILED.value(), Some(&format!("{}", info)))
    }));

    let method = fvm::message::method_number();
    let params = fvm::message::params_raw(params).unwrap_or_else(|e| {
        fvm::vm::abort(
            ExitCode::USR_SERIALIZATION.value(),
            Some(&format!("params block invalid: {:?}", e)),
        )
    });

    let rt = FvmRuntime::default();
    // Invoke the method, aborting if the actor returns an errored exit code.
    let ret = C::invoke_method(&rt, method, params)
        .unwrap_or_else(|err| fvm::vm::abort(err.exit_code().value(), Some(err.msg())));

    // Abort with "assertion failed" if the actor failed to validate the caller somewhere.
    // We do this after handling the error, because the actor may have encountered an error before
    // it even could validate the caller.
    if !rt.caller_validated.get() {
        fvm::vm::abort(ExitCode::USR_ASSERTION_FAILED.value(), Some("failed to validate caller"))
    }

    match ret {
        None => NO_DATA_BLOCK_ID,
        Some(ret_block) => fvm::ipld::put_block(ret_block.codec, ret_block.data.as_slice())
            .unwrap_or_else(|e| {
                fvm::vm::abort(
                    ExitCode::USR_SERIALIZATION.value(),
                    Some(&format!("failed to write result: {:?}", e)),
                )
            }),
    }
}

/// If debugging is enabled in the VM, installs a logger that sends messages to the FVM log syscall.
/// Messages are prefixed with "[LEVEL] ".
/// If debugging is not enabled, no logger will be installed which means that log!() and
/// similar calls will be dropped without either formatting args or making a syscall.
fn init_logging() {
    struct Logger;

    impl log::Log for Logger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            let msg = format!("[{}] {}", record.level(), record.args());
            fvm::debug::log(msg);
        }

        fn flush(&self) {}
    }

    if fvm::debug::enabled() && log::set_logger(&Logger).is_ok() {
        log::set_max_level(log::LevelFilter::Trace);
    }
}
