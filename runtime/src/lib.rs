// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::actor_error::*;
pub use self::builtin::*;
pub use self::runtime::{
    extract_send_result, MessageInfo, Primitives, Runtime, RuntimePolicy, SendError,
};
pub use self::util::*;
pub use dispatch::dispatch;
pub use {fvm_ipld_amt, fvm_ipld_hamt};

pub mod actor_error;
pub mod builtin;
mod dispatch;
pub mod runtime;
pub mod util;

#[cfg(feature = "test_utils")]
pub mod test_utils;

/// Generates the `invoke` entrypoint exported by an actor's Wasm module.
#[macro_export]
macro_rules! wasm_trampoline {
    ($target:ty) => {
        #[no_mangle]
        pub extern "C" fn invoke(param: u32) -> u32 {
            $crate::runtime::fvm::trampoline::<$target>(param)
        }
    };
}
