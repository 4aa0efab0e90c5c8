// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::error::ExitCode;
use serde::de::DeserializeOwned;

use crate::{ActorError, AsActorError};

pub const HAMT_BIT_WIDTH: u32 = 5;

/// Decodes the return block of a send, failing if the callee returned nothing.
pub fn deserialize_block<T>(ret: Option<IpldBlock>) -> Result<T, ActorError>
where
    T: DeserializeOwned,
{
    ret.context_code(ExitCode::USR_ASSERTION_FAILED, "return expected")?
        .deserialize()
        .exit_code(ExitCode::USR_SERIALIZATION)
}
