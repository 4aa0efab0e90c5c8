// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::clock::ChainEpoch;

/// Network parameters the actors read at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Number of epochs between proofs of storage. Deal payments accrue per proving period.
    pub proving_period_duration: ChainEpoch,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy { proving_period_duration: policy_constants::PROVING_PERIOD_DURATION }
    }
}

pub mod policy_constants {
    use fvm_shared::clock::ChainEpoch;

    #[cfg(not(feature = "short-proving-period"))]
    use crate::builtin::EPOCHS_IN_DAY;

    #[cfg(not(feature = "short-proving-period"))]
    pub const PROVING_PERIOD_DURATION: ChainEpoch = EPOCHS_IN_DAY;

    #[cfg(feature = "short-proving-period")]
    pub const PROVING_PERIOD_DURATION: ChainEpoch = 40;
}
