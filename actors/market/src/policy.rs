// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared::clock::ChainEpoch;
use fvm_shared::econ::TokenAmount;

use storage_market_runtime::{actor_error, ActorError};

/// Payment owed for one proving period of a deal, prorated from its total price.
/// The division truncates.
pub fn deal_payment_for_period(
    storage_price: &TokenAmount,
    proving_period: ChainEpoch,
    duration: ChainEpoch,
) -> Result<TokenAmount, ActorError> {
    if duration <= 0 {
        return Err(actor_error!(illegal_state, "deal duration {} must be positive", duration));
    }
    Ok(TokenAmount::from_atto(storage_price.atto() * proving_period / duration))
}

#[cfg(test)]
mod tests {
    use fvm_shared::econ::TokenAmount;
    use fvm_shared::error::ExitCode;
    use test_case::test_case;

    use super::deal_payment_for_period;

    #[test_case(100, 100, 200, 50; "half the duration")]
    #[test_case(100, 100, 300, 33; "truncates")]
    #[test_case(100, 400, 200, 200; "period longer than duration")]
    #[test_case(0, 100, 200, 0; "free deal")]
    fn prorated_payment(price: u64, period: i64, duration: i64, expected: u64) {
        assert_eq!(
            TokenAmount::from_atto(expected),
            deal_payment_for_period(&TokenAmount::from_atto(price), period, duration).unwrap()
        );
    }

    #[test]
    fn zero_duration_is_illegal_state() {
        let err = deal_payment_for_period(&TokenAmount::from_atto(100), 100, 0).unwrap_err();
        assert_eq!(ExitCode::USR_ILLEGAL_STATE, err.exit_code());
    }
}
