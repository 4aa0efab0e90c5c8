use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;

pub mod power {
    use super::*;

    pub const IS_MINER_METHOD: u64 = 7;

    #[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone, Eq, PartialEq)]
    pub struct IsMinerParams {
        pub address: Address,
    }
}
