// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::multihash::{Code, MultihashDigest};
use cid::Cid;
use fvm_ipld_encoding::DAG_CBOR;
use lazy_static::lazy_static;

/// DAG-CBOR encoding of an empty array.
const EMPTY_ARR_BYTES: [u8; 1] = [0x80];

lazy_static! {
    /// The state root of an actor that has not been constructed yet.
    pub static ref EMPTY_ARR_CID: Cid =
        Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(&EMPTY_ARR_BYTES));
}
