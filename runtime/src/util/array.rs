// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_amt as amt;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::error::ExitCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ActorError, AsActorError};

/// Wraps an AMT to provide a dense, index-keyed array API.
/// Errors carry the illegal state exit code and are adorned with the array's name.
pub struct Array<BS, V>
where
    BS: Blockstore,
    V: DeserializeOwned + Serialize,
{
    amt: amt::Amt<V, BS>,
    name: &'static str,
}

impl<BS, V> Array<BS, V>
where
    BS: Blockstore,
    V: DeserializeOwned + Serialize,
{
    /// Creates a new, empty array.
    pub fn empty(store: BS, bit_width: u32, name: &'static str) -> Self {
        Self { amt: amt::Amt::new_with_bit_width(store, bit_width), name }
    }

    /// Creates a new empty array and flushes it to the store.
    pub fn flush_empty(store: BS, bit_width: u32, name: &'static str) -> Result<Cid, ActorError> {
        Self::empty(store, bit_width, name).flush()
    }

    /// Loads an array from the store. The bit width is read from the root node.
    pub fn load(store: BS, root: &Cid, name: &'static str) -> Result<Self, ActorError> {
        Ok(Self {
            amt: amt::Amt::load(root, store).with_context_code(
                ExitCode::USR_ILLEGAL_STATE,
                || format!("failed to load AMT '{}'", name),
            )?,
            name,
        })
    }

    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.amt.flush().with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to flush AMT '{}'", self.name)
        })
    }

    /// Number of elements in the array.
    pub fn count(&self) -> u64 {
        self.amt.count()
    }

    pub fn get(&self, index: u64) -> Result<Option<&V>, ActorError> {
        self.amt.get(index).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to get index {} from AMT '{}'", index, self.name)
        })
    }

    pub fn set(&mut self, index: u64, value: V) -> Result<(), ActorError> {
        self.amt.set(index, value).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to set index {} in AMT '{}'", index, self.name)
        })
    }

    /// Iterates over all elements in index order.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        F: FnMut(u64, &V) -> Result<(), ActorError>,
    {
        self.amt.for_each(|i, v| f(i, v).map_err(|e| anyhow!(e))).map_err(|amt_err| {
            match amt_err {
                amt::Error::Dynamic(e) => match e.downcast::<ActorError>() {
                    Ok(ae) => ae,
                    Err(e) => ActorError::illegal_state(format!(
                        "error in callback traversing AMT {}: {}",
                        self.name, e
                    )),
                },
                e => ActorError::illegal_state(format!("error traversing AMT {}: {}", self.name, e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_ipld_blockstore::MemoryBlockstore;

    const BIT_WIDTH: u32 = 5;

    #[test]
    fn set_get_and_reload() {
        let bs = MemoryBlockstore::new();
        let mut a = Array::<_, String>::empty(&bs, BIT_WIDTH, "words");
        a.set(0, "zero".to_string()).unwrap();
        a.set(1, "one".to_string()).unwrap();
        assert_eq!(2, a.count());
        assert!(a.get(2).unwrap().is_none());
        let root = a.flush().unwrap();

        let loaded = Array::<_, String>::load(&bs, &root, "words").unwrap();
        assert_eq!(Some(&"one".to_string()), loaded.get(1).unwrap());
        let mut indices = Vec::new();
        loaded
            .for_each(|i, _| {
                indices.push(i);
                Ok(())
            })
            .unwrap();
        assert_eq!(vec![0, 1], indices);
    }

    #[test]
    fn for_each_callback_exitcode_propagates() {
        let bs = MemoryBlockstore::new();
        let mut a = Array::<_, u64>::empty(&bs, BIT_WIDTH, "numbers");
        a.set(3, 3).unwrap();
        let err = a.for_each(|_, _| Err(ActorError::not_found("gone".to_string()))).unwrap_err();
        assert_eq!(ActorError::not_found("gone".to_string()), err);
    }
}
