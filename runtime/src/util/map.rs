// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{ActorError, AsActorError};
use anyhow::anyhow;
use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_hamt as hamt;
use fvm_shared::address::Address;
use fvm_shared::error::ExitCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Wraps a HAMT to provide a convenient map API.
/// Any errors are returned with exit code indicating illegal state.
/// The name is not persisted in state, but adorns any error messages.
///
/// The bit width is part of the map's identity: every node must use the same width
/// for a given map so that equal contents flush to equal roots.
pub struct Map<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: DeserializeOwned + Serialize,
{
    hamt: hamt::Hamt<BS, V>,
    name: &'static str,
    key_type: PhantomData<K>,
}

pub trait MapKey: Sized + Debug {
    fn from_bytes(b: &[u8]) -> Result<Self, String>;
    fn to_bytes(&self) -> Result<Vec<u8>, String>;
}

impl<BS, K, V> Map<BS, K, V>
where
    BS: Blockstore,
    K: MapKey,
    V: DeserializeOwned + Serialize,
{
    /// Creates a new, empty map.
    pub fn empty(store: BS, bit_width: u32, name: &'static str) -> Self {
        Self {
            hamt: hamt::Hamt::new_with_bit_width(store, bit_width),
            name,
            key_type: Default::default(),
        }
    }

    /// Loads a map from the store.
    // The caller must know the bit width to interpret the HAMT correctly, so there is no
    // variant that falls back to a default.
    pub fn load(
        store: BS,
        root: &Cid,
        bit_width: u32,
        name: &'static str,
    ) -> Result<Self, ActorError> {
        Ok(Self {
            hamt: hamt::Hamt::load_with_bit_width(root, store, bit_width)
                .with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
                    format!("failed to load HAMT '{}'", name)
                })?,
            name,
            key_type: Default::default(),
        })
    }

    /// Flushes the map's contents to the store.
    /// Returns the root node CID.
    pub fn flush(&mut self) -> Result<Cid, ActorError> {
        self.hamt.flush().with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to flush HAMT '{}'", self.name)
        })
    }

    /// Returns a reference to the value associated with a key, if present.
    pub fn get(&self, key: &K) -> Result<Option<&V>, ActorError> {
        let k = key.to_bytes().context_code(ExitCode::USR_ASSERTION_FAILED, "invalid key")?;
        self.hamt.get(&k).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to get key {key:?} from HAMT '{}'", self.name)
        })
    }

    /// Inserts a key-value pair into the map.
    /// Returns any value previously associated with the key.
    pub fn set(&mut self, key: &K, value: V) -> Result<Option<V>, ActorError>
    where
        V: PartialEq,
    {
        let k = key.to_bytes().context_code(ExitCode::USR_ASSERTION_FAILED, "invalid key")?;
        self.hamt.set(k.into(), value).with_context_code(ExitCode::USR_ILLEGAL_STATE, || {
            format!("failed to set key {key:?} in HAMT '{}'", self.name)
        })
    }

    /// Iterates over all key-value pairs in the map.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), ActorError>
    where
        // The implementation will extract and propagate any ActorError
        // wrapped in a hamt::Error::Dynamic.
        F: FnMut(K, &V) -> Result<(), ActorError>,
    {
        self.hamt
            .for_each(|k, v| {
                let key =
                    K::from_bytes(k).context_code(ExitCode::USR_ILLEGAL_STATE, "invalid key")?;
                f(key, v).map_err(|e| anyhow!(e))
            })
            .map_err(|hamt_err| match hamt_err {
                hamt::Error::Dynamic(e) => match e.downcast::<ActorError>() {
                    Ok(ae) => ae,
                    Err(e) => ActorError::illegal_state(format!(
                        "error in callback traversing HAMT {}: {}",
                        self.name, e
                    )),
                },
                e => {
                    ActorError::illegal_state(format!("error traversing HAMT {}: {}", self.name, e))
                }
            })
    }
}

impl MapKey for Address {
    fn from_bytes(b: &[u8]) -> Result<Self, String> {
        Address::from_bytes(b).map_err(|e| e.to_string())
    }

    fn to_bytes(&self) -> Result<Vec<u8>, String> {
        Ok(Address::to_bytes(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::HAMT_BIT_WIDTH;
    use fvm_ipld_blockstore::MemoryBlockstore;

    #[test]
    fn basic_put_get() {
        let bs = MemoryBlockstore::new();
        let mut m = Map::<_, Address, String>::empty(&bs, HAMT_BIT_WIDTH, "names");
        m.set(&Address::new_id(1234), "1234".to_string()).unwrap();
        assert!(m.get(&Address::new_id(2222)).unwrap().is_none());
        assert_eq!(&"1234".to_string(), m.get(&Address::new_id(1234)).unwrap().unwrap());
    }

    #[test]
    fn root_depends_only_on_content() {
        let bs = MemoryBlockstore::new();
        let mut a = Map::<_, Address, u64>::empty(&bs, HAMT_BIT_WIDTH, "a");
        let mut b = Map::<_, Address, u64>::empty(&bs, HAMT_BIT_WIDTH, "b");
        for id in 100..110 {
            a.set(&Address::new_id(id), id).unwrap();
        }
        for id in (100..110).rev() {
            b.set(&Address::new_id(id), id).unwrap();
        }
        assert_eq!(a.flush().unwrap(), b.flush().unwrap());
    }

    #[test]
    fn reload_after_flush() {
        let bs = MemoryBlockstore::new();
        let mut m = Map::<_, Address, u64>::empty(&bs, HAMT_BIT_WIDTH, "reload");
        m.set(&Address::new_id(101), 7).unwrap();
        let root = m.flush().unwrap();

        let loaded = Map::<_, Address, u64>::load(&bs, &root, HAMT_BIT_WIDTH, "reload").unwrap();
        assert_eq!(Some(&7), loaded.get(&Address::new_id(101)).unwrap());
        let mut seen = Vec::new();
        loaded
            .for_each(|k, v| {
                seen.push((k, *v));
                Ok(())
            })
            .unwrap();
        assert_eq!(vec![(Address::new_id(101), 7)], seen);
    }

    #[test]
    fn for_each_callback_exitcode_propagates() {
        let bs = MemoryBlockstore::new();
        let mut m = Map::<_, Address, String>::empty(&bs, HAMT_BIT_WIDTH, "empty");
        m.set(&Address::new_id(1234), "1234".to_string()).unwrap();
        let res = m.for_each(|_, _| Err(ActorError::forbidden("test".to_string())));
        assert!(res.is_err());
        assert_eq!(res.unwrap_err(), ActorError::forbidden("test".to_string()));
    }
}
