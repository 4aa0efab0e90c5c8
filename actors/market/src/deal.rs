// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{strict_bytes, to_vec};
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::econ::TokenAmount;

/// How sector data maps onto the piece reference.
pub type SerializationMode = u64;

pub const SERIALIZATION_UNIXFS_V0: SerializationMode = 0;

/// Terms a client offers a provider for storing one piece.
///
/// The proposer signature covers the encoding of the proposal with the signature
/// field cleared, so once signed none of the other fields may change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct DealProposal {
    #[serde(with = "strict_bytes")]
    pub piece_ref: Vec<u8>,
    pub piece_size: u64,
    pub piece_serialization: SerializationMode,
    pub client: Address,
    pub provider: Address,
    /// Last epoch (exclusive) at which the proposal may be published.
    pub proposal_expiration: ChainEpoch,
    pub duration: ChainEpoch,
    /// Total price for the whole duration.
    pub storage_price: TokenAmount,
    pub storage_collateral: TokenAmount,
    pub proposer_signature: Option<Signature>,
}

impl DealProposal {
    /// The bytes the client signs.
    pub fn signing_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let unsigned = DealProposal { proposer_signature: None, ..self.clone() };
        Ok(to_vec(&unsigned)?)
    }

    pub fn is_signed(&self) -> bool {
        self.proposer_signature.is_some()
    }

    /// Signs the proposal with `signer`. A proposal can only be signed once.
    pub fn sign<F>(&mut self, signer: F) -> anyhow::Result<()>
    where
        F: FnOnce(&[u8]) -> anyhow::Result<Signature>,
    {
        if self.is_signed() {
            return Err(anyhow!("proposal is already signed"));
        }
        let sig = signer(&self.signing_bytes()?)?;
        self.proposer_signature = Some(sig);
        Ok(())
    }
}

/// A signed proposal counter-signed by its provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct StorageDeal {
    pub proposal: DealProposal,
    pub counter_signature: Signature,
}

impl StorageDeal {
    /// The bytes the provider signs: the encoding of the signed proposal, proposer
    /// signature included. That is every field of the deal except the counter-signature,
    /// which cannot cover itself.
    pub fn counter_signing_bytes(proposal: &DealProposal) -> anyhow::Result<Vec<u8>> {
        Ok(to_vec(proposal)?)
    }

    /// Accepts a signed proposal on behalf of its provider.
    pub fn countersign<F>(proposal: DealProposal, signer: F) -> anyhow::Result<Self>
    where
        F: FnOnce(&[u8]) -> anyhow::Result<Signature>,
    {
        if !proposal.is_signed() {
            return Err(anyhow!("cannot countersign an unsigned proposal"));
        }
        let counter_signature = signer(&Self::counter_signing_bytes(&proposal)?)?;
        Ok(Self { proposal, counter_signature })
    }
}

/// A published deal as stored in the deals array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct OnChainDeal {
    pub deal: StorageDeal,
    /// Zero until the provider activates the deal.
    pub activation_epoch: ChainEpoch,
}

impl OnChainDeal {
    pub fn new(deal: StorageDeal) -> Self {
        Self { deal, activation_epoch: 0 }
    }

    pub fn proposal(&self) -> &DealProposal {
        &self.deal.proposal
    }

    pub fn is_active(&self) -> bool {
        self.activation_epoch > 0
    }
}

#[cfg(test)]
mod tests {
    use fvm_shared::address::Address;
    use fvm_shared::crypto::signature::Signature;
    use fvm_shared::econ::TokenAmount;

    use super::*;

    fn proposal() -> DealProposal {
        DealProposal {
            piece_ref: vec![1, 2, 3],
            piece_size: 1024,
            piece_serialization: SERIALIZATION_UNIXFS_V0,
            client: Address::new_id(100),
            provider: Address::new_id(101),
            proposal_expiration: 100,
            duration: 200,
            storage_price: TokenAmount::from_atto(100),
            storage_collateral: TokenAmount::from_atto(50),
            proposer_signature: None,
        }
    }

    fn sign_with_tag(tag: u8) -> impl FnOnce(&[u8]) -> anyhow::Result<Signature> {
        move |data| {
            let mut bytes = vec![tag];
            bytes.extend_from_slice(data);
            Ok(Signature::new_bls(bytes))
        }
    }

    #[test]
    fn signing_bytes_ignore_signature() {
        let mut p = proposal();
        let before = p.signing_bytes().unwrap();
        p.sign(sign_with_tag(1)).unwrap();
        assert_eq!(before, p.signing_bytes().unwrap());
        assert_ne!(before, StorageDeal::counter_signing_bytes(&p).unwrap());
    }

    #[test]
    fn proposal_cannot_be_signed_twice() {
        let mut p = proposal();
        p.sign(sign_with_tag(1)).unwrap();
        let first = p.proposer_signature.clone();
        assert!(p.sign(sign_with_tag(2)).is_err());
        assert_eq!(first, p.proposer_signature);
    }

    #[test]
    fn countersign_requires_signed_proposal() {
        assert!(StorageDeal::countersign(proposal(), sign_with_tag(2)).is_err());

        let mut p = proposal();
        p.sign(sign_with_tag(1)).unwrap();
        let expected = StorageDeal::counter_signing_bytes(&p).unwrap();
        let deal = StorageDeal::countersign(p, sign_with_tag(2)).unwrap();
        assert_eq!(&expected[..], &deal.counter_signature.bytes()[1..]);
    }

    #[test]
    fn counter_signing_bytes_cover_proposer_signature() {
        let mut p = proposal();
        p.sign(sign_with_tag(1)).unwrap();
        assert_eq!(to_vec(&p).unwrap(), StorageDeal::counter_signing_bytes(&p).unwrap());

        let mut resigned = p.clone();
        resigned.proposer_signature = Some(Signature::new_bls(vec![9]));
        assert_ne!(
            StorageDeal::counter_signing_bytes(&p).unwrap(),
            StorageDeal::counter_signing_bytes(&resigned).unwrap()
        );
    }

    #[test]
    fn new_deal_is_inactive() {
        let deal = OnChainDeal::new(StorageDeal {
            proposal: proposal(),
            counter_signature: Signature::new_bls(vec![0]),
        });
        assert!(!deal.is_active());
    }
}
