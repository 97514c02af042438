//! Quorum promotion engine
//!
//! Mediates the transition of draft entities into their canonical
//! counterparts. Every accepted mutation is first cross-checked against
//! the chain oracle: the recorded state must mirror what the multisig
//! contract actually reports, or the operation is rejected outright.

use std::sync::Arc;
use tracing::{debug, info};

use crate::address::{same_signer_set, Address};
use crate::error::{Error, Result};
use crate::model::{
    DraftTransaction, DraftWallet, EntityId, Transaction, Wallet, MAX_VOTES, MIN_VOTES,
    MULTISIG_CONTRACT_TYPE, PUSH_METHOD,
};
use crate::oracle::ChainOracle;
use crate::store::GovernanceStore;

/// How much balance-change history to pull when verifying an execution;
/// only the most recent entry is inspected
const BALANCE_HISTORY_LIMIT: usize = 1;

/// Optimistic-concurrency token returned by signer validation
///
/// Carries the draft's signer set and version as observed at validation
/// time; the subsequent conditional write only lands if the version is
/// still current.
#[derive(Debug, Clone)]
pub struct SignerGuard {
    pub signers: Vec<Address>,
    pub version: u64,
}

pub struct QuorumEngine {
    store: Arc<GovernanceStore>,
    oracle: Arc<dyn ChainOracle>,
}

impl QuorumEngine {
    pub fn new(store: Arc<GovernanceStore>, oracle: Arc<dyn ChainOracle>) -> Self {
        Self { store, oracle }
    }

    /// Gate for creating a draft wallet: the contract must exist on-chain,
    /// be a freshly deployed multisig authored by the requester, and have
    /// no signers yet. Pure validation; the caller creates the draft.
    pub async fn validate_new_multisig_wallet(
        &self,
        address: &Address,
        author: &Address,
    ) -> Result<()> {
        if self.store.draft_wallet_address_taken(address).await {
            return Err(Error::bad_request("Draft wallet address already taken"));
        }
        if self.store.draft_wallet_author_present(author).await {
            return Err(Error::bad_request("Author already has a draft wallet"));
        }

        let contract = self.oracle.get_contract(address).await?;
        if !address.matches(&contract.address)
            || contract.contract_type != MULTISIG_CONTRACT_TYPE
            || !author.matches(&contract.author)
        {
            return Err(Error::forbidden("Data inconsistency with new contract"));
        }

        let multisig = self.oracle.get_multisig_contract(address).await?;
        if multisig.min_votes != MIN_VOTES
            || multisig.max_votes != MAX_VOTES
            || multisig.signers.is_some()
        {
            return Err(Error::forbidden(
                "Data inconsistency with new multisig contract",
            ));
        }

        debug!("Validated new multisig wallet {} by {}", address, author);
        Ok(())
    }

    /// Gate for recording a signer on a draft wallet
    ///
    /// The oracle's signer list minus the candidate must be set-equal to
    /// the draft's recorded signers: the candidate is exactly the next
    /// signer to arrive on-chain, not a reordering or a foreign entry.
    /// Returns the guard for the conditional write.
    pub async fn validate_new_signer_for_draft_wallet(
        &self,
        author: &Address,
        signer: &Address,
        contract: &Address,
    ) -> Result<SignerGuard> {
        let draft = self
            .store
            .find_draft_wallet_by_author(author)
            .await
            .ok_or_else(|| {
                Error::forbidden("Non-activated draft wallet does not exist for this user")
            })?;

        if draft.address != *contract {
            return Err(Error::forbidden(
                "Draft wallet address not consistent with supplied address",
            ));
        }
        if draft.signers.len() >= MAX_VOTES {
            return Err(Error::bad_request(
                "Draft wallet has reached its max number of signers",
            ));
        }
        if draft.signers.contains(signer) {
            return Err(Error::forbidden("Draft wallet already possesses this signer"));
        }

        let multisig = self.oracle.get_multisig_contract(&draft.address).await?;
        let chain_signers = multisig
            .signers
            .ok_or_else(|| Error::forbidden("No signers on multisig contract"))?;

        if !chain_signers.iter().any(|s| signer.matches(&s.address)) {
            return Err(Error::forbidden("Signer not present on multisig contract"));
        }

        let mut remainder: Vec<Address> = Vec::new();
        for entry in chain_signers.iter().filter(|s| !signer.matches(&s.address)) {
            remainder.push(Address::parse(&entry.address).map_err(|_| {
                Error::Upstream(format!("oracle returned invalid signer address: {}", entry.address))
            })?);
        }
        if !same_signer_set(&remainder, &draft.signers) {
            return Err(Error::forbidden(
                "Draft wallet signers inconsistent with multisig signers",
            ));
        }

        Ok(SignerGuard {
            signers: draft.signers,
            version: draft.version,
        })
    }

    /// Conditionally append the signer; a lost race surfaces as `Conflict`
    /// and the caller should re-validate and retry
    pub async fn add_signer_to_draft_wallet(
        &self,
        contract: &Address,
        signer: Address,
        guard: &SignerGuard,
    ) -> Result<DraftWallet> {
        let draft = self
            .store
            .add_signer_checked(contract, signer.clone(), guard.version)
            .await?;
        info!(
            "Recorded signer {} on draft wallet {} ({}/{})",
            signer,
            contract,
            draft.signers.len(),
            MAX_VOTES
        );
        Ok(draft)
    }

    /// Promote a quorate draft wallet into the next-round wallet,
    /// promoting its signers to admin. Atomic in the store.
    pub async fn activate_draft_wallet(&self, draft_wallet_id: EntityId) -> Result<Wallet> {
        let wallet = self.store.promote_draft_wallet(draft_wallet_id).await?;
        self.store.save().await?;
        Ok(wallet)
    }

    /// Gate for countersigning a draft transaction: the signer's pending
    /// on-chain vote must mirror the draft's recipient and amount exactly
    pub async fn validate_new_signer_for_draft_transaction(
        &self,
        draft_transaction_id: EntityId,
        signer: &Address,
    ) -> Result<SignerGuard> {
        let draft = self
            .store
            .get_draft_transaction(draft_transaction_id)
            .await
            .ok_or_else(|| Error::not_found("Draft transaction"))?;

        if draft.sends.contains(signer) {
            return Err(Error::forbidden(
                "Draft transaction already signed by this signer",
            ));
        }

        let wallet = self
            .store
            .get_wallet(draft.wallet)
            .await
            .ok_or_else(|| Error::not_found("Wallet"))?;

        let multisig = self.oracle.get_multisig_contract(&wallet.address).await?;
        let chain_signers = multisig
            .signers
            .ok_or_else(|| Error::forbidden("No signers on multisig contract"))?;

        let vote_matches = chain_signers.iter().any(|s| {
            signer.matches(&s.address)
                && draft.recipient.matches(&s.dest_address)
                && s.amount == draft.amount
        });
        if !vote_matches {
            return Err(Error::forbidden(
                "Signer vote inconsistent with draft transaction",
            ));
        }

        Ok(SignerGuard {
            signers: draft.sends,
            version: draft.version,
        })
    }

    /// Conditionally record the countersignature
    pub async fn sign_draft_transaction(
        &self,
        draft_transaction_id: EntityId,
        signer: Address,
        guard: &SignerGuard,
    ) -> Result<DraftTransaction> {
        let draft = self
            .store
            .sign_draft_transaction_checked(draft_transaction_id, signer.clone(), guard.version)
            .await?;
        info!(
            "Recorded send by {} on draft transaction {} ({}/{})",
            signer,
            draft_transaction_id,
            draft.sends.len(),
            MIN_VOTES
        );
        Ok(draft)
    }

    /// Gate for execution: quorum reached, votes drained on-chain, and the
    /// recipient's latest balance change matching the broadcast exactly
    pub async fn validate_execution_of_draft_transaction(
        &self,
        draft_transaction_id: EntityId,
        tx_hash: &str,
    ) -> Result<()> {
        let draft = self
            .store
            .get_draft_transaction(draft_transaction_id)
            .await
            .ok_or_else(|| Error::not_found("Draft transaction"))?;

        if draft.sends.len() < MIN_VOTES {
            return Err(Error::bad_request(
                "Draft transaction does not have enough sends",
            ));
        }

        let wallet = self
            .store
            .get_wallet(draft.wallet)
            .await
            .ok_or_else(|| Error::not_found("Wallet"))?;

        let multisig = self.oracle.get_multisig_contract(&wallet.address).await?;
        let chain_signers = multisig
            .signers
            .ok_or_else(|| Error::forbidden("No signers on multisig contract"))?;

        // After a successful push the executed votes read back drained
        let drained = chain_signers
            .iter()
            .filter(|s| draft.recipient.matches(&s.dest_address) && s.amount == 0.0)
            .count();
        if drained < MIN_VOTES {
            return Err(Error::forbidden(
                "Multisig votes not drained for this transaction",
            ));
        }

        let history = self
            .oracle
            .get_address_contract_balances(&draft.recipient, &wallet.address, BALANCE_HISTORY_LIMIT)
            .await?;
        let latest = history
            .first()
            .ok_or_else(|| Error::forbidden("No balance change recorded for recipient"))?;

        if latest.hash != tx_hash
            || latest.contract_type != MULTISIG_CONTRACT_TYPE
            || latest.balance_change != draft.amount
            || !latest.tx_receipt.success
            || latest.tx_receipt.method != PUSH_METHOD
        {
            return Err(Error::forbidden(
                "Balance change inconsistent with executed transaction",
            ));
        }

        debug!(
            "Validated execution of draft transaction {} with tx {}",
            draft_transaction_id, tx_hash
        );
        Ok(())
    }

    /// Promote the draft into an immutable transaction record. Atomic in
    /// the store; idempotent under broadcast retry of the same tx hash.
    pub async fn execute_draft_transaction(
        &self,
        draft_transaction_id: EntityId,
        broadcaster: Address,
        tx_hash: &str,
    ) -> Result<Transaction> {
        let transaction = self
            .store
            .promote_draft_transaction(draft_transaction_id, broadcaster, tx_hash)
            .await?;
        self.store.save().await?;
        Ok(transaction)
    }
}
