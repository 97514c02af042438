//! Governance facade
//!
//! Thin orchestration over the promotion engine and the store: sequences
//! the validate-then-mutate pairs and delegates plain CRUD. Only
//! schema-level checks live here; invariants belong to the engine and the
//! store.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::address::Address;
use crate::engine::QuorumEngine;
use crate::error::{Error, Result};
use crate::model::{
    DraftTransaction, DraftWallet, EntityId, Proposal, ProposalPatch, Transaction,
    TransactionCategory, Wallet,
};
use crate::oracle::ChainOracle;
use crate::store::{
    DraftWalletFilter, GovernanceStore, Page, ProposalFilter, QueryOptions, TransactionFilter,
    WalletFilter,
};

/// How many times a signer submission is re-validated after losing a
/// concurrent race before the conflict is surfaced to the caller
const SIGNER_RETRY_ATTEMPTS: u32 = 3;

/// Request body for creating a draft transaction
#[derive(Debug, Clone, Deserialize)]
pub struct NewDraftTransaction {
    pub title: String,
    pub category: TransactionCategory,
    pub category_other_description: Option<String>,
    pub proposal: Option<EntityId>,
    pub wallet: EntityId,
    pub recipient: Address,
    pub amount: f64,
}

/// Request body for creating a proposal; the wallet reference is resolved
/// to the current wallet at creation time
#[derive(Debug, Clone, Deserialize)]
pub struct NewProposal {
    pub title: String,
    pub description: Option<String>,
    pub oracle: Address,
}

pub struct GovernanceFacade {
    store: Arc<GovernanceStore>,
    engine: QuorumEngine,
}

impl GovernanceFacade {
    pub fn new(store: Arc<GovernanceStore>, oracle: Arc<dyn ChainOracle>) -> Self {
        let engine = QuorumEngine::new(store.clone(), oracle);
        Self { store, engine }
    }

    /*
     * Draft wallets
     */

    /// Validate the deployed contract against the oracle, then record the
    /// draft wallet
    pub async fn create_draft_wallet(
        &self,
        address: Address,
        author: Address,
    ) -> Result<DraftWallet> {
        self.engine
            .validate_new_multisig_wallet(&address, &author)
            .await?;
        let draft = self
            .store
            .create_draft_wallet(DraftWallet::new(address, author))
            .await?;
        self.store.save().await?;
        Ok(draft)
    }

    /// Record a signer on the author's draft wallet, re-validating and
    /// retrying a bounded number of times if a concurrent signer wins
    pub async fn add_signer(
        &self,
        author: &Address,
        signer: &Address,
        contract: &Address,
    ) -> Result<DraftWallet> {
        let mut attempt = 0;
        loop {
            let guard = self
                .engine
                .validate_new_signer_for_draft_wallet(author, signer, contract)
                .await?;
            match self
                .engine
                .add_signer_to_draft_wallet(contract, signer.clone(), &guard)
                .await
            {
                Ok(draft) => {
                    self.store.save().await?;
                    return Ok(draft);
                }
                Err(e) if e.is_conflict() && attempt < SIGNER_RETRY_ATTEMPTS => {
                    attempt += 1;
                    warn!(
                        "Signer race on draft wallet {}, re-validating (attempt {})",
                        contract, attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn activate_draft_wallet(&self, draft_wallet_id: EntityId) -> Result<Wallet> {
        self.engine.activate_draft_wallet(draft_wallet_id).await
    }

    pub async fn delete_draft_wallet(&self, draft_wallet_id: EntityId) -> Result<DraftWallet> {
        let draft = self.store.delete_draft_wallet(draft_wallet_id).await?;
        self.store.save().await?;
        Ok(draft)
    }

    pub async fn get_draft_wallet(&self, id: EntityId) -> Result<DraftWallet> {
        self.store
            .get_draft_wallet(id)
            .await
            .ok_or_else(|| Error::not_found("Draft wallet"))
    }

    pub async fn query_draft_wallets(
        &self,
        filter: &DraftWalletFilter,
        options: &QueryOptions,
    ) -> Page<DraftWallet> {
        self.store.query_draft_wallets(filter, options).await
    }

    /*
     * Wallets
     */

    pub async fn get_current_wallet(&self) -> Option<Wallet> {
        self.store.current_wallet().await
    }

    pub async fn query_wallets(
        &self,
        filter: &WalletFilter,
        options: &QueryOptions,
    ) -> Page<Wallet> {
        self.store.query_wallets(filter, options).await
    }

    /*
     * Proposals
     */

    /// Create a proposal tied to the wallet current at creation time,
    /// starting pending/pending
    pub async fn create_proposal(&self, body: NewProposal) -> Result<Proposal> {
        let current = self
            .store
            .current_wallet()
            .await
            .ok_or_else(|| Error::not_found("Current wallet"))?;
        let proposal = self
            .store
            .create_proposal(Proposal::new(
                body.title,
                body.description,
                body.oracle,
                current.id,
            ))
            .await?;
        self.store.save().await?;
        Ok(proposal)
    }

    pub async fn edit_proposal(&self, id: EntityId, patch: ProposalPatch) -> Result<Proposal> {
        let proposal = self.store.edit_proposal(id, patch).await?;
        self.store.save().await?;
        Ok(proposal)
    }

    pub async fn delete_proposal(&self, id: EntityId) -> Result<Proposal> {
        let proposal = self.store.delete_proposal(id).await?;
        self.store.save().await?;
        Ok(proposal)
    }

    pub async fn query_proposals(
        &self,
        filter: &ProposalFilter,
        options: &QueryOptions,
    ) -> Page<Proposal> {
        self.store.query_proposals(filter, options).await
    }

    /*
     * Draft transactions
     */

    /// Schema checks, then record the draft; the store enforces
    /// one-pending-draft-per-wallet
    pub async fn create_draft_transaction(
        &self,
        body: NewDraftTransaction,
    ) -> Result<DraftTransaction> {
        if body.title.trim().is_empty() {
            return Err(Error::bad_request("Title must not be empty"));
        }
        if !(body.amount > 0.0) {
            return Err(Error::bad_request("Amount must be positive"));
        }
        match body.category {
            TransactionCategory::Other if body.category_other_description.is_none() => {
                return Err(Error::bad_request(
                    "Category description required for category 'other'",
                ));
            }
            _ => {}
        }

        let now = chrono::Utc::now();
        let draft = DraftTransaction {
            id: EntityId::new_v4(),
            title: body.title,
            category: body.category,
            category_other_description: body.category_other_description,
            proposal: body.proposal,
            wallet: body.wallet,
            recipient: body.recipient,
            amount: body.amount,
            sends: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let draft = self.store.create_draft_transaction(draft).await?;
        self.store.save().await?;
        debug!("Created draft transaction {} for wallet {}", draft.id, draft.wallet);
        Ok(draft)
    }

    /// Record a countersignature, with the same bounded conflict retry as
    /// [`add_signer`](Self::add_signer)
    pub async fn sign_draft_transaction(
        &self,
        draft_transaction_id: EntityId,
        signer: &Address,
    ) -> Result<DraftTransaction> {
        let mut attempt = 0;
        loop {
            let guard = self
                .engine
                .validate_new_signer_for_draft_transaction(draft_transaction_id, signer)
                .await?;
            match self
                .engine
                .sign_draft_transaction(draft_transaction_id, signer.clone(), &guard)
                .await
            {
                Ok(draft) => {
                    self.store.save().await?;
                    return Ok(draft);
                }
                Err(e) if e.is_conflict() && attempt < SIGNER_RETRY_ATTEMPTS => {
                    attempt += 1;
                    warn!(
                        "Signer race on draft transaction {}, re-validating (attempt {})",
                        draft_transaction_id, attempt
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Verify the broadcast against the oracle, then promote the draft
    pub async fn execute_draft_transaction(
        &self,
        draft_transaction_id: EntityId,
        broadcaster: Address,
        tx_hash: &str,
    ) -> Result<Transaction> {
        self.engine
            .validate_execution_of_draft_transaction(draft_transaction_id, tx_hash)
            .await?;
        self.engine
            .execute_draft_transaction(draft_transaction_id, broadcaster, tx_hash)
            .await
    }

    pub async fn delete_draft_transaction(&self, id: EntityId) -> Result<DraftTransaction> {
        let draft = self.store.delete_draft_transaction(id).await?;
        self.store.save().await?;
        Ok(draft)
    }

    pub async fn query_draft_transactions(
        &self,
        filter: &TransactionFilter,
        options: &QueryOptions,
    ) -> Page<DraftTransaction> {
        self.store.query_draft_transactions(filter, options).await
    }

    /*
     * Transactions
     */

    pub async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        options: &QueryOptions,
    ) -> Page<Transaction> {
        self.store.query_transactions(filter, options).await
    }
}
