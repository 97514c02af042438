//! Persistence layer
//!
//! All five record collections live behind a single `RwLock` so the two
//! multi-entity promotions (draft wallet -> wallet, draft transaction ->
//! transaction) commit under one write guard: either every related record
//! changes or none do. Conditional writes on a per-draft version counter
//! give optimistic concurrency for signer races.
//!
//! Optional JSON snapshot persistence mirrors the in-memory state to disk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::model::{
    DraftTransaction, DraftWallet, EntityId, Proposal, ProposalPatch, Role, Transaction, User,
    Wallet, MAX_VOTES, MIN_VOTES,
};

/// Default page size when the caller does not specify one
const DEFAULT_PAGE_LIMIT: usize = 10;

/// Query options shared by every paginated listing
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Sort option in the format `field:asc` or `field:desc`
    pub sort_by: Option<String>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

/// One page of query results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub total_results: usize,
}

/// A sortable field value; entities expose their fields through this
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Time(chrono::DateTime<chrono::Utc>),
}

/// Implemented by every stored record kind; powers the single generic
/// filter + sort + paginate path
pub trait Entity: Clone {
    fn id(&self) -> EntityId;

    /// Look up a sortable field by name; `None` for unknown fields
    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// A per-entity query filter
pub trait Filter<T> {
    fn matches(&self, item: &T) -> bool;
}

impl Entity for DraftWallet {
    fn id(&self) -> EntityId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "address" => Some(FieldValue::Str(self.address.to_string())),
            "author" => Some(FieldValue::Str(self.author.to_string())),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            _ => None,
        }
    }
}

impl Entity for Wallet {
    fn id(&self) -> EntityId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "address" => Some(FieldValue::Str(self.address.to_string())),
            "author" => Some(FieldValue::Str(self.author.to_string())),
            "round" => Some(FieldValue::Num(self.round as f64)),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            _ => None,
        }
    }
}

impl Entity for Proposal {
    fn id(&self) -> EntityId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "title" => Some(FieldValue::Str(self.title.clone())),
            "oracle" => Some(FieldValue::Str(self.oracle.to_string())),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            _ => None,
        }
    }
}

impl Entity for DraftTransaction {
    fn id(&self) -> EntityId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "title" => Some(FieldValue::Str(self.title.clone())),
            "amount" => Some(FieldValue::Num(self.amount)),
            "recipient" => Some(FieldValue::Str(self.recipient.to_string())),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            _ => None,
        }
    }
}

impl Entity for Transaction {
    fn id(&self) -> EntityId {
        self.id
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "title" => Some(FieldValue::Str(self.title.clone())),
            "amount" => Some(FieldValue::Num(self.amount)),
            "recipient" => Some(FieldValue::Str(self.recipient.to_string())),
            "created_at" => Some(FieldValue::Time(self.created_at)),
            _ => None,
        }
    }
}

/// Filter for draft wallet listings
#[derive(Debug, Clone, Default)]
pub struct DraftWalletFilter {
    pub address: Option<Address>,
    pub author: Option<Address>,
}

impl Filter<DraftWallet> for DraftWalletFilter {
    fn matches(&self, item: &DraftWallet) -> bool {
        self.address.as_ref().map_or(true, |a| *a == item.address)
            && self.author.as_ref().map_or(true, |a| *a == item.author)
    }
}

/// Filter for wallet listings
#[derive(Debug, Clone, Default)]
pub struct WalletFilter {
    pub address: Option<Address>,
    pub author: Option<Address>,
    pub round: Option<u64>,
}

impl Filter<Wallet> for WalletFilter {
    fn matches(&self, item: &Wallet) -> bool {
        self.address.as_ref().map_or(true, |a| *a == item.address)
            && self.author.as_ref().map_or(true, |a| *a == item.author)
            && self.round.map_or(true, |r| r == item.round)
    }
}

/// Filter for proposal listings
#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub title: Option<String>,
    pub oracle: Option<Address>,
    pub wallet: Option<EntityId>,
    pub acceptance_status: Option<crate::model::AcceptanceStatus>,
    pub funding_status: Option<crate::model::FundingStatus>,
}

impl Filter<Proposal> for ProposalFilter {
    fn matches(&self, item: &Proposal) -> bool {
        self.title.as_ref().map_or(true, |t| *t == item.title)
            && self.oracle.as_ref().map_or(true, |o| *o == item.oracle)
            && self.wallet.map_or(true, |w| w == item.wallet)
            && self
                .acceptance_status
                .map_or(true, |s| s == item.acceptance_status)
            && self
                .funding_status
                .map_or(true, |s| s == item.funding_status)
    }
}

/// Filter shared by draft transaction and transaction listings
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub title: Option<String>,
    pub category: Option<crate::model::TransactionCategory>,
    pub proposal: Option<EntityId>,
    pub wallet: Option<EntityId>,
    pub recipient: Option<Address>,
}

impl Filter<DraftTransaction> for TransactionFilter {
    fn matches(&self, item: &DraftTransaction) -> bool {
        self.title.as_ref().map_or(true, |t| *t == item.title)
            && self.category.map_or(true, |c| c == item.category)
            && self.proposal.map_or(true, |p| Some(p) == item.proposal)
            && self.wallet.map_or(true, |w| w == item.wallet)
            && self.recipient.as_ref().map_or(true, |r| *r == item.recipient)
    }
}

impl Filter<Transaction> for TransactionFilter {
    fn matches(&self, item: &Transaction) -> bool {
        self.title.as_ref().map_or(true, |t| *t == item.title)
            && self.category.map_or(true, |c| c == item.category)
            && self.proposal.map_or(true, |p| Some(p) == item.proposal)
            && self.wallet.map_or(true, |w| w == item.wallet)
            && self.recipient.as_ref().map_or(true, |r| *r == item.recipient)
    }
}

/// Filter, sort, and slice one page out of a collection
fn paginate<T, F>(items: &HashMap<EntityId, T>, filter: &F, options: &QueryOptions) -> Page<T>
where
    T: Entity,
    F: Filter<T>,
{
    let mut results: Vec<T> = items
        .values()
        .filter(|item| filter.matches(item))
        .cloned()
        .collect();

    let (sort_field, descending) = match options.sort_by.as_deref() {
        Some(spec) => {
            let mut parts = spec.splitn(2, ':');
            let field = parts.next().unwrap_or("created_at").to_string();
            let desc = parts.next() == Some("desc");
            (field, desc)
        }
        None => ("created_at".to_string(), false),
    };

    results.sort_by(|a, b| {
        let ord = match (a.field(&sort_field), b.field(&sort_field)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => std::cmp::Ordering::Equal,
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });

    let limit = options.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
    let page = options.page.unwrap_or(1).max(1);
    let total_results = results.len();
    let total_pages = total_results.div_ceil(limit);

    let start = (page - 1).saturating_mul(limit).min(total_results);
    let end = (start + limit).min(total_results);

    Page {
        results: results[start..end].to_vec(),
        page,
        limit,
        total_pages,
        total_results,
    }
}

/// The whole record state; serialized as one snapshot document
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreInner {
    draft_wallets: HashMap<EntityId, DraftWallet>,
    wallets: HashMap<EntityId, Wallet>,
    proposals: HashMap<EntityId, Proposal>,
    draft_transactions: HashMap<EntityId, DraftTransaction>,
    transactions: HashMap<EntityId, Transaction>,
    users: HashMap<EntityId, User>,
    /// Explicit pointer to the wallet holding the maximum round
    current_wallet: Option<EntityId>,
}

/// Governance record store
pub struct GovernanceStore {
    inner: RwLock<StoreInner>,
    persistence_path: Option<String>,
}

impl GovernanceStore {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            persistence_path,
        }
    }

    /// Load the snapshot from disk, if one exists
    pub async fn load(&self) -> Result<()> {
        if let Some(path) = &self.persistence_path {
            if Path::new(path).exists() {
                let data = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

                let loaded: StoreInner = serde_json::from_str(&data)
                    .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

                let mut inner = self.inner.write().await;
                *inner = loaded;

                info!(
                    "Loaded snapshot from {}: {} wallets, {} proposals, {} transactions",
                    path,
                    inner.wallets.len(),
                    inner.proposals.len(),
                    inner.transactions.len()
                );
            }
        }
        Ok(())
    }

    /// Write the snapshot to disk
    pub async fn save(&self) -> Result<()> {
        if let Some(path) = &self.persistence_path {
            let inner = self.inner.read().await;
            let data = serde_json::to_string_pretty(&*inner)
                .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

            tokio::fs::write(path, data)
                .await
                .map_err(|e| Error::SnapshotPersistence(e.to_string()))?;

            debug!("Saved snapshot to {}", path);
        }
        Ok(())
    }

    /*
     * Draft wallets
     */

    /// Insert a draft wallet, enforcing address and author uniqueness
    pub async fn create_draft_wallet(&self, draft: DraftWallet) -> Result<DraftWallet> {
        let mut inner = self.inner.write().await;
        if inner.draft_wallets.values().any(|d| d.address == draft.address) {
            return Err(Error::bad_request("Draft wallet address already taken"));
        }
        if inner.draft_wallets.values().any(|d| d.author == draft.author) {
            return Err(Error::bad_request("Author already has a draft wallet"));
        }
        inner.draft_wallets.insert(draft.id, draft.clone());
        info!("Created draft wallet {} for {}", draft.address, draft.author);
        Ok(draft)
    }

    pub async fn get_draft_wallet(&self, id: EntityId) -> Option<DraftWallet> {
        self.inner.read().await.draft_wallets.get(&id).cloned()
    }

    pub async fn find_draft_wallet_by_author(&self, author: &Address) -> Option<DraftWallet> {
        self.inner
            .read()
            .await
            .draft_wallets
            .values()
            .find(|d| d.author == *author)
            .cloned()
    }

    pub async fn draft_wallet_address_taken(&self, address: &Address) -> bool {
        self.inner
            .read()
            .await
            .draft_wallets
            .values()
            .any(|d| d.address == *address)
    }

    pub async fn draft_wallet_author_present(&self, author: &Address) -> bool {
        self.inner
            .read()
            .await
            .draft_wallets
            .values()
            .any(|d| d.author == *author)
    }

    /// Conditionally append a signer to the draft wallet matching `contract`
    ///
    /// The write only lands if the draft's version still equals the one
    /// observed at validation time; a miss means a concurrent signer won
    /// the race and surfaces as `Conflict`, never as a silent no-op.
    pub async fn add_signer_checked(
        &self,
        contract: &Address,
        signer: Address,
        expected_version: u64,
    ) -> Result<DraftWallet> {
        let mut inner = self.inner.write().await;
        let draft = inner
            .draft_wallets
            .values_mut()
            .find(|d| d.address == *contract)
            .ok_or_else(|| Error::not_found("Draft wallet"))?;

        if draft.version != expected_version {
            return Err(Error::Conflict("draft wallet".to_string()));
        }
        if draft.signers.len() >= MAX_VOTES {
            return Err(Error::bad_request(
                "Draft wallet has reached its max number of signers",
            ));
        }
        if draft.signers.contains(&signer) {
            return Err(Error::bad_request("Draft wallet already possesses this signer"));
        }

        draft.signers.push(signer);
        draft.version += 1;
        draft.updated_at = chrono::Utc::now();
        Ok(draft.clone())
    }

    pub async fn delete_draft_wallet(&self, id: EntityId) -> Result<DraftWallet> {
        let mut inner = self.inner.write().await;
        inner
            .draft_wallets
            .remove(&id)
            .ok_or_else(|| Error::not_found("Draft wallet"))
    }

    pub async fn query_draft_wallets(
        &self,
        filter: &DraftWalletFilter,
        options: &QueryOptions,
    ) -> Page<DraftWallet> {
        paginate(&self.inner.read().await.draft_wallets, filter, options)
    }

    /*
     * Wallets
     */

    pub async fn get_wallet(&self, id: EntityId) -> Option<Wallet> {
        self.inner.read().await.wallets.get(&id).cloned()
    }

    pub async fn wallet_address_taken(&self, address: &Address) -> bool {
        self.inner
            .read()
            .await
            .wallets
            .values()
            .any(|w| w.address == *address)
    }

    /// The wallet holding the maximum round, via the maintained pointer
    pub async fn current_wallet(&self) -> Option<Wallet> {
        let inner = self.inner.read().await;
        inner
            .current_wallet
            .and_then(|id| inner.wallets.get(&id))
            .cloned()
    }

    pub async fn query_wallets(&self, filter: &WalletFilter, options: &QueryOptions) -> Page<Wallet> {
        paginate(&self.inner.read().await.wallets, filter, options)
    }

    /// Promote a quorate draft wallet into a canonical wallet
    ///
    /// Every check and mutation happens under one write guard: the draft
    /// is removed, the wallet created with the next round, the current
    /// pointer advanced, and each signer's user record promoted to admin
    /// (or created) with the wallet attached. A failed check mutates
    /// nothing.
    pub async fn promote_draft_wallet(&self, draft_id: EntityId) -> Result<Wallet> {
        let mut inner = self.inner.write().await;

        let draft = inner
            .draft_wallets
            .get(&draft_id)
            .ok_or_else(|| Error::not_found("Draft wallet"))?
            .clone();

        if draft.signers.len() < MAX_VOTES {
            return Err(Error::bad_request("Draft wallet does not have enough signers"));
        }
        if inner.wallets.values().any(|w| w.address == draft.address) {
            return Err(Error::bad_request("Wallet address already taken"));
        }

        let round = inner
            .current_wallet
            .and_then(|id| inner.wallets.get(&id))
            .map_or(1, |w| w.round + 1);

        // All checks passed; the mutations below are infallible
        inner.draft_wallets.remove(&draft_id);

        let now = chrono::Utc::now();
        let wallet = Wallet {
            id: EntityId::new_v4(),
            address: draft.address,
            author: draft.author,
            signers: draft.signers,
            round,
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        inner.wallets.insert(wallet.id, wallet.clone());
        inner.current_wallet = Some(wallet.id);

        for signer in &wallet.signers {
            match inner.users.values_mut().find(|u| u.address == *signer) {
                Some(user) => {
                    user.role = Role::Admin;
                    if !user.wallets.contains(&wallet.id) {
                        user.wallets.push(wallet.id);
                    }
                    user.updated_at = now;
                }
                None => {
                    let user = User::unnamed(signer.clone(), wallet.id);
                    inner.users.insert(user.id, user);
                }
            }
        }

        info!("Activated wallet {} at round {}", wallet.address, wallet.round);
        Ok(wallet)
    }

    /*
     * Proposals
     */

    /// Insert a proposal, enforcing oracle-address uniqueness
    pub async fn create_proposal(&self, proposal: Proposal) -> Result<Proposal> {
        let mut inner = self.inner.write().await;
        if inner.proposals.values().any(|p| p.oracle == proposal.oracle) {
            return Err(Error::bad_request("Proposal oracle address already taken"));
        }
        if !inner.wallets.contains_key(&proposal.wallet) {
            return Err(Error::not_found("Wallet"));
        }
        inner.proposals.insert(proposal.id, proposal.clone());
        Ok(proposal)
    }

    pub async fn get_proposal(&self, id: EntityId) -> Option<Proposal> {
        self.inner.read().await.proposals.get(&id).cloned()
    }

    pub async fn edit_proposal(&self, id: EntityId, patch: ProposalPatch) -> Result<Proposal> {
        let mut inner = self.inner.write().await;
        let proposal = inner
            .proposals
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Proposal"))?;

        if let Some(title) = patch.title {
            proposal.title = title;
        }
        if let Some(description) = patch.description {
            proposal.description = Some(description);
        }
        if let Some(status) = patch.acceptance_status {
            proposal.acceptance_status = status;
        }
        if let Some(status) = patch.funding_status {
            proposal.funding_status = status;
        }
        proposal.updated_at = chrono::Utc::now();
        Ok(proposal.clone())
    }

    pub async fn delete_proposal(&self, id: EntityId) -> Result<Proposal> {
        let mut inner = self.inner.write().await;
        inner
            .proposals
            .remove(&id)
            .ok_or_else(|| Error::not_found("Proposal"))
    }

    pub async fn query_proposals(
        &self,
        filter: &ProposalFilter,
        options: &QueryOptions,
    ) -> Page<Proposal> {
        paginate(&self.inner.read().await.proposals, filter, options)
    }

    /*
     * Draft transactions
     */

    /// Insert a draft transaction, enforcing one pending draft per wallet
    pub async fn create_draft_transaction(
        &self,
        draft: DraftTransaction,
    ) -> Result<DraftTransaction> {
        let mut inner = self.inner.write().await;
        if !inner.wallets.contains_key(&draft.wallet) {
            return Err(Error::not_found("Wallet"));
        }
        if inner
            .draft_transactions
            .values()
            .any(|d| d.wallet == draft.wallet)
        {
            return Err(Error::bad_request(
                "Wallet already has a pending draft transaction",
            ));
        }
        if let Some(proposal) = draft.proposal {
            if !inner.proposals.contains_key(&proposal) {
                return Err(Error::not_found("Proposal"));
            }
        }
        inner.draft_transactions.insert(draft.id, draft.clone());
        Ok(draft)
    }

    pub async fn get_draft_transaction(&self, id: EntityId) -> Option<DraftTransaction> {
        self.inner.read().await.draft_transactions.get(&id).cloned()
    }

    /// Conditionally record a countersignature, versioned like
    /// [`add_signer_checked`](Self::add_signer_checked)
    pub async fn sign_draft_transaction_checked(
        &self,
        id: EntityId,
        signer: Address,
        expected_version: u64,
    ) -> Result<DraftTransaction> {
        let mut inner = self.inner.write().await;
        let draft = inner
            .draft_transactions
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("Draft transaction"))?;

        if draft.version != expected_version {
            return Err(Error::Conflict("draft transaction".to_string()));
        }
        if draft.sends.contains(&signer) {
            return Err(Error::bad_request(
                "Draft transaction already signed by this signer",
            ));
        }

        draft.sends.push(signer);
        draft.version += 1;
        draft.updated_at = chrono::Utc::now();
        Ok(draft.clone())
    }

    pub async fn delete_draft_transaction(&self, id: EntityId) -> Result<DraftTransaction> {
        let mut inner = self.inner.write().await;
        inner
            .draft_transactions
            .remove(&id)
            .ok_or_else(|| Error::not_found("Draft transaction"))
    }

    pub async fn query_draft_transactions(
        &self,
        filter: &TransactionFilter,
        options: &QueryOptions,
    ) -> Page<DraftTransaction> {
        paginate(&self.inner.read().await.draft_transactions, filter, options)
    }

    /*
     * Transactions
     */

    pub async fn get_transaction(&self, id: EntityId) -> Option<Transaction> {
        self.inner.read().await.transactions.get(&id).cloned()
    }

    pub async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        options: &QueryOptions,
    ) -> Page<Transaction> {
        paginate(&self.inner.read().await.transactions, filter, options)
    }

    /// Promote a quorate draft transaction into an executed transaction
    ///
    /// Atomic under one write guard: the draft is removed, the transaction
    /// recorded with the draft's sends carried over unmodified, its id
    /// appended to the source wallet (and linked proposal) exactly once.
    /// Re-broadcasting the same tx hash returns the existing record.
    pub async fn promote_draft_transaction(
        &self,
        draft_id: EntityId,
        broadcaster: Address,
        tx_hash: &str,
    ) -> Result<Transaction> {
        let mut inner = self.inner.write().await;

        // Idempotency under broadcast retry
        if let Some(existing) = inner.transactions.values().find(|t| t.tx == tx_hash) {
            debug!("Transaction {} already recorded for tx {}", existing.id, tx_hash);
            return Ok(existing.clone());
        }

        let draft = inner
            .draft_transactions
            .get(&draft_id)
            .ok_or_else(|| Error::not_found("Draft transaction"))?
            .clone();

        if draft.sends.len() < MIN_VOTES {
            return Err(Error::bad_request(
                "Draft transaction does not have enough sends",
            ));
        }
        if !inner.wallets.contains_key(&draft.wallet) {
            return Err(Error::not_found("Wallet"));
        }

        // All checks passed; the mutations below are infallible
        inner.draft_transactions.remove(&draft_id);

        let now = chrono::Utc::now();
        let transaction = Transaction {
            id: EntityId::new_v4(),
            title: draft.title,
            category: draft.category,
            category_other_description: draft.category_other_description,
            proposal: draft.proposal,
            wallet: draft.wallet,
            recipient: draft.recipient,
            amount: draft.amount,
            sends: draft.sends,
            push: broadcaster,
            tx: tx_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.transactions.insert(transaction.id, transaction.clone());

        if let Some(wallet) = inner.wallets.get_mut(&transaction.wallet) {
            if !wallet.transactions.contains(&transaction.id) {
                wallet.transactions.push(transaction.id);
                wallet.updated_at = now;
            }
        }
        if let Some(proposal_id) = transaction.proposal {
            if let Some(proposal) = inner.proposals.get_mut(&proposal_id) {
                if !proposal.transactions.contains(&transaction.id) {
                    proposal.transactions.push(transaction.id);
                    proposal.updated_at = now;
                }
            }
        }

        info!(
            "Executed transaction {} for {} from wallet {}",
            transaction.id, transaction.amount, transaction.wallet
        );
        Ok(transaction)
    }

    /*
     * Users
     */

    pub async fn find_user_by_address(&self, address: &Address) -> Option<User> {
        self.inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.address == *address)
            .cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Entity counts for status display: (draft wallets, wallets,
    /// proposals, draft transactions, transactions)
    pub async fn counts(&self) -> (usize, usize, usize, usize, usize) {
        let inner = self.inner.read().await;
        (
            inner.draft_wallets.len(),
            inner.wallets.len(),
            inner.proposals.len(),
            inner.draft_transactions.len(),
            inner.transactions.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionCategory;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn draft_wallet_with_signers(n: usize) -> DraftWallet {
        let mut draft = DraftWallet::new(addr(100), addr(101));
        draft.signers = (1..=n as u8).map(addr).collect();
        draft.version = n as u64;
        draft
    }

    async fn store_with_wallet() -> (GovernanceStore, Wallet) {
        let store = GovernanceStore::new(None);
        store
            .create_draft_wallet(draft_wallet_with_signers(5))
            .await
            .unwrap();
        let draft = store.find_draft_wallet_by_author(&addr(101)).await.unwrap();
        let wallet = store.promote_draft_wallet(draft.id).await.unwrap();
        (store, wallet)
    }

    fn draft_transaction(wallet: EntityId) -> DraftTransaction {
        let now = chrono::Utc::now();
        DraftTransaction {
            id: EntityId::new_v4(),
            title: "Pay the relay operator".to_string(),
            category: TransactionCategory::FundProposal,
            category_other_description: None,
            proposal: None,
            wallet,
            recipient: addr(50),
            amount: 10.0,
            sends: vec![addr(1), addr(2), addr(3)],
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_draft_wallet_uniqueness() {
        let store = GovernanceStore::new(None);
        store
            .create_draft_wallet(DraftWallet::new(addr(1), addr(2)))
            .await
            .unwrap();

        let same_address = store
            .create_draft_wallet(DraftWallet::new(addr(1), addr(3)))
            .await;
        assert!(matches!(same_address, Err(Error::BadRequest(_))));

        let same_author = store
            .create_draft_wallet(DraftWallet::new(addr(4), addr(2)))
            .await;
        assert!(matches!(same_author, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_add_signer_version_race() {
        let store = GovernanceStore::new(None);
        store
            .create_draft_wallet(DraftWallet::new(addr(1), addr(2)))
            .await
            .unwrap();

        // Two callers validated against version 0; only the first lands
        let first = store.add_signer_checked(&addr(1), addr(10), 0).await;
        assert!(first.is_ok());
        let second = store.add_signer_checked(&addr(1), addr(11), 0).await;
        assert!(matches!(second, Err(Error::Conflict(_))));

        let draft = store.find_draft_wallet_by_author(&addr(2)).await.unwrap();
        assert_eq!(draft.signers, vec![addr(10)]);
        assert_eq!(draft.version, 1);
    }

    #[tokio::test]
    async fn test_add_signer_cap_and_duplicates() {
        let store = GovernanceStore::new(None);
        store
            .create_draft_wallet(draft_wallet_with_signers(5))
            .await
            .unwrap();

        let sixth = store.add_signer_checked(&addr(100), addr(6), 5).await;
        assert!(matches!(sixth, Err(Error::BadRequest(_))));

        let store = GovernanceStore::new(None);
        store
            .create_draft_wallet(draft_wallet_with_signers(2))
            .await
            .unwrap();
        let dup = store.add_signer_checked(&addr(100), addr(1), 2).await;
        assert!(matches!(dup, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_promote_draft_wallet_requires_quorum() {
        let store = GovernanceStore::new(None);
        store
            .create_draft_wallet(draft_wallet_with_signers(4))
            .await
            .unwrap();
        let draft = store.find_draft_wallet_by_author(&addr(101)).await.unwrap();

        let result = store.promote_draft_wallet(draft.id).await;
        assert!(matches!(result, Err(Error::BadRequest(_))));

        // Failed promotion leaves the draft intact and creates nothing
        assert!(store.get_draft_wallet(draft.id).await.is_some());
        assert!(store.current_wallet().await.is_none());
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_promote_draft_wallet_round_and_users() {
        let (store, wallet) = store_with_wallet().await;

        assert_eq!(wallet.round, 1);
        assert_eq!(wallet.signers.len(), 5);
        assert_eq!(store.current_wallet().await.unwrap().id, wallet.id);
        assert_eq!(store.user_count().await, 5);

        let user = store.find_user_by_address(&addr(3)).await.unwrap();
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.wallets, vec![wallet.id]);
        assert_eq!(user.name, "unnamed");
    }

    #[tokio::test]
    async fn test_round_monotonicity() {
        let store = GovernanceStore::new(None);
        let mut rounds = Vec::new();
        for n in 0..3u8 {
            let mut draft = DraftWallet::new(addr(200 + n), addr(210 + n));
            draft.signers = (1..=5).map(addr).collect();
            store.create_draft_wallet(draft.clone()).await.unwrap();
            let wallet = store.promote_draft_wallet(draft.id).await.unwrap();
            rounds.push(wallet.round);
        }
        assert_eq!(rounds, vec![1, 2, 3]);
        assert_eq!(store.current_wallet().await.unwrap().round, 3);
    }

    #[tokio::test]
    async fn test_promote_draft_transaction_atomic_effects() {
        let (store, wallet) = store_with_wallet().await;
        let draft = draft_transaction(wallet.id);
        store.create_draft_transaction(draft.clone()).await.unwrap();

        let tx = store
            .promote_draft_transaction(draft.id, addr(1), "0xhash1")
            .await
            .unwrap();

        assert_eq!(tx.sends, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(tx.push, addr(1));
        assert_eq!(tx.tx, "0xhash1");
        assert!(store.get_draft_transaction(draft.id).await.is_none());

        let wallet = store.get_wallet(wallet.id).await.unwrap();
        assert_eq!(wallet.transactions, vec![tx.id]);
    }

    #[tokio::test]
    async fn test_promote_draft_transaction_idempotent_on_rebroadcast() {
        let (store, wallet) = store_with_wallet().await;
        let draft = draft_transaction(wallet.id);
        store.create_draft_transaction(draft.clone()).await.unwrap();

        let first = store
            .promote_draft_transaction(draft.id, addr(1), "0xhash1")
            .await
            .unwrap();
        let second = store
            .promote_draft_transaction(draft.id, addr(1), "0xhash1")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let wallet = store.get_wallet(wallet.id).await.unwrap();
        assert_eq!(wallet.transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_promote_draft_transaction_requires_quorum() {
        let (store, wallet) = store_with_wallet().await;
        let mut draft = draft_transaction(wallet.id);
        draft.sends = vec![addr(1), addr(2)];
        store.create_draft_transaction(draft.clone()).await.unwrap();

        let result = store
            .promote_draft_transaction(draft.id, addr(1), "0xhash1")
            .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
        assert!(store.get_draft_transaction(draft.id).await.is_some());
    }

    #[tokio::test]
    async fn test_one_draft_transaction_per_wallet() {
        let (store, wallet) = store_with_wallet().await;
        store
            .create_draft_transaction(draft_transaction(wallet.id))
            .await
            .unwrap();
        let second = store.create_draft_transaction(draft_transaction(wallet.id)).await;
        assert!(matches!(second, Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_proposal_oracle_uniqueness_and_edit() {
        let (store, wallet) = store_with_wallet().await;
        let proposal = Proposal::new("Fund the relay".into(), None, addr(60), wallet.id);
        store.create_proposal(proposal.clone()).await.unwrap();

        let dup = store
            .create_proposal(Proposal::new("Other".into(), None, addr(60), wallet.id))
            .await;
        assert!(matches!(dup, Err(Error::BadRequest(_))));

        let patch = ProposalPatch {
            acceptance_status: Some(crate::model::AcceptanceStatus::Accepted),
            ..Default::default()
        };
        let edited = store.edit_proposal(proposal.id, patch).await.unwrap();
        assert_eq!(
            edited.acceptance_status,
            crate::model::AcceptanceStatus::Accepted
        );
        assert_eq!(edited.funding_status, crate::model::FundingStatus::Pending);
    }

    #[tokio::test]
    async fn test_pagination_sorting() {
        let store = GovernanceStore::new(None);
        for n in 0..5u8 {
            let mut draft = DraftWallet::new(addr(200 + n), addr(210 + n));
            draft.signers = (1..=5).map(addr).collect();
            store.create_draft_wallet(draft.clone()).await.unwrap();
            store.promote_draft_wallet(draft.id).await.unwrap();
        }

        let page = store
            .query_wallets(
                &WalletFilter::default(),
                &QueryOptions {
                    sort_by: Some("round:desc".to_string()),
                    limit: Some(2),
                    page: Some(1),
                },
            )
            .await;

        assert_eq!(page.total_results, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[0].round, 5);
        assert_eq!(page.results[1].round, 4);

        let filtered = store
            .query_wallets(
                &WalletFilter {
                    round: Some(3),
                    ..Default::default()
                },
                &QueryOptions::default(),
            )
            .await;
        assert_eq!(filtered.total_results, 1);
        assert_eq!(filtered.results[0].round, 3);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir
            .path()
            .join("snapshot.json")
            .to_string_lossy()
            .to_string();

        let store = GovernanceStore::new(Some(path.clone()));
        store
            .create_draft_wallet(draft_wallet_with_signers(5))
            .await
            .unwrap();
        let draft = store.find_draft_wallet_by_author(&addr(101)).await.unwrap();
        let wallet = store.promote_draft_wallet(draft.id).await.unwrap();
        store.save().await.unwrap();

        let reloaded = GovernanceStore::new(Some(path));
        reloaded.load().await.unwrap();
        let current = reloaded.current_wallet().await.unwrap();
        assert_eq!(current.id, wallet.id);
        assert_eq!(current.round, 1);
        assert_eq!(reloaded.user_count().await, 5);
    }
}
