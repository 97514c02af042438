//! Entity model for the governance record-keeper
//!
//! Five record kinds move through the system: draft wallets and draft
//! transactions are provisional and get promoted into wallets and
//! transactions once they reach quorum; proposals tie funding requests to
//! the wallet that was current when they were filed. Users are minimal
//! records carrying the admin role granted to wallet signers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;

/// Minimum on-chain votes required to execute a multisig transaction
pub const MIN_VOTES: usize = 3;
/// Signer slots on a multisig wallet; also the activation quorum
pub const MAX_VOTES: usize = 5;

/// Contract type string the chain oracle reports for multisig contracts
pub const MULTISIG_CONTRACT_TYPE: &str = "Multisig";
/// Receipt method of the broadcast call that finalizes a multisig payment
pub const PUSH_METHOD: &str = "push";

pub type EntityId = Uuid;

/// A provisional multisig wallet accumulating signers toward activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftWallet {
    pub id: EntityId,
    /// Deployed multisig contract address (unique)
    pub address: Address,
    /// Deploying author (unique - one active draft per author)
    pub author: Address,
    /// Signers recorded so far, at most MAX_VOTES, no duplicates
    pub signers: Vec<Address>,
    /// Optimistic-lock counter, bumped on every mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftWallet {
    pub fn new(address: Address, author: Address) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            address,
            author,
            signers: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_quorum(&self) -> bool {
        self.signers.len() >= MAX_VOTES
    }
}

/// An activated treasury wallet; the highest round is "current"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: EntityId,
    pub address: Address,
    pub author: Address,
    /// Exactly MAX_VOTES signers, fixed at activation
    pub signers: Vec<Address>,
    /// Monotonic sequence number across successive treasury wallets
    pub round: u64,
    /// Executed transactions, append-only, no duplicates
    pub transactions: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptanceStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingStatus {
    Pending,
    Funded,
    Unfunded,
}

/// A funding proposal put to its oracle vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    /// Voting oracle contract address (unique)
    pub oracle: Address,
    /// The wallet that was current when the proposal was filed
    pub wallet: EntityId,
    pub acceptance_status: AcceptanceStatus,
    pub funding_status: FundingStatus,
    /// Transactions that funded this proposal
    pub transactions: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(title: String, description: Option<String>, oracle: Address, wallet: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            oracle,
            wallet,
            acceptance_status: AcceptanceStatus::Pending,
            funding_status: FundingStatus::Pending,
            transactions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Patch applied by proposal edits; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub acceptance_status: Option<AcceptanceStatus>,
    pub funding_status: Option<FundingStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionCategory {
    PayForOracle,
    FundProposal,
    SetupNewWallet,
    TransferFundsToNewWallet,
    DelegateRewards,
    Other,
}

/// A payment awaiting countersignatures before broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTransaction {
    pub id: EntityId,
    pub title: String,
    pub category: TransactionCategory,
    /// Required iff category is Other
    pub category_other_description: Option<String>,
    pub proposal: Option<EntityId>,
    /// Source wallet (unique - one pending draft per wallet)
    pub wallet: EntityId,
    pub recipient: Address,
    pub amount: f64,
    /// Signers who have countersigned on-chain, no duplicates
    pub sends: Vec<Address>,
    /// Optimistic-lock counter, bumped on every mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DraftTransaction {
    pub fn has_quorum(&self) -> bool {
        self.sends.len() >= MIN_VOTES
    }
}

/// Immutable record of an executed treasury payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: EntityId,
    pub title: String,
    pub category: TransactionCategory,
    pub category_other_description: Option<String>,
    pub proposal: Option<EntityId>,
    pub wallet: EntityId,
    pub recipient: Address,
    pub amount: f64,
    /// Final countersigner set, carried over from the draft unmodified
    pub sends: Vec<Address>,
    /// Address that broadcast the push call
    pub push: Address,
    /// On-chain transaction hash of the broadcast
    pub tx: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Minimal user record; signers are promoted to admin at wallet activation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub address: Address,
    pub role: Role,
    pub is_address_verified: bool,
    /// Wallets this user is a signatory of
    pub wallets: Vec<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Placeholder record for a signer with no account yet
    pub fn unnamed(address: Address, wallet: EntityId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: "unnamed".to_string(),
            address,
            role: Role::Admin,
            is_address_verified: false,
            wallets: vec![wallet],
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    #[test]
    fn test_draft_wallet_quorum() {
        let mut draft = DraftWallet::new(addr(1), addr(2));
        assert!(!draft.has_quorum());
        draft.signers = (10..15).map(addr).collect();
        assert!(draft.has_quorum());
    }

    #[test]
    fn test_category_wire_names() {
        let json = serde_json::to_string(&TransactionCategory::PayForOracle).unwrap();
        assert_eq!(json, "\"payForOracle\"");
        let cat: TransactionCategory = serde_json::from_str("\"fundProposal\"").unwrap();
        assert_eq!(cat, TransactionCategory::FundProposal);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&AcceptanceStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&FundingStatus::Unfunded).unwrap(),
            "\"unfunded\""
        );
    }

    #[test]
    fn test_proposal_starts_pending() {
        let p = Proposal::new("Fund the relay".into(), None, addr(3), Uuid::new_v4());
        assert_eq!(p.acceptance_status, AcceptanceStatus::Pending);
        assert_eq!(p.funding_status, FundingStatus::Pending);
        assert!(p.transactions.is_empty());
    }
}
