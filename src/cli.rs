//! CLI command handlers

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::address::Address;
use crate::config::Config;
use crate::oracle::{ChainOracle, HttpOracle};
use crate::store::GovernanceStore;

/// Print the current wallet and record counts from the snapshot
pub async fn status(config: &Config) -> Result<()> {
    let store = GovernanceStore::new(config.store.persistence_path.clone());
    store.load().await?;

    let (draft_wallets, wallets, proposals, draft_transactions, transactions) =
        store.counts().await;

    match store.current_wallet().await {
        Some(wallet) => {
            println!(
                "Current wallet: {} (round {}, {} signers, {} transactions)",
                wallet.address,
                wallet.round,
                wallet.signers.len(),
                wallet.transactions.len()
            );
        }
        None => println!("Current wallet: none"),
    }

    println!("Draft wallets:      {}", draft_wallets);
    println!("Wallets:            {}", wallets);
    println!("Proposals:          {}", proposals);
    println!("Draft transactions: {}", draft_transactions);
    println!("Transactions:       {}", transactions);

    Ok(())
}

/// Fetch and display a contract's indexed state from the oracle
pub async fn check_contract(config: &Config, address: &str) -> Result<()> {
    let address = Address::parse(address)?;
    let oracle: Arc<dyn ChainOracle> = Arc::new(HttpOracle::new(&config.oracle)?);

    info!("Querying oracle for contract {}", address);

    let contract = oracle.get_contract(&address).await?;
    println!("Contract {}", contract.address);
    println!("  type:   {}", contract.contract_type);
    println!("  author: {}", contract.author);

    if contract.contract_type == crate::model::MULTISIG_CONTRACT_TYPE {
        let multisig = oracle.get_multisig_contract(&address).await?;
        println!("  quorum: {}-of-{}", multisig.min_votes, multisig.max_votes);
        match multisig.signers {
            Some(signers) => {
                println!("  signers:");
                for signer in signers {
                    println!(
                        "    {} -> {} ({})",
                        signer.address, signer.dest_address, signer.amount
                    );
                }
            }
            None => println!("  signers: none yet"),
        }
    }

    Ok(())
}

/// Print the effective configuration
pub fn show_config(config: &Config) {
    print!("{}", config.display());
}
