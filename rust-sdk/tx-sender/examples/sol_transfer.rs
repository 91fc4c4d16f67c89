//! Sends 0.001 SOL with a keypair loaded from disk.
//!
//! ```text
//! RPC_URL=https://api.devnet.solana.com \
//! KEYPAIR=~/.config/solana/id.json \
//! cargo run --example sol_transfer -- <RECIPIENT>
//! ```
//!
//! `HELPER_CONFIG` may point at a TOML file with `HelperConfig` fields.

use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;

use solana_keypair::read_keypair_file;
use solana_pubkey::Pubkey;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_tx_kit::{
    HelperConfig, PrepareTransactionConfig, SendOptions, SolTransferHelper, SolTransferRequest,
    TransactionHelper,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solana_tx_kit=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let rpc_url =
        std::env::var("RPC_URL").unwrap_or_else(|_| "https://api.devnet.solana.com".to_string());
    let keypair_path = std::env::var("KEYPAIR")?;
    let recipient = std::env::args()
        .nth(1)
        .ok_or("usage: sol_transfer <RECIPIENT>")?;
    let recipient = Pubkey::from_str(&recipient)?;

    let config = match std::env::var("HELPER_CONFIG") {
        Ok(path) => HelperConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        Err(_) => HelperConfig::default(),
    };
    let multiplier = config.compute_unit_limit_multiplier;
    let keypair = Arc::new(read_keypair_file(&keypair_path)?);

    let helper = TransactionHelper::new(Arc::new(RpcClient::new(rpc_url)), config);
    let transfers = SolTransferHelper::new(helper.clone());
    let request = SolTransferRequest::from_sol(keypair, recipient, "0.001")?;

    let prepared = transfers.prepare_transfer(request).await?;
    println!(
        "Prepared {:?} transaction for fee payer {}",
        prepared.version(),
        prepared.fee_payer()
    );

    // Simulate once to size the compute unit limit, keeping the blockhash.
    let tuned = helper
        .prepare_transaction(
            prepared.message().clone(),
            &PrepareTransactionConfig {
                compute_unit_limit_multiplier: multiplier,
                blockhash_reset: false,
                ..PrepareTransactionConfig::default()
            },
        )
        .await?;
    let prepared = prepared.with_message(tuned)?;
    println!("Compute unit limit: {:?}", prepared.compute_unit_limit());

    let signature = transfers
        .send_prepared_transfer(&prepared, &SendOptions::default())
        .await?;
    println!("Transaction submitted: {signature}");
    Ok(())
}
