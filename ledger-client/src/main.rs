//! ledger transfer
use std::time::Duration;

use clap::Parser;
use ledger_client::{signer, Client, Gateway};
use ledger_core::AccountId;
use log::info;

/// Ledger transfer CLI
#[derive(Parser, Debug)]
#[command(
    name = "ledger-transfer",
    about = "Submit a transfer to a ledger gateway and wait for its receipt"
)]
struct Cli {
    /// WebSocket URL of the gateway node (e.g. ws://localhost:50211)
    #[arg(long, env = "GATEWAY_URL", help = "WebSocket URL of the gateway node")]
    gateway_url: String,

    /// Account of the gateway node, credited with node fees (e.g. 0.0.3)
    #[arg(long, env = "GATEWAY_ACCOUNT", help = "Account id of the gateway node")]
    gateway_account: AccountId,

    /// Account paying for the transfer (e.g. 0.0.1001)
    #[arg(long, env = "PAYER_ACCOUNT", help = "Account id paying for the transfer")]
    payer: AccountId,

    /// Path to the hex encoded Ed25519 key of the payer
    #[arg(
        long,
        env = "PAYER_KEY",
        help = "Path to the payer's key file for signing transactions"
    )]
    payer_key: String,

    /// Account receiving the transfer
    #[arg(long, help = "Account id receiving the transfer")]
    recipient: AccountId,

    /// Amount to transfer, in the smallest denomination
    #[arg(long, help = "Amount to transfer")]
    amount: i64,

    /// Memo attached to the transaction
    #[arg(long, default_value = "", help = "Memo attached to the transaction")]
    memo: String,

    /// Number of retries for transient failures
    #[arg(long, env = "RETRY_COUNT", default_value_t = 5)]
    retry_count: u32,

    /// Delay between retries and receipt polls, in milliseconds
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 200)]
    retry_delay_ms: u64,

    /// Fetch the detailed record after the transfer succeeds
    #[arg(long)]
    fetch_record: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger with fallback to info if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    info!("🚀 Starting ledger transfer...");

    let signatory = signer::load_ed25519_key(&cli.payer_key).await?;
    let client = Client::new();
    let ctx = client.context();
    ctx.set_gateway(Some(Gateway::new(cli.gateway_account, cli.gateway_url)));
    ctx.set_payer(Some(cli.payer));
    ctx.set_signatory(Some(signatory));
    ctx.set_memo(cli.memo);
    ctx.set_retry_count(cli.retry_count);
    ctx.set_retry_delay(Duration::from_millis(cli.retry_delay_ms));
    ctx.set_fetch_record(cli.fetch_record);

    info!(
        "🔵 Transferring {} from {} to {}",
        cli.amount, cli.payer, cli.recipient
    );
    let outcome = client.transfer(cli.recipient, cli.amount, None).await?;
    info!(
        "🟢 Transaction {} reached consensus: {}",
        outcome.transaction_id(),
        outcome.receipt.status
    );
    if let Some(record) = &outcome.record {
        info!(
            "📄 Consensus at {}, fee charged {}",
            record.consensus_timestamp, record.fee_charged
        );
    }

    client.dispose();
    Ok(())
}
