use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_instruction::Instruction;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::RpcSimulateTransactionConfig;
use solana_transaction_status_client_types::UiTransactionEncoding;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::abort::abortable;
use crate::compute_config::PrepareTransactionConfig;
use crate::config::{DEFAULT_COMPUTE_UNIT_LIMIT, MAX_COMPUTE_UNIT_LIMIT};
use crate::error::Result;
use crate::message::{fetch_latest_lifetime, TransactionMessage};

const SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR: u8 = 2;
const SET_COMPUTE_UNIT_PRICE_DISCRIMINATOR: u8 = 3;

fn is_compute_budget_instruction(instruction: &Instruction, discriminator: u8) -> bool {
    instruction.program_id == solana_sdk_ids::compute_budget::ID
        && instruction.data.first() == Some(&discriminator)
}

pub fn is_set_compute_unit_limit_instruction(instruction: &Instruction) -> bool {
    is_compute_budget_instruction(instruction, SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR)
}

pub fn is_set_compute_unit_price_instruction(instruction: &Instruction) -> bool {
    is_compute_budget_instruction(instruction, SET_COMPUTE_UNIT_PRICE_DISCRIMINATOR)
}

/// Index of the first set-compute-unit-limit instruction
pub fn find_compute_unit_limit_index(instructions: &[Instruction]) -> Option<usize> {
    instructions
        .iter()
        .position(is_set_compute_unit_limit_instruction)
}

/// Units requested by the first set-compute-unit-limit instruction
pub fn get_compute_unit_limit(instructions: &[Instruction]) -> Option<u32> {
    let instruction = &instructions[find_compute_unit_limit_index(instructions)?];
    let bytes = instruction.data.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Micro-lamports per unit requested by the first set-compute-unit-price instruction
pub fn get_compute_unit_price(instructions: &[Instruction]) -> Option<u64> {
    let instruction = instructions
        .iter()
        .find(|ix| is_set_compute_unit_price_instruction(ix))?;
    let bytes = instruction.data.get(1..9)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Compute budget instructions to place in front of `instructions`, skipping any
/// kind the caller already supplied.
pub(crate) fn compute_budget_prefix(
    instructions: &[Instruction],
    compute_unit_limit: Option<u32>,
    compute_unit_price: Option<u64>,
) -> Vec<Instruction> {
    let mut prefix = Vec::with_capacity(2);
    if let Some(units) = compute_unit_limit {
        if find_compute_unit_limit_index(instructions).is_none() {
            prefix.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        }
    }
    if let Some(micro_lamports) = compute_unit_price {
        if !instructions.iter().any(is_set_compute_unit_price_instruction) {
            prefix.push(ComputeBudgetInstruction::set_compute_unit_price(
                micro_lamports,
            ));
        }
    }
    prefix
}

/// Applies `multiplier` to a simulated unit count.
///
/// A simulation that reports no consumption falls back to
/// [`DEFAULT_COMPUTE_UNIT_LIMIT`]. The result is at least 1 and never above
/// [`MAX_COMPUTE_UNIT_LIMIT`].
pub fn estimate_compute_unit_limit(units_consumed: u64, multiplier: f64) -> u32 {
    if units_consumed == 0 {
        return DEFAULT_COMPUTE_UNIT_LIMIT;
    }
    let scaled = (units_consumed as f64 * multiplier).ceil();
    if scaled >= f64::from(MAX_COMPUTE_UNIT_LIMIT) {
        MAX_COMPUTE_UNIT_LIMIT
    } else {
        (scaled as u32).max(1)
    }
}

/// Simulates `message` and sets its compute unit limit, then refreshes its
/// blockhash when asked to or when the message has none.
///
/// Returns a new message; the input is consumed but callers holding a clone keep
/// the original.
pub async fn prepare_transaction(
    rpc: &RpcClient,
    message: TransactionMessage,
    config: &PrepareTransactionConfig,
) -> Result<TransactionMessage> {
    let commitment = config.commitment.unwrap_or(rpc.commitment().commitment);
    let abort = config.abort.as_ref();
    let had_lifetime = message.lifetime().is_some();
    let mut message = message;

    let limit_index = find_compute_unit_limit_index(message.instructions());
    if limit_index.is_none() || config.compute_unit_limit_reset {
        let simulation_message = if had_lifetime {
            message.clone()
        } else {
            let lifetime = fetch_latest_lifetime(rpc, commitment, abort).await?;
            message.clone().with_lifetime(lifetime)
        };
        let units_consumed =
            simulate_compute_units(rpc, &simulation_message, commitment, abort).await?;
        let units =
            estimate_compute_unit_limit(units_consumed, config.compute_unit_limit_multiplier);
        debug!(units_consumed, units, "estimated compute unit limit");

        let instruction = ComputeBudgetInstruction::set_compute_unit_limit(units);
        message = match limit_index {
            Some(index) => message.with_replaced_instruction(index, instruction),
            None => message.with_appended_instructions([instruction]),
        };
    }

    if config.blockhash_reset || !had_lifetime {
        let lifetime = fetch_latest_lifetime(rpc, commitment, abort).await?;
        message = message.with_lifetime(lifetime);
    }

    if let Some(log_wire) = &config.log_wire {
        log_wire(&message.to_base64_wire()?);
    }

    Ok(message)
}

async fn simulate_compute_units(
    rpc: &RpcClient,
    message: &TransactionMessage,
    commitment: CommitmentLevel,
    abort: Option<&CancellationToken>,
) -> Result<u64> {
    let transaction = message.to_unsigned_transaction()?;
    let config = RpcSimulateTransactionConfig {
        sig_verify: false,
        replace_recent_blockhash: false,
        commitment: Some(CommitmentConfig { commitment }),
        encoding: Some(UiTransactionEncoding::Base64),
        ..RpcSimulateTransactionConfig::default()
    };
    let response = abortable(
        abort,
        rpc.simulate_transaction_with_config(&transaction, config),
    )
    .await?;
    if let Some(err) = &response.value.err {
        warn!(%err, "simulation reported an error while estimating compute units");
    }
    Ok(response.value.units_consumed.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BlockhashLifetime, TransactionVersion};
    use crate::tests::{mock_lifetime, MockRpc};
    use rstest::rstest;
    use solana_pubkey::Pubkey;
    use solana_system_interface::instruction::transfer;
    use std::sync::{Arc, Mutex};

    fn transfer_message(payer: Pubkey) -> TransactionMessage {
        TransactionMessage::new(TransactionVersion::Legacy)
            .with_fee_payer(payer)
            .with_appended_instructions([transfer(&payer, &Pubkey::new_unique(), 10)])
    }

    #[rstest]
    #[case(0, 1.1, 200_000)]
    #[case(1_000, 1.1, 1_100)]
    #[case(1_001, 1.1, 1_102)]
    #[case(1, 0.1, 1)]
    #[case(500_000, 1.1, 550_000)]
    #[case(1_300_000, 1.1, 1_400_000)]
    #[case(u64::MAX, 1.1, 1_400_000)]
    fn test_estimate_compute_unit_limit(
        #[case] units_consumed: u64,
        #[case] multiplier: f64,
        #[case] expected: u32,
    ) {
        assert_eq!(
            estimate_compute_unit_limit(units_consumed, multiplier),
            expected
        );
    }

    #[test]
    fn test_compute_unit_limit_detection() {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_price(5),
            ComputeBudgetInstruction::set_compute_unit_limit(123_456),
        ];
        assert_eq!(find_compute_unit_limit_index(&instructions), Some(1));
        assert_eq!(get_compute_unit_limit(&instructions), Some(123_456));
        assert_eq!(get_compute_unit_price(&instructions), Some(5));
        assert_eq!(get_compute_unit_limit(&instructions[..1]), None);
    }

    #[test]
    fn test_prefix_skips_existing_kinds() {
        let existing = vec![ComputeBudgetInstruction::set_compute_unit_limit(10)];
        let prefix = compute_budget_prefix(&existing, Some(20), Some(7));
        assert_eq!(prefix.len(), 1);
        assert!(is_set_compute_unit_price_instruction(&prefix[0]));
        assert!(compute_budget_prefix(&existing, None, None).is_empty());
    }

    #[tokio::test]
    async fn test_appends_limit_and_refreshes_lifetime() {
        let rpc = MockRpc::new().with_units_consumed(Some(1_000));
        let client = rpc.client();
        let payer = Pubkey::new_unique();
        let original = transfer_message(payer).with_lifetime(mock_lifetime(200));

        let tuned = prepare_transaction(
            &client,
            original.clone(),
            &PrepareTransactionConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(tuned.instructions().len(), 2);
        assert_eq!(get_compute_unit_limit(tuned.instructions()), Some(1_100));
        assert_ne!(tuned.lifetime(), original.lifetime());
        assert_eq!(original.instructions().len(), 1);
        assert_eq!(rpc.count("simulateTransaction"), 1);
        assert_eq!(rpc.count("getLatestBlockhash"), 1);
    }

    #[tokio::test]
    async fn test_existing_limit_is_kept_without_reset() {
        let rpc = MockRpc::new().with_units_consumed(Some(1_000));
        let client = rpc.client();
        let payer = Pubkey::new_unique();
        let message = transfer_message(payer)
            .with_appended_instructions([ComputeBudgetInstruction::set_compute_unit_limit(50)])
            .with_lifetime(mock_lifetime(200));
        let config = PrepareTransactionConfig {
            blockhash_reset: false,
            ..PrepareTransactionConfig::default()
        };

        let tuned = prepare_transaction(&client, message, &config).await.unwrap();

        assert_eq!(get_compute_unit_limit(tuned.instructions()), Some(50));
        assert_eq!(tuned.lifetime(), Some(mock_lifetime(200)));
        assert!(rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reset_replaces_limit_in_place() {
        let rpc = MockRpc::new().with_units_consumed(Some(10_000));
        let client = rpc.client();
        let payer = Pubkey::new_unique();
        let message = transfer_message(payer)
            .with_appended_instructions([ComputeBudgetInstruction::set_compute_unit_limit(50)])
            .with_lifetime(mock_lifetime(200));
        let config = PrepareTransactionConfig {
            compute_unit_limit_reset: true,
            blockhash_reset: false,
            ..PrepareTransactionConfig::default()
        };

        let tuned = prepare_transaction(&client, message, &config).await.unwrap();

        assert_eq!(tuned.instructions().len(), 2);
        assert_eq!(find_compute_unit_limit_index(tuned.instructions()), Some(1));
        assert_eq!(get_compute_unit_limit(tuned.instructions()), Some(11_000));
    }

    #[tokio::test]
    async fn test_missing_units_fall_back_to_default() {
        let rpc = MockRpc::new().with_units_consumed(None);
        let client = rpc.client();
        let message = transfer_message(Pubkey::new_unique()).with_lifetime(mock_lifetime(200));
        let tuned = prepare_transaction(&client, message, &PrepareTransactionConfig::default())
            .await
            .unwrap();
        assert_eq!(get_compute_unit_limit(tuned.instructions()), Some(200_000));
    }

    #[tokio::test]
    async fn test_message_without_lifetime_gets_one() {
        let rpc = MockRpc::new().with_units_consumed(Some(500));
        let client = rpc.client();
        let config = PrepareTransactionConfig {
            blockhash_reset: false,
            ..PrepareTransactionConfig::default()
        };
        let tuned = prepare_transaction(&client, transfer_message(Pubkey::new_unique()), &config)
            .await
            .unwrap();
        let lifetime: BlockhashLifetime = tuned.lifetime().unwrap();
        assert_eq!(lifetime.last_valid_block_height, 1_002);
        assert_eq!(rpc.count("getLatestBlockhash"), 2);
    }

    #[tokio::test]
    async fn test_simulation_uses_base64_without_sig_verify() {
        let rpc = MockRpc::new().with_units_consumed(Some(500));
        let client = rpc.client();
        let message = transfer_message(Pubkey::new_unique()).with_lifetime(mock_lifetime(200));
        prepare_transaction(&client, message, &PrepareTransactionConfig::default())
            .await
            .unwrap();
        let config = rpc.simulate_configs().pop().unwrap();
        assert_eq!(config["encoding"], "base64");
        assert_eq!(config["sigVerify"], false);
        assert_eq!(config["replaceRecentBlockhash"], false);
    }

    #[tokio::test]
    async fn test_wire_logger_receives_final_message() {
        let rpc = MockRpc::new().with_units_consumed(Some(500));
        let client = rpc.client();
        let logged = Arc::new(Mutex::new(Vec::new()));
        let sink = logged.clone();
        let config = PrepareTransactionConfig {
            log_wire: Some(Arc::new(move |wire: &str| {
                sink.lock().unwrap().push(wire.to_string())
            })),
            ..PrepareTransactionConfig::default()
        };
        let message = transfer_message(Pubkey::new_unique()).with_lifetime(mock_lifetime(200));

        let tuned = prepare_transaction(&client, message, &config).await.unwrap();

        let logged = logged.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0], tuned.to_base64_wire().unwrap());
    }

    #[tokio::test]
    async fn test_aborted_before_simulation() {
        let rpc = MockRpc::new();
        let client = rpc.client();
        let abort = CancellationToken::new();
        abort.cancel();
        let config = PrepareTransactionConfig {
            abort: Some(abort),
            ..PrepareTransactionConfig::default()
        };
        let message = transfer_message(Pubkey::new_unique()).with_lifetime(mock_lifetime(200));
        let result = prepare_transaction(&client, message, &config).await;
        assert!(matches!(result, Err(crate::TransactionError::Aborted)));
        assert!(rpc.calls().is_empty());
    }
}
