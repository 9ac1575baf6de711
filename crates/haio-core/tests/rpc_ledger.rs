use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;

use haio_core::ledger::{
    AccountRef, Address, Commitment, Keypair, Ledger, LedgerError, ProgramCall, RpcLedger,
    TransferRequest,
};

fn addr(n: u8) -> Address {
    Address::from_bytes([n; 32])
}

fn ok(result: serde_json::Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

fn rpc_error(code: i64, message: &str) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message } })
        .to_string()
}

#[tokio::test]
async fn balance_is_read_from_a_decimal_string() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({
            "jsonrpc": "2.0",
            "method": "getBalance",
            "params": { "mint": addr(1), "owner": addr(2), "commitment": "finalized" }
        })))
        .with_header("content-type", "application/json")
        .with_body(ok(json!({ "amount": "18446744073709551615" })))
        .create_async()
        .await;

    let ledger = RpcLedger::new(server.url(), Commitment::Finalized).unwrap();
    let balance = ledger.get_balance(&addr(1), &addr(2)).await.unwrap();
    assert_eq!(balance, u64::MAX);
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_account_is_recognised() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(rpc_error(-32004, "could not find account"))
        .create_async()
        .await;

    let ledger = RpcLedger::new(server.url(), Commitment::Confirmed).unwrap();
    let err = ledger.get_balance(&addr(1), &addr(2)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)), "{err:?}");
}

#[tokio::test]
async fn program_errors_keep_code_and_message() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_header("content-type", "application/json")
        .with_body(rpc_error(6001, "insufficient liquidity"))
        .create_async()
        .await;

    let ledger = RpcLedger::new(server.url(), Commitment::Finalized).unwrap();
    let call = ProgramCall {
        program_id: addr(9),
        method: "swap_usdc_for_haio".into(),
        accounts: vec![AccountRef::new("operator", &addr(3))],
        args: json!({ "amount_in": 5 }),
        signers: vec![],
    };
    let err = ledger.invoke_program(call).await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::Program {
            code: 6001,
            message: "insufficient liquidity".into()
        }
    );
}

#[tokio::test]
async fn transfers_carry_instruction_signature_and_commitment() {
    let authority = Arc::new(Keypair::from_seed([4; 32]));
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({
                "method": "transfer",
                "params": {
                    "instruction": {
                        "mint": addr(1),
                        "from": authority.pubkey(),
                        "to": addr(5),
                        "amount": "42"
                    },
                    "commitment": "finalized"
                }
            })),
            Matcher::Regex(format!(r#""pubkey":"{}""#, authority.pubkey())),
        ]))
        .with_header("content-type", "application/json")
        .with_body(ok(json!({ "signature": "5igSig" })))
        .create_async()
        .await;

    let ledger = RpcLedger::new(server.url(), Commitment::Finalized).unwrap();
    let confirmation = ledger
        .transfer(TransferRequest {
            mint: addr(1),
            from: authority.pubkey(),
            to: addr(5),
            authority: authority.clone(),
            amount: 42,
        })
        .await
        .unwrap();
    assert_eq!(confirmation.signature, "5igSig");
    mock.assert_async().await;
}

#[tokio::test]
async fn http_failures_are_transport_errors() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(503)
        .create_async()
        .await;

    let ledger = RpcLedger::new(server.url(), Commitment::Finalized).unwrap();
    let err = ledger.get_balance(&addr(1), &addr(2)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Rpc(ref m) if m.contains("503")), "{err:?}");
}

#[tokio::test]
async fn engine_state_is_decoded() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "getEngineState" })))
        .with_header("content-type", "application/json")
        .with_body(ok(json!({
            "revenue_safe": addr(21),
            "reward_pool": addr(22),
            "dao_treasury": addr(23),
            "developer_treasury": addr(24),
            "ratios": { "staking_bps": 7000, "dao_bps": 2000, "developer_bps": 1000 },
            "rewards": {
                "total_staked_units": 4,
                "cumulative_reward_per_unit": 3937500000000000000u64,
                "last_distribution_time": null
            }
        })))
        .create_async()
        .await;

    let ledger = RpcLedger::new(server.url(), Commitment::Finalized).unwrap();
    let state = ledger.fetch_engine_state(&addr(20)).await.unwrap();
    assert_eq!(state.reward_pool, addr(22));
    assert_eq!(state.ratios.staking_bps, 7000);
    assert_eq!(state.rewards.total_staked_units, 4);
    assert_eq!(
        state.rewards.cumulative_reward_per_unit,
        3_937_500_000_000_000_000
    );
}
