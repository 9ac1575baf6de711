//! JSON-RPC 2.0 client for a ledger gateway.
//!
//! Reads are plain calls. Writes carry the instruction plus one ed25519
//! signature per required signer, computed over the serialized instruction
//! (serde_json renders object keys sorted, so the bytes are canonical). The
//! gateway answers only once the transaction reached the requested
//! commitment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    Address, BurnRequest, Commitment, Confirmation, EngineState, Keypair, Ledger, LedgerError,
    ProgramCall, TransferRequest,
};

/// Gateway error code for a token account that does not exist.
pub const ACCOUNT_NOT_FOUND_CODE: i64 = -32004;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    /// Decimal string; base-unit amounts can exceed 2^53.
    amount: String,
}

pub struct RpcLedger {
    client: reqwest::Client,
    url: String,
    commitment: Commitment,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>, commitment: Commitment) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            commitment,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Rpc(format!("{method}: HTTP {status}")));
        }
        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{method}: malformed response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(classify_error(err));
        }
        let result = parsed
            .result
            .ok_or_else(|| LedgerError::Rpc(format!("{method}: response has no result")))?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::Rpc(format!("{method}: unexpected result shape: {e}")))
    }

    async fn submit(
        &self,
        method: &str,
        instruction: Value,
        signers: &[&Keypair],
    ) -> Result<Confirmation, LedgerError> {
        let message =
            serde_json::to_vec(&instruction).map_err(|e| LedgerError::Signing(e.to_string()))?;
        let signatures: Vec<Value> = signers
            .iter()
            .map(|kp| json!({ "pubkey": kp.pubkey(), "signature": kp.sign(&message) }))
            .collect();
        let confirmation: Confirmation = self
            .call(
                method,
                json!({
                    "instruction": instruction,
                    "signatures": signatures,
                    "commitment": self.commitment,
                }),
            )
            .await?;
        debug!(method, signature = %confirmation.signature, "rpc transaction confirmed");
        Ok(confirmation)
    }
}

fn classify_error(err: RpcErrorBody) -> LedgerError {
    if err.code == ACCOUNT_NOT_FOUND_CODE || err.message.contains("could not find account") {
        LedgerError::AccountNotFound(err.message)
    } else {
        LedgerError::Program {
            code: err.code,
            message: err.message,
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn get_balance(&self, mint: &Address, owner: &Address) -> Result<u64, LedgerError> {
        let result: BalanceResult = self
            .call(
                "getBalance",
                json!({ "mint": mint, "owner": owner, "commitment": self.commitment }),
            )
            .await?;
        result
            .amount
            .parse()
            .map_err(|_| LedgerError::Rpc(format!("invalid balance amount '{}'", result.amount)))
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Confirmation, LedgerError> {
        let instruction = json!({
            "mint": request.mint,
            "from": request.from,
            "to": request.to,
            "authority": request.authority.pubkey(),
            "amount": request.amount.to_string(),
        });
        self.submit("transfer", instruction, &[request.authority.as_ref()])
            .await
    }

    async fn burn(&self, request: BurnRequest) -> Result<Confirmation, LedgerError> {
        let instruction = json!({
            "mint": request.mint,
            "owner": request.owner,
            "authority": request.authority.pubkey(),
            "amount": request.amount.to_string(),
        });
        self.submit("burn", instruction, &[request.authority.as_ref()])
            .await
    }

    async fn invoke_program(&self, call: ProgramCall) -> Result<Confirmation, LedgerError> {
        let instruction = json!({
            "programId": call.program_id,
            "method": call.method,
            "accounts": call.accounts,
            "args": call.args,
        });
        let signers: Vec<&Keypair> = call.signers.iter().map(|k| k.as_ref()).collect();
        self.submit("invokeProgram", instruction, &signers).await
    }

    async fn fetch_engine_state(&self, engine: &Address) -> Result<EngineState, LedgerError> {
        self.call(
            "getEngineState",
            json!({ "engine": engine, "commitment": self.commitment }),
        )
        .await
    }
}
