//! Minimal Aptos fullnode and faucet REST calls.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{DeployError, Result};

const APT_COIN_TYPE: &str = "0x1::aptos_coin::AptosCoin";

pub struct AptosClient {
    client: Client,
    node_url: String,
}

impl AptosClient {
    pub fn new(client: Client, node_url: String) -> Self {
        Self { client, node_url }
    }

    /// APT balance in octas. Accounts the chain has never seen report zero.
    pub async fn balance(&self, address: &str) -> Result<u64> {
        let resp = self
            .client
            .post(format!("{}/view", self.node_url))
            .json(&balance_view_request(address))
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            if is_missing_account(status.as_u16(), &body) {
                debug!("Account {address} not found on chain; treating balance as 0");
                return Ok(0);
            }
            return Err(DeployError::Node {
                status: status.as_u16(),
                message: node_message(&body),
            });
        }
        parse_balance(&body)
    }

    /// Ask a mint faucet to fund `address`.
    pub async fn fund(&self, faucet_url: &str, address: &str, amount: u64) -> Result<()> {
        let resp = self
            .client
            .post(format!("{faucet_url}/mint"))
            .query(&[("amount", amount.to_string()), ("address", address.to_string())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("Faucet refused funding: {message}");
            return Err(DeployError::Node {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

fn balance_view_request(address: &str) -> Value {
    json!({
        "function": "0x1::coin::balance",
        "type_arguments": [APT_COIN_TYPE],
        "arguments": [address],
    })
}

/// The view call answers `["<u64 as string>"]`.
fn parse_balance(body: &Value) -> Result<u64> {
    let raw = body.get(0).ok_or_else(|| DeployError::Node {
        status: 200,
        message: format!("unexpected view response: {body}"),
    })?;
    let parsed = match raw {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.ok_or_else(|| DeployError::Node {
        status: 200,
        message: format!("balance is not a u64: {raw}"),
    })
}

fn node_message(body: &Value) -> String {
    body.get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.to_string())
}

fn is_missing_account(status: u16, body: &Value) -> bool {
    if status == 404 {
        return true;
    }
    let code = body.get("error_code").and_then(|c| c.as_str()).unwrap_or("");
    let message = node_message(body);
    code == "account_not_found"
        || code == "resource_not_found"
        || message.contains("ECOIN_STORE_NOT_PUBLISHED")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_request_targets_apt_balance() {
        let req = balance_view_request("0xabc");
        assert_eq!(req["function"], "0x1::coin::balance");
        assert_eq!(req["type_arguments"][0], "0x1::aptos_coin::AptosCoin");
        assert_eq!(req["arguments"][0], "0xabc");
    }

    #[test]
    fn parses_string_and_numeric_balances() {
        assert_eq!(parse_balance(&json!(["150000000"])).unwrap(), 150_000_000);
        assert_eq!(parse_balance(&json!([42])).unwrap(), 42);
        assert!(parse_balance(&json!([])).is_err());
        assert!(parse_balance(&json!(["lots"])).is_err());
    }

    #[test]
    fn missing_accounts_are_recognised() {
        assert!(is_missing_account(404, &Value::Null));
        assert!(is_missing_account(
            400,
            &json!({ "message": "Account not found", "error_code": "account_not_found" })
        ));
        assert!(is_missing_account(
            400,
            &json!({ "message": "Move abort in 0x1::coin: ECOIN_STORE_NOT_PUBLISHED(0x60005)", "error_code": "invalid_input" })
        ));
        assert!(!is_missing_account(
            500,
            &json!({ "message": "internal", "error_code": "internal_error" })
        ));
    }
}
