use near_sdk::json_types::U128;
use near_sdk::serde::{Deserialize, Serialize};
use near_sdk::{env, serde_json, AccountId, PromiseResult};

/// One unit of work in a governance batch. The JSON field names and their
/// order are the wire format the foreign governor encodes against, so they
/// must not be renamed or reordered.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(crate = "near_sdk::serde")]
pub struct GovernanceCall {
    pub contract_id: AccountId,
    /// Attached amount in yoctoNEAR, decimal string to avoid precision loss.
    #[serde(default = "zero_deposit")]
    pub deposit: U128,
    /// Execution budget in TGas; a missing field means the default budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    pub method_name: String,
    pub args: Vec<u8>,
}

fn zero_deposit() -> U128 {
    U128(0)
}

/// Outcome of one dispatched call, reported in batch order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(crate = "near_sdk::serde")]
pub struct CallResult {
    pub success: bool,
    pub result: Option<Vec<u8>>,
}

impl CallResult {
    /// `result` carries data only for a successful call that returned some.
    pub fn from_promise(result: PromiseResult) -> Self {
        match result {
            PromiseResult::Successful(data) if data.is_empty() => CallResult {
                success: true,
                result: None,
            },
            PromiseResult::Successful(data) => CallResult {
                success: true,
                result: Some(data),
            },
            _ => CallResult {
                success: false,
                result: None,
            },
        }
    }
}

pub fn encode_batch(calls: &[GovernanceCall]) -> Vec<u8> {
    // A batch built from valid calls cannot fail to serialize
    #[allow(clippy::redundant_closure)]
    serde_json::to_vec(calls).ok().unwrap_or_else(|| env::abort())
}

/// All-or-nothing decode of an authenticated payload. Anything but a
/// complete array of well-formed records aborts before execution begins.
pub fn decode_batch(data: &[u8]) -> Vec<GovernanceCall> {
    let calls: Vec<GovernanceCall> =
        serde_json::from_slice(data).unwrap_or_else(|_| env::panic_str("MalformedPayload"));
    for call in &calls {
        if call.method_name.is_empty() {
            env::panic_str("MalformedPayload");
        }
    }
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::VMContextBuilder;
    use near_sdk::testing_env;

    fn setup() {
        testing_env!(VMContextBuilder::new().build());
    }

    fn registry() -> AccountId {
        "contract_000.sub_olas.olas_000.testnet".parse().unwrap()
    }

    #[test]
    fn round_trip() {
        setup();
        let calls = vec![
            GovernanceCall {
                contract_id: registry(),
                deposit: U128(0),
                gas: None,
                method_name: "is_paused".to_string(),
                args: vec![],
            },
            GovernanceCall {
                contract_id: "gov_000.sub_olas.olas_000.testnet".parse().unwrap(),
                deposit: U128(100_000_000_000_000_000),
                gas: Some(5),
                method_name: "test_payable".to_string(),
                args: br#"{"account_id":"gov_000.sub_olas.olas_000.testnet"}"#.to_vec(),
            },
        ];
        assert_eq!(decode_batch(&encode_batch(&calls)), calls);
    }

    #[test]
    fn round_trip_empty_batch() {
        setup();
        let bytes = encode_batch(&[]);
        assert_eq!(bytes, b"[]");
        assert!(decode_batch(&bytes).is_empty());
    }

    #[test]
    fn encode_is_canonical_json() {
        setup();
        let calls = vec![GovernanceCall {
            contract_id: registry(),
            deposit: U128(0),
            gas: Some(5),
            method_name: "version".to_string(),
            args: vec![],
        }];
        let encoded = String::from_utf8(encode_batch(&calls)).unwrap();
        assert_eq!(
            encoded,
            r#"[{"contract_id":"contract_000.sub_olas.olas_000.testnet","deposit":"0","gas":5,"method_name":"version","args":[]}]"#
        );
    }

    #[test]
    fn decode_defaults() {
        setup();
        let calls = decode_batch(
            br#"[{"contract_id":"contract_000.sub_olas.olas_000.testnet","method_name":"version","args":[]}]"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].deposit, U128(0));
        assert_eq!(calls[0].gas, None);
    }

    #[test]
    #[should_panic(expected = "MalformedPayload")]
    fn decode_rejects_non_array() {
        setup();
        decode_batch(br#"{"contract_id":"a.testnet","method_name":"m","args":[]}"#);
    }

    #[test]
    #[should_panic(expected = "MalformedPayload")]
    fn decode_rejects_missing_method_name() {
        setup();
        decode_batch(br#"[{"contract_id":"a.testnet","args":[]}]"#);
    }

    #[test]
    #[should_panic(expected = "MalformedPayload")]
    fn decode_rejects_empty_method_name() {
        setup();
        decode_batch(br#"[{"contract_id":"a.testnet","method_name":"","args":[]}]"#);
    }

    #[test]
    #[should_panic(expected = "MalformedPayload")]
    fn decode_rejects_arg_bytes_out_of_range() {
        setup();
        decode_batch(br#"[{"contract_id":"a.testnet","method_name":"m","args":[0,256]}]"#);
    }

    #[test]
    #[should_panic(expected = "MalformedPayload")]
    fn decode_rejects_trailing_bytes() {
        setup();
        decode_batch(br#"[] trailing"#);
    }

    #[test]
    #[should_panic(expected = "MalformedPayload")]
    fn decode_rejects_invalid_account() {
        setup();
        decode_batch(br#"[{"contract_id":"","method_name":"m","args":[]}]"#);
    }

    #[test]
    fn promise_outcomes_keep_order_and_isolate_failures() {
        setup();
        let outcomes = vec![
            PromiseResult::Successful(b"\"1.0.0\"".to_vec()),
            PromiseResult::Failed,
            PromiseResult::Successful(Vec::new()),
        ];
        let results: Vec<CallResult> = outcomes.into_iter().map(CallResult::from_promise).collect();
        assert_eq!(
            results,
            vec![
                CallResult {
                    success: true,
                    result: Some(b"\"1.0.0\"".to_vec()),
                },
                CallResult {
                    success: false,
                    result: None,
                },
                CallResult {
                    success: true,
                    result: None,
                },
            ]
        );
    }
}
