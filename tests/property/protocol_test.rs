// tests/property/protocol_test.rs

//! Property-based tests for the client message decoder

use cloudvar::core::CloudVarError;
use cloudvar::core::protocol::{ClientMessage, VariableValue};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_decode_arbitrary_text_never_panics(text in ".{0,200}") {
        match ClientMessage::decode(&text) {
            Ok(_) | Err(CloudVarError::Decode(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_decode_accepts_any_scalar_set(
        name in "[a-zA-Z0-9_ ]{1,32}",
        number in any::<i64>(),
        text in "[ -~]{0,32}",
        flag in any::<bool>(),
    ) {
        for value in [
            VariableValue::from(number),
            VariableValue::from(text.as_str()),
            VariableValue::from(flag),
        ] {
            let raw = json!({"method": "set", "name": name, "value": serde_json::Value::from(value.clone())});
            let decoded = ClientMessage::decode(&raw.to_string()).unwrap();
            prop_assert_eq!(
                decoded,
                ClientMessage::Set { name: name.clone(), value, user: None }
            );
        }
    }
}
