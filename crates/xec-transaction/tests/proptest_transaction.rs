use proptest::prelude::*;

use xec_script::Script;
use xec_transaction::{SigHashType, Transaction, TransactionInput, TransactionOutput};

/// Strategy to generate a valid random transaction.
fn arb_transaction() -> impl Strategy<Value = Transaction> {
    let arb_input = (
        prop::array::uniform32(any::<u8>()),       // prev tx hash
        any::<u32>(),                              // prev tx index
        prop::collection::vec(any::<u8>(), 0..64), // script bytes
        any::<u32>(),                              // sequence
    )
        .prop_map(|(hash, idx, script_bytes, seq)| {
            let mut input = TransactionInput::from_outpoint(hash, idx);
            input.unlocking_script = Script::from_bytes(&script_bytes);
            input.sequence_number = seq;
            input
        });

    let arb_output = (any::<u64>(), prop::collection::vec(any::<u8>(), 0..64))
        .prop_map(|(satoshis, script_bytes)| {
            TransactionOutput::with_script(satoshis, Script::from_bytes(&script_bytes))
        });

    (
        any::<u32>(), // version
        prop::collection::vec(arb_input, 1..4),
        prop::collection::vec(arb_output, 1..4),
        any::<u32>(), // locktime
    )
        .prop_map(|(version, inputs, outputs, lock_time)| Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn transaction_serialize_deserialize_roundtrip(tx in arb_transaction()) {
        let bytes = tx.to_bytes();
        let tx2 = Transaction::from_bytes(&bytes).unwrap();
        prop_assert_eq!(&tx, &tx2);
        prop_assert_eq!(bytes, tx2.to_bytes());
    }

    #[test]
    fn transaction_hex_roundtrip(tx in arb_transaction()) {
        let tx2 = Transaction::from_hex(&tx.to_hex()).unwrap();
        prop_assert_eq!(tx.tx_id(), tx2.tx_id());
    }

    /// The digest never commits to unlocking scripts.
    #[test]
    fn sighash_ignores_unlocking_scripts(tx in arb_transaction(), amount in any::<u64>()) {
        let mut stripped = tx.clone();
        for input in &mut stripped.inputs {
            input.unlocking_script = Script::new();
        }
        let code = [0x51u8];
        let a = xec_transaction::sighash::signature_hash(&tx, 0, &code, SigHashType::ALL_FORKID, amount).unwrap();
        let b = xec_transaction::sighash::signature_hash(&stripped, 0, &code, SigHashType::ALL_FORKID, amount).unwrap();
        prop_assert_eq!(a, b);
    }
}
