//! Co-signing scenarios exchanged through the base64 transport form.

use xec_primitives::ec::PrivateKey;
use xec_psbt::{extract_transaction, fill_psbt, finalize, PartiallySignedTransaction, PsbtError};
use xec_script::Script;
use xec_sign::{
    FlatSigningProvider, KeyOriginInfo, SigningProvider, TransactionSignatureChecker,
};
use xec_sign::verify::verify_script;
use xec_transaction::{SigHashType, Transaction, TransactionInput, TransactionOutput};

fn keys() -> Vec<PrivateKey> {
    (1u8..=3).map(|b| PrivateKey::from_bytes(&[b; 32]).unwrap()).collect()
}

fn redeem_script(keys: &[PrivateKey]) -> Script {
    let pubs: Vec<Vec<u8>> = keys.iter().map(|k| k.pub_key().to_bytes()).collect();
    Script::multisig(2, &pubs).unwrap()
}

/// A PSBT spending one 2-of-3 P2SH output, as the coordinator creates it.
fn coordinator_psbt(redeem: &Script) -> PartiallySignedTransaction {
    let mut tx = Transaction::new();
    tx.add_input(TransactionInput::from_outpoint([0xab; 32], 2));
    tx.add_output(TransactionOutput::with_script(49_000, Script::from_bytes(&[0x51])));
    let mut psbt = PartiallySignedTransaction::new(tx).unwrap();
    psbt.inputs[0].utxo = Some(TransactionOutput::with_script(
        50_000,
        Script::p2sh(&redeem.script_id()),
    ));
    psbt.inputs[0].redeem_script = redeem.clone();
    psbt
}

fn signer(key: &PrivateKey, index: u32) -> FlatSigningProvider {
    let mut provider = FlatSigningProvider::new();
    let key_id = provider.add_key(key.clone());
    provider.add_key_origin(key_id, KeyOriginInfo::new([index as u8; 4], vec![index]));
    provider
}

fn sign_copy(encoded: &str, provider: &dyn SigningProvider) -> (bool, String) {
    let mut psbt = PartiallySignedTransaction::from_base64(encoded).unwrap();
    let complete = fill_psbt(provider, &mut psbt, SigHashType::ALL_FORKID, true, true).unwrap();
    (complete, psbt.to_base64())
}

#[test]
fn two_of_three_partial_then_complete() {
    let keys = keys();
    let redeem = redeem_script(&keys);
    let encoded = coordinator_psbt(&redeem).to_base64();

    // Signers one and three work independently on their own copies.
    let (complete_a, signed_a) = sign_copy(&encoded, &signer(&keys[0], 0));
    let (complete_c, signed_c) = sign_copy(&encoded, &signer(&keys[2], 2));
    assert!(!complete_a && !complete_c);

    let a = PartiallySignedTransaction::from_base64(&signed_a).unwrap();
    let c = PartiallySignedTransaction::from_base64(&signed_c).unwrap();
    assert_eq!(a.inputs[0].partial_sigs.len(), 1);
    assert_eq!(c.inputs[0].partial_sigs.len(), 1);
    assert_eq!(a.inputs[0].hd_keypaths.len(), 1);

    // Merging in either order yields the same container.
    let ac = PartiallySignedTransaction::merged(&a, &c).unwrap();
    let ca = PartiallySignedTransaction::merged(&c, &a).unwrap();
    assert_eq!(ac.to_bytes(), ca.to_bytes());
    assert_eq!(ac.inputs[0].partial_sigs.len(), 2);

    let mut combined = ac;
    assert!(finalize(&mut combined));
    let input = &combined.inputs[0];
    assert!(input.partial_sigs.is_empty());
    assert!(input.redeem_script.is_empty());

    // OP_0, signature by key 1, signature by key 3, redeem script.
    let stack = input.final_script_sig.push_only_stack().unwrap();
    assert_eq!(stack.len(), 4);
    assert!(stack[0].is_empty());
    assert_eq!(stack[1], a.inputs[0].partial_sigs[&keys[0].key_id()].1);
    assert_eq!(stack[2], c.inputs[0].partial_sigs[&keys[2].key_id()].1);
    assert_eq!(stack[3], redeem.to_bytes());

    let tx = extract_transaction(&combined).unwrap();
    let checker = TransactionSignatureChecker::new(&tx, 0, 50_000);
    let script_pubkey = Script::p2sh(&redeem.script_id());
    assert!(verify_script(&tx.inputs[0].unlocking_script, &script_pubkey, &checker));

    // The final form survives another round trip.
    let reparsed = PartiallySignedTransaction::from_base64(&combined.to_base64()).unwrap();
    assert_eq!(reparsed.to_bytes(), combined.to_bytes());
}

#[test]
fn second_signer_completes_sequentially() {
    let keys = keys();
    let redeem = redeem_script(&keys);
    let encoded = coordinator_psbt(&redeem).to_base64();

    let (complete, after_first) = sign_copy(&encoded, &signer(&keys[1], 1));
    assert!(!complete);
    let (complete, after_second) = sign_copy(&after_first, &signer(&keys[0], 0));
    assert!(complete);

    let psbt = PartiallySignedTransaction::from_base64(&after_second).unwrap();
    assert!(!psbt.inputs[0].final_script_sig.is_empty());
    assert!(extract_transaction(&psbt).is_ok());
}

#[test]
fn finalize_without_enough_signatures_fails() {
    let keys = keys();
    let redeem = redeem_script(&keys);
    let encoded = coordinator_psbt(&redeem).to_base64();
    let (_, signed) = sign_copy(&encoded, &signer(&keys[0], 0));

    let mut psbt = PartiallySignedTransaction::from_base64(&signed).unwrap();
    assert!(!finalize(&mut psbt));
    assert_eq!(psbt.inputs[0].partial_sigs.len(), 1);
    assert!(matches!(extract_transaction(&psbt), Err(PsbtError::NotFinalized(0))));
}

#[test]
fn p2pkh_single_signer() {
    let key = PrivateKey::from_bytes(&[9; 32]).unwrap();
    let mut tx = Transaction::new();
    tx.add_input(TransactionInput::from_outpoint([0xcd; 32], 0));
    tx.add_output(TransactionOutput::with_script(700, Script::p2pkh(&key.key_id())));
    let mut psbt = PartiallySignedTransaction::new(tx).unwrap();
    psbt.inputs[0].utxo = Some(TransactionOutput::with_script(800, Script::p2pkh(&key.key_id())));

    let provider = signer(&key, 0);
    assert!(fill_psbt(&provider, &mut psbt, SigHashType::ALL_FORKID, true, true).unwrap());
    // The change output is recognized as ours.
    assert_eq!(psbt.outputs[0].hd_keypaths.len(), 1);

    let tx = extract_transaction(&psbt).unwrap();
    let checker = TransactionSignatureChecker::new(&tx, 0, 800);
    assert!(verify_script(
        &tx.inputs[0].unlocking_script,
        &Script::p2pkh(&key.key_id()),
        &checker
    ));
}
