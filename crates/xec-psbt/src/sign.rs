//! Driving the signing pipeline over PSBT inputs and outputs.

use log::{debug, warn};
use xec_sign::{
    produce_signature, DummySigningProvider, HidingSigningProvider,
    MutableTransactionSignatureCreator, SignError, SignatureData, SigningProvider,
};
use xec_transaction::{SigHashType, Transaction};

use crate::{PartiallySignedTransaction, PsbtError, PsbtInput};

/// Sign one PSBT input with whatever `provider` can contribute.
///
/// Existing partial signatures are reused, so co-signers can each call
/// this on their own copy and merge the results. Not knowing a key or not
/// having the UTXO yet is not an error.
///
/// The UTXO is compared against the source output attached to the
/// transaction input, when there is one. That attachment is local to an
/// in-memory [`Transaction`] and is not serialized, so a PSBT decoded from
/// bytes never gets this check.
///
/// # Arguments
/// * `provider` - Keys and scripts available to this signer.
/// * `tx` - The PSBT's unsigned transaction.
/// * `input` - The PSBT map of input `index`; updated in place.
/// * `index` - Which transaction input is being signed.
/// * `sighash` - Sighash type for new signatures.
///
/// # Returns
/// Whether the input is complete.
pub fn sign_psbt_input(
    provider: &dyn SigningProvider,
    tx: &Transaction,
    input: &mut PsbtInput,
    index: usize,
    sighash: SigHashType,
) -> Result<bool, PsbtError> {
    if index >= tx.inputs.len() {
        return Err(SignError::InputIndexOutOfRange {
            index,
            count: tx.inputs.len(),
        }
        .into());
    }
    if !input.final_script_sig.is_empty() {
        return Ok(true);
    }
    if !input.sighash_type.is_unset() && input.sighash_type != sighash {
        warn!(
            "input {} requires sighash {}, refusing {}",
            index, input.sighash_type, sighash
        );
        return Err(PsbtError::SighashMismatch {
            required: input.sighash_type,
            requested: sighash,
        });
    }

    let Some(utxo) = input.utxo.clone() else {
        debug!("input {} has no UTXO yet", index);
        return Ok(false);
    };
    if let Some(source) = tx.inputs[index].source_tx_output() {
        if *source != utxo {
            warn!("input {} UTXO disagrees with the transaction's source output", index);
            return Err(PsbtError::UtxoMismatch(index));
        }
    }

    let mut sigdata = SignatureData::new();
    input.fill_signature_data(&mut sigdata);
    let original = sigdata.clone();

    {
        let creator = MutableTransactionSignatureCreator::new(tx, index, utxo.satoshis, sighash);
        produce_signature(provider, &creator, &utxo.locking_script, &mut sigdata);
    }
    sigdata.merge(original);
    input.from_signature_data(&sigdata);

    debug!(
        "input {}: complete={} partial signatures={}",
        index,
        sigdata.complete,
        input.partial_sigs.len()
    );
    Ok(sigdata.complete)
}

/// Sign every input and annotate every output.
///
/// Inputs are signed through a view of `provider` that hides private keys
/// unless `sign` is set and hides key origins unless `include_origins` is
/// set. Outputs receive the redeem scripts and key origins the provider
/// knows, never anything secret.
///
/// Only a signing pass insists that an input's recorded sighash matches
/// `sighash`; an update-only pass makes no new signatures and keeps each
/// input's own sighash. On error `psbt` is left untouched.
///
/// # Returns
/// Whether every input is complete.
pub fn fill_psbt(
    provider: &dyn SigningProvider,
    psbt: &mut PartiallySignedTransaction,
    sighash: SigHashType,
    sign: bool,
    include_origins: bool,
) -> Result<bool, PsbtError> {
    let view = HidingSigningProvider::new(provider, !sign, !include_origins);
    let mut filled = psbt.clone();

    let mut complete = true;
    for index in 0..filled.inputs.len() {
        let recorded = filled.inputs[index].sighash_type;
        let input_sighash = if sign || recorded.is_unset() {
            sighash
        } else {
            recorded
        };
        complete &= filled.sign_input(&view, index, input_sighash)?;
    }
    for index in 0..filled.outputs.len() {
        filled.update_output(&view, index)?;
    }

    *psbt = filled;
    Ok(complete)
}

/// Turn every input whose partial data already satisfies its script into a
/// final scriptSig. No new signatures are made.
///
/// # Returns
/// Whether every input is now final.
pub fn finalize(psbt: &mut PartiallySignedTransaction) -> bool {
    let Some(tx) = psbt.tx.as_ref() else {
        return false;
    };

    let mut complete = true;
    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        let sighash = if input.sighash_type.is_unset() {
            SigHashType::default()
        } else {
            input.sighash_type
        };
        complete &= sign_psbt_input(&DummySigningProvider, tx, input, index, sighash).unwrap_or(false);
    }
    debug!("finalize: complete={}", complete);
    complete
}

/// Build the fully signed transaction from a finalized PSBT.
///
/// # Returns
/// The transaction with every unlocking script filled in, or
/// `NotFinalized` naming the first input without a final scriptSig.
pub fn extract_transaction(psbt: &PartiallySignedTransaction) -> Result<Transaction, PsbtError> {
    let mut tx = psbt.tx.clone().ok_or(PsbtError::MissingUnsignedTx)?;
    if psbt.inputs.len() != tx.inputs.len() {
        return Err(PsbtError::InputCountMismatch {
            expected: tx.inputs.len(),
            found: psbt.inputs.len(),
        });
    }
    for (index, (txin, input)) in tx.inputs.iter_mut().zip(&psbt.inputs).enumerate() {
        if input.final_script_sig.is_empty() {
            return Err(PsbtError::NotFinalized(index));
        }
        txin.unlocking_script = input.final_script_sig.clone();
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xec_primitives::ec::PrivateKey;
    use xec_script::Script;
    use xec_sign::{FlatSigningProvider, KeyOriginInfo};
    use xec_transaction::{TransactionInput, TransactionOutput};

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[byte; 32]).unwrap()
    }

    fn p2pkh_psbt(secret: &PrivateKey) -> PartiallySignedTransaction {
        let mut tx = Transaction::new();
        tx.add_input(TransactionInput::from_outpoint([0x01; 32], 0));
        tx.add_output(TransactionOutput::with_script(900, Script::p2pkh(&secret.key_id())));
        let mut psbt = PartiallySignedTransaction::new(tx).unwrap();
        psbt.inputs[0].utxo = Some(TransactionOutput::with_script(
            1000,
            Script::p2pkh(&secret.key_id()),
        ));
        psbt
    }

    #[test]
    fn test_sign_p2pkh_input() {
        let secret = key(1);
        let mut provider = FlatSigningProvider::new();
        provider.add_key(secret.clone());
        let mut psbt = p2pkh_psbt(&secret);

        assert!(psbt.sign_input(&provider, 0, SigHashType::ALL_FORKID).unwrap());
        let input = &psbt.inputs[0];
        assert!(!input.final_script_sig.is_empty());
        assert!(input.partial_sigs.is_empty());

        // A final input short-circuits even with a conflicting request.
        assert!(psbt.sign_input(&DummySigningProvider, 0, SigHashType::new(0x43)).unwrap());

        let tx = extract_transaction(&psbt).unwrap();
        assert_eq!(tx.inputs[0].unlocking_script, psbt.inputs[0].final_script_sig);
    }

    #[test]
    fn test_missing_utxo_is_not_an_error() {
        let secret = key(2);
        let mut provider = FlatSigningProvider::new();
        provider.add_key(secret.clone());
        let mut psbt = p2pkh_psbt(&secret);
        psbt.inputs[0].utxo = None;
        assert!(!psbt.sign_input(&provider, 0, SigHashType::ALL_FORKID).unwrap());
        assert!(psbt.inputs[0].is_null());
    }

    #[test]
    fn test_caller_misuse() {
        let secret = key(3);
        let mut provider = FlatSigningProvider::new();
        provider.add_key(secret.clone());

        let mut psbt = p2pkh_psbt(&secret);
        assert!(matches!(
            psbt.sign_input(&provider, 5, SigHashType::ALL_FORKID),
            Err(PsbtError::Sign(SignError::InputIndexOutOfRange { index: 5, count: 1 }))
        ));

        psbt.inputs[0].sighash_type = SigHashType::new(0xc1);
        assert!(matches!(
            psbt.sign_input(&provider, 0, SigHashType::ALL_FORKID),
            Err(PsbtError::SighashMismatch { .. })
        ));
        assert!(psbt.sign_input(&provider, 0, SigHashType::new(0xc1)).unwrap());

        let mut psbt = p2pkh_psbt(&secret);
        let mut tx = psbt.tx.clone().unwrap();
        tx.inputs[0].set_source_output(Some(TransactionOutput::with_script(
            999,
            Script::p2pkh(&secret.key_id()),
        )));
        let input = &mut psbt.inputs[0];
        assert!(matches!(
            sign_psbt_input(&provider, &tx, input, 0, SigHashType::ALL_FORKID),
            Err(PsbtError::UtxoMismatch(0))
        ));
    }

    #[test]
    fn test_fill_psbt_without_signing() {
        let secret = key(4);
        let mut provider = FlatSigningProvider::new();
        let key_id = provider.add_key(secret.clone());
        let origin = KeyOriginInfo::new([0xab; 4], vec![0x8000_0000, 7]);
        provider.add_key_origin(key_id, origin.clone());
        let mut psbt = p2pkh_psbt(&secret);

        assert!(!fill_psbt(&provider, &mut psbt, SigHashType::ALL_FORKID, false, true).unwrap());
        assert!(psbt.inputs[0].partial_sigs.is_empty());
        assert!(psbt.inputs[0].final_script_sig.is_empty());
        assert_eq!(psbt.inputs[0].hd_keypaths[&secret.pub_key()], origin);
        assert_eq!(psbt.outputs[0].hd_keypaths[&secret.pub_key()], origin);

        let mut hidden = p2pkh_psbt(&secret);
        assert!(fill_psbt(&provider, &mut hidden, SigHashType::ALL_FORKID, true, false).unwrap());
        assert!(hidden.outputs[0].hd_keypaths.is_empty());
        assert!(matches!(extract_transaction(&psbt), Err(PsbtError::NotFinalized(0))));
    }

    /// The attached source output does not survive encoding, so a decoded
    /// PSBT signs against its UTXO record alone.
    #[test]
    fn test_utxo_check_is_in_memory_only() {
        let secret = key(8);
        let mut provider = FlatSigningProvider::new();
        provider.add_key(secret.clone());

        let mut psbt = p2pkh_psbt(&secret);
        if let Some(tx) = psbt.tx.as_mut() {
            tx.inputs[0].set_source_output(Some(TransactionOutput::with_script(
                999,
                Script::p2pkh(&secret.key_id()),
            )));
        }
        let mut decoded = PartiallySignedTransaction::from_bytes(&psbt.to_bytes()).unwrap();

        assert!(matches!(
            psbt.sign_input(&provider, 0, SigHashType::ALL_FORKID),
            Err(PsbtError::UtxoMismatch(0))
        ));
        assert!(decoded.tx.as_ref().unwrap().inputs[0].source_tx_output().is_none());
        assert!(decoded.sign_input(&provider, 0, SigHashType::ALL_FORKID).unwrap());
    }

    fn two_input_psbt(secret: &PrivateKey) -> PartiallySignedTransaction {
        let mut tx = Transaction::new();
        tx.add_input(TransactionInput::from_outpoint([0x01; 32], 0));
        tx.add_input(TransactionInput::from_outpoint([0x02; 32], 1));
        tx.add_output(TransactionOutput::with_script(1500, Script::p2pkh(&secret.key_id())));
        let mut psbt = PartiallySignedTransaction::new(tx).unwrap();
        for input in &mut psbt.inputs {
            input.utxo = Some(TransactionOutput::with_script(
                1000,
                Script::p2pkh(&secret.key_id()),
            ));
        }
        psbt.inputs[1].sighash_type = SigHashType::ALL_FORKID.with_anyone_can_pay();
        psbt
    }

    /// An update-only pass accepts inputs that ask for a different sighash.
    #[test]
    fn test_fill_psbt_update_ignores_recorded_sighash() {
        let secret = key(6);
        let mut provider = FlatSigningProvider::new();
        let key_id = provider.add_key(secret.clone());
        let origin = KeyOriginInfo::new([0x11; 4], vec![3]);
        provider.add_key_origin(key_id, origin.clone());
        let mut psbt = two_input_psbt(&secret);

        assert!(!fill_psbt(&provider, &mut psbt, SigHashType::ALL_FORKID, false, true).unwrap());
        for input in &psbt.inputs {
            assert!(input.partial_sigs.is_empty());
            assert_eq!(input.hd_keypaths[&secret.pub_key()], origin);
        }
        assert_eq!(psbt.inputs[1].sighash_type.raw(), 0xc1);
    }

    /// A signing pass that fails on a later input leaves earlier inputs alone.
    #[test]
    fn test_fill_psbt_sighash_mismatch_changes_nothing() {
        let secret = key(7);
        let mut provider = FlatSigningProvider::new();
        let key_id = provider.add_key(secret.clone());
        provider.add_key_origin(key_id, KeyOriginInfo::new([0x22; 4], vec![1]));
        let mut psbt = two_input_psbt(&secret);
        let before = psbt.clone();

        assert!(matches!(
            fill_psbt(&provider, &mut psbt, SigHashType::ALL_FORKID, true, true),
            Err(PsbtError::SighashMismatch { .. })
        ));
        assert_eq!(psbt.inputs, before.inputs);
        assert_eq!(psbt.outputs, before.outputs);
        assert!(psbt.inputs[0].hd_keypaths.is_empty());
        assert!(psbt.inputs[0].final_script_sig.is_empty());
    }

    #[test]
    fn test_finalize_from_partial_signatures() {
        let secret = key(5);
        let mut provider = FlatSigningProvider::new();
        provider.add_key(secret.clone());
        let mut psbt = p2pkh_psbt(&secret);
        let tx = psbt.tx.clone().unwrap();

        // Produce a signature without finalizing.
        let mut sigdata = SignatureData::new();
        {
            let creator = MutableTransactionSignatureCreator::new(&tx, 0, 1000, SigHashType::ALL_FORKID);
            let script = psbt.inputs[0].utxo.clone().unwrap().locking_script;
            assert!(produce_signature(&provider, &creator, &script, &mut sigdata));
        }
        sigdata.complete = false;
        psbt.inputs[0].from_signature_data(&sigdata);
        assert_eq!(psbt.inputs[0].partial_sigs.len(), 1);

        assert!(finalize(&mut psbt));
        assert_eq!(psbt.inputs[0].final_script_sig, sigdata.script_sig);
        assert!(psbt.inputs[0].partial_sigs.is_empty());
    }
}
