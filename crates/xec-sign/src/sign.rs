//! The signature production pipeline.
//!
//! `produce_signature` classifies a locking script, gathers keys and
//! signatures for it, and assembles an unlocking script. P2SH is unwrapped
//! exactly one level. Partial progress (for example one signature of a
//! 2-of-3 multisig) is kept in [`SignatureData`] so that co-signers can
//! merge their contributions later.

use log::{debug, trace};
use xec_primitives::ec::PublicKey;
use xec_primitives::KeyId;
use xec_script::{solve, Script, ScriptTemplate};
use xec_transaction::{SigHashType, Transaction, TransactionInput, TransactionOutput};

use crate::checker::{SignatureChecker, SignatureExtractorChecker, TransactionSignatureChecker};
use crate::creator::{
    MutableTransactionSignatureCreator, SignatureCreator, DUMMY_SIGNATURE_CREATOR,
};
use crate::verify::verify_script;
use crate::{SignError, SignatureData, SigningProvider};

/// Outcome of signing one script level.
struct SignStep {
    solved: bool,
    template: ScriptTemplate,
    stack: Vec<Vec<u8>>,
}

/// Find the public key for `key_id`: recorded signatures first, then
/// public keys met earlier, then the provider. A provider hit also records
/// the key's origin when the provider knows it.
fn get_pub_key(
    provider: &dyn SigningProvider,
    sigdata: &mut SignatureData,
    key_id: &KeyId,
) -> Option<PublicKey> {
    if let Some((pub_key, _)) = sigdata.signatures.get(key_id) {
        return Some(pub_key.clone());
    }
    if let Some((pub_key, _)) = sigdata.misc_pubkeys.get(key_id) {
        return Some(pub_key.clone());
    }
    let pub_key = provider.get_pub_key(key_id)?;
    if let Some(origin) = provider.get_key_origin(key_id) {
        sigdata
            .misc_pubkeys
            .entry(*key_id)
            .or_insert_with(|| (pub_key.clone(), origin));
    }
    Some(pub_key)
}

/// Reuse a recorded signature for `key_id` or ask the creator for one.
///
/// New signatures are recorded against the key, found through
/// `get_pub_key` or taken from `known_key` (the key listed in the script).
fn create_sig(
    creator: &dyn SignatureCreator,
    sigdata: &mut SignatureData,
    provider: &dyn SigningProvider,
    key_id: &KeyId,
    known_key: Option<&PublicKey>,
    script_code: &Script,
) -> Option<Vec<u8>> {
    if let Some((_, sig)) = sigdata.signatures.get(key_id) {
        trace!("reusing signature for key {}", key_id);
        return Some(sig.clone());
    }
    let pub_key = get_pub_key(provider, sigdata, key_id).or_else(|| known_key.cloned());
    let sig = creator.create_sig(provider, key_id, script_code)?;
    if let Some(pub_key) = pub_key {
        sigdata.signatures.insert(*key_id, (pub_key, sig.clone()));
    }
    Some(sig)
}

/// Produce the stack items satisfying one level of `script`.
///
/// For P2SH the single stack item is the redeem script; the caller signs
/// it in a second step.
fn sign_step(
    provider: &dyn SigningProvider,
    creator: &dyn SignatureCreator,
    script: &Script,
    sigdata: &mut SignatureData,
) -> SignStep {
    let template = solve(script);
    let mut stack = Vec::new();

    let solved = match &template {
        ScriptTemplate::NonStandard | ScriptTemplate::NullData => false,
        ScriptTemplate::PubKey(key_bytes) => match PublicKey::from_bytes(key_bytes) {
            Ok(pub_key) => {
                let key_id = pub_key.key_id();
                match create_sig(creator, sigdata, provider, &key_id, Some(&pub_key), script) {
                    Some(sig) => {
                        stack.push(sig);
                        true
                    }
                    None => false,
                }
            }
            Err(_) => false,
        },
        ScriptTemplate::PubKeyHash(key_id) => {
            match create_sig(creator, sigdata, provider, key_id, None, script) {
                Some(sig) => match get_pub_key(provider, sigdata, key_id) {
                    Some(pub_key) => {
                        stack.push(sig);
                        stack.push(pub_key.to_bytes());
                        true
                    }
                    None => false,
                },
                None => false,
            }
        }
        ScriptTemplate::ScriptHash(script_id) => {
            let redeem = provider.get_script(script_id).or_else(|| {
                (sigdata.redeem_script.script_id() == *script_id)
                    .then(|| sigdata.redeem_script.clone())
            });
            match redeem {
                Some(redeem) => {
                    stack.push(redeem.into_bytes());
                    true
                }
                None => false,
            }
        }
        ScriptTemplate::Multisig { required, pub_keys } => {
            // CHECKMULTISIG pops one extra element.
            stack.push(Vec::new());
            for key_bytes in pub_keys {
                if stack.len() > *required {
                    break;
                }
                let Ok(pub_key) = PublicKey::from_bytes(key_bytes) else {
                    continue;
                };
                let key_id = pub_key.key_id();
                if let Some(sig) =
                    create_sig(creator, sigdata, provider, &key_id, Some(&pub_key), script)
                {
                    stack.push(sig);
                }
            }
            let ok = stack.len() == required + 1;
            stack.resize(required + 1, Vec::new());
            ok
        }
    };

    SignStep {
        solved,
        template,
        stack,
    }
}

/// Try to satisfy `script_pubkey`, recording progress in `sigdata`.
///
/// Does nothing if `sigdata` is already complete. Otherwise signs one
/// level (two for P2SH), stores the assembled unlocking script in
/// `sigdata.script_sig`, and marks the data complete when that script
/// verifies under the creator's checker.
///
/// # Arguments
/// * `provider` - Source of keys, public keys and redeem scripts.
/// * `creator` - Produces the signatures.
/// * `script_pubkey` - The locking script being spent.
/// * `sigdata` - Accumulated state; updated in place.
///
/// # Returns
/// Whether `sigdata` is now complete.
pub fn produce_signature(
    provider: &dyn SigningProvider,
    creator: &dyn SignatureCreator,
    script_pubkey: &Script,
    sigdata: &mut SignatureData,
) -> bool {
    if sigdata.complete {
        return true;
    }

    let SignStep {
        mut solved,
        template,
        mut stack,
    } = sign_step(provider, creator, script_pubkey, sigdata);

    if solved {
        if let ScriptTemplate::ScriptHash(_) = template {
            let subscript = Script::from(stack.pop().unwrap_or_default());
            sigdata.redeem_script = subscript.clone();

            let inner = sign_step(provider, creator, &subscript, sigdata);
            solved = inner.solved && !matches!(inner.template, ScriptTemplate::ScriptHash(_));
            stack = inner.stack;
            stack.push(subscript.into_bytes());
        }
    }

    sigdata.script_sig = match Script::push_all(&stack) {
        Ok(script) => script,
        Err(e) => {
            debug!("produce_signature: cannot assemble unlocking script: {}", e);
            return false;
        }
    };
    sigdata.complete = solved && verify_script(&sigdata.script_sig, script_pubkey, creator.checker());

    debug!(
        "produce_signature: template={} solved={} complete={} signatures={}",
        template,
        solved,
        sigdata.complete,
        sigdata.signatures.len()
    );
    sigdata.complete
}

/// Whether `script` could be signed given the keys' public halves.
///
/// Runs the pipeline with placeholder signatures, so no private keys are
/// needed, only public keys and redeem scripts.
pub fn is_solvable(provider: &dyn SigningProvider, script: &Script) -> bool {
    let mut sigdata = SignatureData::new();
    produce_signature(provider, &DUMMY_SIGNATURE_CREATOR, script, &mut sigdata)
}

/// Sign input `input_index` of `tx`, which spends `amount` locked by
/// `script_pubkey`.
///
/// The input's unlocking script is overwritten only when signing
/// completes; on failure the input is left unmodified.
///
/// # Returns
/// `Ok(true)` when complete, `Ok(false)` when the script could not be fully
/// satisfied, or `InputIndexOutOfRange`.
pub fn sign_signature(
    provider: &dyn SigningProvider,
    script_pubkey: &Script,
    tx: &mut Transaction,
    input_index: usize,
    amount: u64,
    sighash: SigHashType,
) -> Result<bool, SignError> {
    if input_index >= tx.inputs.len() {
        return Err(SignError::InputIndexOutOfRange {
            index: input_index,
            count: tx.inputs.len(),
        });
    }

    let mut sigdata = SignatureData::new();
    let complete = {
        let creator = MutableTransactionSignatureCreator::new(tx, input_index, amount, sighash);
        produce_signature(provider, &creator, script_pubkey, &mut sigdata)
    };
    if complete {
        update_input(&mut tx.inputs[input_index], &sigdata);
    }
    Ok(complete)
}

/// Sign input `input_index` of `tx_to`, looking up the spent output in
/// `tx_from`.
///
/// # Returns
/// As [`sign_signature`], plus `PrevoutMismatch` when `tx_from` is not the
/// transaction the input spends and `PrevoutIndexOutOfRange` when it has no
/// such output.
pub fn sign_signature_from_tx(
    provider: &dyn SigningProvider,
    tx_from: &Transaction,
    tx_to: &mut Transaction,
    input_index: usize,
    sighash: SigHashType,
) -> Result<bool, SignError> {
    let input = tx_to
        .inputs
        .get(input_index)
        .ok_or(SignError::InputIndexOutOfRange {
            index: input_index,
            count: tx_to.inputs.len(),
        })?;

    let from_id = tx_from.tx_id();
    if from_id.as_bytes() != &input.source_txid {
        return Err(SignError::PrevoutMismatch {
            expected: hex_txid(&input.source_txid),
            found: from_id.to_string(),
        });
    }

    let vout = input.source_tx_out_index;
    let txout = tx_from
        .outputs
        .get(vout as usize)
        .ok_or(SignError::PrevoutIndexOutOfRange {
            index: vout,
            count: tx_from.outputs.len(),
        })?;

    let script_pubkey = txout.locking_script.clone();
    let amount = txout.satoshis;
    sign_signature(provider, &script_pubkey, tx_to, input_index, amount, sighash)
}

fn hex_txid(txid: &[u8; 32]) -> String {
    let mut display = *txid;
    display.reverse();
    hex::encode(display)
}

/// Recover signing state from an existing, possibly partial, unlocking
/// script of input `input_index`.
///
/// A fully valid script yields complete data carrying every signature that
/// checked. Otherwise the P2SH redeem script (last push) is recovered and,
/// for multisig, each pushed signature is matched to the next key it
/// verifies against.
///
/// # Arguments
/// * `tx` - The transaction holding the unlocking script.
/// * `input_index` - Which input to read.
/// * `txout` - The output being spent.
pub fn data_from_transaction(
    tx: &Transaction,
    input_index: usize,
    txout: &TransactionOutput,
) -> Result<SignatureData, SignError> {
    let input = tx
        .inputs
        .get(input_index)
        .ok_or(SignError::InputIndexOutOfRange {
            index: input_index,
            count: tx.inputs.len(),
        })?;

    let mut data = SignatureData::new();
    data.script_sig = input.unlocking_script.clone();
    let mut stack = data.script_sig.push_only_stack().unwrap_or_default();

    let tx_checker = TransactionSignatureChecker::new(tx, input_index, txout.satoshis);
    let extractor = SignatureExtractorChecker::new(&tx_checker);

    if verify_script(&data.script_sig, &txout.locking_script, &extractor) {
        data.complete = true;
        data.signatures = extractor.into_signatures();
        return Ok(data);
    }

    let mut template = solve(&txout.locking_script);
    let mut next_script = txout.locking_script.clone();

    if matches!(template, ScriptTemplate::ScriptHash(_)) {
        if let Some(redeem) = stack.pop().filter(|r| !r.is_empty()) {
            next_script = Script::from(redeem);
            data.redeem_script = next_script.clone();
            template = solve(&next_script);
        }
    }

    if let ScriptTemplate::Multisig { pub_keys, .. } = &template {
        let mut last_success_key = 0;
        for sig in &stack {
            for (i, key_bytes) in pub_keys.iter().enumerate().skip(last_success_key) {
                let key_id = KeyId::hash_of(key_bytes);
                if extractor.has_signature(&key_id)
                    || extractor.check_sig(sig, key_bytes, &next_script)
                {
                    last_success_key = i + 1;
                    break;
                }
            }
        }
    }

    data.signatures = extractor.into_signatures();
    debug!(
        "data_from_transaction: input {} yielded {} signatures",
        input_index,
        data.signatures.len()
    );
    Ok(data)
}

/// Write the assembled unlocking script into `input`.
pub fn update_input(input: &mut TransactionInput, sigdata: &SignatureData) {
    input.unlocking_script = sigdata.script_sig.clone();
}
