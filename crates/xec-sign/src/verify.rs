//! Template-level script verification.
//!
//! Evaluates a push-only unlocking script against the standard locking
//! templates the signer produces: P2PK, P2PKH, bare multisig and P2SH
//! wrapping one of those. Signature validity is delegated to a
//! [`SignatureChecker`]. Anything else fails.
//!
//! The unlocking script must leave exactly the stack the template consumes,
//! and the multisig dummy element must be empty.

use xec_primitives::hash::hash160;
use xec_script::{solve, Script, ScriptTemplate};

use crate::SignatureChecker;

/// Check that `script_sig` satisfies `script_pubkey`.
///
/// # Arguments
/// * `script_sig` - The unlocking script; must be push-only.
/// * `script_pubkey` - The locking script being spent.
/// * `checker` - Validates each signature.
///
/// # Returns
/// `true` if the spend is valid for the recognised template.
pub fn verify_script(
    script_sig: &Script,
    script_pubkey: &Script,
    checker: &dyn SignatureChecker,
) -> bool {
    let Ok(mut stack) = script_sig.push_only_stack() else {
        return false;
    };

    match solve(script_pubkey) {
        ScriptTemplate::ScriptHash(script_id) => {
            let Some(redeem) = stack.pop() else {
                return false;
            };
            if hash160(&redeem) != *script_id.as_bytes() {
                return false;
            }
            let redeem_script = Script::from(redeem);
            match solve(&redeem_script) {
                ScriptTemplate::ScriptHash(_) => false,
                template => verify_template(&template, &redeem_script, &stack, checker),
            }
        }
        template => verify_template(&template, script_pubkey, &stack, checker),
    }
}

fn verify_template(
    template: &ScriptTemplate,
    script_code: &Script,
    stack: &[Vec<u8>],
    checker: &dyn SignatureChecker,
) -> bool {
    match (template, stack) {
        (ScriptTemplate::PubKey(pub_key), [sig]) => checker.check_sig(sig, pub_key, script_code),
        (ScriptTemplate::PubKeyHash(key_id), [sig, pub_key]) => {
            hash160(pub_key) == *key_id.as_bytes() && checker.check_sig(sig, pub_key, script_code)
        }
        (ScriptTemplate::Multisig { required, pub_keys }, [dummy, sigs @ ..]) => {
            dummy.is_empty()
                && sigs.len() == *required
                && check_multisig(sigs, pub_keys, script_code, checker)
        }
        _ => false,
    }
}

/// Ordered CHECKMULTISIG matching: each signature must verify against a
/// key that comes after the key matched by the previous signature.
fn check_multisig(
    sigs: &[Vec<u8>],
    pub_keys: &[Vec<u8>],
    script_code: &Script,
    checker: &dyn SignatureChecker,
) -> bool {
    let mut keys = pub_keys.iter();
    for sig in sigs {
        if sig.is_empty() {
            return false;
        }
        if !keys.any(|key| checker.check_sig(sig, key, script_code)) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DummySignatureChecker;
    use xec_primitives::ec::PrivateKey;

    /// Accepts a signature only if it equals the key's first byte repeated.
    struct ToyChecker;

    impl SignatureChecker for ToyChecker {
        fn check_sig(&self, sig: &[u8], pub_key: &[u8], _script_code: &Script) -> bool {
            sig == [pub_key[1], 0x41]
        }
    }

    fn pub_key(byte: u8) -> Vec<u8> {
        PrivateKey::from_bytes(&[byte; 32]).unwrap().pub_key().to_bytes()
    }

    fn toy_sig(key: &[u8]) -> Vec<u8> {
        vec![key[1], 0x41]
    }

    #[test]
    fn test_verify_p2pk_and_p2pkh() {
        let key = pub_key(1);
        let p2pk = Script::p2pk(&key).unwrap();
        let sig = toy_sig(&key);
        assert!(verify_script(&Script::push_all(&[&sig]).unwrap(), &p2pk, &ToyChecker));
        assert!(!verify_script(&Script::push_all(&[&sig, &sig]).unwrap(), &p2pk, &ToyChecker));

        let p2pkh = Script::p2pkh(&xec_primitives::KeyId::hash_of(&key));
        let good = Script::push_all(&[&sig, &key]).unwrap();
        assert!(verify_script(&good, &p2pkh, &ToyChecker));
        let wrong_key = Script::push_all(&[&sig, &pub_key(2)]).unwrap();
        assert!(!verify_script(&wrong_key, &p2pkh, &DummySignatureChecker));
    }

    #[test]
    fn test_verify_multisig_ordering() {
        let keys = vec![pub_key(1), pub_key(2), pub_key(3)];
        let script = Script::multisig(2, &keys).unwrap();
        let (s1, s2, s3) = (toy_sig(&keys[0]), toy_sig(&keys[1]), toy_sig(&keys[2]));
        let empty = Vec::new();

        assert!(verify_script(&Script::push_all(&[&empty, &s1, &s3]).unwrap(), &script, &ToyChecker));
        assert!(verify_script(&Script::push_all(&[&empty, &s2, &s3]).unwrap(), &script, &ToyChecker));
        // Out of key order.
        assert!(!verify_script(&Script::push_all(&[&empty, &s3, &s1]).unwrap(), &script, &ToyChecker));
        // Padding slot left empty.
        assert!(!verify_script(&Script::push_all(&[&empty, &s1, &empty]).unwrap(), &script, &ToyChecker));
        // Non-empty dummy.
        assert!(!verify_script(&Script::push_all(&[&s2, &s1, &s3]).unwrap(), &script, &ToyChecker));
        // Too few signatures.
        assert!(!verify_script(&Script::push_all(&[&empty, &s1]).unwrap(), &script, &ToyChecker));
    }

    #[test]
    fn test_verify_p2sh() {
        let keys = vec![pub_key(1), pub_key(2)];
        let redeem = Script::multisig(1, &keys).unwrap();
        let p2sh = Script::p2sh(&redeem.script_id());
        let sig = toy_sig(&keys[1]);
        let empty = Vec::new();

        let good = Script::push_all(&[&empty, &sig, &redeem.clone().into_bytes()]).unwrap();
        assert!(verify_script(&good, &p2sh, &ToyChecker));

        let other = Script::multisig(1, &[pub_key(3)]).unwrap();
        let wrong_redeem = Script::push_all(&[&empty, &sig, &other.into_bytes()]).unwrap();
        assert!(!verify_script(&wrong_redeem, &p2sh, &DummySignatureChecker));

        // P2SH inside P2SH is not evaluated.
        let inner = Script::p2sh(&redeem.script_id());
        let outer = Script::p2sh(&inner.script_id());
        let nested = Script::push_all(&[inner.to_bytes()]).unwrap();
        assert!(!verify_script(&nested, &outer, &DummySignatureChecker));
    }

    #[test]
    fn test_verify_rejects_non_push_and_nonstandard() {
        let key = pub_key(1);
        let p2pk = Script::p2pk(&key).unwrap();
        assert!(!verify_script(&p2pk, &p2pk, &DummySignatureChecker));
        let op_true = Script::from_bytes(&[0x51]);
        assert!(!verify_script(&Script::new(), &op_true, &DummySignatureChecker));
    }
}
