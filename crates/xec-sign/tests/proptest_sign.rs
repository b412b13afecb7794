use proptest::prelude::*;

use xec_primitives::ec::PrivateKey;
use xec_script::Script;
use xec_sign::{
    is_solvable, produce_signature, FlatSigningProvider, SignatureData, DUMMY_SIGNATURE_CREATOR,
};

fn provider_with(seeds: &[u8]) -> (FlatSigningProvider, Vec<Vec<u8>>) {
    let mut provider = FlatSigningProvider::new();
    let mut pubs = Vec::new();
    for seed in seeds {
        let key = PrivateKey::from_bytes(&[*seed; 32]).unwrap();
        pubs.push(key.pub_key().to_bytes());
        provider.add_key(key);
    }
    (provider, pubs)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary locking scripts never panic the pipeline.
    #[test]
    fn arbitrary_scripts_do_not_panic(bytes in prop::collection::vec(any::<u8>(), 0..80)) {
        let (provider, _) = provider_with(&[1, 2]);
        let script = Script::from_bytes(&bytes);
        let mut sigdata = SignatureData::new();
        let complete = produce_signature(&provider, &DUMMY_SIGNATURE_CREATOR, &script, &mut sigdata);
        prop_assert_eq!(complete, sigdata.complete);
        prop_assert_eq!(complete, is_solvable(&provider, &script));
    }

    /// An m-of-n multisig with all keys known is solvable and carries
    /// exactly m signatures after the dummy.
    #[test]
    fn multisig_with_all_keys_is_solvable(n in 1usize..=5, m_seed in any::<usize>()) {
        let required = m_seed % n + 1;
        let seeds: Vec<u8> = (1..=n as u8).collect();
        let (provider, pubs) = provider_with(&seeds);
        let script = Script::multisig(required, &pubs).unwrap();

        let mut sigdata = SignatureData::new();
        prop_assert!(produce_signature(&provider, &DUMMY_SIGNATURE_CREATOR, &script, &mut sigdata));
        let stack = sigdata.script_sig.push_only_stack().unwrap();
        prop_assert_eq!(stack.len(), required + 1);
        prop_assert!(stack[0].is_empty());
        prop_assert!(stack[1..].iter().all(|sig| !sig.is_empty()));
    }
}
