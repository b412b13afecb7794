use proptest::prelude::*;

use xec_primitives::KeyId;
use xec_script::{solve, Script, ScriptTemplate};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn push_all_evaluates_back_to_values(
        values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..8)
    ) {
        let script = Script::push_all(&values).unwrap();
        prop_assert!(script.is_push_only());
        prop_assert_eq!(script.push_only_stack().unwrap(), values);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let script = Script::from_bytes(&data);
        let _ = solve(&script);
        let _ = script.to_asm();
        let _ = script.is_push_only();
        prop_assert_eq!(script.to_bytes(), &data[..]);
    }

    #[test]
    fn p2pkh_always_solves(id in prop::array::uniform20(any::<u8>())) {
        let key_id = KeyId::new(id);
        prop_assert_eq!(solve(&Script::p2pkh(&key_id)), ScriptTemplate::PubKeyHash(key_id));
    }

    #[test]
    fn script_hex_roundtrip(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let script = Script::from_bytes(&data);
        let script2 = Script::from_hex(&script.to_hex()).unwrap();
        prop_assert_eq!(script, script2);
    }
}
