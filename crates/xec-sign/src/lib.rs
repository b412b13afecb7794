/// XEC SDK - Signing providers and the signature production pipeline.
///
/// Answers "which keys and scripts do we know", produces signatures for
/// the standard spending templates, and assembles complete or partial
/// unlocking scripts that can be merged across co-signers.

pub mod key_origin;
pub mod provider;
pub mod signature_data;
pub mod checker;
pub mod creator;
pub mod verify;
pub mod sign;

mod error;
pub use error::SignError;
pub use key_origin::KeyOriginInfo;
pub use provider::{
    merge_providers, DummySigningProvider, FlatSigningProvider, HidingSigningProvider,
    SigningProvider,
};
pub use signature_data::{SigPair, SignatureData};
pub use checker::{DummySignatureChecker, SignatureChecker, TransactionSignatureChecker};
pub use creator::{
    DummySignatureCreator, MutableTransactionSignatureCreator, SignatureCreator,
    DUMMY_MAXIMUM_SIGNATURE_CREATOR, DUMMY_SIGNATURE_CREATOR,
};
pub use sign::{
    data_from_transaction, is_solvable, produce_signature, sign_signature,
    sign_signature_from_tx, update_input,
};
