//! Blob transaction pricing, assembly, encoding and signing

mod assembler;
mod fees;
mod signer;
mod types;

pub use assembler::{CallParams, TransactionAssembler};
pub use fees::{
    FeeEstimator, FeeParameters, FeePolicy, BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN,
    BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE,
};
pub use signer::{LocalSigner, Signer, SigningDomain};
pub use types::{SignedBlobTransaction, UnsignedBlobTransaction};

#[cfg(test)]
pub use signer::MockSigner;
