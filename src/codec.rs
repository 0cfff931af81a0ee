//! The external serializer/deserializer seam: `spec.md` §4.7, §9a.
//!
//! The queue core only ever moves bytes. Turning a `T` into bytes and back
//! is entirely the caller's concern, expressed as a [`Codec`]: a plain pair
//! of encode/decode functions, not tied to any particular object model
//! (`original_source/`'s custom integer codec test is the direct ancestor of
//! this trait; see `SPEC_FULL.md` §9b).

use crate::error::BoxError;

/// Encodes values of type `T` to bytes and back, for a [`crate::Queue`].
///
/// Both methods run outside the queue's mutex: `encode` before the lock is
/// acquired, `decode` after it is released (`spec.md` §4.2, §7). A failure
/// here never touches ring state.
pub trait Codec<T>: Send + Sync + 'static {
    /// Serializes `value` to bytes.
    fn encode(&self, value: &T) -> Result<Vec<u8>, BoxError>;
    /// Deserializes bytes produced by `encode` back into a value.
    fn decode(&self, bytes: &[u8]) -> Result<T, BoxError>;
}

/// Passthrough codec for callers who already work in raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, BoxError> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError> {
        Ok(bytes.to_vec())
    }
}

#[cfg(feature = "bincode")]
mod bincode_codec {
    use super::Codec;
    use crate::error::BoxError;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use std::marker::PhantomData;

    /// Convenience codec backed by `bincode`, for any
    /// `T: Serialize + DeserializeOwned`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BincodeCodec<T>(PhantomData<fn() -> T>);

    impl<T> BincodeCodec<T> {
        /// Creates a new codec. `T` is inferred or spelled out at the
        /// [`crate::Queue`] construction site.
        pub fn new() -> Self {
            Self(PhantomData)
        }
    }

    impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Codec<T> for BincodeCodec<T> {
        fn encode(&self, value: &T) -> Result<Vec<u8>, BoxError> {
            bincode::serialize(value).map_err(|e| Box::new(e) as BoxError)
        }

        fn decode(&self, bytes: &[u8]) -> Result<T, BoxError> {
            bincode::deserialize(bytes).map_err(|e| Box::new(e) as BoxError)
        }
    }
}
#[cfg(feature = "bincode")]
pub use bincode_codec::BincodeCodec;
