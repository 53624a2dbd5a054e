use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("capsule expired")]
    CapsuleExpired,

    #[error("capsule signature invalid")]
    CapsuleSignatureInvalid,

    #[error("capsule too large: {0} bytes")]
    CapsuleTooLarge(usize),

    #[error("capsule version unsupported: {0}")]
    CapsuleVersionUnsupported(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] nt_crypto::CryptoError),
}
