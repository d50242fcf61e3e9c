//! Error types for the chainkit engine.
//!
//! One enum per concern, aggregated into [`ChainError`]. Whether a failure is
//! worth retrying against another backend is decided in exactly one place,
//! [`ChainError::is_transient`].

use thiserror::Error;

use crate::chain::Curve;

/// Coarse classification of a [`ChainError`], for callers mapping failures to messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure: timeouts, refused connections, 5xx, rate limits, garbage bodies.
    Network,
    /// Account state does not allow the operation (balance, resource, existence).
    Account,
    /// The transfer intent or chain parameters are malformed or incomplete.
    Build,
    /// The external signer failed or the user cancelled.
    Signing,
    /// The chain or API rejected the request with its own code and message.
    Remote,
    /// Misconfiguration or local infrastructure (storage, registry).
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request timed out")] Timeout,
    #[error("connection failed: {0}")] Connection(String),
    #[error("http status {status}: {body}")] Http { status: u16, body: String },
    #[error("undecodable response: {0}")] Decode(String),
    #[error("invalid request: {0}")] InvalidRequest(String),
    #[error("provider failure ({code}): {message}")] ProviderFailure { code: i64, message: String },
}

impl NetworkError {
    /// Whether another backend could plausibly serve the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::Decode(_) => true,
            Self::ProviderFailure { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::InvalidRequest(_) => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("account not found: {0}")] NotFound(String),
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: u128, required: u128 },
    #[error("insufficient {resource}: available {available}, required {required}, max {max}")]
    InsufficientFeeResource { resource: String, available: u128, required: u128, max: u128 },
    #[error("amount exceeds {resource} left after fee: available {available}")]
    FeeResourceExceedsBalance { resource: String, available: u128 },
    #[error("remaining balance below existential deposit {minimum}")]
    BelowExistentialDeposit { minimum: u128 },
    #[error("unsupported operation: {0}")] Unsupported(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing required field: {0}")] MissingField(&'static str),
    #[error("invalid intent: {0}")] InvalidIntent(String),
    #[error("encoding: {0}")] Encoding(String),
    #[error("signature count mismatch: expected {expected}, got {actual}")]
    SignatureCount { expected: usize, actual: usize },
    #[error("invalid signature: {0}")] InvalidSignature(String),
    #[error("transaction already submitted as {0}")] AlreadySubmitted(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing cancelled")] Cancelled,
    #[error("signer rejected request: {0}")] Rejected(String),
    #[error("signer device error: {0}")] Device(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid HRP")] InvalidHrp,
    #[error("invalid length")] InvalidLength,
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid version: {0}")] InvalidVersion(u8),
    #[error("invalid padding bits")] InvalidPadding,
    #[error("missing separator")] MissingSeparator,
    #[error("mixed case")] MixedCase,
    #[error("invalid public key for {0}")] InvalidPublicKey(Curve),
    #[error("unsupported curve: {0}")] UnsupportedCurve(Curve),
    #[error("wallet has no default address")] MissingDefault,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("negative amount: {0}")] Negative(String),
    #[error("malformed amount: {0}")] Malformed(String),
    #[error("more than {decimals} fractional digits: {value}")] TooPrecise { value: String, decimals: u8 },
    #[error("amount overflow")] Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("spend {spend} plus fee {fee} overflows")] AmountOverflow { spend: u64, fee: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")] Unavailable(String),
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown chain: {0}")] UnknownChain(String),
    #[error("empty provider list")] EmptyProviderList,
    #[error("no plugin for chain: {0}")] NoPlugin(String),
    #[error("invalid configuration: {0}")] Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Account(#[from] AccountError),
    #[error(transparent)] Build(#[from] BuildError),
    #[error(transparent)] Signing(#[from] SignerError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error(transparent)] Amount(#[from] AmountError),
    #[error(transparent)] Selection(#[from] SelectionError),
    #[error(transparent)] Storage(#[from] StorageError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error("remote rejected request ({code}): {message}")] Remote { code: i64, message: String },
}

impl ChainError {
    /// Wrap a chain API rejection, keeping code and message verbatim.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::Remote { code, message: message.into() }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Account(_) => ErrorKind::Account,
            Self::Build(_) | Self::Address(_) | Self::Amount(_) | Self::Selection(_) => {
                ErrorKind::Build
            }
            Self::Signing(_) => ErrorKind::Signing,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Storage(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// The single retry predicate used by provider rotation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_transient())
    }

    /// Whether the user cancelled the signing step.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Signing(SignerError::Cancelled))
    }
}
