//! Error types shared by every fallible operation in the crate.
//!
//! A single [`Error`] carries a human readable message and, for failures that
//! callers branch on, a stable [`ErrorCode`]. Verification warnings reuse the
//! same type so that errors and warnings can be inspected uniformly.
//!
//! ```
//! use trustkit::error::{Error, ErrorCode};
//!
//! let err = Error::coded(ErrorCode::Expired, "certificate expired");
//! assert_eq!(err.code(), Some(ErrorCode::Expired));
//! assert_eq!(err.code_str(), Some("expired"));
//! assert_eq!(ErrorCode::Expired.code(), 200);
//! ```

use std::fmt;

use thiserror::Error;

/// Stable, machine readable failure codes.
///
/// The integer and string forms never change once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
#[repr(i32)]
pub enum ErrorCode {
    /// A certificate encoding could not be decoded.
    ParseCert = 100,
    /// A PEM block had a label other than `CERTIFICATE`.
    UnexpectedPemLabel = 101,
    /// A file could not be read.
    FileRead = 102,
    /// A file could not be written.
    FileWrite = 103,
    /// A directory could not be listed.
    DirectoryRead = 104,
    /// A value could not be encoded.
    Encode = 105,

    /// The certificate's `notAfter` lies in the past.
    Expired = 200,
    /// The certificate's `notBefore` lies in the future.
    NotYetValid = 201,
    /// A certificate used as an issuer is not a CA.
    NotCa = 202,
    /// A signature did not verify under the issuer's key.
    BadSignature = 203,
    /// A signature or key algorithm is not supported.
    UnsupportedAlgorithm = 204,
    /// No issuer for a certificate could be located.
    IssuerNotFound = 205,
    /// A certificate does not chain to a trusted root.
    UntrustedRoot = 206,
    /// An issuer's key usage does not allow certificate signing.
    KeyUsageViolation = 207,
    /// A CA's path length constraint was exceeded.
    PathLenExceeded = 208,
    /// Path building hit the maximum chain depth.
    ChainTooLong = 209,
    /// Testing roots are refused by hardened stores.
    TestingRootRejected = 210,

    /// A link is signed with a weak but accepted algorithm.
    WeakSignatureAlgorithm = 300,
    /// A key on the path is weaker than recommended.
    WeakKey = 301,
    /// The trust anchor expires soon.
    AnchorNearExpiry = 302,

    /// `download_all` was called with auto-download disabled.
    DownloadDisabled = 400,
    /// The remote CA bundle could not be fetched or was unusable.
    DownloadFailed = 401,
    /// The CA bundle cache could not be written.
    CacheWrite = 402,

    /// A PKCS#12 password was wrong.
    BadPassword = 500,
    /// A PKCS#12 container could not be decoded.
    DecodePkcs12 = 501,
    /// A PKCS#12 container could not be encoded.
    EncodePkcs12 = 502,
    /// The operation requires a private key that is not present.
    MissingKey = 503,
    /// Private or public key material is malformed.
    InvalidKey = 504,
}

impl ErrorCode {
    /// The stable integer form of the code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// The stable string form of the code.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseCert => "parse-cert",
            ErrorCode::UnexpectedPemLabel => "unexpected-pem-label",
            ErrorCode::FileRead => "file-read",
            ErrorCode::FileWrite => "file-write",
            ErrorCode::DirectoryRead => "directory-read",
            ErrorCode::Encode => "encode",
            ErrorCode::Expired => "expired",
            ErrorCode::NotYetValid => "not-yet-valid",
            ErrorCode::NotCa => "not-ca",
            ErrorCode::BadSignature => "bad-signature",
            ErrorCode::UnsupportedAlgorithm => "unsupported-algorithm",
            ErrorCode::IssuerNotFound => "issuer-not-found",
            ErrorCode::UntrustedRoot => "untrusted-root",
            ErrorCode::KeyUsageViolation => "key-usage-violation",
            ErrorCode::PathLenExceeded => "path-len-exceeded",
            ErrorCode::ChainTooLong => "chain-too-long",
            ErrorCode::TestingRootRejected => "testing-root-rejected",
            ErrorCode::WeakSignatureAlgorithm => "weak-signature-algorithm",
            ErrorCode::WeakKey => "weak-key",
            ErrorCode::AnchorNearExpiry => "anchor-near-expiry",
            ErrorCode::DownloadDisabled => "download-disabled",
            ErrorCode::DownloadFailed => "download-failed",
            ErrorCode::CacheWrite => "cache-write",
            ErrorCode::BadPassword => "bad-password",
            ErrorCode::DecodePkcs12 => "decode-pkcs12",
            ErrorCode::EncodePkcs12 => "encode-pkcs12",
            ErrorCode::MissingKey => "missing-key",
            ErrorCode::InvalidKey => "invalid-key",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents errors that can occur in the trustkit library.
///
/// Operational failures without a stable meaning are uncoded; trust and
/// integrity failures always carry an [`ErrorCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Error {
    code: Option<ErrorCode>,
    message: String,
}

impl Error {
    /// Creates an uncoded error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an error carrying `code`.
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Stable string identifier of the code, if any.
    pub fn code_str(&self) -> Option<&'static str> {
        self.code.map(ErrorCode::as_str)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_coded(&self) -> bool {
        self.code.is_some()
    }

    /// Returns `true` when this error carries exactly `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.code == Some(code)
    }

    /// Prefixes the message with `context`, keeping the code.
    pub(crate) fn context(self, context: impl fmt::Display) -> Self {
        Self {
            code: self.code,
            message: format!("{context}: {}", self.message),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::new(format!("DER error: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(format!("I/O error: {err}"))
    }
}

impl From<pem::PemError> for Error {
    fn from(err: pem::PemError) -> Self {
        Error::coded(ErrorCode::ParseCert, format!("malformed PEM: {err}"))
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Error::coded(ErrorCode::InvalidKey, format!("RSA error: {err}"))
    }
}

impl From<pkcs8::Error> for Error {
    fn from(err: pkcs8::Error) -> Self {
        Error::coded(ErrorCode::InvalidKey, format!("PKCS#8 error: {err}"))
    }
}

impl From<pkcs8::spki::Error> for Error {
    fn from(err: pkcs8::spki::Error) -> Self {
        Error::coded(ErrorCode::InvalidKey, format!("SPKI error: {err}"))
    }
}
