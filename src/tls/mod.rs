//! TLS handling module
//!
//! This module owns everything OpenSSL: the server credentials loaded at
//! startup, the per-connection endpoint, and certificate helpers.

pub mod cert;
mod credentials;
mod endpoint;

pub use cert::{certificate_info, describe_name, load_cert};
pub use credentials::{CredentialMode, ServerCredentials, ANON_CIPHER_LIST};
pub use endpoint::{HandshakeFailure, PeerVerification, TlsEndpoint};
