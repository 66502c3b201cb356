//! Certificate handling module
//!
//! Helpers that turn X.509 certificates into the strings crywrap logs.

use openssl::hash::MessageDigest;
use openssl::x509::{X509, X509NameRef, X509Ref};
use std::path::Path;

use crate::common::fs::read_file;
use crate::common::{CertificateInfo, ProxyError, Result};

/// Format a distinguished name as `CN=..., O=...`
///
/// Entries that are not valid UTF-8 are skipped.
pub fn describe_name(name: &X509NameRef) -> String {
    let mut out = String::new();
    for entry in name.entries() {
        let Ok(key) = entry.object().nid().short_name() else {
            continue;
        };
        let Ok(value) = entry.data().as_utf8() else {
            continue;
        };
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(&format!("{}={}", key, value));
    }
    out
}

/// SHA-256 fingerprint as colon separated upper-case hex
pub fn fingerprint(cert: &X509Ref) -> Result<String> {
    let digest = cert.digest(MessageDigest::sha256())
        .map_err(|e| ProxyError::Certificate(format!("Failed to calculate certificate fingerprint: {}", e)))?;

    Ok(digest.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(":"))
}

/// Subject and fingerprint of an in-memory certificate
pub fn certificate_info(cert: &X509Ref) -> Result<CertificateInfo> {
    Ok(CertificateInfo {
        subject: describe_name(cert.subject_name()),
        fingerprint: fingerprint(cert)?,
    })
}

/// Load the first certificate of a PEM file
///
/// # Errors
///
/// Returns an error if the certificate cannot be read or parsed.
pub fn load_cert(cert_path: &Path) -> Result<X509> {
    let cert_data = read_file(cert_path, "Certificate")?;

    X509::from_pem(&cert_data)
        .map_err(|e| ProxyError::Certificate(format!(
            "Failed to parse certificate {}: {}", cert_path.display(), e
        )))
}
