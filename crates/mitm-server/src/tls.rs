//! TLS contexts for the impersonated ecosystem.
//!
//! The controllers and the manager both date from the RC4 era: the
//! listener must offer `TLS_RSA_WITH_RC4_128_MD5` (OpenSSL `RC4-MD5`)
//! and the dialer additionally offers the 40-bit export variant. Modern
//! defaults reject these at security level 1, so both contexts pin
//! `@SECLEVEL=0`. Session tickets are off and the server's cipher order
//! wins, matching the devices' expectations. TLS secrets are appended to
//! a key-log file so captures of this traffic stay decryptable.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use openssl::pkey::PKey;
use openssl::ssl::{
    SslContext, SslContextBuilder, SslMethod, SslOptions, SslVersion,
};
use openssl::x509::X509;

use crate::error::ServerError;

/// Cipher string for the listener side.
const SERVER_CIPHERS: &str = "RC4-MD5:@SECLEVEL=0";

/// Cipher string for the manager dialer: the 40-bit export suite plus
/// the 128-bit one, exactly what a real controller offers.
pub(crate) const CLIENT_CIPHERS: &str = "EXP-RC4-MD5:RC4-MD5:@SECLEVEL=0";

/// Name of the append-only NSS key-log file in the user's home directory.
const KEY_LOG_FILE: &str = ".eidc-mitm.keys";

/// PEM leaf certificate and key (plus optional DER chain) presented to
/// connecting controllers.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    /// Additional chain certificates, DER encoded, sent after the leaf.
    pub chain_der: Vec<Vec<u8>>,
}

/// Build the listener-side TLS context.
pub(crate) fn server_context(identity: &TlsIdentity) -> Result<SslContext, ServerError> {
    let mut builder = SslContext::builder(SslMethod::tls())?;

    let cert = X509::from_pem(&identity.cert_pem)?;
    builder.set_certificate(&cert)?;
    let key = PKey::private_key_from_pem(&identity.key_pem)?;
    builder.set_private_key(&key)?;
    for der in &identity.chain_der {
        builder.add_extra_chain_cert(X509::from_der(der)?)?;
    }

    apply_legacy_profile(&mut builder, SERVER_CIPHERS)?;
    builder.set_options(SslOptions::CIPHER_SERVER_PREFERENCE | SslOptions::NO_TICKET);
    install_key_log(&mut builder)?;

    Ok(builder.build())
}

/// Constrain a context to the devices' protocol window and ciphers.
pub(crate) fn apply_legacy_profile(
    builder: &mut SslContextBuilder,
    ciphers: &str,
) -> Result<(), ServerError> {
    builder.set_cipher_list(ciphers)?;
    builder.set_min_proto_version(Some(SslVersion::TLS1))?;
    builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
    Ok(())
}

/// Register a key-log callback appending NSS-format lines to
/// `<home>/.eidc-mitm.keys`.
pub(crate) fn install_key_log(builder: &mut SslContextBuilder) -> Result<(), ServerError> {
    let path = key_log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(ServerError::KeyLog)?;
    let file = Mutex::new(file);

    builder.set_keylog_callback(move |_ssl, line| {
        if let Err(err) = append_line(&file, line) {
            tracing::warn!(%err, "failed to append to TLS key log");
        }
    });
    Ok(())
}

fn append_line(file: &Mutex<File>, line: &str) -> std::io::Result<()> {
    let mut file = file.lock().unwrap();
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")
}

fn key_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(KEY_LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_log_lands_in_home() {
        let path = key_log_path();
        assert!(path.ends_with(KEY_LOG_FILE));
    }
}
