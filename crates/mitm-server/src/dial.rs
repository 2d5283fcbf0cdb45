//! Outbound connection to the real manager.

use std::pin::Pin;
use std::sync::LazyLock;

use openssl::ssl::{Ssl, SslContext, SslMethod, SslVerifyMode};
use regex::Regex;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use crate::error::ServerError;
use crate::tls::{apply_legacy_profile, install_key_log, CLIENT_CIPHERS};

/// Transport used when dialing the manager a controller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialMode {
    /// TLS with the controller's cipher offer and no peer verification
    /// (the managers in the field present untrusted certificates).
    #[default]
    Tls,
    /// Plain TCP, for managers running without SSL.
    Plain,
}

static HAS_PORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(":[0-9]+$").expect("port regex"));

/// Append `:443` when the host string carries no port.
pub fn canonicalize_host(host: &str) -> String {
    if HAS_PORT.is_match(host) {
        host.to_string()
    } else {
        format!("{host}:443")
    }
}

/// A manager-side connection of either transport.
pub enum ManagerStream {
    Tls(SslStream<TcpStream>),
    Plain(TcpStream),
}

/// Dial the manager named by the controller's `Host` header.
pub async fn connect_manager(host: &str, mode: DialMode) -> Result<ManagerStream, ServerError> {
    let addr = canonicalize_host(host);
    let tcp = TcpStream::connect(&addr).await.map_err(|err| ServerError::Dial {
        host: addr.clone(),
        message: err.to_string(),
    })?;

    match mode {
        DialMode::Plain => Ok(ManagerStream::Plain(tcp)),
        DialMode::Tls => {
            let ctx = client_context()?;
            let mut ssl = Ssl::new(&ctx)?;
            ssl.set_hostname(host_without_port(&addr))?;
            let mut stream = SslStream::new(ssl, tcp)?;
            Pin::new(&mut stream)
                .connect()
                .await
                .map_err(|err| ServerError::Handshake(err.to_string()))?;
            Ok(ManagerStream::Tls(stream))
        }
    }
}

fn client_context() -> Result<SslContext, ServerError> {
    let mut builder = SslContext::builder(SslMethod::tls())?;
    apply_legacy_profile(&mut builder, CLIENT_CIPHERS)?;
    builder.set_verify(SslVerifyMode::NONE);
    install_key_log(&mut builder)?;
    Ok(builder.build())
}

fn host_without_port(addr: &str) -> &str {
    match addr.rfind(':') {
        Some(index) => &addr[..index],
        None => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_without_ports_gain_443() {
        for (input, expected) in [
            ("foo", "foo:443"),
            ("foo.bar", "foo.bar:443"),
            ("foo:1", "foo:1"),
            ("foo.bar:1", "foo.bar:1"),
            ("foo1", "foo1:443"),
            ("foo1.bar1", "foo1.bar1:443"),
            ("foo1:1", "foo1:1"),
            ("foo1.bar1:1", "foo1.bar1:1"),
        ] {
            assert_eq!(canonicalize_host(input), expected, "{input}");
        }
    }

    #[test]
    fn port_strip_for_sni() {
        assert_eq!(host_without_port("foo.bar:443"), "foo.bar");
        assert_eq!(host_without_port("bare"), "bare");
    }
}
