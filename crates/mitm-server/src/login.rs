//! Reading the controller's first request without losing it.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use eidc_protocol::controller::LoginInfo;
use eidc_protocol::{Direction, Message};
use http_wire::HttpFramer;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ServerError;

/// Read from a fresh controller connection until its first HTTP message
/// is complete, extract the [`LoginInfo`], and return every byte read so
/// far. The caller seeds the session's northbound framer with those
/// bytes, so the login request itself still gets relayed to the manager.
pub async fn peek_login<R>(
    reader: &mut R,
    read_timeout: Option<Duration>,
) -> Result<(LoginInfo, Bytes), ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut buffered = BytesMut::new();
    let mut buf = [0u8; 8192];

    loop {
        // Probe a copy so the original bytes stay intact for the session.
        let mut probe = HttpFramer::from_bytes(buffered.clone());
        match probe.next_frame() {
            Ok(Some(frame)) => {
                let msg = Message::parse(frame, Direction::Northbound)
                    .map_err(|err| ServerError::Login(err.to_string()))?;
                let login = LoginInfo::from_message(&msg)
                    .map_err(|err| ServerError::Login(err.to_string()))?;
                return Ok((login, buffered.freeze()));
            }
            Ok(None) => {}
            Err(err) => return Err(ServerError::Login(err.to_string())),
        }

        let read = reader.read(&mut buf);
        let n = match read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ServerError::Timeout)?,
            None => read.await,
        }
        .map_err(|err| ServerError::Login(err.to_string()))?;

        if n == 0 {
            return Err(ServerError::Login(
                "connection closed before login completed".into(),
            ));
        }
        buffered.extend_from_slice(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn login_wire() -> Vec<u8> {
        let body = r#"{"serialNumber":"0127F01A","siteKey":"ABC"}"#;
        format!(
            "POST /eidc/connected HTTP/1.1\r\nHost: fake.server.com\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\
             ServerKey: 9c6e4f93\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn peek_returns_login_and_all_buffered_bytes() {
        let (mut near, mut far) = tokio::io::duplex(16 * 1024);
        let wire = login_wire();
        let expected = wire.clone();
        tokio::spawn(async move {
            near.write_all(&wire).await.unwrap();
        });

        let (login, buffered) = peek_login(&mut far, None).await.unwrap();
        assert_eq!(login.host, "fake.server.com");
        assert_eq!(login.server_key, "9c6e4f93");
        assert_eq!(login.connected.serial_number, "0127F01A");
        assert_eq!(&buffered[..], &expected[..]);
    }

    #[tokio::test]
    async fn peek_handles_dribbled_bytes() {
        let (mut near, mut far) = tokio::io::duplex(16 * 1024);
        let wire = login_wire();
        tokio::spawn(async move {
            for chunk in wire.chunks(7) {
                near.write_all(chunk).await.unwrap();
            }
        });

        let (login, _) = peek_login(&mut far, None).await.unwrap();
        assert_eq!(login.connected.site_key, "ABC");
    }

    #[tokio::test]
    async fn peek_rejects_non_login_first_message() {
        let (mut near, mut far) = tokio::io::duplex(16 * 1024);
        tokio::spawn(async move {
            near.write_all(b"GET /eidc/status HTTP/1.1\r\nHost: h\r\n\r\n")
                .await
                .unwrap();
        });

        assert!(matches!(
            peek_login(&mut far, None).await,
            Err(ServerError::Login(_))
        ));
    }

    #[tokio::test]
    async fn peek_times_out_on_a_silent_peer() {
        let (_near, mut far) = tokio::io::duplex(16 * 1024);
        let result = peek_login(&mut far, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(ServerError::Timeout)));
    }
}
