//! Syslog notification of raised alerts

use tokio::net::UdpSocket;

/// Fire-and-forget UDP sender for alert wire lines
#[derive(Debug, Clone)]
pub struct Notifier {
    host: String,
    port: u16,
}

impl Notifier {
    /// Create a notifier targeting `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Destination as `host:port`
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Send one wire line as a single datagram.
    ///
    /// No retry and no acknowledgment; the caller decides what a failure means.
    pub async fn send(&self, line: &str) -> Result<(), NotifierError> {
        tracing::info!(target_addr = %self.target(), "Sending alert: {}", line);

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| NotifierError::Socket(e.to_string()))?;

        let sent = socket
            .send_to(line.as_bytes(), (self.host.as_str(), self.port))
            .await
            .map_err(|e| NotifierError::Send(format!("{}: {}", self.target(), e)))?;

        if sent != line.len() {
            return Err(NotifierError::Send(format!(
                "{}: short write ({} of {} bytes)",
                self.target(),
                sent,
                line.len()
            )));
        }
        Ok(())
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Send error: {0}")]
    Send(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Alert;

    #[tokio::test]
    async fn test_send_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let alert = Alert::new("uc1", "now").with_target_user("root");
        let notifier = Notifier::new("127.0.0.1", port);
        notifier.send(&alert.to_wire_line()).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..len]).unwrap(),
            alert.to_wire_line()
        );
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let notifier = Notifier::new("host.invalid", 514);
        let result = notifier.send("line").await;
        assert!(matches!(result, Err(NotifierError::Send(_))));
    }

    #[test]
    fn test_target() {
        assert_eq!(Notifier::new("10.1.1.1", 514).target(), "10.1.1.1:514");
    }
}
