// THEORY:
// The actuator is the car's motor controller, reachable over HTTP on the local
// network. The protocol is deliberately dumb: one GET per command, the
// command and its hold-duration in the query string, and a response body that
// nobody reads. Only "did it arrive" matters.
//
// `Actuator` is the seam between the dispatcher and the network so that the
// dispatcher can be exercised against an in-memory double.

use crate::core_modules::steering::ActuatorCommand;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Everything that can go wrong delivering a command. None of these are fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported actuator url `{0}` (expected http://host[:port]/path)")]
    InvalidUrl(String),
    #[error("actuator unreachable: {0}")]
    Io(#[from] std::io::Error),
    #[error("actuator did not answer within {0:?}")]
    Timeout(Duration),
    #[error("actuator answered with HTTP status {0}")]
    Status(u16),
    #[error("actuator sent a malformed response")]
    MalformedResponse,
}

/// Something that can carry a command to the car.
pub trait Actuator: Send + Sync + 'static {
    fn send(
        &self,
        command: &ActuatorCommand,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Talks to the firmware's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpActuator {
    host: String,
    port: u16,
    /// Path prefix every command is appended to, always ending in `/`.
    base_path: String,
    timeout: Duration,
}

impl HttpActuator {
    /// Parses a base URL such as `http://192.168.1.46/`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidUrl(base_url.to_string());

        let rest = base_url.strip_prefix("http://").ok_or_else(invalid)?;
        let (authority, path) = match rest.find('/') {
            Some(slash) => rest.split_at(slash),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let mut base_path = path.to_string();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }

        Ok(Self {
            host: host.to_string(),
            port,
            base_path,
            timeout,
        })
    }

    /// The full URL a command is sent to.
    pub fn url_for(&self, command: &ActuatorCommand) -> String {
        let authority = if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        format!("http://{}{}", authority, self.target_for(command))
    }

    fn target_for(&self, command: &ActuatorCommand) -> String {
        format!("{}{}", self.base_path, command.path())
    }

    async fn get(&self, target: &str) -> Result<u16, TransportError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;

        let host_header = if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        };
        let request = format!(
            "GET {target} HTTP/1.1\r\nHost: {host_header}\r\nUser-Agent: chroma_pilot\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).await?;
        let status = parse_status(status_line.as_bytes())
            .ok_or(TransportError::MalformedResponse)?;

        let mut content_length = None;
        let mut header = String::new();
        loop {
            header.clear();
            if reader.read_line(&mut header).await? == 0 {
                return Ok(status);
            }
            let line = header.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse::<u64>().ok();
                }
            }
        }

        // The body is drained so the firmware can finish cleanly, then dropped. Without a
        // length it runs until the firmware closes the connection.
        let mut sink = tokio::io::sink();
        match content_length {
            Some(length) => {
                let mut body = (&mut reader).take(length);
                tokio::io::copy(&mut body, &mut sink).await?;
            }
            None => {
                tokio::io::copy(&mut reader, &mut sink).await?;
            }
        }
        Ok(status)
    }
}

impl Actuator for HttpActuator {
    async fn send(&self, command: &ActuatorCommand) -> Result<(), TransportError> {
        let target = self.target_for(command);
        let status = timeout(self.timeout, self.get(&target))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }
}

/// Pulls the status code out of `HTTP/1.x NNN ...`.
fn parse_status(response: &[u8]) -> Option<u16> {
    let line_end = response
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(response.len());
    let line = std::str::from_utf8(&response[..line_end]).ok()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::steering::{Direction, SteeringZone};
    use tokio::net::TcpListener;

    const OK_REPLY: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    const KEEP_ALIVE_REPLY: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: keep-alive\r\n\r\nok";

    fn parsed(url: &str) -> HttpActuator {
        HttpActuator::new(url, Duration::from_secs(1)).unwrap()
    }

    fn local_actuator(port: u16, timeout: Duration) -> HttpActuator {
        let url = format!("http://127.0.0.1:{port}/");
        HttpActuator::new(&url, timeout).unwrap()
    }

    /// Serves exactly one request with `reply`, handing back the request line.
    async fn one_shot_server(reply: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).await.unwrap();
            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap() > 2 {
                line.clear();
            }
            reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
            request_line.trim_end().to_string()
        });
        (port, handle)
    }

    #[test]
    fn parses_base_urls() {
        let actuator = parsed("http://192.168.1.46/");
        let command = ActuatorCommand::manual(Direction::Forward, 40);
        assert_eq!(
            actuator.url_for(&command),
            "http://192.168.1.46/move?command=forward&duration=40"
        );

        let actuator = parsed("http://car.local:8080/api");
        assert_eq!(
            actuator.url_for(&command),
            "http://car.local:8080/api/move?command=forward&duration=40"
        );

        let actuator = parsed("http://10.0.0.2");
        assert_eq!(
            actuator.url_for(&command),
            "http://10.0.0.2/move?command=forward&duration=40"
        );
    }

    #[test]
    fn rejects_unsupported_urls() {
        for url in ["https://car/", "car/", "http://:80/", "http://car:port/"] {
            assert!(matches!(
                HttpActuator::new(url, Duration::from_secs(1)),
                Err(TransportError::InvalidUrl(_))
            ));
        }
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status(b"HTTP/1.1 200 OK\r\n\r\n"), Some(200));
        assert_eq!(parse_status(b"HTTP/1.0 404 Not Found\r\n"), Some(404));
        assert_eq!(parse_status(b"garbage"), None);
        assert_eq!(parse_status(b""), None);
    }

    #[tokio::test]
    async fn sends_get_with_command_and_duration() {
        let (port, server) = one_shot_server(OK_REPLY).await;
        let actuator = local_actuator(port, Duration::from_secs(2));

        let command = ActuatorCommand::for_zone(SteeringZone::Right, 40).unwrap();
        actuator.send(&command).await.unwrap();

        assert_eq!(
            server.await.unwrap(),
            "GET /move?command=left&mode2=1&duration=40 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn body_ends_at_content_length_on_a_kept_alive_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(KEEP_ALIVE_REPLY).await.unwrap();
            // Hold the connection open well past the request timeout.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let actuator = local_actuator(port, Duration::from_millis(500));
        let command = ActuatorCommand::manual(Direction::Forward, 40);
        let result = actuator.send(&command).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let reply = "HTTP/1.1 500 Internal Server Error\r\n\r\n";
        let (port, _server) = one_shot_server(reply).await;
        let actuator = local_actuator(port, Duration::from_secs(2));
        let result = actuator.send(&ActuatorCommand::speed(500, 20)).await;
        assert!(matches!(result, Err(TransportError::Status(500))));
    }

    #[tokio::test]
    async fn unreachable_actuator_is_an_io_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let actuator = local_actuator(port, Duration::from_secs(2));
        let command = ActuatorCommand::manual(Direction::Left, 40);
        let result = actuator.send(&command).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn silent_actuator_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let actuator = local_actuator(port, Duration::from_millis(100));
        let command = ActuatorCommand::manual(Direction::Left, 40);
        let result = actuator.send(&command).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
