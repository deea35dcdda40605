//! The line-oriented channel the engine talks over.

use flightlink_common::error::LinkError;

use crate::async_trait;

/// A duplex, line-oriented channel to the simulator.
///
/// The engine owns exactly one transport and serializes every call to it, so
/// implementations never see concurrent use.
#[async_trait]
pub trait Transport: Send + 'static {
    /// A human readable name used in logs.
    const TRANSPORT_NAME: &'static str;

    /// Opens the channel.
    ///
    /// Fails with [`LinkError::Connection`] if the remote cannot be reached.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), LinkError>;

    /// Writes `line` followed by a newline.
    async fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Waits for the next full line and returns it without its terminator.
    ///
    /// Fails with [`LinkError::Closed`] on end of stream.
    async fn read_line(&mut self) -> Result<String, LinkError>;

    /// Releases the channel. Calling it while disconnected does nothing.
    async fn disconnect(&mut self);

    /// Returns true while the channel is open.
    fn is_connected(&self) -> bool;
}

#[cfg(feature = "tcp")]
pub use self::tcp::TcpTransport;

#[cfg(feature = "tcp")]
mod tcp {
    use std::net::Shutdown;

    use async_net::TcpStream;
    use flightlink_common::error::LinkError;
    use futures_lite::io::BufReader;
    use futures_lite::{AsyncBufReadExt, AsyncWriteExt};
    use tracing::{debug, info, trace};

    use super::Transport;
    use crate::async_trait;

    #[derive(Default, Debug)]
    /// A [`Transport`] over a plain TCP stream, as exposed by FlightGear's
    /// telnet interface.
    pub struct TcpTransport {
        stream: Option<Connection>,
    }

    #[derive(Debug)]
    struct Connection {
        reader: BufReader<TcpStream>,
        writer: TcpStream,
    }

    /// Garbage bytes become replacement characters, so a bad response is
    /// rejected as a value instead of failing the channel.
    fn decode_line(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }

    #[async_trait]
    impl Transport for TcpTransport {
        const TRANSPORT_NAME: &'static str = "TCP";

        async fn connect(&mut self, host: &str, port: u16) -> Result<(), LinkError> {
            self.disconnect().await;

            info!("Connecting to {}:{}", host, port);
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|source| LinkError::Connection {
                    host: host.to_string(),
                    port,
                    source,
                })?;
            // Requests are tiny and latency matters more than throughput.
            stream.set_nodelay(true)?;

            if let Ok(addr) = stream.peer_addr() {
                debug!("Connected to: {:?}", addr);
            }

            self.stream = Some(Connection {
                reader: BufReader::new(stream.clone()),
                writer: stream,
            });
            Ok(())
        }

        async fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
            let connection = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

            let mut buffer = Vec::with_capacity(line.len() + 1);
            buffer.extend_from_slice(line.as_bytes());
            buffer.push(b'\n');

            trace!("Sending {} bytes", buffer.len());
            connection.writer.write_all(&buffer).await?;
            connection.writer.flush().await?;
            Ok(())
        }

        async fn read_line(&mut self) -> Result<String, LinkError> {
            let connection = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

            let mut buffer = Vec::new();
            match connection.reader.read_until(b'\n', &mut buffer).await? {
                0 => {
                    info!("Simulator closed the connection");
                    Err(LinkError::Closed)
                }
                n => {
                    trace!("Received {} bytes", n);
                    Ok(decode_line(&buffer))
                }
            }
        }

        async fn disconnect(&mut self) {
            if let Some(connection) = self.stream.take() {
                // The peer may already be gone; there is nothing left to report.
                let _ = connection.writer.shutdown(Shutdown::Both);
                info!("Disconnected");
            }
        }

        fn is_connected(&self) -> bool {
            self.stream.is_some()
        }
    }

    #[cfg(test)]
    mod tests {
        use std::io::Write;
        use std::net::TcpListener;

        use flightlink_common::parse_value;
        use futures_lite::future::block_on;

        use super::*;

        #[test]
        fn strips_line_terminators() {
            assert_eq!(decode_line(b"3500.25\r\n"), "3500.25");
            assert_eq!(decode_line(b"-12"), "-12");
        }

        #[test]
        fn invalid_utf8_is_a_bad_value_not_a_fault() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let server = std::thread::spawn(move || {
                let (mut stream, _) = listener.accept().unwrap();
                stream.write_all(b"\xff\n271.5\r\n").unwrap();
            });

            let mut transport = TcpTransport::default();
            block_on(transport.connect("127.0.0.1", port)).unwrap();

            let garbage = block_on(transport.read_line()).unwrap();
            assert_eq!(garbage, "\u{FFFD}");
            assert!(matches!(
                parse_value("/orientation/heading-deg", &garbage),
                Err(LinkError::Parse { .. })
            ));
            // The channel is still usable afterwards
            assert_eq!(block_on(transport.read_line()).unwrap(), "271.5");

            server.join().unwrap();
            block_on(transport.disconnect());
            assert!(!transport.is_connected());
        }
    }
}
