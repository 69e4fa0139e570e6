use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info, warn};

use crate::{error::Error, position::ReportStream};

/// Streaming request: JSON reports, as they come
const WATCH: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// gpsd [ReportStream] over TCP. Connects lazily and reconnects on the
/// next request after any error.
pub struct GpsdStream {
    host: String,
    port: u16,
    connect_timeout: Duration,
    reader: Option<BufReader<TcpStream>>,
    pending: Vec<u8>,
}

impl GpsdStream {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            port,
            host: host.to_string(),
            connect_timeout: Duration::from_secs(2),
            reader: None,
            pending: Vec::new(),
        }
    }

    fn connect(&self, timeout: Duration) -> Result<BufReader<TcpStream>, Error> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("{}:{} did not resolve", self.host, self.port),
                ))
            })?;

        let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.write_all(WATCH)?;

        info!("position: connected to gpsd {}", addr);
        Ok(BufReader::new(stream))
    }

    fn disconnect(&mut self) {
        self.reader = None;
        self.pending.clear();
    }
}

impl ReportStream for GpsdStream {
    fn next_report(&mut self, timeout: Duration) -> Result<Option<String>, Error> {
        // zero would disable the read timeout
        let timeout = timeout.max(Duration::from_millis(1));

        if self.reader.is_none() {
            let reader = self.connect(timeout.min(self.connect_timeout))?;
            self.reader = Some(reader);
        }

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        reader.get_ref().set_read_timeout(Some(timeout))?;

        // partial lines are kept until completed by a later read
        match reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                warn!("position: gpsd closed the connection");
                self.disconnect();
                Err(Error::EndOfStream)
            },
            Ok(_) => {
                if self.pending.last() != Some(&b'\n') {
                    // closed mid-line
                    self.disconnect();
                    return Err(Error::EndOfStream);
                }
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                Ok(Some(line))
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(None)
            },
            Err(e) => {
                debug!("position: gpsd read error: {}", e);
                self.disconnect();
                Err(Error::Io(e))
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::GpsdStream;
    use crate::{
        error::Error,
        position::{FixQuality, PositionSampler, ReportStream},
    };

    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread,
        time::Duration,
    };

    #[test]
    fn watch_and_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = String::new();
            BufReader::new(socket.try_clone().unwrap())
                .read_line(&mut request)
                .unwrap();

            socket
                .write_all(b"{\"class\":\"VERSION\",\"release\":\"3.25\"}\n")
                .unwrap();
            socket
                .write_all(b"{\"class\":\"TPV\",\"mode\":3,\"lat\":42.0,\"lon\":12.5}\n")
                .unwrap();
            request
        });

        let mut sampler = PositionSampler::new(GpsdStream::new("127.0.0.1", port));
        let (fix, _) = sampler.drain(Duration::from_millis(500));

        let request = server.join().unwrap();
        assert_eq!(request.trim(), "?WATCH={\"enable\":true,\"json\":true};");

        assert_eq!(fix.quality, FixQuality::ThreeD);
        assert_eq!(fix.coordinates(), Some((42.0, 12.5)));
    }

    #[test]
    fn silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            let mut request = String::new();
            BufReader::new(socket.try_clone().unwrap())
                .read_line(&mut request)
                .unwrap();
            thread::sleep(Duration::from_millis(300));
            drop(socket);
        });

        let mut stream = GpsdStream::new("127.0.0.1", port);
        assert!(matches!(
            stream.next_report(Duration::from_millis(50)),
            Ok(None)
        ));

        server.join().unwrap();

        assert!(matches!(
            stream.next_report(Duration::from_millis(200)),
            Err(Error::EndOfStream)
        ));
    }

    #[test]
    fn connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut stream = GpsdStream::new("127.0.0.1", port);
        assert!(stream.next_report(Duration::from_millis(100)).is_err());
    }
}
