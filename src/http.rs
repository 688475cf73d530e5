//! # HTTP Transport Module
//!
//! [`Transport`] implementation which opens the live preview request over HTTP and reads the
//! `multipart/x-mixed-replace` response on its own thread.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use reqwest::blocking::{Client, Request};
use reqwest::header::CONTENT_TYPE;

use crate::error::{Error, Result};
use crate::multipart::{boundary_from_content_type, MultipartSplitter, Part};
use crate::session::{Method, RequestDescriptor};
use crate::transport::{ConnectionHandle, EventSink, Transport, TransportEvent};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// How long the connection may go without receiving anything before it is treated as failed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// Transport over a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client
}

/// A connection opened by [`HttpTransport`].
struct HttpConnection {
    cancelled: Arc<AtomicBool>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl HttpTransport {
    /// Create a transport with its own client, using [`DEFAULT_IDLE_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }

    /// Create a transport whose connections fail once nothing has been received for `idle`.
    ///
    /// The blocking client applies its timeout to connecting and to each read, not to the
    /// request as a whole, so a stream which keeps delivering stays open indefinitely. A stalled
    /// one completes with an error, which lets the live preview restart it.
    pub fn with_idle_timeout(idle: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(idle)
            .build()
            .map_err(Error::Http)?;

        Ok(Self { client })
    }

    /// Create a transport sharing an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, descriptor: RequestDescriptor) -> Result<Request> {
        let mut builder = match descriptor.method {
            Method::Get => self.client.get(&descriptor.url),
            Method::Post => self.client.post(&descriptor.url)
        };

        for (key, value) in descriptor.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = descriptor.body {
            builder = builder.body(body);
        }

        builder.build().map_err(Error::Http)
    }
}

impl Transport for HttpTransport {
    fn open(&self, request: RequestDescriptor, sink: EventSink) -> Result<Box<dyn ConnectionHandle>> {
        let request = self.build_request(request)?;
        let client = self.client.clone();

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        thread::spawn(move || {
            let result = stream_parts(&client, request, &sink, &flag);

            if flag.load(Ordering::SeqCst) {
                trace!("Connection for generation {} cancelled", sink.generation());
                return;
            }

            sink.send(TransportEvent::Completed(result.err()));
        });

        Ok(Box::new(HttpConnection { cancelled }))
    }
}

impl ConnectionHandle for HttpConnection {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Execute the request and feed the parts of the response to the sink until the body ends or
/// the connection is cancelled.
fn stream_parts(
    client: &Client,
    request: Request,
    sink: &EventSink,
    cancelled: &AtomicBool
) -> Result<()> {
    let mut response = client.execute(request).map_err(Error::Http)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport(format!("Unexpected HTTP status {}", status)));
    }

    let boundary = response.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(boundary_from_content_type)
        .ok_or_else(|| Error::Transport(String::from("Response is not a multipart stream")))?;

    debug!("Live preview stream open, boundary {:?}", boundary);

    let mut splitter = MultipartSplitter::new(&boundary);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    while !cancelled.load(Ordering::SeqCst) {
        let n = response.read(&mut buf)
            .map_err(|e| Error::Transport(e.to_string()))?;

        if n == 0 {
            break;
        }

        for part in splitter.push(&buf[..n]) {
            if cancelled.load(Ordering::SeqCst) {
                return Ok(());
            }

            match part {
                Part::Boundary => sink.send(TransportEvent::Boundary),
                Part::Data(data) => sink.send(TransportEvent::Data(data))
            }
        }

        if splitter.is_finished() {
            break;
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;
    use std::time::Instant;

    use crate::livepreview::Generation;
    use crate::transport::tests::{sink_for, Record, Recorder};

    /// Serve one canned response on a local port, returning its URL.
    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let addr = listener.local_addr().expect("No local address");

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept");

            // Read the request head before answering
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                match stream.read(&mut byte) {
                    Ok(1) => head.push(byte[0]),
                    _ => break
                }
            }

            stream.write_all(&response).expect("Failed to write response");
        });

        format!("http://{}/osc/commands/execute", addr)
    }

    fn wait_for_completion(recorder: &Recorder) -> Vec<Record> {
        let deadline = Instant::now() + Duration::from_secs(5);

        loop {
            let records: Vec<Record> = recorder.records().into_iter().map(|(_, r)| r).collect();
            if records.iter().any(|r| matches!(r, Record::Completed(_))) {
                return records;
            }

            assert!(Instant::now() < deadline, "Connection never completed");
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Test that a multipart response is turned into boundary and data events
    #[test]
    fn test_stream_parts() {
        let mut response = b"HTTP/1.1 200 OK\r\n\
            Content-Type: multipart/x-mixed-replace; boundary=\"frame\"\r\n\
            Connection: close\r\n\r\n".to_vec();
        response.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\nabc\r\n");
        response.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\ndefg\r\n");

        let url = serve_once(response);
        let recorder = Arc::new(Recorder::default());
        let transport = HttpTransport::new().expect("Failed to build transport");

        let _connection = transport
            .open(
                RequestDescriptor::new(Method::Get, url).header("Accept", "multipart/x-mixed-replace"),
                sink_for(&recorder, Generation::from(3))
            )
            .expect("Failed to open");

        let records = wait_for_completion(&recorder);

        // Chunking of the data depends on the network, so join it back up
        let mut joined: Vec<Record> = Vec::new();
        for record in records {
            match (joined.last_mut(), record) {
                (Some(Record::Data(prev)), Record::Data(d)) => prev.extend_from_slice(&d),
                (_, r) => joined.push(r)
            }
        }

        assert_eq!(joined, vec![
            Record::Boundary,
            Record::Data(b"abc".to_vec()),
            Record::Boundary,
            Record::Data(b"defg".to_vec()),
            Record::Completed(false)
        ]);
        assert!(recorder.records().iter().all(|(g, _)| *g == Generation::from(3)));
    }

    /// Test that an error status completes the connection with an error
    #[test]
    fn test_error_status() {
        let url = serve_once(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_vec()
        );
        let recorder = Arc::new(Recorder::default());
        let transport = HttpTransport::new().expect("Failed to build transport");

        let _connection = transport
            .open(RequestDescriptor::new(Method::Get, url), sink_for(&recorder, Generation::from(1)))
            .expect("Failed to open");

        assert_eq!(wait_for_completion(&recorder), vec![Record::Completed(true)]);
    }

    /// Test that an invalid URL fails to open rather than completing later
    #[test]
    fn test_invalid_url() {
        let recorder = Arc::new(Recorder::default());
        let transport = HttpTransport::new().expect("Failed to build transport");

        let result = transport.open(
            RequestDescriptor::new(Method::Get, "not a url"),
            sink_for(&recorder, Generation::from(1))
        );

        assert!(matches!(result, Err(Error::Http(_))));
    }

    /// Test that a stream which stops sending completes with an error
    #[test]
    fn test_idle_stream_fails() {
        let (_tx, rx) = channel::<()>();
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let url = format!("http://{}/", listener.local_addr().expect("No local address"));

        // Send the response head and one part, then go quiet until the test ends
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("Failed to accept");
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                match stream.read(&mut byte) {
                    Ok(1) => head.push(byte[0]),
                    _ => break
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\n\
                    Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
                    Connection: close\r\n\r\n\
                    --frame\r\n\r\nabc")
                .expect("Failed to write response");
            let _ = rx.recv();
        });

        let recorder = Arc::new(Recorder::default());
        let transport = HttpTransport::with_idle_timeout(Duration::from_millis(200))
            .expect("Failed to build transport");
        let _connection = transport
            .open(RequestDescriptor::new(Method::Get, url), sink_for(&recorder, Generation::from(1)))
            .expect("Failed to open");

        let records = wait_for_completion(&recorder);

        assert_eq!(records.first(), Some(&Record::Boundary));
        assert_eq!(records.last(), Some(&Record::Completed(true)));
    }

    /// Test that a cancelled connection reports nothing further
    #[test]
    fn test_cancel() {
        let (_tx, rx) = channel::<()>();
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
        let url = format!("http://{}/", listener.local_addr().expect("No local address"));

        // Accept the connection but never answer until the test ends
        thread::spawn(move || {
            let _conn = listener.accept();
            let _ = rx.recv();
        });

        let recorder = Arc::new(Recorder::default());
        let transport = HttpTransport::new().expect("Failed to build transport");
        let connection = transport
            .open(RequestDescriptor::new(Method::Get, url), sink_for(&recorder, Generation::from(1)))
            .expect("Failed to open");

        connection.cancel();
        thread::sleep(Duration::from_millis(100));

        assert!(recorder.records().is_empty());
    }
}
