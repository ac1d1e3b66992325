use crate::error::{Error, Result};
use crate::io::{decode_response, encode_request, BodyFraming, BUFFER_CAPACITY};
#[cfg(feature = "flate2")]
use crate::model::header::ACCEPT_ENCODING;
use crate::model::header::{InvalidHeaderValue, CONNECTION, HOST, USER_AGENT};
use crate::model::{
    BodyEnd, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Version,
};
use std::io::{self, BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Host targeted by [`Client::default`].
pub const DEFAULT_HOST: &str = "localhost";
/// Port targeted by [`Client::default`].
pub const DEFAULT_PORT: u16 = 10080;

/// An HTTP client for a single server.
///
/// It only holds configuration: each call to [`Client::connect`] opens a new [`Connection`]
/// and nothing is shared between connections.
///
/// The client blocks indefinitely on an unresponsive server unless a timeout is set with [`Client::with_global_timeout`].
///
/// Missing: TLS, redirections, authentication and connection pooling.
///
/// ```no_run
/// use oxchange::model::header::CONTENT_TYPE;
/// use oxchange::model::{Method, Request, StatusCode};
/// use oxchange::Client;
/// use std::time::Duration;
///
/// let client = Client::new("localhost", 10080).with_global_timeout(Duration::from_secs(10));
/// let mut connection = client.connect()?;
/// connection.send_request(Request::new(Method::GET, "/"))?;
/// let response = connection.receive_response()?;
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/html");
/// let body = response.into_body().to_string()?;
/// # Result::<_,Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    user_agent: Option<HeaderValue>,
}

impl Client {
    #[inline]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
            user_agent: None,
        }
    }

    /// Sets the global timeout value (applies to both read, write and connection).
    #[inline]
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the default value for the [`User-Agent`](https://httpwg.org/specs/rfc9110.html#field.user-agent) header.
    #[inline]
    pub fn with_user_agent(
        mut self,
        user_agent: impl Into<String>,
    ) -> Result<Self, InvalidHeaderValue> {
        self.user_agent = Some(HeaderValue::try_from(user_agent.into())?);
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Opens a TCP connection to the server.
    ///
    /// Every resolved address is tried in order, there is no retry.
    pub fn connect(&self) -> Result<Connection> {
        let host_header = HeaderValue::try_from(if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        })
        .map_err(|e| Error::InvalidRequest(format!("Invalid host '{}': {e}", self.host)))?;
        let addresses = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                Error::connection_io(
                    format!("Not able to resolve {}:{}", self.host, self.port),
                    e,
                )
            })?
            .collect::<Vec<_>>();
        let stream = self.open_stream(&addresses).map_err(|e| {
            Error::connection_io(
                format!("Not able to connect to {}:{}", self.host, self.port),
                e,
            )
        })?;
        let peer = stream
            .peer_addr()
            .map_err(|e| Error::connection_io("Not able to get the peer address", e))?;
        let reader = stream
            .try_clone()
            .map_err(|e| Error::connection_io("Not able to clone the TCP stream", e))?;
        debug!(%peer, "connected");
        Ok(Connection {
            reader: BufReader::with_capacity(BUFFER_CAPACITY, reader),
            stream,
            peer,
            host: host_header,
            user_agent: self.user_agent.clone(),
            state: ConnectionState::Idle,
            pending: None,
        })
    }

    /// Runs a single exchange on a new connection that is closed after the response.
    ///
    /// The returned response owns the connection: its body is streamed from the socket.
    pub fn request(&self, mut request: Request<'_>) -> Result<Response<'static>> {
        request
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
        let mut connection = self.connect()?;
        connection.send_request(request)?;
        connection.into_response()
    }

    fn open_stream(&self, addresses: &[SocketAddr]) -> io::Result<TcpStream> {
        let stream = if let Some(timeout) = self.timeout {
            Self::connect_timeout(addresses, timeout)
        } else {
            TcpStream::connect(addresses)
        }?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn connect_timeout(addresses: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
        let mut error = io::Error::new(
            ErrorKind::InvalidInput,
            "Not able to resolve the provide addresses",
        );
        for address in addresses {
            match TcpStream::connect_timeout(address, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => error = e,
            }
        }
        Err(error)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// An open connection to a server, carrying sequential exchanges.
///
/// Exchanges go [`send_request`](Self::send_request) then [`receive_response`](Self::receive_response).
/// The connection is kept alive until either side sends `Connection: close`.
///
/// The body of a response must be read to its end before the next request is sent:
/// [`send_request`](Self::send_request) fails otherwise.
/// After any error the connection must be dropped.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    peer: SocketAddr,
    host: HeaderValue,
    user_agent: Option<HeaderValue>,
    state: ConnectionState,
    pending: Option<PendingRequest>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum ConnectionState {
    Idle,
    AwaitingResponse,
    ReadingBody,
    Closed,
    Broken,
}

#[derive(Debug)]
struct PendingRequest {
    method: Method,
    close: bool,
}

impl Connection {
    /// Serializes and sends the request.
    ///
    /// The `host` header (and the client user agent) are added if missing.
    pub fn send_request(&mut self, mut request: Request<'_>) -> Result<()> {
        match self.state {
            ConnectionState::Idle => (),
            ConnectionState::AwaitingResponse => {
                return Err(Error::connection(
                    "The response to the previous request has not been received",
                ))
            }
            ConnectionState::ReadingBody => {
                return Err(Error::connection(
                    "The body of the previous response has not been fully read",
                ))
            }
            ConnectionState::Closed => {
                return Err(Error::connection("The connection is closed"))
            }
            ConnectionState::Broken => {
                return Err(Error::connection(
                    "The connection is not usable anymore after a failed exchange",
                ))
            }
        }

        // Additional headers
        {
            let headers = request.headers_mut();
            headers.entry(HOST).or_insert_with(|| self.host.clone());
            if let Some(user_agent) = &self.user_agent {
                headers
                    .entry(USER_AGENT)
                    .or_insert_with(|| user_agent.clone());
            }
            #[cfg(feature = "flate2")]
            headers
                .entry(ACCEPT_ENCODING)
                .or_insert_with(|| HeaderValue::from_static("gzip,deflate"));
        }

        let pending = PendingRequest {
            method: request.method().clone(),
            close: wants_close(Version::HTTP_11, request.headers()),
        };
        trace!(method = %pending.method, path = request.target(), "sending request");
        let result = encode_request(
            request,
            BufWriter::with_capacity(BUFFER_CAPACITY, &self.stream),
        );
        match result {
            Ok(()) => {
                self.state = ConnectionState::AwaitingResponse;
                self.pending = Some(pending);
                Ok(())
            }
            // Nothing has been written
            Err(e @ Error::InvalidRequest(_)) => Err(e),
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "failed to send the request");
                self.abort();
                Err(e)
            }
        }
    }

    /// Reads the response head.
    ///
    /// The body is not read: it is streamed from the connection while the returned [`Response`] body is consumed.
    pub fn receive_response(&mut self) -> Result<Response<'_>> {
        let pending = self.take_pending()?;
        let Self {
            stream,
            reader,
            peer,
            state,
            ..
        } = self;
        let (response, framing) = match decode_response(reader, &pending.method) {
            Ok(response) => response,
            Err(e) => {
                warn!(%peer, error = %e, "failed to receive the response");
                let _ = stream.shutdown(Shutdown::Both);
                *state = ConnectionState::Broken;
                return Err(e);
            }
        };
        let close = pending.close || closes_after(&response, framing);
        debug!(
            %peer,
            status = response.status().as_u16(),
            ?framing,
            close,
            "received response head"
        );

        if framing == BodyFraming::Empty {
            *state = if close {
                let _ = stream.shutdown(Shutdown::Both);
                ConnectionState::Closed
            } else {
                ConnectionState::Idle
            };
            return Ok(response);
        }

        *state = ConnectionState::ReadingBody;
        let stream: &TcpStream = stream;
        let peer = *peer;
        Ok(response.map_body(move |body| {
            body.with_end_hook(move |end| {
                *state = match end {
                    BodyEnd::Complete if !close => ConnectionState::Idle,
                    BodyEnd::Complete => {
                        let _ = stream.shutdown(Shutdown::Both);
                        ConnectionState::Closed
                    }
                    BodyEnd::Failed => {
                        warn!(%peer, "failed to read the response body");
                        let _ = stream.shutdown(Shutdown::Both);
                        ConnectionState::Broken
                    }
                }
            })
        }))
    }

    /// Closes the connection.
    ///
    /// Closing an already closed connection does nothing.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // The peer might have already closed the connection
            if e.kind() != ErrorKind::NotConnected {
                debug!(peer = %self.peer, error = %e, "failed to shut down the connection");
            }
        }
        self.state = ConnectionState::Closed;
        self.pending = None;
        debug!(peer = %self.peer, "connection closed");
    }

    /// If a new request can be sent on this connection.
    pub fn is_reusable(&self) -> bool {
        self.state == ConnectionState::Idle
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn into_response(mut self) -> Result<Response<'static>> {
        let pending = self.take_pending()?;
        let (response, _) = decode_response(self.reader, &pending.method)?;
        Ok(response)
    }

    fn take_pending(&mut self) -> Result<PendingRequest> {
        if self.state != ConnectionState::AwaitingResponse {
            return Err(Error::connection("No request is waiting for a response"));
        }
        self.pending
            .take()
            .ok_or_else(|| Error::connection("No request is waiting for a response"))
    }

    fn abort(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.state = ConnectionState::Broken;
        self.pending = None;
    }
}

fn closes_after(response: &Response<'_>, framing: BodyFraming) -> bool {
    framing == BodyFraming::UntilClose
        || response.status() == StatusCode::SWITCHING_PROTOCOLS
        || wants_close(response.version(), response.headers())
}

/// HTTP/1.1 connections are persistent by default, HTTP/1.0 ones only with `Connection: keep-alive`.
fn wants_close(version: Version, headers: &HeaderMap) -> bool {
    let has_option = |option: &str| {
        headers.get_all(CONNECTION).iter().any(|value| {
            value.to_str().is_ok_and(|value| {
                value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case(option))
            })
        })
    };
    if has_option("close") {
        return true;
    }
    version == Version::HTTP_10 && !has_option("keep-alive")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
    use crate::model::Body;
    use std::io::{BufRead, Read, Write};
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread::{sleep, spawn, JoinHandle};
    use tracing_test::traced_test;

    /// Accepts a single connection and answers each request with the next scripted response.
    ///
    /// Each response is written in several parts with a short pause in between.
    /// Returns the raw requests once the connection is over.
    fn serve(responses: Vec<Vec<&'static str>>) -> (Client, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut requests = Vec::new();
            for parts in responses {
                let Some(request) = read_request(&mut reader) else {
                    break;
                };
                requests.push(request);
                for (i, part) in parts.into_iter().enumerate() {
                    if i > 0 {
                        sleep(Duration::from_millis(20));
                    }
                    stream.write_all(part.as_bytes()).unwrap();
                    stream.flush().unwrap();
                }
            }
            requests
        });
        (
            Client::new("127.0.0.1", port).with_global_timeout(Duration::from_secs(10)),
            handle,
        )
    }

    fn read_request(reader: &mut impl BufRead) -> Option<String> {
        let mut request = String::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).ok()? == 0 {
                return None;
            }
            request.push_str(&line);
            if line == "\r\n" {
                break;
            }
        }
        let head = request.to_ascii_lowercase();
        if head.contains("transfer-encoding: chunked") {
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).ok()?;
                request.push_str(&line);
                let size = usize::from_str_radix(line.trim_end(), 16).ok()?;
                let mut data = vec![0; size + 2];
                reader.read_exact(&mut data).ok()?;
                request.push_str(&String::from_utf8(data).ok()?);
                if size == 0 {
                    break;
                }
            }
        } else if let Some(len) = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length: "))
        {
            let mut data = vec![0; len.trim().parse().ok()?];
            reader.read_exact(&mut data).ok()?;
            request.push_str(&String::from_utf8(data).ok()?);
        }
        Some(request)
    }

    #[test]
    #[traced_test]
    fn get_with_chunked_response() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n5\r\n---\r\n\r\n0\r\n\r\n",
        ]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        let response = connection.receive_response()?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(response.into_body().to_vec()?, b"---\r\n");
        assert!(connection.is_reusable());
        connection.close();

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with(&format!(
            "GET / HTTP/1.1\r\nhost: 127.0.0.1:{}\r\n",
            client.port()
        )));
        assert!(requests[0].ends_with("\r\n\r\n"));
        assert!(logs_contain("connected"));
        assert!(logs_contain("received response head"));
        Ok(())
    }

    #[test]
    fn keep_alive_then_close() -> Result<()> {
        let (client, server) = serve(vec![
            vec!["HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 5\r\n\r\nindex"],
            vec!["HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: 5\r\n\r\nabout"],
        ]);
        let mut connection = client.connect()?;

        connection.send_request(Request::new(Method::GET, "/"))?;
        let response = connection.receive_response()?;
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(response.into_body().to_string()?, "index");
        assert!(connection.is_reusable());

        let mut request = Request::new(Method::GET, "/about.html");
        request
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
        connection.send_request(request)?;
        let body = connection.receive_response()?.into_body();
        assert_eq!(body.to_string()?, "about");
        assert!(!connection.is_reusable());

        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("GET /about.html HTTP/1.1\r\n"));
        assert!(requests[1].contains("\r\nconnection: close\r\n"));
        Ok(())
    }

    #[test]
    fn server_close_ends_keep_alive() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 2\r\n\r\nok",
        ]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        assert_eq!(connection.receive_response()?.into_body().to_string()?, "ok");
        assert!(!connection.is_reusable());
        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn post_chunked_body() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-length: 8\r\n\r\nreceived",
        ]]);
        let mut request = Request::new(Method::POST, "/test")
            .with_body(Body::from_read(b"abc".as_ref()));
        request
            .headers_mut()
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        let mut connection = client.connect()?;
        connection.send_request(request)?;
        assert_eq!(
            connection.receive_response()?.into_body().to_string()?,
            "received"
        );
        connection.close();

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /test HTTP/1.1\r\n"));
        assert!(requests[0].contains("\r\ntransfer-encoding: chunked\r\n"));
        assert!(requests[0].ends_with("\r\n\r\n3\r\nabc\r\n0\r\n\r\n"));
        Ok(())
    }

    #[test]
    fn fixed_length_body_over_several_reads() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nhel",
            "lo",
            "world",
        ]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        let response = connection.receive_response()?;
        assert_eq!(response.body().len(), Some(10));
        let mut total = Vec::new();
        for chunk in response.into_body() {
            total.extend_from_slice(&chunk?);
        }
        assert_eq!(total, b"helloworld");
        assert!(connection.is_reusable());
        connection.close();
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn head_response_has_no_body() -> Result<()> {
        let (client, server) = serve(vec![
            vec!["HTTP/1.1 200 OK\r\ncontent-length: 1000\r\n\r\n"],
            vec!["HTTP/1.1 204 No Content\r\n\r\n"],
        ]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::HEAD, "/"))?;
        let response = connection.receive_response()?;
        assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "1000");
        assert_eq!(response.body().len(), Some(0));
        drop(response);
        assert!(connection.is_reusable());
        connection.send_request(Request::new(Method::DELETE, "/"))?;
        assert_eq!(
            connection.receive_response()?.status(),
            StatusCode::NO_CONTENT
        );
        connection.close();
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn empty_response_is_a_protocol_error() -> Result<()> {
        let (client, server) = serve(vec![vec![""]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        server.join().unwrap();
        assert!(connection.receive_response().unwrap_err().is_protocol());
        assert!(!connection.is_reusable());
        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());
        Ok(())
    }

    #[test]
    fn unread_body_prevents_reuse() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\nabc",
        ]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        drop(connection.receive_response()?);
        assert!(!connection.is_reusable());
        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());
        connection.close();
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn truncated_body_breaks_connection() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhel",
        ]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        let response = connection.receive_response()?;
        server.join().unwrap();
        let chunks = response.into_body().collect::<Vec<_>>();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap(), b"hel");
        assert!(chunks[1].as_ref().unwrap_err().is_protocol());
        assert!(!connection.is_reusable());
        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());
        Ok(())
    }

    #[test]
    fn receive_without_request() -> Result<()> {
        let (client, server) = serve(Vec::new());
        let mut connection = client.connect()?;
        assert!(connection.receive_response().unwrap_err().is_connection());
        connection.close();
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let (client, server) = serve(Vec::new());
        let mut connection = client.connect()?;
        assert!(connection.is_reusable());
        connection.close();
        connection.close();
        assert!(!connection.is_reusable());
        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn invalid_request_keeps_connection_usable() -> Result<()> {
        let (client, server) = serve(Vec::new());
        let mut connection = client.connect()?;
        assert!(matches!(
            connection.send_request(Request::new(Method::GET, "no spaces allowed")),
            Err(Error::InvalidRequest(_))
        ));
        assert!(connection.is_reusable());
        connection.close();
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn one_shot_request_until_close() -> Result<()> {
        let (client, server) = serve(vec![vec!["HTTP/1.0 200 OK\r\n\r\nhello ", "world"]]);
        let client = client.with_user_agent("oxchange-test").unwrap();
        let response = client.request(Request::new(Method::POST, "/echo").with_body("ping"))?;
        assert_eq!(response.version(), Version::HTTP_10);
        assert_eq!(response.body().len(), None);
        assert_eq!(response.into_body().to_string()?, "hello world");

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /echo HTTP/1.1\r\n"));
        assert!(requests[0].contains("\r\nconnection: close\r\n"));
        assert!(requests[0].contains("\r\nuser-agent: oxchange-test\r\n"));
        assert!(requests[0].ends_with("\r\ncontent-length: 4\r\n\r\nping"));
        Ok(())
    }

    #[test]
    fn read_timeout_breaks_connection() -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            read_request(&mut reader);
            // Never answers, waits for the client to go away
            let _ = reader.read_to_end(&mut Vec::new());
        });
        let mut connection = Client::new("127.0.0.1", port)
            .with_global_timeout(Duration::from_millis(100))
            .connect()?;
        connection.send_request(Request::new(Method::GET, "/"))?;
        assert!(connection.receive_response().unwrap_err().is_transport());
        assert!(!connection.is_reusable());
        assert!(connection
            .send_request(Request::new(Method::GET, "/"))
            .unwrap_err()
            .is_connection());
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn switching_protocols_closes_connection() -> Result<()> {
        let (client, server) = serve(vec![vec![
            "HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\nconnection: upgrade\r\n\r\n",
        ]]);
        let mut connection = client.connect()?;
        connection.send_request(Request::new(Method::GET, "/chat"))?;
        let response = connection.receive_response()?;
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.body().len(), Some(0));
        drop(response);
        assert!(!connection.is_reusable());
        server.join().unwrap();
        Ok(())
    }

    #[test]
    fn connection_refused() {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(Client::new("127.0.0.1", port)
            .connect()
            .unwrap_err()
            .is_connection());
    }

    #[test]
    fn default_target() {
        let client = Client::default();
        assert_eq!(client.host(), "localhost");
        assert_eq!(client.port(), 10080);
    }

    #[test]
    fn connection_option_rules() {
        let mut headers = HeaderMap::new();
        assert!(!wants_close(Version::HTTP_11, &headers));
        assert!(wants_close(Version::HTTP_10, &headers));
        headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));
        assert!(!wants_close(Version::HTTP_10, &headers));
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade, Close"));
        assert!(wants_close(Version::HTTP_11, &headers));
    }
}
