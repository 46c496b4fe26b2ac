//! # Handler de Conexión
//! src/server/connection.rs
//!
//! Un [`ConnectionHandler`] es dueño de un socket aceptado y procesa, en el
//! thread que lo llama, la secuencia de requests que llegan por él:
//!
//! ```text
//! Open ──(request, response)*──▶ Closed
//! ```
//!
//! La conexión se cierra por fin de stream, por timeout de inactividad, por
//! un error de socket o porque otro thread llamó a [`ConnectionHandler::stop`].
//! Cerrar el socket es la única forma de desbloquear un `read` en curso: un
//! flag cooperativo no se ve mientras el thread está bloqueado leyendo.
//!
//! Los errores de un request nunca salen de aquí: [`ConnectionContext::dispatch`]
//! los convierte en respuesta con un único `match` ([`map_error`]).

use super::listing;
use crate::error::HandlerError;
use crate::fileserver::FileService;
use crate::http::response::TEXT_HTML_UTF8;
use crate::http::{ParseError, Request, Response, ResponseWriter, StatusCode};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

/// Cuerpo de la respuesta a métodos no soportados
pub const OPERATION_NOT_SUPPORTED: &str = "Operation not supported";

/// Dependencias compartidas por todos los handlers de conexión
pub struct ConnectionContext {
    file_service: Arc<dyn FileService>,
    writer: ResponseWriter,
    keep_alive_timeout: Duration,
}

impl ConnectionContext {
    /// Crea el contexto
    pub fn new(file_service: Arc<dyn FileService>, keep_alive_timeout: Duration) -> Self {
        Self {
            file_service,
            writer: ResponseWriter::new(keep_alive_timeout),
            keep_alive_timeout,
        }
    }

    /// Crea un handler para un socket recién aceptado
    pub fn create_handler(self: &Arc<Self>, id: u64, stream: TcpStream) -> ConnectionHandler {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        ConnectionHandler {
            id,
            peer,
            stream,
            closed: AtomicBool::new(false),
            context: Arc::clone(self),
        }
    }

    /// Convierte un request en una respuesta. Nunca falla: cualquier error,
    /// incluso un panic, termina en la respuesta que le corresponde.
    pub fn dispatch(&self, request: &Request) -> Response {
        let method = request.method().to_ascii_uppercase();
        info!(uri = %request.target(), method = %method, "Request");

        let result = panic::catch_unwind(AssertUnwindSafe(|| match method.as_str() {
            "GET" => self.handle_get(request),
            "HEAD" => self.handle_head(request),
            other => Err(HandlerError::Unsupported(other.to_string())),
        }));

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => map_error(&e),
            Err(_) => {
                error!(uri = %request.target(), "Request handler panicked");
                Response::new(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        debug!(status = %response.status(), "Response");
        response
    }

    fn handle_head(&self, _request: &Request) -> Result<Response, HandlerError> {
        Err(HandlerError::Unsupported("HEAD".to_string()))
    }

    fn handle_get(&self, request: &Request) -> Result<Response, HandlerError> {
        let path = request.relative_path();
        let fs = &self.file_service;
        let classify = |e: io::Error| HandlerError::from_file_service(&path, e);

        if fs.is_file(&path).map_err(classify)? {
            let file = fs.resolve(&path).map_err(classify)?;
            // Detectar archivos ilegibles antes de escribir el status line
            File::open(&file).map_err(classify)?;
            Ok(Response::file(file))
        } else if fs.is_directory(&path).map_err(classify)? {
            let entries = fs.list_directory(&path).map_err(classify)?;
            let body = listing::render(&path, &entries);
            Ok(Response::bytes(StatusCode::OK, body.into_bytes(), TEXT_HTML_UTF8))
        } else {
            Err(HandlerError::NotFound(path))
        }
    }
}

/// Traduce un error de request a su respuesta.
///
/// El detalle de los errores internos solo va al log, nunca al cliente.
pub fn map_error(err: &HandlerError) -> Response {
    match err {
        HandlerError::Unsupported(method) => {
            info!(method = %method, "Operation not supported");
            Response::text(StatusCode::NOT_FOUND, OPERATION_NOT_SUPPORTED)
        }
        HandlerError::AccessDenied(path) => {
            debug!(path = %path, "Access denied");
            Response::new(StatusCode::FORBIDDEN)
        }
        HandlerError::NotFound(path) => {
            debug!(path = %path, "File not found");
            Response::new(StatusCode::NOT_FOUND)
        }
        HandlerError::Io(e) => {
            error!(error = %e, error_kind = ?e.kind(), "Request failed");
            Response::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Fallos que terminan la conexión
#[derive(Debug, Error)]
enum ConnectionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ConnectionError {
    fn is_timeout(&self) -> bool {
        match self {
            ConnectionError::Parse(e) => e.is_timeout(),
            ConnectionError::Io(e) => {
                matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
            }
        }
    }
}

/// Procesa los requests de un socket aceptado
pub struct ConnectionHandler {
    id: u64,
    peer: String,
    /// Handle de control: `stop()` lo usa para cortar la conexión
    stream: TcpStream,
    /// false → true una sola vez; quien gana la transición cierra el socket
    closed: AtomicBool,
    context: Arc<ConnectionContext>,
}

impl ConnectionHandler {
    /// Identificador único dentro del acceptor
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Dirección del cliente
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// `true` si el socket ya fue cerrado
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Procesa requests hasta que el cliente se desconecte, venza el timeout
    /// de inactividad o alguien llame a `stop()`. Usa el thread que lo llama.
    ///
    /// Siempre deja el socket cerrado al salir.
    pub fn handle_requests(&self) {
        let span = info_span!("conn", id = self.id, peer = %self.peer);
        let _enter = span.enter();
        debug!("Processing requests");

        match self.request_loop() {
            Ok(()) => debug!("Client closed connection"),
            Err(e) if self.is_closed() => debug!(error = %e, "Connection stopped"),
            Err(e) if e.is_timeout() => info!("Timeout waiting for next request, closing connection"),
            Err(ConnectionError::Parse(e @ ParseError::Io(_))) | Err(ConnectionError::Parse(e @ ParseError::UnexpectedEof)) => {
                warn!(error = %e, "Error reading from socket")
            }
            Err(ConnectionError::Parse(e)) => warn!(error = %e, "Malformed request, closing connection"),
            Err(ConnectionError::Io(e)) => warn!(error = %e, "Error writing to socket"),
        }

        if !self.is_closed() {
            self.stop();
        }
    }

    /// Cierra el socket. Idempotente y seguro de llamar desde otro thread:
    /// desbloquea al thread que esté leyendo de esta conexión.
    pub fn stop(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(id = self.id, peer = %self.peer, "Closing connection");
            match self.stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                // El cliente ya se había ido
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => warn!(error = %e, "Suppressing error closing socket"),
            }
        } else {
            debug!(id = self.id, "Already closed");
        }
    }

    fn request_loop(&self) -> Result<(), ConnectionError> {
        let mut reader = BufReader::new(self.stream.try_clone()?);
        let mut writer = BufWriter::new(self.stream.try_clone()?);

        loop {
            self.stream
                .set_read_timeout(Some(self.context.keep_alive_timeout))?;
            if !self.handle_one_request(&mut reader, &mut writer)? {
                return Ok(());
            }
        }
    }

    /// Lee y responde un request. Retorna `false` al llegar al fin del stream.
    fn handle_one_request<W: Write>(
        &self,
        reader: &mut BufReader<TcpStream>,
        writer: &mut W,
    ) -> Result<bool, ConnectionError> {
        debug!("Waiting for HTTP request");
        let request = match Request::read_from(reader)? {
            Some(request) => request,
            None => return Ok(false),
        };
        debug!(request = %request, "Received request");

        let response = self.context.dispatch(&request);
        self.context.writer.write(writer, response)?;
        Ok(true)
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileserver::LocalFileService;
    use std::fs;
    use std::io::{BufRead, Read};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    fn setup(timeout: Duration) -> (TempDir, Arc<ConnectionContext>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"ABCD").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("inner.bin"), b"x").unwrap();
        let service = Arc::new(LocalFileService::new(dir.path()));
        (dir, Arc::new(ConnectionContext::new(service, timeout)))
    }

    fn get(target: &str) -> Request {
        Request::new("GET", target, "HTTP/1.1", Default::default())
    }

    /// Par (handler, cliente) conectados por loopback
    fn connected_pair(context: &Arc<ConnectionContext>) -> (Arc<ConnectionHandler>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (Arc::new(context.create_handler(1, server_side)), client)
    }

    /// Lee una respuesta completa usando Content-Length
    fn read_response(reader: &mut BufReader<TcpStream>) -> (String, Vec<u8>) {
        let mut head = String::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            head.push_str(&line);
        }
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).unwrap();
        (head, body)
    }

    #[test]
    fn test_dispatch_file() {
        let (dir, context) = setup(Duration::from_secs(5));
        let response = context.dispatch(&get("/a.txt"));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &crate::http::Body::File(dir.path().join("a.txt")));
    }

    #[test]
    fn test_dispatch_directory() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let response = context.dispatch(&get("/sub"));

        assert_eq!(response.status(), StatusCode::OK);
        match response.body() {
            crate::http::Body::Bytes { bytes, content_type } => {
                assert_eq!(content_type, TEXT_HTML_UTF8);
                let html = String::from_utf8(bytes.clone()).unwrap();
                assert!(html.contains("<li><a href=\"inner.bin\">inner.bin</a></li>"));
                assert_eq!(html.matches("<li>").count(), 1);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_root_lists_subdirectory_with_slash() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let response = context.dispatch(&get("/"));

        match response.body() {
            crate::http::Body::Bytes { bytes, .. } => {
                let html = String::from_utf8(bytes.clone()).unwrap();
                assert!(html.contains("<li><a href=\"sub/\">sub/</a></li>"));
                assert!(html.contains("<li><a href=\"a.txt\">a.txt</a></li>"));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_not_found() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let response = context.dispatch(&get("/missing"));

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), &crate::http::Body::Empty);
    }

    #[test]
    fn test_dispatch_traversal_is_forbidden() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let response = context.dispatch(&get("/../etc/passwd"));

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.body(), &crate::http::Body::Empty);
    }

    #[test]
    fn test_dispatch_unsupported_methods() {
        let (_dir, context) = setup(Duration::from_secs(5));

        for method in ["HEAD", "POST", "DELETE", "BREW"] {
            let request = Request::new(method, "/a.txt", "HTTP/1.1", Default::default());
            let response = context.dispatch(&request);

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(
                response.body(),
                &crate::http::Body::Bytes {
                    bytes: OPERATION_NOT_SUPPORTED.as_bytes().to_vec(),
                    content_type: crate::http::response::TEXT_PLAIN_UTF8.to_string(),
                }
            );
        }
    }

    #[test]
    fn test_dispatch_lowercase_get() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let request = Request::new("get", "/a.txt", "HTTP/1.1", Default::default());
        assert_eq!(context.dispatch(&request).status(), StatusCode::OK);
    }

    #[test]
    fn test_map_error() {
        let io_err = HandlerError::Io(io::Error::new(io::ErrorKind::Other, "secret detail"));
        let response = map_error(&io_err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), &crate::http::Body::Empty);

        let not_found = HandlerError::NotFound("x".to_string());
        assert_eq!(map_error(&not_found).status(), StatusCode::NOT_FOUND);

        let denied = HandlerError::AccessDenied("x".to_string());
        assert_eq!(map_error(&denied).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_keep_alive_on_one_connection() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let (handler, mut client) = connected_pair(&context);
        let worker = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || handler.handle_requests())
        };

        let mut reader = BufReader::new(client.try_clone().unwrap());
        for _ in 0..3 {
            client.write_all(b"GET /a.txt HTTP/1.1\r\nHost: test\r\n\r\n").unwrap();
            let (head, body) = read_response(&mut reader);
            assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(head.contains("Connection: keep-alive\r\n"));
            assert!(head.contains("Keep-Alive: timeout=5, max=10\r\n"));
            assert_eq!(body, b"ABCD");
        }

        client.shutdown(Shutdown::Write).unwrap();
        worker.join().unwrap();
        assert!(handler.is_closed());
    }

    #[test]
    fn test_malformed_header_closes_without_response() {
        let (_dir, context) = setup(Duration::from_secs(5));
        let (handler, mut client) = connected_pair(&context);
        let worker = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || handler.handle_requests())
        };

        client.write_all(b"GET /a.txt HTTP/1.1\r\nno colon here\r\n\r\n").unwrap();
        worker.join().unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_idle_timeout_closes_connection() {
        let (_dir, context) = setup(Duration::from_millis(200));
        let (handler, mut client) = connected_pair(&context);
        let worker = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || handler.handle_requests())
        };

        let started = Instant::now();
        worker.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(handler.is_closed());

        // El servidor cerró: el cliente lee fin de stream
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stop_unblocks_reader_and_is_idempotent() {
        let (_dir, context) = setup(Duration::from_secs(60));
        let (handler, _client) = connected_pair(&context);
        let worker = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || handler.handle_requests())
        };

        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        handler.stop();
        handler.stop();
        worker.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(handler.is_closed());
        handler.stop();
    }
}
