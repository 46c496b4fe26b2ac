//! # Construcción y Escritura de Respuestas HTTP
//! src/http/response.rs
//!
//! Una [`Response`] es la *intención* de respuesta: status, headers y un
//! [`Body`] (archivo, bytes en memoria o vacío). El [`ResponseWriter`] la
//! serializa sobre el stream de la conexión sin cerrarlo, porque el mismo
//! stream se reutiliza para los requests siguientes.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 4\r\n
//! Content-Type: text/plain\r\n
//! Connection: keep-alive\r\n
//! Keep-Alive: timeout=10, max=10\r\n
//! \r\n
//! ABCD
//! ```
//!
//! Los headers salen en orden de inserción. `Content-Length` siempre está
//! presente y `Connection`/`Keep-Alive` se agregan en cada respuesta.

use super::StatusCode;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Content type por defecto cuando no se puede adivinar por la extensión
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Content type de los listados de directorio
pub const TEXT_HTML_UTF8: &str = "text/html; charset=utf-8";

/// Content type de los mensajes de error en texto plano
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Valor `max` que se anuncia en el header `Keep-Alive`
pub const KEEP_ALIVE_MAX: u32 = 10;

const CRLF: &str = "\r\n";

/// Cuerpo de una respuesta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Contenido de un archivo; se copia del disco al socket sin cargarlo entero
    File(PathBuf),

    /// Bytes en memoria con su content type
    Bytes { bytes: Vec<u8>, content_type: String },

    /// Sin body (`Content-Length: 0`)
    Empty,
}

/// Una respuesta HTTP lista para escribir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: IndexMap<String, String>,
    body: Body,
}

impl Response {
    /// Crea una respuesta sin headers ni body
    ///
    /// # Ejemplo
    /// ```
    /// use http_file_server::http::{Response, StatusCode};
    ///
    /// let response = Response::new(StatusCode::NOT_FOUND);
    /// assert!(response.headers().is_empty());
    /// ```
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: Body::Empty,
        }
    }

    /// 200 con el contenido de un archivo
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(StatusCode::OK).with_body(Body::File(path.into()))
    }

    /// Respuesta con bytes en memoria
    pub fn bytes(status: StatusCode, bytes: Vec<u8>, content_type: &str) -> Self {
        Self::new(status).with_body(Body::Bytes {
            bytes,
            content_type: content_type.to_string(),
        })
    }

    /// Respuesta con un mensaje en texto plano UTF-8
    pub fn text(status: StatusCode, message: &str) -> Self {
        Self::bytes(status, message.as_bytes().to_vec(), TEXT_PLAIN_UTF8)
    }

    /// Agrega un header (si ya existe, se sobrescribe en su posición original)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Versión mutable de [`Response::with_header`]
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Reemplaza el body
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Obtiene el código de estado
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Obtiene los headers agregados por el llamador
    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Obtiene el body
    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// Adivina el content type de un archivo por su extensión
///
/// # Ejemplo
/// ```
/// use http_file_server::http::response::guess_content_type;
///
/// assert_eq!(guess_content_type("image.png".as_ref()), "image/png");
/// assert_eq!(guess_content_type("cs_quotes".as_ref()), "application/octet-stream");
/// ```
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(APPLICATION_OCTET_STREAM)
        .to_string()
}

/// Serializa respuestas sobre el stream de una conexión.
///
/// Es barato de clonar y se comparte entre todas las conexiones.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    keep_alive_timeout_secs: u64,
}

impl ResponseWriter {
    /// Crea un writer que anuncia `keep_alive_timeout` en el header `Keep-Alive`
    pub fn new(keep_alive_timeout: Duration) -> Self {
        Self {
            keep_alive_timeout_secs: keep_alive_timeout.as_secs(),
        }
    }

    /// Escribe la respuesta completa y hace flush. No cierra `out`.
    ///
    /// # Errores
    ///
    /// Cualquier error de I/O: abrir el archivo del body o escribir en el
    /// socket. Un error de archivo antes de escribir el status line deja el
    /// stream intacto, así que el llamador todavía puede contestar un 500.
    pub fn write<W: Write>(&self, out: &mut W, response: Response) -> io::Result<()> {
        let Response { status, mut headers, body } = response;

        match body {
            Body::File(path) => {
                let mut file = File::open(&path)?;
                let size = file.metadata()?.len();
                let content_type = guess_content_type(&path);
                debug!(
                    file = %path.display(),
                    content_type = %content_type,
                    size,
                    "Sending file in HTTP response"
                );
                headers.insert("Content-Length".to_string(), size.to_string());
                headers.insert("Content-Type".to_string(), content_type);
                self.write_head(out, status, headers)?;
                io::copy(&mut file, out)?;
            }
            Body::Bytes { bytes, content_type } => {
                headers.insert("Content-Length".to_string(), bytes.len().to_string());
                headers.insert("Content-Type".to_string(), content_type);
                self.write_head(out, status, headers)?;
                out.write_all(&bytes)?;
            }
            Body::Empty => {
                headers.insert("Content-Length".to_string(), "0".to_string());
                self.write_head(out, status, headers)?;
            }
        }

        out.flush()
    }

    /// Status line + headers + línea vacía
    fn write_head<W: Write>(
        &self,
        out: &mut W,
        status: StatusCode,
        mut headers: IndexMap<String, String>,
    ) -> io::Result<()> {
        let reason = status.reason_phrase().unwrap_or_else(|| {
            warn!(status = status.as_u16(), "Missing status string for status");
            ""
        });

        headers.insert("Connection".to_string(), "keep-alive".to_string());
        headers.insert(
            "Keep-Alive".to_string(),
            format!("timeout={}, max={}", self.keep_alive_timeout_secs, KEEP_ALIVE_MAX),
        );

        let mut head = format!("HTTP/1.1 {} {}{}", status.as_u16(), reason, CRLF);
        for (name, value) in &headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str(CRLF);
        }
        head.push_str(CRLF);

        out.write_all(head.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn writer() -> ResponseWriter {
        ResponseWriter::new(Duration::from_secs(10))
    }

    fn render(response: Response) -> String {
        let mut out = Vec::new();
        writer().write(&mut out, response).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_response() {
        let text = render(Response::new(StatusCode::NOT_FOUND));

        assert_eq!(
            text,
            "HTTP/1.1 404 Not Found\r\n\
             Content-Length: 0\r\n\
             Connection: keep-alive\r\n\
             Keep-Alive: timeout=10, max=10\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_bytes_response() {
        let text = render(Response::bytes(StatusCode::OK, b"<p>hi</p>".to_vec(), TEXT_HTML_UTF8));

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(text.ends_with("\r\n\r\n<p>hi</p>"));
    }

    #[test]
    fn test_text_response() {
        let response = Response::text(StatusCode::NOT_FOUND, "Operation not supported");
        let text = render(response);

        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.ends_with("\r\n\r\nOperation not supported"));
    }

    #[test]
    fn test_unknown_status_has_empty_reason() {
        let text = render(Response::new(StatusCode::from_u16(299)));
        assert!(text.starts_with("HTTP/1.1 299 \r\n"));
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let response = Response::new(StatusCode::OK)
            .with_header("X-First", "1")
            .with_header("X-Second", "2");
        let text = render(response);

        let first = text.find("X-First").unwrap();
        let second = text.find("X-Second").unwrap();
        let length = text.find("Content-Length").unwrap();
        let keep_alive = text.find("Keep-Alive").unwrap();
        assert!(first < second && second < length && length < keep_alive);
    }

    #[test]
    fn test_file_response_streams_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"ABCD").unwrap();

        let text = render(Response::file(&path));

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("\r\n\r\nABCD"));
    }

    #[test]
    fn test_missing_file_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        let result = writer().write(&mut out, Response::file(dir.path().join("missing")));

        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_keep_alive_reflects_timeout() {
        let mut out = Vec::new();
        ResponseWriter::new(Duration::from_secs(3))
            .write(&mut out, Response::new(StatusCode::OK))
            .unwrap();

        assert!(String::from_utf8(out).unwrap().contains("Keep-Alive: timeout=3, max=10\r\n"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("image.png")), "image/png");
        assert_eq!(guess_content_type(Path::new("dir1/a")), APPLICATION_OCTET_STREAM);
    }
}
