//! # Parsing de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Parser orientado a líneas sobre un `BufRead`. Cada llamada a
//! [`Request::read_from`] consume exactamente un request (request line +
//! headers + línea vacía) y deja el stream posicionado al inicio del
//! siguiente, de modo que el mismo reader sirve para toda la conexión
//! keep-alive.
//!
//! ## Formato
//!
//! ```text
//! GET /dir/file.txt HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! \r\n
//! ```
//!
//! No se soportan bodies: los métodos con body no se manejan y el parser
//! nunca lee más allá de la línea vacía.

use indexmap::IndexMap;
use std::fmt;
use std::io::{self, BufRead};
use thiserror::Error;

/// Errores de un request malformado.
///
/// Cualquiera de estos cierra la conexión sin respuesta: no se pudo leer lo
/// suficiente del request como para contestar.
#[derive(Debug, Error)]
pub enum ParseError {
    /// La request line no tiene METHOD, target y versión
    #[error("malformed request line: {0:?}")]
    MissingFields(String),

    /// Header sin ':'
    #[error("malformed HTTP request, invalid header line: {0:?}")]
    InvalidHeader(String),

    /// El stream terminó antes de la línea vacía que cierra los headers
    #[error("error reading request, unexpected end of input")]
    UnexpectedEof,

    /// Error del socket (timeout, reset, close local...)
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ParseError {
    /// `true` si el error viene de que venció el read timeout del socket
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ParseError::Io(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Un request HTTP parseado. Inmutable una vez construido.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Método tal cual llegó (ej: "GET")
    method: String,

    /// Request-target sin decodificar (ej: "/dir/a%20b.txt")
    target: String,

    /// Versión (ej: "HTTP/1.1")
    version: String,

    /// Headers en orden de llegada; un nombre repetido conserva el último valor
    headers: IndexMap<String, String>,
}

impl Request {
    /// Construye un request a partir de sus partes
    pub fn new(
        method: impl Into<String>,
        target: impl Into<String>,
        version: impl Into<String>,
        headers: IndexMap<String, String>,
    ) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: version.into(),
            headers,
        }
    }

    /// Lee un request del reader.
    ///
    /// # Retorna
    ///
    /// * `Ok(Some(request))` - Un request completo
    /// * `Ok(None)` - Fin del stream antes de cualquier contenido: el cliente
    ///   no va a mandar más requests por esta conexión
    /// * `Err(ParseError)` - Request malformado o error del socket
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use http_file_server::http::Request;
    /// use std::io::Cursor;
    ///
    /// let mut reader = Cursor::new(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n".to_vec());
    /// let request = Request::read_from(&mut reader).unwrap().unwrap();
    ///
    /// assert_eq!(request.method(), "GET");
    /// assert_eq!(request.header("Host"), Some("x"));
    /// assert!(Request::read_from(&mut reader).unwrap().is_none());
    /// ```
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Option<Self>, ParseError> {
        // 1. Saltar líneas en blanco hasta la request line
        let request_line = loop {
            match read_line(reader)? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        // 2. METHOD SP target SP version
        let (method, target, version) = parse_request_line(&request_line)?;

        // 3. Headers hasta la línea vacía
        let mut headers = IndexMap::new();
        loop {
            let line = read_line(reader)?.ok_or(ParseError::UnexpectedEof)?;
            if line.trim().is_empty() {
                break;
            }
            let (name, value) = parse_header_line(&line)?;
            headers.insert(name, value);
        }

        Ok(Some(Request::new(method, target, version, headers)))
    }

    /// Obtiene el método HTTP del request
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Obtiene el request-target sin decodificar
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Obtiene la versión HTTP
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Obtiene todos los headers
    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    /// Obtiene un header específico (el nombre se compara tal cual)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    /// Ruta relativa al directorio base: el target completo sin el '/'
    /// inicial y con los `%XX` decodificados como UTF-8.
    ///
    /// `?` y `#` no tienen significado especial: son parte del nombre. Los
    /// octetos que no forman UTF-8 válido se reemplazan por U+FFFD.
    ///
    /// # Ejemplo
    /// ```
    /// use http_file_server::http::Request;
    ///
    /// let request = Request::new("GET", "/dir/a%20b.txt", "HTTP/1.1", Default::default());
    /// assert_eq!(request.relative_path(), "dir/a b.txt");
    /// ```
    pub fn relative_path(&self) -> String {
        let raw = self.target.strip_prefix('/').unwrap_or(&self.target);
        let decoded = urlencoding::decode_binary(raw.as_bytes());
        String::from_utf8_lossy(&decoded).into_owned()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.target, self.version)
    }
}

/// Lee una línea sin el terminador (`\n` o `\r\n`). `None` en fin de stream.
///
/// Los bytes que no son UTF-8 se reemplazan en vez de fallar; el parser solo
/// necesita ubicar espacios y ':'.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, ParseError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Parsea la request line: `GET /path HTTP/1.1`.
///
/// Se separa por espacios simples; campos extra al final se ignoran.
fn parse_request_line(line: &str) -> Result<(String, String, String), ParseError> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 3 {
        return Err(ParseError::MissingFields(line.to_string()));
    }
    Ok((
        parts[0].trim().to_string(),
        parts[1].trim().to_string(),
        parts[2].trim().to_string(),
    ))
}

/// Parsea un header: el nombre es lo que está antes del primer ':', el valor
/// es el resto sin espacios alrededor. No se separan valores por comas.
fn parse_header_line(line: &str) -> Result<(String, String), ParseError> {
    match line.split_once(':') {
        Some((name, value)) => Ok((name.to_string(), value.trim().to_string())),
        None => Err(ParseError::InvalidHeader(line.to_string())),
    }
}
