//! # Módulo HTTP
//!
//! El subconjunto de HTTP/1.1 que habla el servidor de archivos:
//!
//! - Parsing de requests línea por línea (request line + headers)
//! - Escritura de respuestas con `Content-Length` y keep-alive
//! - Códigos de estado
//!
//! No hay bodies en los requests, ni chunked encoding, ni rangos.
//!
//! ### Formato de Request
//!
//! ```text
//! GET /path HTTP/1.1\r\n
//! Header-Name: Header-Value\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 4\r\n
//! Connection: keep-alive\r\n
//! Keep-Alive: timeout=10, max=10\r\n
//! \r\n
//! ABCD
//! ```

pub mod request;   // Parsing de HTTP requests
pub mod response;  // Construcción y escritura de HTTP responses
pub mod status;    // Códigos de estado HTTP

// Re-exportamos los tipos principales para facilitar su uso
pub use request::{ParseError, Request};
pub use response::{Body, Response, ResponseWriter};
pub use status::StatusCode;
