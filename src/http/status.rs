//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Códigos de estado que usa el servidor de archivos. A diferencia de un enum
//! cerrado, `StatusCode` es un newtype sobre `u16`: el writer tiene que poder
//! serializar cualquier código, incluso uno sin reason phrase conocida
//! (en ese caso la frase queda vacía).
//!
//! - **2xx**: Éxito (200 OK)
//! - **4xx**: Error del cliente (400, 403, 404)
//! - **5xx**: Error del servidor (500)

use std::fmt;

/// Código de estado HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 200 OK - La petición fue exitosa
    pub const OK: StatusCode = StatusCode(200);

    /// 403 Forbidden - El file service negó el acceso a la ruta
    pub const FORBIDDEN: StatusCode = StatusCode(403);

    /// 404 Not Found - Ni archivo ni directorio (o método no soportado)
    pub const NOT_FOUND: StatusCode = StatusCode(404);

    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    /// Crea un código a partir de su valor numérico
    pub const fn from_u16(code: u16) -> Self {
        StatusCode(code)
    }

    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use http_file_server::http::StatusCode;
    /// assert_eq!(StatusCode::OK.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Retorna el reason phrase asociado al código, si lo conocemos
    ///
    /// # Ejemplo
    /// ```
    /// use http_file_server::http::StatusCode;
    /// assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), Some("Not Found"));
    /// assert_eq!(StatusCode::from_u16(299).reason_phrase(), None);
    /// ```
    pub fn reason_phrase(&self) -> Option<&'static str> {
        match self.0 {
            200 => Some("OK"),
            403 => Some("Forbidden"),
            404 => Some("Not Found"),
            500 => Some("Internal Server Error"),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    /// Formato: "200 OK" (o "299 " si no hay reason phrase)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase().unwrap_or(""))
    }
}
