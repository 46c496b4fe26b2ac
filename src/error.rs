//! # Errores del Servidor
//! src/error.rs
//!
//! Dos familias de errores:
//!
//! - [`ServerError`]: fallos de arranque y de ciclo de vida (bind, config,
//!   start/stop). Son fatales para quien los recibe.
//! - [`HandlerError`]: fallos dentro de un request. Nunca salen del
//!   handler de conexión: se convierten en una respuesta en un único punto
//!   (`server::connection::map_error`).

use std::io;
use thiserror::Error;

/// Errores de arranque y de ciclo de vida del servidor
#[derive(Debug, Error)]
pub enum ServerError {
    /// No se pudo hacer bind al puerto configurado
    #[error("could not bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Se agotaron los intentos de bind a un puerto aleatorio
    #[error("could not find an available random port in {lower}..={upper} after {attempts} attempts")]
    RandomPortExhausted { attempts: u32, lower: u16, upper: u16 },

    /// Configuración inválida
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start()` llamado dos veces
    #[error("server already started")]
    AlreadyStarted,

    /// Operación sobre un servidor ya detenido
    #[error("server already closed")]
    AlreadyClosed,

    /// `join()` o `local_port()` antes de `start()`
    #[error("server not started")]
    NotStarted,

    /// El thread del accept loop terminó con panic
    #[error("accept loop panicked")]
    AcceptLoopPanicked,

    /// Cualquier otro error de I/O
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Resultado de las operaciones de ciclo de vida
pub type ServerResult<T> = Result<T, ServerError>;

/// Errores de un request individual, ya clasificados para elegir la respuesta
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Método distinto de GET (incluido HEAD)
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// El file service negó el acceso a la ruta
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Ni archivo ni directorio
    #[error("not found: {0}")]
    NotFound(String),

    /// Cualquier otro fallo: 500 sin detalles hacia el cliente
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HandlerError {
    /// Clasifica un error de I/O del file service.
    ///
    /// `PermissionDenied` se convierte en 403; el resto queda como 500.
    pub fn from_file_service(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => HandlerError::AccessDenied(path.to_string()),
            io::ErrorKind::NotFound => HandlerError::NotFound(path.to_string()),
            _ => HandlerError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_file_service_permission_denied() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            HandlerError::from_file_service("secret", err),
            HandlerError::AccessDenied(p) if p == "secret"
        ));
    }

    #[test]
    fn test_from_file_service_other_is_io() {
        let err = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert!(matches!(
            HandlerError::from_file_service("a", err),
            HandlerError::Io(_)
        ));
    }

    #[test]
    fn test_random_port_exhausted_message() {
        let err = ServerError::RandomPortExhausted { attempts: 10, lower: 40000, upper: 49999 };
        assert_eq!(
            err.to_string(),
            "could not find an available random port in 40000..=49999 after 10 attempts"
        );
    }
}
