//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Este módulo implementa el servidor de archivos:
//! 1. Hace bind a un puerto fijo o aleatorio (`acceptor`)
//! 2. Acepta conexiones y las entrega a un pool de workers acotado
//! 3. Procesa varios requests por conexión con keep-alive (`connection`)
//! 4. Sirve archivos y listados de directorios (`listing`)
//!
//! `TcpServer` (en `tcp`) junta todo detrás de `start`/`join`/`stop`.

pub mod acceptor;
pub mod connection;
pub mod listing;
pub mod tcp;

// Re-exportar para facilitar el uso
pub use acceptor::ConnectionAcceptor;
pub use connection::{map_error, ConnectionContext, ConnectionHandler};
pub use tcp::TcpServer;
