//! # HTTP File Server
//! src/lib.rs
//!
//! Servidor de archivos HTTP/1.1 con conexiones persistentes (keep-alive),
//! timeout de inactividad y un pool de workers acotado. Todo el I/O es
//! bloqueante: un thread corre el accept loop y cada conexión activa ocupa
//! un worker.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: Parsing de requests y escritura de responses
//! - `server`: Acceptor, handler de conexión y fachada `TcpServer`
//! - `fileserver`: Acceso al directorio base (`FileService`)
//! - `workers`: Pool de threads con entrega directa
//! - `config`: Configuración por CLI y variables de entorno
//! - `error`: Errores de arranque y de request
//! - `logging`: Inicialización de `tracing`
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use http_file_server::config::Config;
//! use http_file_server::server::TcpServer;
//!
//! let config = Config { port: 0, ..Config::default() };
//! let server = TcpServer::new(config);
//! server.start().expect("Error al iniciar servidor");
//! println!("Escuchando en el puerto {}", server.local_port().unwrap());
//! server.join().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod fileserver;
pub mod http;
pub mod logging;
pub mod server;
pub mod workers;
