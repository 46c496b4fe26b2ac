//! # HTTP File Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor de archivos.
//!
//! Lee la configuración (CLI + variables de entorno), inicializa el logging,
//! arranca el servidor y lo detiene con SIGINT/SIGTERM.

use http_file_server::config::Config;
use http_file_server::logging::init_logging;
use http_file_server::server::TcpServer;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

fn main() {
    let config = Config::new();

    if let Err(e) = init_logging(&config.log_config()) {
        eprintln!("Error al inicializar logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        process::exit(1);
    }

    let server = Arc::new(TcpServer::new(config));
    server.config().log_summary();
    if let Err(e) = server.start() {
        error!(error = %e, "Could not start server");
        process::exit(1);
    }

    if let Err(e) = install_signal_handler(Arc::clone(&server)) {
        error!(error = %e, "Could not install signal handler");
        server.stop();
        process::exit(1);
    }

    if let Err(e) = server.join() {
        error!(error = %e, "Server terminated with error");
        server.stop();
        process::exit(1);
    }
    info!("Bye");
}

/// Detiene el servidor al recibir SIGINT o SIGTERM
#[cfg(unix)]
fn install_signal_handler(server: Arc<TcpServer>) -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "Received shutdown signal");
                server.stop();
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handler(_server: Arc<TcpServer>) -> std::io::Result<()> {
    Ok(())
}
