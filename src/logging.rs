//! # Logging
//! src/logging.rs
//!
//! Inicialización de `tracing-subscriber`. El resto del crate solo usa las
//! macros de `tracing`; cada conexión corre dentro de un span `conn` con la
//! dirección del cliente, así que todas sus líneas de log llevan el peer.
//!
//! ```rust,ignore
//! use http_file_server::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! tracing::info!(port = 8080, "Accepting new connections");
//! ```

use clap::ValueEnum;
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Formato de salida de los logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multilínea, para desarrollo
    Pretty,
    /// Una línea por evento
    Compact,
    /// JSON, para producción
    Json,
}

/// Configuración de logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directiva de `EnvFilter` (ej: "info", "http_file_server=debug")
    pub level: String,

    /// Formato de salida
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Instala el subscriber global.
///
/// # Errores
///
/// Retorna un mensaje si el filtro es inválido o si ya había un subscriber
/// instalado.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| format!("Invalid log level {:?}: {}", config.level, e))?;

    let layer = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_thread_names(true)
            .with_current_span(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| e.to_string())
}
