//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor de archivos con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./http_file_server --port 0 \
//!   --thread-pool-size 16 \
//!   --keep-alive-timeout 5 \
//!   --base-path ./public
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 BASE_PATH=/srv/files ./http_file_server
//! ```

use crate::error::{ServerError, ServerResult};
use crate::logging::{LogConfig, LogFormat};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuración del servidor de archivos HTTP/1.1
#[derive(Debug, Clone, Parser, Serialize)]
#[command(name = "http_file_server")]
#[command(about = "Servidor de archivos HTTP/1.1 con keep-alive y pool de workers acotado")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    /// Puerto en el que escucha el servidor (0 = puerto aleatorio libre)
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Máximo de conexiones atendidas en paralelo
    #[arg(long = "thread-pool-size", default_value = "10", env = "THREAD_POOL_SIZE")]
    pub thread_pool_size: usize,

    /// Segundos que una conexión puede quedar ociosa esperando el próximo request
    #[arg(long = "keep-alive-timeout", default_value = "10", env = "KEEP_ALIVE_TIMEOUT")]
    pub keep_alive_timeout_secs: u64,

    /// Directorio desde el que se sirven los archivos
    #[arg(long = "base-path", default_value = ".", env = "BASE_PATH")]
    pub base_path: PathBuf,

    /// Filtro de logs (ej: "info", "http_file_server=debug")
    #[arg(long = "log-level", default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Formato de los logs
    #[arg(long = "log-format", value_enum, default_value = "pretty", env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección de bind con el puerto indicado
    ///
    /// # Ejemplo
    /// ```rust
    /// use http_file_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(8080), "127.0.0.1:8080");
    /// ```
    pub fn address(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }

    /// Timeout de inactividad como `Duration`
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    /// Directorio base de archivos
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Configuración de logging derivada
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }

    /// Valida la configuración
    ///
    /// Retorna `ServerError::InvalidConfig` si hay valores inválidos
    pub fn validate(&self) -> ServerResult<()> {
        if self.thread_pool_size == 0 {
            return Err(ServerError::InvalidConfig(
                "Thread pool size must be >= 1".to_string(),
            ));
        }

        if self.keep_alive_timeout_secs == 0 {
            return Err(ServerError::InvalidConfig(
                "Keep-alive timeout must be > 0".to_string(),
            ));
        }

        // El timeout se aplica en milisegundos; tiene que caber en un i32
        if self.keep_alive_timeout_secs.saturating_mul(1000) > i32::MAX as u64 {
            return Err(ServerError::InvalidConfig(format!(
                "Keep-alive timeout of {} seconds is too large, must be smaller than {} millis",
                self.keep_alive_timeout_secs,
                i32::MAX
            )));
        }

        if !self.base_path.is_dir() {
            return Err(ServerError::InvalidConfig(format!(
                "Base path is not a directory: {}",
                self.base_path.display()
            )));
        }

        Ok(())
    }

    /// Registra un resumen de la configuración en los logs
    pub fn log_summary(&self) {
        let port = if self.port == 0 {
            "random".to_string()
        } else {
            self.port.to_string()
        };
        info!(
            host = %self.host,
            port = %port,
            thread_pool_size = self.thread_pool_size,
            keep_alive_timeout_secs = self.keep_alive_timeout_secs,
            base_path = %self.base_path.display(),
            "Configuration"
        );
        if let Ok(json) = serde_json::to_string(self) {
            tracing::debug!(config = %json, "Effective configuration");
        }
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            thread_pool_size: 10,
            keep_alive_timeout_secs: 10,
            base_path: PathBuf::from("."),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.thread_pool_size, 10);
        assert_eq!(config.keep_alive_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_address_custom() {
        let mut config = Config::default();
        config.host = "0.0.0.0".to_string();
        assert_eq!(config.address(3000), "0.0.0.0:3000");
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::try_parse_from([
            "http_file_server",
            "--port",
            "0",
            "--thread-pool-size",
            "4",
            "--keep-alive-timeout",
            "2",
            "--base-path",
            "/tmp",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.port, 0);
        assert_eq!(config.thread_pool_size, 4);
        assert_eq!(config.keep_alive_timeout_secs, 2);
        assert_eq!(config.base_path, PathBuf::from("/tmp"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_rejects_out_of_range_port() {
        assert!(Config::try_parse_from(["http_file_server", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_validate_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.base_path = dir.path().to_path_buf();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_pool_size() {
        let mut config = Config::default();
        config.thread_pool_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Thread pool size"));
    }

    #[test]
    fn test_validate_invalid_timeout() {
        let mut config = Config::default();
        config.keep_alive_timeout_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("Keep-alive timeout"));

        config.keep_alive_timeout_secs = u64::MAX;
        assert!(config.validate().unwrap_err().to_string().contains("too large"));
    }

    #[test]
    fn test_validate_missing_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.base_path = dir.path().join("does-not-exist");
        assert!(config.validate().unwrap_err().to_string().contains("Base path"));
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["port"], 8080);
        assert_eq!(json["log_format"], "pretty");
    }
}
