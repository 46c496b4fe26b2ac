//! # Servidor TCP
//! src/server/tcp.rs
//!
//! Fachada del servidor: un thread dedicado (`acceptor`) corre el accept
//! loop del [`ConnectionAcceptor`], y los handlers de conexión corren en su
//! pool de workers.
//!
//! ```rust,ignore
//! let server = Arc::new(TcpServer::new(config));
//! server.start()?;
//! println!("listening on {}", server.local_port()?);
//! server.join()?;
//! ```
//!
//! `stop()` puede llamarse desde cualquier thread mientras otro está en
//! `join()`.

use super::acceptor::ConnectionAcceptor;
use super::connection::ConnectionContext;
use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::fileserver::{FileService, LocalFileService};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Espera máxima a que el thread del accept loop termine en `stop()`
pub const ACCEPTOR_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Lifecycle {
    acceptor: Option<Arc<ConnectionAcceptor>>,
    handle: Option<JoinHandle<ServerResult<()>>>,
    started: bool,
    stopped: bool,
}

/// Señal de que el accept loop terminó, con o sin panic
#[derive(Default)]
struct Finished {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Finished {
    fn set(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }

    /// Retorna `true` si terminó antes de `timeout`
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
        *done
    }
}

struct FinishGuard(Arc<Finished>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Servidor de archivos HTTP/1.1
pub struct TcpServer {
    config: Config,
    file_service: Arc<dyn FileService>,
    lifecycle: Mutex<Lifecycle>,
    finished: Arc<Finished>,
}

impl TcpServer {
    /// Servidor que sirve archivos desde `config.base_path`
    pub fn new(config: Config) -> Self {
        let file_service = Arc::new(LocalFileService::new(config.base_path()));
        Self::with_file_service(config, file_service)
    }

    /// Servidor con un file service propio
    pub fn with_file_service(config: Config, file_service: Arc<dyn FileService>) -> Self {
        Self {
            config,
            file_service,
            lifecycle: Mutex::new(Lifecycle::default()),
            finished: Arc::new(Finished::default()),
        }
    }

    /// Hace bind y lanza el accept loop en segundo plano.
    ///
    /// Retorna apenas el loop queda corriendo.
    ///
    /// # Errores
    ///
    /// * `ServerError::AlreadyStarted` / `ServerError::AlreadyClosed`
    /// * Los errores de bind de [`ConnectionAcceptor::bind`]
    pub fn start(&self) -> ServerResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stopped {
            return Err(ServerError::AlreadyClosed);
        }
        if lifecycle.started {
            return Err(ServerError::AlreadyStarted);
        }

        let context = Arc::new(ConnectionContext::new(
            Arc::clone(&self.file_service),
            self.config.keep_alive_timeout(),
        ));
        let acceptor = Arc::new(ConnectionAcceptor::bind(&self.config, context)?);

        let handle = {
            let acceptor = Arc::clone(&acceptor);
            let finished = FinishGuard(Arc::clone(&self.finished));
            thread::Builder::new()
                .name("acceptor".to_string())
                .spawn(move || {
                    let _finished = finished;
                    acceptor.run()
                })?
        };

        info!(
            port = acceptor.local_port(),
            base_path = %self.file_service.base_path().display(),
            "Server started"
        );
        lifecycle.acceptor = Some(acceptor);
        lifecycle.handle = Some(handle);
        lifecycle.started = true;
        Ok(())
    }

    /// Bloquea hasta que termine el accept loop.
    ///
    /// # Errores
    ///
    /// * `ServerError::NotStarted` - No se llamó a `start()`
    /// * `ServerError::AcceptLoopPanicked` - El accept loop terminó con panic
    /// * El error con el que haya terminado el accept loop
    pub fn join(&self) -> ServerResult<()> {
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.started {
                return Err(ServerError::NotStarted);
            }
            lifecycle.handle.take()
        };

        match handle {
            Some(handle) => handle.join().map_err(|_| ServerError::AcceptLoopPanicked)?,
            // Otro thread ya hizo join
            None => Ok(()),
        }
    }

    /// Detiene el servidor. Idempotente.
    ///
    /// Espera hasta `ACCEPTOR_GRACE_PERIOD` a que termine el accept loop; si
    /// no termina, el thread queda suelto.
    pub fn stop(&self) {
        let acceptor = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.stopped {
                debug!("Server already stopped");
                return;
            }
            lifecycle.stopped = true;
            lifecycle.acceptor.clone()
        };

        let Some(acceptor) = acceptor else {
            debug!("Server stopped before start");
            return;
        };

        info!(port = acceptor.local_port(), "Stopping server");
        acceptor.stop();
        if self.finished.wait(ACCEPTOR_GRACE_PERIOD) {
            info!("Server stopped");
        } else {
            warn!(
                grace_secs = ACCEPTOR_GRACE_PERIOD.as_secs(),
                "Accept loop did not finish in time, detaching"
            );
        }
    }

    /// Puerto en el que escucha el servidor
    ///
    /// # Errores
    ///
    /// * `ServerError::NotStarted` - No se llamó a `start()`
    pub fn local_port(&self) -> ServerResult<u16> {
        self.lifecycle
            .lock()
            .acceptor
            .as_ref()
            .map(|acceptor| acceptor.local_port())
            .ok_or(ServerError::NotStarted)
    }

    /// Conexiones activas en este momento
    pub fn active_connections(&self) -> usize {
        self.lifecycle
            .lock()
            .acceptor
            .as_ref()
            .map_or(0, |acceptor| acceptor.active_connections())
    }

    /// Configuración con la que se creó el servidor
    pub fn config(&self) -> &Config {
        &self.config
    }
}
