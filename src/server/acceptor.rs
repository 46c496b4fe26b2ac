//! # Acceptor de Conexiones
//! src/server/acceptor.rs
//!
//! Hace bind una sola vez, acepta conexiones hasta que lo detengan y entrega
//! cada socket aceptado al [`WorkerPool`]. Lleva un registro de los handlers
//! activos para poder cerrarlos todos al apagar.
//!
//! ## Apagado
//!
//! 1. Cerrar el listener (desbloquea el accept loop)
//! 2. Bajo el lock del registro, `stop()` a cada handler registrado
//! 3. `shutdown()` del pool y espera acotada (`POOL_GRACE_PERIOD`)
//! 4. Si vence la espera, `shutdown_now()`
//!
//! Un `TcpListener` de std no se puede cerrar desde otro thread mientras
//! `accept()` está bloqueado. Para despertarlo, `stop()` se conecta a su
//! propio puerto; el accept loop ve el flag de cerrado y sale.

use super::connection::{ConnectionContext, ConnectionHandler};
use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::workers::WorkerPool;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Límite inferior del rango de puertos aleatorios
pub const RANDOM_PORT_RANGE_LOWER: u16 = 40000;

/// Límite superior (inclusivo) del rango de puertos aleatorios
pub const RANDOM_PORT_RANGE_UPPER: u16 = 49999;

/// Intentos de bind antes de rendirse con un puerto aleatorio
pub const RANDOM_PORT_MAX_ATTEMPTS: u32 = 10;

/// Espera máxima a que los workers terminen durante el apagado
pub const POOL_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Workers que se mantienen vivos aunque estén ociosos
const POOL_MIN_SIZE: usize = 1;

/// Tiempo que un worker ocioso extra espera antes de terminar
const POOL_KEEP_ALIVE: Duration = Duration::from_secs(60);

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handlers activos. El flag `closed` se lee bajo el mismo lock que el
/// mapa, así un handler registrado durante el apagado nunca queda sin
/// `stop()`.
struct Registry {
    handlers: Mutex<HashMap<u64, Arc<ConnectionHandler>>>,
    closed: AtomicBool,
}

impl Registry {
    /// Retorna `false` si el acceptor ya está cerrado
    fn register(&self, handler: &Arc<ConnectionHandler>) -> bool {
        let mut handlers = self.handlers.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        handlers.insert(handler.id(), Arc::clone(handler));
        true
    }

    fn unregister(&self, id: u64) {
        self.handlers.lock().remove(&id);
    }
}

/// Saca al handler del registro cuando el job termina, incluso con panic
struct Registration {
    registry: Arc<Registry>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Acepta conexiones y las despacha al pool de workers
pub struct ConnectionAcceptor {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    context: Arc<ConnectionContext>,
    pool: WorkerPool,
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

impl ConnectionAcceptor {
    /// Hace bind según la configuración.
    ///
    /// Con `port == 0` elige un puerto aleatorio en
    /// `RANDOM_PORT_RANGE_LOWER..=RANDOM_PORT_RANGE_UPPER`.
    ///
    /// # Errores
    ///
    /// * `ServerError::Bind` - No se pudo usar el puerto fijo
    /// * `ServerError::RandomPortExhausted` - Todos los intentos aleatorios fallaron
    pub fn bind(config: &Config, context: Arc<ConnectionContext>) -> ServerResult<Self> {
        let listener = if config.port == 0 {
            bind_random(RANDOM_PORT_RANGE_LOWER..=RANDOM_PORT_RANGE_UPPER, |port| {
                TcpListener::bind(config.address(port))
            })?
        } else {
            TcpListener::bind(config.address(config.port)).map_err(|source| {
                ServerError::Bind {
                    port: config.port,
                    source,
                }
            })?
        };
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "Listening");

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            context,
            pool: WorkerPool::new(
                "http-handler",
                POOL_MIN_SIZE,
                config.thread_pool_size,
                POOL_KEEP_ALIVE,
            ),
            registry: Arc::new(Registry {
                handlers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
            next_id: AtomicU64::new(0),
        })
    }

    /// Puerto en el que quedó escuchando
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Dirección en la que quedó escuchando
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `true` después de `stop()`
    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(Ordering::SeqCst)
    }

    /// Conexiones registradas en este momento
    pub fn active_connections(&self) -> usize {
        self.registry.handlers.lock().len()
    }

    /// Accept loop. Bloquea hasta que alguien llame a `stop()` o falle el
    /// listener. Si `stop()` ya se llamó, retorna `Ok(())` sin aceptar nada.
    ///
    /// # Errores
    ///
    /// * `ServerError::Io` - Error inesperado de `accept()`; el acceptor
    ///   queda detenido
    pub fn run(&self) -> ServerResult<()> {
        let listener = match self.listener.lock().as_ref() {
            Some(listener) => listener.try_clone()?,
            None => {
                debug!("Acceptor stopped before the accept loop started");
                return Ok(());
            }
        };
        info!(port = self.local_port(), "Accepting new connections");

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if self.is_closed() {
                        debug!(peer = %peer, "Dropping connection accepted while stopping");
                        break;
                    }
                    self.dispatch(stream, peer);
                }
                Err(e) if self.is_closed() => {
                    debug!(error = %e, "Listener closed");
                    break;
                }
                // El cliente abortó antes de que lo aceptáramos
                Err(e) if e.kind() == io::ErrorKind::ConnectionAborted => {
                    debug!(error = %e, "Connection aborted before accept");
                }
                Err(e) => {
                    warn!(error = %e, "Error accepting connection, stopping");
                    self.stop();
                    return Err(e.into());
                }
            }
        }

        debug!("Accept loop finished");
        Ok(())
    }

    /// Entrega un socket aceptado al pool. Bloquea si todos los workers
    /// están ocupados.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let context = Arc::clone(&self.context);
        let registry = Arc::clone(&self.registry);
        debug!(peer = %peer, id, "Accepted connection");

        let submitted = self.pool.execute(move || {
            let handler = Arc::new(context.create_handler(id, stream));
            if !registry.register(&handler) {
                handler.stop();
                return;
            }
            let _registration = Registration { registry, id };
            handler.handle_requests();
        });

        if let Err(e) = submitted {
            if self.is_closed() {
                debug!(peer = %peer, error = %e, "Connection dropped during shutdown");
            } else {
                warn!(peer = %peer, error = %e, "Could not dispatch connection");
            }
        }
    }

    /// Detiene el acceptor y todas sus conexiones. Idempotente.
    pub fn stop(&self) {
        if self
            .registry
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Acceptor already closed");
            return;
        }
        info!(port = self.local_port(), "Stopping connection acceptor");

        self.close_listener();

        {
            let handlers = self.registry.handlers.lock();
            debug!(count = handlers.len(), "Closing active connections");
            for handler in handlers.values() {
                debug!(id = handler.id(), peer = handler.peer(), "Stopping connection");
                handler.stop();
            }
        }

        self.pool.shutdown();
        if !self.pool.await_termination(POOL_GRACE_PERIOD) {
            let abandoned = self.pool.shutdown_now();
            warn!(abandoned, "Worker pool did not terminate in time");
        }
        info!("Connection acceptor stopped");
    }

    /// Suelta el listener y despierta al accept loop si está bloqueado
    fn close_listener(&self) {
        drop(self.listener.lock().take());

        let target = SocketAddr::new(wake_ip(self.local_addr.ip()), self.local_addr.port());
        match TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
            Ok(_) => debug!("Woke up accept loop"),
            // Nadie estaba esperando en accept()
            Err(e) => debug!(error = %e, "Accept loop not listening"),
        }
    }
}

impl std::fmt::Debug for ConnectionAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAcceptor")
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

/// Bind a un puerto elegido al azar en `range`, reintentando con otro si
/// ya está en uso. Cualquier otro error de `bind` es definitivo.
fn bind_random<F>(range: RangeInclusive<u16>, mut bind: F) -> ServerResult<TcpListener>
where
    F: FnMut(u16) -> io::Result<TcpListener>,
{
    let mut rng = rand::thread_rng();

    for attempt in 1..=RANDOM_PORT_MAX_ATTEMPTS {
        let port = rng.gen_range(range.clone());
        match bind(port) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!(port, attempt, "Random port in use, retrying");
            }
            Err(source) => return Err(ServerError::Bind { port, source }),
        }
    }

    Err(ServerError::RandomPortExhausted {
        attempts: RANDOM_PORT_MAX_ATTEMPTS,
        lower: *range.start(),
        upper: *range.end(),
    })
}

/// Una dirección "any" no sirve como destino; se usa loopback
fn wake_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    }
}
