//! # Pool de Workers Acotado
//! src/workers/pool.rs
//!
//! Pool de threads reutilizables con entrega directa (sin cola):
//!
//! 1. Si hay un worker ocioso esperando, el job se le entrega a él.
//! 2. Si no, y hay menos de `max` threads, se crea uno nuevo con el job.
//! 3. Si no, quien envía el job se bloquea hasta que un worker quede libre.
//!
//! Los workers ociosos por encima de `min` terminan después de
//! `keep_alive` sin trabajo.
//!
//! El apagado es en dos fases: [`WorkerPool::shutdown`] deja de aceptar
//! trabajo y deja terminar lo que está corriendo, y
//! [`WorkerPool::shutdown_now`] abandona a los workers que sigan vivos.
//! Un thread de Rust no se puede interrumpir desde afuera; por eso quien usa
//! el pool tiene que desbloquear a sus jobs por su cuenta (el acceptor cierra
//! los sockets) antes de esperar la terminación.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Un trabajo para el pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errores al enviar un job
#[derive(Debug, Error)]
pub enum PoolError {
    /// El pool ya fue apagado
    #[error("worker pool is shut down")]
    Shutdown,

    /// El sistema operativo no pudo crear el thread
    #[error("could not spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Estado protegido por el mutex
struct State {
    /// Job entregado a un worker ocioso y todavía no tomado
    handoff: Option<Job>,

    /// Workers esperando trabajo
    idle: usize,

    /// Workers vivos
    threads: usize,

    /// Ya no se aceptan jobs
    shutdown: bool,

    /// Sufijo para el nombre del próximo thread
    next_id: usize,
}

struct Shared {
    name: String,
    min: usize,
    max: usize,
    keep_alive: Duration,
    state: Mutex<State>,
    /// Los workers ociosos esperan aquí un job
    work_ready: Condvar,
    /// Quien envía espera aquí a que se libere un worker
    worker_free: Condvar,
    /// `await_termination` espera aquí a que no queden threads
    terminated: Condvar,
}

/// Pool de threads con entrega directa
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Crea un pool vacío. Los threads se crean a demanda.
    ///
    /// `max` se fuerza a ser al menos 1 y `min` a no superar `max`.
    pub fn new(name: &str, min: usize, max: usize, keep_alive: Duration) -> Self {
        let max = max.max(1);
        Self {
            shared: Arc::new(Shared {
                name: name.to_string(),
                min: min.min(max),
                max,
                keep_alive,
                state: Mutex::new(State {
                    handoff: None,
                    idle: 0,
                    threads: 0,
                    shutdown: false,
                    next_id: 0,
                }),
                work_ready: Condvar::new(),
                worker_free: Condvar::new(),
                terminated: Condvar::new(),
            }),
        }
    }

    /// Ejecuta `job` en un worker.
    ///
    /// Bloquea si los `max` workers están ocupados.
    ///
    /// # Errores
    ///
    /// * `PoolError::Shutdown` - El pool fue apagado (antes o durante la espera)
    /// * `PoolError::Spawn` - No se pudo crear un thread nuevo
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        let mut state = self.shared.state.lock();

        loop {
            if state.shutdown {
                return Err(PoolError::Shutdown);
            }

            // 1. Entregar a un worker ocioso
            if state.idle > 0 && state.handoff.is_none() {
                state.handoff = Some(job);
                self.shared.work_ready.notify_one();
                return Ok(());
            }

            // 2. Crear un worker nuevo
            if state.threads < self.shared.max {
                state.threads += 1;
                let id = state.next_id;
                state.next_id += 1;
                drop(state);
                return self.spawn_worker(id, job);
            }

            // 3. Esperar a que alguno se libere
            self.shared.worker_free.wait(&mut state);
        }
    }

    fn spawn_worker(&self, id: usize, first_job: Job) -> Result<(), PoolError> {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.shared.name, id))
            .spawn(move || worker_loop(shared, first_job));

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                let mut state = self.shared.state.lock();
                state.threads -= 1;
                self.shared.worker_free.notify_one();
                self.shared.terminated.notify_all();
                Err(PoolError::Spawn(e))
            }
        }
    }

    /// Deja de aceptar jobs. Los que están corriendo terminan normalmente y
    /// los workers ociosos salen de inmediato. Idempotente.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if !state.shutdown {
            debug!(pool = %self.shared.name, "Shutting down worker pool");
            state.shutdown = true;
        }
        self.shared.work_ready.notify_all();
        self.shared.worker_free.notify_all();
    }

    /// Espera hasta `timeout` a que terminen todos los workers.
    ///
    /// Retorna `true` si no queda ninguno vivo.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.threads > 0 {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.threads == 0;
            }
        }
        true
    }

    /// Apaga el pool y abandona a los workers que sigan ocupados.
    ///
    /// Retorna cuántos workers quedaron vivos; sus threads terminan solos
    /// cuando su job retorne.
    pub fn shutdown_now(&self) -> usize {
        self.shutdown();
        let remaining = self.shared.state.lock().threads;
        if remaining > 0 {
            warn!(
                pool = %self.shared.name,
                remaining,
                "Abandoning workers that did not finish in time"
            );
        }
        remaining
    }

    /// Workers vivos (ocupados u ociosos)
    pub fn pool_size(&self) -> usize {
        self.shared.state.lock().threads
    }

    /// Workers ejecutando un job en este momento
    pub fn active_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.threads - state.idle
    }

    /// `true` después de `shutdown()`
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Loop de un worker: ejecuta el primer job y luego espera más hasta que
/// el pool se apague o venza su `keep_alive`.
fn worker_loop(shared: Arc<Shared>, first_job: Job) {
    trace!("Worker started");
    run_job(first_job);

    let mut state = shared.state.lock();
    loop {
        if state.shutdown && state.handoff.is_none() {
            break;
        }

        state.idle += 1;
        shared.worker_free.notify_one();
        let timed_out = wait_for_work(&shared, &mut state);
        state.idle -= 1;

        if let Some(job) = state.handoff.take() {
            shared.worker_free.notify_one();
            MutexGuard::unlocked(&mut state, || run_job(job));
            continue;
        }

        if state.shutdown {
            break;
        }
        if timed_out && state.threads > shared.min {
            trace!("Idle worker exiting");
            break;
        }
    }

    state.threads -= 1;
    shared.worker_free.notify_one();
    shared.terminated.notify_all();
    trace!("Worker terminated");
}

/// Espera un job entregado o el apagado. Retorna `true` si venció el
/// `keep_alive` sin trabajo.
fn wait_for_work(shared: &Shared, state: &mut MutexGuard<'_, State>) -> bool {
    loop {
        if state.handoff.is_some() || state.shutdown {
            return false;
        }
        if shared.work_ready.wait_for(state, shared.keep_alive).timed_out() {
            return state.handoff.is_none();
        }
    }
}

/// Ejecuta un job atrapando panics para que el worker sobreviva
fn run_job(job: Job) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!(
            thread = thread::current().name().unwrap_or("unnamed"),
            panic = %message,
            "Uncaught panic on worker thread"
        );
    }
}
