//! Local port pool for benchmark workers
//!
//! Every validator worker needs a distinct local listen port for its
//! throwaway proxy instance. Checkout blocks until a port is free; the
//! lease returns its port on drop, so every exit path checks back in.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::{ProspectorError, Result};

struct Inner {
    free: Mutex<Vec<u16>>,
    available: Semaphore,
    size: usize,
}

/// Fixed-size pool of distinct local ports
#[derive(Clone)]
pub struct PortPool {
    inner: Arc<Inner>,
}

impl PortPool {
    /// Pool of `count` consecutive ports starting at `base`
    pub fn new(base: u16, count: usize) -> Self {
        let ports: Vec<u16> = (0..count).map(|i| base + i as u16).collect();
        PortPool {
            inner: Arc::new(Inner {
                available: Semaphore::new(ports.len()),
                size: ports.len(),
                free: Mutex::new(ports),
            }),
        }
    }

    /// Block until a port is free and lease it
    pub async fn checkout(&self) -> Result<PortLease> {
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .map_err(|_| ProspectorError::PortPoolExhausted)?;
        permit.forget();

        let port = match self.inner.free.lock().pop() {
            Some(port) => port,
            None => {
                // Permit count tracks the free list; restore and bail
                self.inner.available.add_permits(1);
                return Err(ProspectorError::PortPoolExhausted);
            }
        };

        Ok(PortLease {
            port,
            inner: self.inner.clone(),
        })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Ports currently checked in
    pub fn free_count(&self) -> usize {
        self.inner.free.lock().len()
    }
}

/// A leased port; returns to the pool when dropped
pub struct PortLease {
    port: u16,
    inner: Arc<Inner>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.inner.free.lock().push(self.port);
        self.inner.available.add_permits(1);
    }
}
