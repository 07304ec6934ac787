use crate::error::{OverlayError, Result};
use log::{debug, warn};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// Caps the number of connection handlers running at once
///
/// Every accepted connection needs a permit; the permit is handed back
/// when its handler finishes, whether it ended cleanly or not.
pub struct ConnectionLimiter {
    active: RwLock<HashSet<SocketAddr>>,
    max_connections: usize,
}

/// Held by a running handler; releases its slot on drop
pub struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
    address: SocketAddr,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Self {
        Self {
            active: RwLock::new(HashSet::new()),
            max_connections,
        }
    }

    /// Claim a slot for `address`, or `None` when every slot is taken
    pub fn try_acquire(self: &Arc<Self>, address: SocketAddr) -> Result<Option<ConnectionPermit>> {
        let mut active = self
            .active
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire limiter lock: {e}")))?;

        if active.len() >= self.max_connections {
            return Ok(None);
        }
        active.insert(address);
        debug!("Handler slot taken by {address}");

        Ok(Some(ConnectionPermit {
            limiter: Arc::clone(self),
            address,
        }))
    }

    fn release(&self, address: &SocketAddr) {
        match self.active.write() {
            Ok(mut active) => {
                active.remove(address);
                debug!("Handler slot released by {address}");
            }
            Err(_) => warn!("Failed to release handler slot for {address}"),
        }
    }

    pub fn active_count(&self) -> usize {
        match self.active.read() {
            Ok(active) => active.len(),
            Err(_) => {
                log::error!("Failed to acquire limiter lock");
                0
            }
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.release(&self.address);
    }
}
