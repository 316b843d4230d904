use crate::prelude::*;

use std::collections::BTreeMap;

/// Number of serial ports that may be in use at the same time.
pub const MAX_CONTROLLERS: usize = 3;

pub type SharedPortManager = Arc<Mutex<PortManager>>;

/// Hands out serial ports to their owners and refuses double allocation.
#[derive(Debug, Default)]
pub struct PortManager {
    // port -> owner
    allocated: BTreeMap<String, String>,
}

impl PortManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPortManager {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn allocate(&mut self, port: &str, owner: &str) -> bool {
        if let Some(current) = self.allocated.get(port) {
            warn!("[PortManager] port {} is already allocated to {}", port, current);
            return false;
        }

        if self.allocated.len() >= MAX_CONTROLLERS {
            warn!(
                "[PortManager] cannot allocate {} for {}: all {} ports in use",
                port, owner, MAX_CONTROLLERS
            );
            return false;
        }

        info!("[PortManager] allocating port {} to {}", port, owner);
        self.allocated.insert(port.to_string(), owner.to_string());
        true
    }

    /// Releases every port held by `owner`.
    pub fn free(&mut self, owner: &str) {
        self.allocated.retain(|port, current| {
            if current == owner {
                info!("[PortManager] removing port {}, owner {}", port, owner);
                return false;
            }
            true
        });
    }

    pub fn owner_of(&self, port: &str) -> Option<&str> {
        self.allocated.get(port).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }
}
