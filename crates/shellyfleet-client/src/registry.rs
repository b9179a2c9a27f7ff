use std::collections::HashMap;
use std::sync::Arc;

use shellyfleet_domain::DeviceGeneration;

use crate::client::{DeviceAuth, DeviceClient};
use crate::gen1::Gen1Client;
use crate::gen2::Gen2Client;

/// Dispatches by [`DeviceGeneration`] — a single-key registry, since there
/// is only one axis to dispatch on here.
pub struct ClientRegistry {
    clients: HashMap<DeviceGeneration, Arc<dyn DeviceClient>>,
}

impl ClientRegistry {
    /// Builds the default registry: one client per generation, sharing the
    /// same optional credentials.
    pub fn new(auth: DeviceAuth) -> Self {
        let mut clients: HashMap<DeviceGeneration, Arc<dyn DeviceClient>> = HashMap::new();
        clients.insert(DeviceGeneration::Gen1, Arc::new(Gen1Client::new(auth.clone())));
        clients.insert(DeviceGeneration::Gen2Plus, Arc::new(Gen2Client::new(auth)));
        ClientRegistry { clients }
    }

    pub fn for_generation(&self, generation: DeviceGeneration) -> Arc<dyn DeviceClient> {
        self.clients
        .get(&generation)
        .cloned()
        .expect("registry seeded with a client for every DeviceGeneration variant")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_distinct_clients_per_generation() {
        let registry = ClientRegistry::new(DeviceAuth::default());
        let _gen1 = registry.for_generation(DeviceGeneration::Gen1);
        let _gen2 = registry.for_generation(DeviceGeneration::Gen2Plus);
    }
}
