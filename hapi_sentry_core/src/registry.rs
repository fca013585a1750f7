/**
 * Init-once holder for the bound `Client`.
 *
 * A `Registry` is an explicit handle: components that report events can be
 * given one directly. The process-default registry behind
 * `Registry::global()` backs the free functions of the crate root.
 *
 * Binding succeeds exactly once per registry; later binds are rejected and
 * the first client stays in place.
 */
use std::sync::{Arc, OnceLock};

use crate::client::Client;

/// Process-default registry.
static GLOBAL_REGISTRY: Registry = Registry::new();

#[derive(Default)]
pub struct Registry {
    client: OnceLock<Arc<Client>>,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            client: OnceLock::new(),
        }
    }

    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    /**
     * Binds `client` to this registry.
     *
     * # Returns
     * `true` if the client was bound, `false` if another client already was.
     */
    pub fn bind_client(&self, client: Arc<Client>) -> bool {
        self.client.set(client).is_ok()
    }

    /// The bound client, or `None` before the first successful bind.
    pub fn client(&self) -> Option<&Arc<Client>> {
        self.client.get()
    }

    pub fn is_bound(&self) -> bool {
        self.client.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn client(logger: &str) -> Arc<Client> {
        Arc::new(
            Client::new(Options {
                logger: logger.into(),
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_unbound_registry_has_no_client() {
        let registry = Registry::new();
        assert!(!registry.is_bound());
        assert!(registry.client().is_none());
    }

    #[test]
    fn test_first_bind_wins() {
        let registry = Registry::new();
        assert!(registry.bind_client(client("first")));
        assert!(!registry.bind_client(client("second")));
        assert_eq!(registry.client().unwrap().options().logger, "first");
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(Registry::global(), Registry::global()));
    }
}
