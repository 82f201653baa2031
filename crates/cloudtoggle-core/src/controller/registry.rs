use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ResourceController;
use crate::types::ResourceKind;

/// Immutable map from resource kind to controller, built once at startup.
#[derive(Default, Clone)]
pub struct ControllerRegistry {
    controllers: HashMap<ResourceKind, Arc<dyn ResourceController>>,
}

impl ControllerRegistry {
    pub fn builder() -> ControllerRegistryBuilder {
        ControllerRegistryBuilder::default()
    }

    /// Controller for `kind`, or `None` when nothing is registered for it.
    pub fn get(&self, kind: &ResourceKind) -> Option<Arc<dyn ResourceController>> {
        self.controllers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &ResourceKind) -> bool {
        self.controllers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.controllers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[derive(Default)]
pub struct ControllerRegistryBuilder {
    controllers: HashMap<ResourceKind, Arc<dyn ResourceController>>,
}

impl ControllerRegistryBuilder {
    /// Register `controller` under `kind`. A later registration for the same
    /// kind replaces the earlier one.
    pub fn register(
        mut self,
        kind: impl Into<ResourceKind>,
        controller: Arc<dyn ResourceController>,
    ) -> Self {
        let kind = kind.into();
        info!(kind = %kind, "registering resource controller");
        if self.controllers.insert(kind.clone(), controller).is_some() {
            warn!(kind = %kind, "replaced previously registered controller");
        }
        self
    }

    /// Register `controller` under its own `kind()`.
    pub fn with(self, controller: Arc<dyn ResourceController>) -> Self {
        let kind = controller.kind();
        self.register(kind, controller)
    }

    pub fn build(self) -> ControllerRegistry {
        ControllerRegistry {
            controllers: self.controllers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ComputeController, DatabaseController};
    use crate::provider::{FleetSpec, SimulatedFleet};

    fn fleet() -> Arc<SimulatedFleet> {
        Arc::new(SimulatedFleet::new(FleetSpec::default()))
    }

    #[test]
    fn unknown_kind_is_absent() {
        let registry = ControllerRegistry::builder()
            .with(Arc::new(ComputeController::new(fleet())))
            .build();
        assert!(registry.get(&ResourceKind::compute()).is_some());
        assert!(registry.get(&ResourceKind::new("S3")).is_none());
        assert!(!registry.contains(&ResourceKind::database()));
    }

    #[test]
    fn kinds_are_sorted() {
        let f = fleet();
        let registry = ControllerRegistry::builder()
            .with(Arc::new(DatabaseController::new(f.clone())))
            .with(Arc::new(ComputeController::new(f)))
            .build();
        assert_eq!(
            registry.kinds(),
            vec![ResourceKind::compute(), ResourceKind::database()]
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn empty_registry() {
        let registry = ControllerRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.kinds().is_empty());
    }
}
