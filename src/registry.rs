use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::training::TrainedArtifact;

/// Single-slot holder of the active [`TrainedArtifact`].
///
/// Readers take an `Arc` snapshot; installing a new artifact swaps the slot
/// wholesale and never disturbs snapshots already handed out.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    slot: RwLock<Option<Arc<TrainedArtifact>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, artifact: TrainedArtifact) -> Arc<TrainedArtifact> {
        let artifact = Arc::new(artifact);
        info!(model = artifact.model_name(), "installed trained model");
        *self.slot.write() = Some(Arc::clone(&artifact));
        artifact
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedArtifact>> {
        self.slot.read().clone()
    }

    pub fn require(&self) -> ServiceResult<Arc<TrainedArtifact>> {
        self.snapshot().ok_or(ServiceError::ModelNotReady)
    }

    pub fn is_ready(&self) -> bool {
        self.slot.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::tests::{small_config, synthetic_records};
    use crate::training::train;

    #[test]
    fn empty_registry_reports_not_ready() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_ready());
        assert!(matches!(registry.require(), Err(ServiceError::ModelNotReady)));
    }

    #[test]
    fn install_replaces_wholesale_without_touching_snapshots() {
        let registry = ModelRegistry::new();
        let records = synthetic_records(50);
        let first = registry.install(train(&records, &small_config()).unwrap());
        let held = registry.snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &held));

        let second = registry.install(train(&records, &small_config()).unwrap());
        assert!(!Arc::ptr_eq(&held, &second));
        assert!(Arc::ptr_eq(&registry.require().unwrap(), &second));
        assert_eq!(held.metrics(), second.metrics());
    }
}
