//! Validated launch plan: descriptors in launch order.

use std::collections::{BTreeMap, HashSet};

use super::error::DomainError;
use super::id::ServiceName;
use super::service::ServiceDescriptor;
use super::template::{Reference, BUILTINS};

/// Service descriptors arranged in their configured launch order.
///
/// Construction guarantees that names are unique, that the launch order is
/// a permutation of the declared set, and that every `${service.key}`
/// reference points at a service launched earlier that exports `key`.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    services: Vec<ServiceDescriptor>,
}

impl LaunchPlan {
    /// Validate `descriptors` against `launch_order` and build the plan.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn new(
        descriptors: Vec<ServiceDescriptor>,
        launch_order: &[ServiceName],
    ) -> Result<Self, DomainError> {
        if launch_order.is_empty() {
            return Err(DomainError::EmptyLaunchOrder);
        }

        let mut by_name: BTreeMap<ServiceName, ServiceDescriptor> = BTreeMap::new();
        for descriptor in descriptors {
            let name = descriptor.name().clone();
            if by_name.insert(name.clone(), descriptor).is_some() {
                return Err(DomainError::DuplicateService(name.to_string()));
            }
        }

        let mut seen = HashSet::new();
        let mut services = Vec::with_capacity(launch_order.len());
        for name in launch_order {
            if !seen.insert(name) {
                return Err(DomainError::DuplicateInLaunchOrder(name.to_string()));
            }
            let descriptor = by_name
                .remove(name)
                .ok_or_else(|| DomainError::UnknownService(name.to_string()))?;
            services.push(descriptor);
        }

        if let Some(name) = by_name.keys().next() {
            return Err(DomainError::MissingFromLaunchOrder(name.to_string()));
        }

        Self::check_references(&services)?;
        Ok(Self { services })
    }

    fn check_references(services: &[ServiceDescriptor]) -> Result<(), DomainError> {
        for (position, descriptor) in services.iter().enumerate() {
            let earlier = &services[..position];
            for reference in descriptor.references()? {
                match reference {
                    Reference::Builtin(variable) => {
                        if !BUILTINS.contains(&variable.as_str()) {
                            return Err(DomainError::UnknownVariable {
                                service: descriptor.name().to_string(),
                                variable,
                            });
                        }
                    }
                    Reference::Export { service, key } => {
                        let target = earlier
                            .iter()
                            .find(|d| d.name().as_str() == service)
                            .ok_or_else(|| DomainError::ForwardReference {
                                service: descriptor.name().to_string(),
                                target: service.clone(),
                            })?;
                        if !target.exports().contains_key(&key) {
                            return Err(DomainError::UnknownExport {
                                service: descriptor.name().to_string(),
                                target: service,
                                key,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// All descriptors in launch order.
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|d| d.name().as_str() == name)
    }

    /// Number of declared services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Restrict the plan to `names`, keeping launch order.
    ///
    /// An empty selection means every service. The selection must be
    /// closed under export references: a selected service cannot depend
    /// on one that is left out.
    ///
    /// # Errors
    /// Returns [`DomainError::UnknownService`] for names not in the plan and
    /// [`DomainError::ForwardReference`] when a dependency is left out.
    pub fn select(&self, names: &[ServiceName]) -> Result<Vec<ServiceDescriptor>, DomainError> {
        if names.is_empty() {
            return Ok(self.services.clone());
        }
        for name in names {
            if self.get(name.as_str()).is_none() {
                return Err(DomainError::UnknownService(name.to_string()));
            }
        }

        let selected: Vec<ServiceDescriptor> = self
            .services
            .iter()
            .filter(|d| names.contains(d.name()))
            .cloned()
            .collect();
        Self::check_references(&selected)?;
        Ok(selected)
    }
}
