//! Dependency injection container.
//!
//! Services are registered as factories at application startup and
//! resolved lazily by type. The first resolution runs the factory and
//! memoises the instance; later resolutions return the cached `Arc`.
//! Re-entering a resolution for a type that is already being built is
//! a cycle and resolves to an error.
//!
//! The container is a startup concern: steady-state request handling
//! never touches it.
//!
//! # Example
//!
//! ```
//! use trellis_core::di::Container;
//! use std::sync::Arc;
//!
//! struct Config {
//!     dsn: String,
//! }
//!
//! struct Repo {
//!     dsn: String,
//! }
//!
//! let mut container = Container::new();
//! container.register(|_| {
//!     Ok(Arc::new(Config { dsn: "mysql://localhost/app".into() }))
//! });
//! container.register(|c| {
//!     let config = c.resolve::<Config>()?;
//!     Ok(Arc::new(Repo { dsn: config.dsn.clone() }))
//! });
//!
//! let repo = container.resolve::<Repo>().unwrap();
//! assert_eq!(repo.dsn, "mysql://localhost/app");
//! ```

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type AnyService = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&Container) -> Result<AnyService, ContainerError> + Send + Sync>;

/// Error returned when a service cannot be resolved.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// No factory was registered for the requested type.
    #[error("service {type_name} is not registered")]
    NotRegistered {
        /// The type that could not be resolved.
        type_name: &'static str,
    },

    /// Resolution re-entered a type that is already being constructed.
    #[error("dependency cycle detected while resolving {type_name}")]
    Cycle {
        /// The type whose resolution was re-entered.
        type_name: &'static str,
    },

    /// The factory itself failed.
    #[error("failed to construct {type_name}: {source}")]
    Build {
        /// The type being constructed.
        type_name: &'static str,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

impl ContainerError {
    /// Creates a build error for type `T`.
    pub fn build<T>(source: impl Into<anyhow::Error>) -> Self {
        Self::Build {
            type_name: std::any::type_name::<T>(),
            source: source.into(),
        }
    }
}

/// A type-keyed container of lazily constructed services.
///
/// Registration takes `&mut self` (startup only); resolution is `&self`
/// and safe to share behind an `Arc` afterwards.
#[derive(Default)]
pub struct Container {
    factories: HashMap<TypeId, Factory>,
    instances: Mutex<HashMap<TypeId, AnyService>>,
    resolving: Mutex<HashSet<TypeId>>,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for type `T`.
    ///
    /// The factory receives the container so it can resolve its own
    /// dependencies. It runs at most once; the produced instance is
    /// memoised.
    pub fn register<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<Arc<T>, ContainerError> + Send + Sync + 'static,
    {
        self.factories.insert(
            TypeId::of::<T>(),
            Box::new(move |c| factory(c).map(|arc| arc as AnyService)),
        );
    }

    /// Registers an already-constructed instance of type `T`.
    pub fn register_instance<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.instances
            .lock()
            .insert(TypeId::of::<T>(), service as AnyService);
    }

    /// Resolves a service of type `T`, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotRegistered`] when no factory or
    /// instance exists for `T`, [`ContainerError::Cycle`] when `T` is
    /// already being constructed on this resolution path, or the
    /// factory's own error.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        if let Some(instance) = self.instances.lock().get(&id) {
            return instance
                .clone()
                .downcast::<T>()
                .map_err(|_| ContainerError::NotRegistered { type_name });
        }

        let factory = self
            .factories
            .get(&id)
            .ok_or(ContainerError::NotRegistered { type_name })?;

        if !self.resolving.lock().insert(id) {
            return Err(ContainerError::Cycle { type_name });
        }
        let result = factory(self);
        self.resolving.lock().remove(&id);

        let instance = result?;
        self.instances.lock().insert(id, instance.clone());
        instance
            .downcast::<T>()
            .map_err(|_| ContainerError::NotRegistered { type_name })
    }

    /// Returns `true` if a factory or instance exists for `T`.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.factories.contains_key(&id) || self.instances.lock().contains_key(&id)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("factory_count", &self.factories.len())
            .field("instance_count", &self.instances.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Leaf {
        value: u32,
    }

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        container.register(|_| Ok(Arc::new(Leaf { value: 7 })));

        let leaf = container.resolve::<Leaf>().unwrap();
        assert_eq!(leaf.value, 7);
    }

    #[test]
    fn test_resolve_unregistered() {
        let container = Container::new();
        let result = container.resolve::<Leaf>();
        assert!(matches!(result, Err(ContainerError::NotRegistered { .. })));
    }

    #[test]
    fn test_factory_runs_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut container = Container::new();
        container.register(|_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Leaf { value: 1 }))
        });

        container.resolve::<Leaf>().unwrap();
        container.resolve::<Leaf>().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dependencies_resolve_through_container() {
        struct Config {
            name: String,
        }
        struct Service {
            name: String,
        }

        let mut container = Container::new();
        container.register(|_| {
            Ok(Arc::new(Config {
                name: "trellis".to_string(),
            }))
        });
        container.register(|c| {
            let config = c.resolve::<Config>()?;
            Ok(Arc::new(Service {
                name: config.name.clone(),
            }))
        });

        let service = container.resolve::<Service>().unwrap();
        assert_eq!(service.name, "trellis");
    }

    #[test]
    fn test_cycle_detection() {
        struct A;
        struct B;

        let mut container = Container::new();
        container.register(|c| {
            c.resolve::<B>()?;
            Ok(Arc::new(A))
        });
        container.register(|c| {
            c.resolve::<A>()?;
            Ok(Arc::new(B))
        });

        let result = container.resolve::<A>();
        assert!(matches!(result, Err(ContainerError::Cycle { .. })));
    }

    #[test]
    fn test_self_cycle_detection() {
        struct Selfish;

        let mut container = Container::new();
        container.register(|c| {
            c.resolve::<Selfish>()?;
            Ok(Arc::new(Selfish))
        });

        let result = container.resolve::<Selfish>();
        assert!(matches!(result, Err(ContainerError::Cycle { .. })));
    }

    #[test]
    fn test_register_instance() {
        let mut container = Container::new();
        container.register_instance(Arc::new(Leaf { value: 3 }));

        assert!(container.contains::<Leaf>());
        assert_eq!(container.resolve::<Leaf>().unwrap().value, 3);
    }

    #[test]
    fn test_failed_factory_can_retry() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut container = Container::new();
        container.register(|_| {
            if CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ContainerError::build::<Leaf>(anyhow::anyhow!("boom")))
            } else {
                Ok(Arc::new(Leaf { value: 9 }))
            }
        });

        assert!(container.resolve::<Leaf>().is_err());
        assert_eq!(container.resolve::<Leaf>().unwrap().value, 9);
    }
}
