//! Named mutators and the registry the push path dispatches through.
//!
//! A mutator is a plain async function over a [`WriteTransaction`] and a
//! typed argument. Arguments arrive as JSON and are decoded with serde before
//! the handler runs, so handlers never see malformed input.

mod todo;

pub use todo::{default_registry, Todo, TODO_PREFIX};

use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::store::StoreError;
use crate::transaction::WriteTransaction;

/// Why a mutator did not complete.
#[derive(Debug, thiserror::Error)]
pub enum MutatorError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Failed(String),

    /// The store itself failed; this aborts the whole push attempt.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Boxed future returned by every mutator.
pub type MutatorFuture<'a> = BoxFuture<'a, Result<(), MutatorError>>;

/// Signature of a typed mutator function.
pub type Handler<A> = for<'a> fn(&'a mut dyn WriteTransaction, A) -> MutatorFuture<'a>;

/// A mutator with its argument type erased.
pub trait Mutator: Send + Sync {
    fn call<'a>(&self, tx: &'a mut dyn WriteTransaction, args: Value) -> MutatorFuture<'a>;
}

struct Typed<A> {
    handler: Handler<A>,
}

impl<A> Mutator for Typed<A>
where
    A: DeserializeOwned + Send + 'static,
{
    fn call<'a>(&self, tx: &'a mut dyn WriteTransaction, args: Value) -> MutatorFuture<'a> {
        match serde_json::from_value::<A>(args) {
            Ok(args) => (self.handler)(tx, args),
            Err(e) => Box::pin(async move { Err(MutatorError::InvalidArgs(e.to_string())) }),
        }
    }
}

/// Errors building a registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Mutator registered twice: {0}")]
    Duplicate(String),

    #[error("No mutators registered")]
    Empty,
}

/// Immutable name to mutator table, built once at startup.
pub struct MutatorRegistry {
    mutators: HashMap<String, Box<dyn Mutator>>,
}

impl MutatorRegistry {
    pub fn builder() -> MutatorRegistryBuilder {
        MutatorRegistryBuilder::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mutators.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Mutator> {
        self.mutators.get(name).map(|m| m.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.mutators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutatorRegistry")
            .field("mutators", &self.names())
            .finish()
    }
}

/// Collects mutators; duplicates are reported by [`MutatorRegistryBuilder::build`].
#[derive(Default)]
pub struct MutatorRegistryBuilder {
    mutators: Vec<(String, Box<dyn Mutator>)>,
}

impl MutatorRegistryBuilder {
    pub fn register<A>(mut self, name: impl Into<String>, handler: Handler<A>) -> Self
    where
        A: DeserializeOwned + Send + 'static,
    {
        self.mutators
            .push((name.into(), Box::new(Typed { handler })));
        self
    }

    pub fn build(self) -> Result<MutatorRegistry, RegistryError> {
        if self.mutators.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut mutators = HashMap::with_capacity(self.mutators.len());
        for (name, mutator) in self.mutators {
            if mutators.contains_key(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            mutators.insert(name, mutator);
        }

        Ok(MutatorRegistry { mutators })
    }
}
