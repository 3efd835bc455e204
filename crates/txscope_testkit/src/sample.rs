//! Sample domain: a hero registry.
//!
//! A repository that never sees a scope handle and a service that opens
//! scopes around its use cases. Calling service methods from inside another
//! scope makes them join that scope, so several use cases can share one
//! transaction.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use txscope_core::{ResourceAccessor, ScopeError, ScopeFactory, ScopeOptions};
use txscope_resource::{InMemoryResource, InMemoryResourceFactory, ResourceError};

/// Collection holding serialized heroes.
pub const HEROES: &str = "heroes";

/// Errors raised by the sample domain.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Scope protocol error.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Resource error.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Hero could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Hero failed validation.
    #[error("invalid hero: {0}")]
    InvalidHero(String),
}

/// Result type for the sample domain.
pub type SampleResult<T> = Result<T, SampleError>;

/// A superpower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superpower {
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
}

impl Superpower {
    /// Creates a superpower.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A hero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    /// Primary key; 0 until stored.
    pub id: u64,
    /// Name.
    pub name: String,
    /// Superpowers.
    pub superpowers: Vec<Superpower>,
}

impl Hero {
    /// Creates an unsaved hero.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            superpowers: Vec::new(),
        }
    }

    /// Adds a superpower.
    #[must_use]
    pub fn with_superpower(mut self, superpower: Superpower) -> Self {
        self.superpowers.push(superpower);
        self
    }
}

impl fmt::Display for Hero {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let powers: Vec<&str> = self.superpowers.iter().map(|p| p.name.as_str()).collect();
        write!(
            f,
            "Hero (id={}, name={}, superpowers=[{}])",
            self.id,
            self.name,
            powers.join(", ")
        )
    }
}

fn key(id: u64) -> String {
    format!("{id:020}")
}

/// Data access for heroes through the ambient resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeroRepository;

impl HeroRepository {
    fn resource() -> SampleResult<std::sync::Arc<InMemoryResource>> {
        Ok(ResourceAccessor::current::<InMemoryResource>()?)
    }

    /// Tracks a new hero under the next free id and returns the stored
    /// hero.
    ///
    /// # Errors
    ///
    /// Fails without an active scope or if the hero cannot be serialized.
    pub async fn add_hero(&self, hero: &Hero) -> SampleResult<Hero> {
        tracing::debug!(hero = %hero, "adding hero");
        let resource = Self::resource()?;
        let next = resource
            .scan(HEROES)?
            .last()
            .and_then(|(key, _)| key.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let stored = Hero {
            id: next,
            ..hero.clone()
        };
        resource.put(HEROES, key(next), serde_json::to_vec(&stored)?)?;
        tokio::task::yield_now().await;
        Ok(stored)
    }

    /// Returns a hero by id.
    ///
    /// # Errors
    ///
    /// Fails without an active scope or if stored data is corrupt.
    pub async fn get_hero(&self, id: u64) -> SampleResult<Option<Hero>> {
        let resource = Self::resource()?;
        resource
            .get(HEROES, &key(id))?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(SampleError::from)
    }

    /// Returns all heroes in id order.
    ///
    /// # Errors
    ///
    /// Fails without an active scope or if stored data is corrupt.
    pub async fn get_all_heroes(&self) -> SampleResult<Vec<Hero>> {
        let resource = Self::resource()?;
        tokio::task::yield_now().await;
        resource
            .scan(HEROES)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(SampleError::from))
            .collect()
    }
}

/// Hero use cases, each running in its own scope.
#[derive(Debug, Clone)]
pub struct HeroService {
    scopes: ScopeFactory<InMemoryResourceFactory>,
    repository: HeroRepository,
}

impl HeroService {
    /// Creates a service over the given scope factory.
    pub fn new(scopes: ScopeFactory<InMemoryResourceFactory>) -> Self {
        Self {
            scopes,
            repository: HeroRepository,
        }
    }

    /// Stores a hero and returns it with its id.
    ///
    /// # Errors
    ///
    /// Fails if the hero has no name, or on any scope or resource error.
    pub async fn add_hero(&self, hero: Hero) -> SampleResult<Hero> {
        if hero.name.trim().is_empty() {
            return Err(SampleError::InvalidHero("name must not be empty".into()));
        }
        let repository = self.repository;
        self.scopes
            .execute(ScopeOptions::default(), || async move {
                repository.add_hero(&hero).await
            })
            .await
    }

    /// Stores several heroes in one transaction. Nothing is stored if any
    /// of them is rejected.
    ///
    /// # Errors
    ///
    /// Returns the first error; later heroes are not attempted.
    pub async fn add_heroes(&self, heroes: Vec<Hero>) -> SampleResult<Vec<Hero>> {
        self.scopes
            .execute(ScopeOptions::default(), || async move {
                let mut stored = Vec::with_capacity(heroes.len());
                for hero in heroes {
                    stored.push(self.add_hero(hero).await?);
                }
                Ok(stored)
            })
            .await
    }

    /// Returns all heroes.
    ///
    /// # Errors
    ///
    /// Fails on any scope or resource error.
    pub async fn get_heroes(&self) -> SampleResult<Vec<Hero>> {
        let repository = self.repository;
        self.scopes
            .execute(ScopeOptions::new().read_only(true), || async move {
                repository.get_all_heroes().await
            })
            .await
    }

    /// Returns a hero by id.
    ///
    /// # Errors
    ///
    /// Fails on any scope or resource error.
    pub async fn get_hero(&self, id: u64) -> SampleResult<Option<Hero>> {
        let repository = self.repository;
        self.scopes
            .execute(ScopeOptions::new().read_only(true), || async move {
                repository.get_hero(id).await
            })
            .await
    }
}
