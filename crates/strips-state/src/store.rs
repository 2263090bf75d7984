//! The planning universe: known objects and static facts.
//!
//! The universe only ever grows. Every entry remembers the level and
//! version at which it was added so earlier views can be reconstructed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strips_core::{Fact, Object, PlanningError, Result, Type, World};
use uuid::Uuid;

use crate::snapshot::UniverseSnapshot;

/// Where a known fact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactSource {
    /// Part of the problem's initial state.
    Initial,
    /// Certified by a stream call.
    Stream { stream: String, inputs: Vec<Object> },
}

/// A versioned fact entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    /// The fact itself.
    pub fact: Fact,

    /// Planner level at which it became known.
    pub level: usize,

    /// Version number (monotonically increasing).
    pub version: u64,

    /// Provenance.
    pub source: FactSource,
}

/// A versioned object entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub object: Object,
    pub level: usize,
    pub version: u64,
}

/// Append-only store of objects and static facts.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Objects per type, in insertion order.
    by_type: BTreeMap<Type, Vec<Object>>,

    /// Object index.
    objects: BTreeMap<Object, ObjectEntry>,

    /// Fact index.
    facts: BTreeMap<Fact, FactEntry>,

    /// Current planner level.
    level: usize,

    /// Global version counter.
    version: u64,
}

impl Universe {
    /// Create an empty universe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Advance to a new level. Levels never go backwards.
    pub fn advance_to(&mut self, level: usize) {
        self.level = self.level.max(level);
    }

    /// Current version of the store.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Add an object. Returns true if it was new.
    pub fn add_object(&mut self, object: Object) -> Result<bool> {
        if object.is_optimistic() {
            return Err(PlanningError::Internal(format!(
                "placeholder {} cannot enter the universe",
                object
            )));
        }
        if self.objects.contains_key(&object) {
            return Ok(false);
        }
        let version = self.next_version();
        self.by_type
            .entry(object.ty.clone())
            .or_default()
            .push(object.clone());
        self.objects.insert(
            object.clone(),
            ObjectEntry {
                object,
                level: self.level,
                version,
            },
        );
        Ok(true)
    }

    /// Add a fact and its arguments. Returns true if the fact was new.
    pub fn add_fact(&mut self, fact: Fact, source: FactSource) -> Result<bool> {
        if self.facts.contains_key(&fact) {
            return Ok(false);
        }
        for object in &fact.args {
            self.add_object(object.clone())?;
        }
        let version = self.next_version();
        tracing::trace!("fact {} known at level {}", fact, self.level);
        self.facts.insert(
            fact.clone(),
            FactEntry {
                fact,
                level: self.level,
                version,
                source,
            },
        );
        Ok(true)
    }

    /// Returns true if the fact is known.
    pub fn contains_fact(&self, fact: &Fact) -> bool {
        self.facts.contains_key(fact)
    }

    /// Returns true if the object is known.
    pub fn contains_object(&self, object: &Object) -> bool {
        self.objects.contains_key(object)
    }

    /// Entry for a fact.
    pub fn fact_entry(&self, fact: &Fact) -> Option<&FactEntry> {
        self.facts.get(fact)
    }

    /// Known objects of a type, in insertion order.
    pub fn objects_of(&self, ty: &Type) -> &[Object] {
        self.by_type.get(ty).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Known types.
    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.by_type.keys()
    }

    /// All known objects.
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.keys()
    }

    /// All known facts.
    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.keys()
    }

    /// Number of known objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of known facts.
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Facts known at or before a level.
    pub fn facts_at(&self, level: usize) -> BTreeSet<Fact> {
        self.facts
            .values()
            .filter(|e| e.level <= level)
            .map(|e| e.fact.clone())
            .collect()
    }

    /// Objects known at or before a level.
    pub fn objects_at(&self, level: usize) -> BTreeSet<Object> {
        self.objects
            .values()
            .filter(|e| e.level <= level)
            .map(|e| e.object.clone())
            .collect()
    }

    /// Create a snapshot of the current universe.
    pub fn snapshot(&self) -> UniverseSnapshot {
        let objects_by_type = self
            .by_type
            .iter()
            .map(|(ty, objects)| (ty.name().to_string(), objects.len()))
            .collect();
        UniverseSnapshot {
            id: Uuid::new_v4(),
            level: self.level,
            version: self.version,
            timestamp: Utc::now(),
            objects: self.object_count(),
            facts: self.fact_count(),
            objects_by_type,
        }
    }
}

impl World for Universe {
    fn contains(&self, fact: &Fact) -> bool {
        self.contains_fact(fact)
    }

    fn objects(&self, ty: &Type) -> &[Object] {
        self.objects_of(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strips_core::Predicate;

    #[test]
    fn test_add_and_query() {
        let pose = Type::new("POSE");
        let conf = Type::new("CONF");
        let legal_kin = Predicate::new("LegalKin", [pose.clone(), conf.clone()]);
        let mut universe = Universe::new();

        let fact = legal_kin.fact([pose.object(1), conf.object(1)]).unwrap();
        assert!(universe.add_fact(fact.clone(), FactSource::Initial).unwrap());
        assert!(!universe.add_fact(fact.clone(), FactSource::Initial).unwrap());

        assert!(universe.contains_fact(&fact));
        assert!(universe.contains_object(&conf.object(1)));
        assert_eq!(universe.objects_of(&pose), &[pose.object(1)]);
        assert_eq!(universe.object_count(), 2);
        assert_eq!(universe.version(), 3);
    }

    #[test]
    fn test_versioning_by_level() {
        let pose = Type::new("POSE");
        let mut universe = Universe::new();

        universe.add_object(pose.object(0)).unwrap();
        universe.advance_to(2);
        universe.add_object(pose.object(1)).unwrap();
        universe.advance_to(1);
        assert_eq!(universe.level(), 2);

        assert_eq!(universe.objects_at(0).len(), 1);
        assert_eq!(universe.objects_at(2).len(), 2);
        assert!(universe.objects_at(0).is_subset(&universe.objects_at(2)));
    }

    #[test]
    fn test_placeholders_rejected() {
        let mut universe = Universe::new();
        let result = universe.add_object(Object::optimistic(Type::new("POSE"), 0));
        assert!(matches!(result, Err(PlanningError::Internal(_))));
    }

    #[test]
    fn test_snapshot() {
        let pose = Type::new("POSE");
        let mut universe = Universe::new();
        universe.add_object(pose.object(0)).unwrap();
        universe.add_object(pose.object(1)).unwrap();

        let snapshot = universe.snapshot();
        assert_eq!(snapshot.objects, 2);
        assert_eq!(snapshot.objects_by_type["POSE"], 2);
        assert_eq!(snapshot.version, universe.version());
    }
}
