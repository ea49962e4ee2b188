//! Task corpus: registry of immutable benchmark task definitions.
//!
//! The registry holds every task for a benchmark session, keyed by name.
//! Tasks are validated on registration, retrievable by name, and iterable
//! in registration order. The corpus is loaded once per session from a
//! YAML file and is read-only thereafter.

pub mod spec;

pub use spec::{Difficulty, TaskSpec};

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::CorpusError;

/// On-disk corpus file: an ordered list of task specs.
#[derive(Debug, Deserialize)]
struct CorpusFile {
    tasks: Vec<TaskSpec>,
}

/// Registry of benchmark tasks for one session.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    /// Task specs keyed by name.
    entries: HashMap<String, TaskSpec>,
    /// Task names in registration order.
    order: Vec<String>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a registry from a YAML corpus file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses a registry from YAML corpus contents.
    pub fn from_yaml_str(contents: &str) -> Result<Self, CorpusError> {
        let file: CorpusFile = serde_yaml::from_str(contents)?;
        let mut registry = Self::new();
        for task in file.tasks {
            registry.register(task)?;
        }
        Ok(registry)
    }

    /// Registers a new task.
    ///
    /// # Errors
    /// Returns `DuplicateTask` if a task with the same name exists, or
    /// `InvalidTask` if the spec fails validation (empty ground truth).
    pub fn register(&mut self, task: TaskSpec) -> Result<(), CorpusError> {
        task.validate().map_err(|reason| CorpusError::InvalidTask {
            name: task.name.clone(),
            reason,
        })?;

        if self.entries.contains_key(&task.name) {
            return Err(CorpusError::DuplicateTask(task.name));
        }

        self.order.push(task.name.clone());
        self.entries.insert(task.name.clone(), task);
        Ok(())
    }

    /// Gets a task by name.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if no task with the given name exists.
    pub fn get(&self, name: &str) -> Result<&TaskSpec, CorpusError> {
        self.entries
            .get(name)
            .ok_or_else(|| CorpusError::TaskNotFound(name.to_string()))
    }

    /// Iterates over all tasks in registration order.
    ///
    /// The iterator is restartable: calling `all()` again yields the same
    /// sequence.
    pub fn all(&self) -> impl Iterator<Item = &TaskSpec> + '_ {
        self.order.iter().map(|name| &self.entries[name])
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
