use crate::domain::models::{
    percentage, Container, ContainerColor, ContainerPatch, Effect, Task,
};
use serde::Serialize;

/// Why a mutation was dropped without touching any store.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    EmptyInput,
    ContainerNotFound,
    TaskIndexOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    Create(Container),
    Update { id: String, patch: ContainerPatch },
    Delete { id: String },
}

impl PendingWrite {
    pub fn container_id(&self) -> &str {
        match self {
            Self::Create(container) => &container.id,
            Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// A computed mutation: what to persist and which effects to run once it lands.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub write: PendingWrite,
    pub effects: Vec<Effect>,
}

/// Fields of a new container decided outside the pure state (id, color, day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStamp {
    pub id: String,
    pub color: ContainerColor,
    pub day: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilerState {
    containers: Vec<Container>,
    revision: u64,
}

impl ReconcilerState {
    pub fn new(containers: Vec<Container>) -> Self {
        Self {
            containers: normalize(containers),
            revision: 0,
        }
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn find(&self, id: &str) -> Option<&Container> {
        self.containers.iter().find(|container| container.id == id)
    }

    /// Replaces the whole list. Applying an identical list twice is a no-op.
    pub fn replace_all(&mut self, containers: Vec<Container>) -> bool {
        let containers = normalize(containers);
        if containers == self.containers {
            return false;
        }
        self.containers = containers;
        self.revision = self.revision.wrapping_add(1);
        true
    }

    pub fn plan_add_container(
        &self,
        title: &str,
        time: &str,
        stamp: ContainerStamp,
    ) -> Result<Transition, IgnoreReason> {
        let title = title.trim();
        let time = time.trim();
        if title.is_empty() || time.is_empty() {
            return Err(IgnoreReason::EmptyInput);
        }

        let container = Container {
            id: stamp.id,
            title: title.to_string(),
            time: time.to_string(),
            tasks: Vec::new(),
            progress: 0,
            color: stamp.color,
            day: stamp.day,
        };
        Ok(Transition {
            write: PendingWrite::Create(container),
            effects: Effect::click(),
        })
    }

    pub fn plan_add_task(&self, container_id: &str, text: &str) -> Result<Transition, IgnoreReason> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IgnoreReason::EmptyInput);
        }
        let container = self
            .find(container_id)
            .ok_or(IgnoreReason::ContainerNotFound)?;

        let mut tasks = container.tasks.clone();
        tasks.push(Task::new(text));
        Ok(Transition {
            write: PendingWrite::Update {
                id: container.id.clone(),
                patch: ContainerPatch::tasks(tasks),
            },
            effects: Effect::click(),
        })
    }

    pub fn plan_toggle_task(&self, container_id: &str, index: usize) -> Result<Transition, IgnoreReason> {
        let container = self
            .find(container_id)
            .ok_or(IgnoreReason::ContainerNotFound)?;
        if index >= container.tasks.len() {
            return Err(IgnoreReason::TaskIndexOutOfRange);
        }

        let mut tasks = container.tasks.clone();
        let completed = !tasks[index].done;
        tasks[index].done = completed;
        Ok(Transition {
            write: PendingWrite::Update {
                id: container.id.clone(),
                patch: ContainerPatch::tasks(tasks),
            },
            effects: if completed { Effect::completion() } else { Vec::new() },
        })
    }

    pub fn plan_delete_task(&self, container_id: &str, index: usize) -> Result<Transition, IgnoreReason> {
        let container = self
            .find(container_id)
            .ok_or(IgnoreReason::ContainerNotFound)?;
        if index >= container.tasks.len() {
            return Err(IgnoreReason::TaskIndexOutOfRange);
        }

        let mut tasks = container.tasks.clone();
        tasks.remove(index);
        Ok(Transition {
            write: PendingWrite::Update {
                id: container.id.clone(),
                patch: ContainerPatch::tasks(tasks),
            },
            effects: Effect::click(),
        })
    }

    pub fn plan_delete_container(&self, container_id: &str) -> Result<Transition, IgnoreReason> {
        let container = self
            .find(container_id)
            .ok_or(IgnoreReason::ContainerNotFound)?;
        Ok(Transition {
            write: PendingWrite::Delete {
                id: container.id.clone(),
            },
            effects: Effect::click(),
        })
    }

    pub fn in_bucket<'a>(&'a self, day_key: &'a str) -> impl Iterator<Item = &'a Container> + 'a {
        self.containers
            .iter()
            .filter(move |container| container.day == day_key)
    }

    /// Completion across every persisted container, visible or not.
    pub fn day_progress(&self) -> u8 {
        aggregate_progress(self.containers.iter())
    }

    pub fn bucket_progress(&self, day_key: &str) -> u8 {
        aggregate_progress(self.in_bucket(day_key))
    }
}

fn aggregate_progress<'a>(containers: impl Iterator<Item = &'a Container>) -> u8 {
    let (done, total) = containers.fold((0usize, 0usize), |(done, total), container| {
        (done + container.done_count(), total + container.tasks.len())
    });
    percentage(done, total)
}

fn normalize(containers: Vec<Container>) -> Vec<Container> {
    containers.into_iter().map(Container::normalized).collect()
}

/// Applies a write to a list the way a store would. Used by the local backend.
pub fn apply_write(containers: &[Container], write: &PendingWrite) -> Vec<Container> {
    match write {
        PendingWrite::Create(container) => {
            let mut next = containers.to_vec();
            next.push(container.clone());
            next
        }
        PendingWrite::Update { id, patch } => containers
            .iter()
            .cloned()
            .map(|mut container| {
                if &container.id == id {
                    container.apply_patch(patch);
                }
                container
            })
            .collect(),
        PendingWrite::Delete { id } => containers
            .iter()
            .filter(|container| &container.id != id)
            .cloned()
            .collect(),
    }
}
