use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl Task {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerColor {
    #[default]
    #[serde(alias = "border-indigo-400")]
    Indigo,
    #[serde(alias = "border-pink-400")]
    Pink,
    #[serde(alias = "border-teal-400")]
    Teal,
    #[serde(alias = "border-yellow-400")]
    Yellow,
    #[serde(alias = "border-purple-400")]
    Purple,
}

impl ContainerColor {
    pub const PALETTE: [ContainerColor; 5] = [
        ContainerColor::Indigo,
        ContainerColor::Pink,
        ContainerColor::Teal,
        ContainerColor::Yellow,
        ContainerColor::Purple,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub title: String,
    pub time: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub color: ContainerColor,
    #[serde(default)]
    pub day: String,
}

/// Older writers store `"tasks": null` for a container without tasks.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Task>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Task>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Container {
    pub fn done_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.done).count()
    }

    /// Replaces the task list and recomputes `progress` in the same step.
    pub fn set_tasks(&mut self, tasks: Vec<Task>) {
        self.progress = compute_progress(&tasks);
        self.tasks = tasks;
    }

    /// Brings `progress` back in line with `tasks` for data read from a store.
    pub fn normalized(mut self) -> Self {
        self.progress = compute_progress(&self.tasks);
        self
    }

    pub fn apply_patch(&mut self, patch: &ContainerPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(time) = &patch.time {
            self.time = time.clone();
        }
        if let Some(tasks) = &patch.tasks {
            self.tasks = tasks.clone();
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(day) = &patch.day {
            self.day = day.clone();
        }
    }
}

/// Partial container fields sent to `update`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ContainerColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
}

impl ContainerPatch {
    /// Task list and its derived progress, always written together.
    pub fn tasks(tasks: Vec<Task>) -> Self {
        Self {
            progress: Some(compute_progress(&tasks)),
            tasks: Some(tasks),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// `round(100 * done / total)`, or 0 for an empty list. Halves round up.
pub fn compute_progress(tasks: &[Task]) -> u8 {
    let done = tasks.iter().filter(|task| task.done).count();
    percentage(done, tasks.len())
}

pub fn percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = done.min(total) as u64;
    let total = total as u64;
    ((200 * done + total) / (2 * total)) as u8
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    Click,
    Success,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Burst {
    pub particle_count: u32,
    pub spread: u32,
    pub colors: Vec<String>,
}

impl Default for Burst {
    fn default() -> Self {
        Self {
            particle_count: 60,
            spread: 70,
            colors: vec![
                "#6366F1".to_string(),
                "#A78BFA".to_string(),
                "#34D399".to_string(),
            ],
        }
    }
}

/// Side effect requested by a state transition, executed by a feedback sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    Sound { cue: Cue, volume: f32 },
    Celebrate(Burst),
}

impl Effect {
    pub const CUE_VOLUME: f32 = 0.25;

    pub fn click() -> Vec<Effect> {
        vec![Effect::Sound {
            cue: Cue::Click,
            volume: Self::CUE_VOLUME,
        }]
    }

    pub fn completion() -> Vec<Effect> {
        vec![
            Effect::Sound {
                cue: Cue::Success,
                volume: Self::CUE_VOLUME,
            },
            Effect::Celebrate(Burst::default()),
        ]
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Effect::Celebrate(_))
    }
}
