use crate::domain::models::{Cue, Effect};
use std::sync::Mutex;
use tracing::info;

/// Executes feedback effects. Implementations must return promptly; the
/// caller never waits on sound or animation.
pub trait FeedbackSink: Send + Sync {
    fn perform(&self, effect: &Effect);

    fn perform_all(&self, effects: &[Effect]) {
        for effect in effects {
            self.perform(effect);
        }
    }
}

/// Reports effects through tracing for hosts without audio or animation.
#[derive(Debug, Default)]
pub struct TracingFeedbackSink;

impl FeedbackSink for TracingFeedbackSink {
    fn perform(&self, effect: &Effect) {
        match effect {
            Effect::Sound { cue, volume } => {
                let cue = match cue {
                    Cue::Click => "click",
                    Cue::Success => "success",
                };
                info!(cue, volume, "feedback sound");
            }
            Effect::Celebrate(burst) => {
                info!(
                    particles = burst.particle_count,
                    spread = burst.spread,
                    "feedback celebration"
                );
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingFeedbackSink {
    effects: Mutex<Vec<Effect>>,
}

impl RecordingFeedbackSink {
    pub fn effects(&self) -> Vec<Effect> {
        self.effects
            .lock()
            .map(|effects| effects.clone())
            .unwrap_or_default()
    }

    pub fn completion_count(&self) -> usize {
        self.effects()
            .iter()
            .filter(|effect| effect.is_completion())
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut effects) = self.effects.lock() {
            effects.clear();
        }
    }
}

impl FeedbackSink for RecordingFeedbackSink {
    fn perform(&self, effect: &Effect) {
        if let Ok(mut effects) = self.effects.lock() {
            effects.push(effect.clone());
        }
    }
}
