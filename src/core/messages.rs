//! The pool of throttled companion messages.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Templates for throttled messages. `{name}` is the display name and
/// `{meters}` the rounded session distance.
pub const MESSAGE_TEMPLATES: &[&str] = &[
    "{name} walks with you...",
    "the world is wide, {name} is discovering it",
    "{name} feels the wind",
    "keep going, {name} follows you",
    "{name}: {meters}m together",
    "every step counts, says {name}",
    "{name} watches the surroundings",
    "you are not alone, {name} is here",
];

/// Picks and renders messages from a fixed template pool.
pub struct MessagePool {
    templates: Vec<String>,
    rng: StdRng,
}

impl MessagePool {
    /// Pool over the built-in templates with an entropy-seeded generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Pool with a fixed seed, for reproducible selection.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            templates: MESSAGE_TEMPLATES.iter().map(|t| t.to_string()).collect(),
            rng,
        }
    }

    /// Replace the templates. An empty list keeps the built-in pool.
    pub fn with_templates(mut self, templates: Vec<String>) -> Self {
        if !templates.is_empty() {
            self.templates = templates;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Pick a template at random and render it.
    pub fn pick(&mut self, name: &str, total_distance_m: f64) -> String {
        let index = self.rng.gen_range(0..self.templates.len());
        render(&self.templates[index], name, total_distance_m)
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill in a template's placeholders.
pub fn render(template: &str, name: &str, total_distance_m: f64) -> String {
    let meters = total_distance_m.max(0.0).round() as u64;
    template
        .replace("{name}", name)
        .replace("{meters}", &meters.to_string())
}
