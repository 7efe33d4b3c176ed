//! Greeting prefixes for retrieval-backed answers.

use rand::seq::SliceRandom;

pub const GREETINGS: [&str; 4] = ["Hello!", "Hi there!", "Hey!", "Greetings!"];

/// Chooses the greeting that prefixes a generated answer.
pub trait GreetingPicker: Send + Sync {
    fn pick(&self) -> String;
}

/// Uniform random choice from [`GREETINGS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGreeting;

impl GreetingPicker for RandomGreeting {
    fn pick(&self) -> String {
        let mut rng = rand::thread_rng();
        GREETINGS.choose(&mut rng).unwrap_or(&GREETINGS[0]).to_string()
    }
}

/// Always the same greeting.
#[derive(Debug, Clone)]
pub struct FixedGreeting(pub String);

impl GreetingPicker for FixedGreeting {
    fn pick(&self) -> String {
        self.0.clone()
    }
}
