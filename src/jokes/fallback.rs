use rand::seq::IndexedRandom;

/// Served when the joke API cannot produce a usable joke.
pub const FALLBACK_JOKES: &[&str] = &[
    "I'm reading a book about anti-gravity. It's impossible to put down.",
    "Why don't skeletons fight each other? They don't have the guts.",
    "I used to hate facial hair, but then it grew on me.",
    "What do you call a fake noodle? An impasta.",
    "Why did the scarecrow win an award? He was outstanding in his field.",
    "I only know 25 letters of the alphabet. I don't know y.",
    "What do you call cheese that isn't yours? Nacho cheese.",
    "Why couldn't the bicycle stand up by itself? It was two tired.",
    "How does a penguin build its house? Igloos it together.",
    "I would tell you a joke about construction, but I'm still working on it.",
];

pub fn pick() -> &'static str {
    FALLBACK_JOKES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FALLBACK_JOKES[0])
}
