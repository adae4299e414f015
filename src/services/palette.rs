use std::sync::Mutex;

use rand::seq::SliceRandom;

/// Gradient classes handed to trip cards.
pub const TRIP_COLORS: [&str; 12] = [
    "from-blue-500 to-blue-600",
    "from-green-500 to-green-600",
    "from-purple-500 to-purple-600",
    "from-pink-500 to-pink-600",
    "from-indigo-500 to-indigo-600",
    "from-red-500 to-red-600",
    "from-yellow-500 to-yellow-600",
    "from-teal-500 to-teal-600",
    "from-orange-500 to-orange-600",
    "from-cyan-500 to-cyan-600",
    "from-emerald-500 to-emerald-600",
    "from-violet-500 to-violet-600",
];

/// Rotating color queue. Explicit process-scoped state owned by the app state
/// rather than a module global: starts empty, reshuffles once a full cycle has
/// been handed out, and no color repeats within a cycle.
#[derive(Debug, Default)]
pub struct TripPalette {
    queue: Mutex<Vec<&'static str>>,
}

impl TripPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> &'static str {
        let mut queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if queue.is_empty() {
            let mut colors = TRIP_COLORS.to_vec();
            colors.shuffle(&mut rand::thread_rng());
            *queue = colors;
        }
        queue.pop().unwrap_or(TRIP_COLORS[0])
    }
}
