//! Time-bounded highlight of the topics matched by the latest search.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct HighlightState {
    topics: Vec<String>,
    generation: u64,
    clear_task: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<HighlightState>) -> MutexGuard<'_, HighlightState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Highlighted topics plus the single pending task that clears them.
///
/// Each `replace` starts a new generation and aborts the previous clear
/// task; a clear task only empties the set if its generation is current.
#[derive(Debug)]
pub struct Highlight {
    window: Duration,
    state: Arc<Mutex<HighlightState>>,
}

impl Highlight {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(HighlightState::default())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Install a new highlight and schedule its clear.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn replace(&self, topics: Vec<String>) {
        let mut state = lock(&self.state);
        state.generation += 1;
        let generation = state.generation;
        if let Some(task) = state.clear_task.take() {
            task.abort();
        }
        state.topics = topics;

        let shared = Arc::clone(&self.state);
        let window = self.window;
        state.clear_task = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut state = lock(&shared);
            if state.generation == generation {
                debug!("Highlight expired after {:?}", window);
                state.topics.clear();
                state.clear_task = None;
            }
        }));
    }

    /// Currently highlighted topics.
    pub fn topics(&self) -> Vec<String> {
        lock(&self.state).topics.clone()
    }

    pub fn contains(&self, topic: &str) -> bool {
        lock(&self.state).topics.iter().any(|t| t == topic)
    }

    /// Clear immediately and cancel the pending clear task.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.topics.clear();
        if let Some(task) = state.clear_task.take() {
            task.abort();
        }
    }
}

impl Drop for Highlight {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.state).clear_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlight_clears_after_window() {
        let highlight = Highlight::new(Duration::from_secs(30));
        highlight.replace(topics(&["A"]));
        assert_eq!(highlight.topics(), vec!["A"]);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(highlight.contains("A"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(highlight.topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_restarts_window() {
        let highlight = Highlight::new(Duration::from_secs(30));
        highlight.replace(topics(&["A"]));

        tokio::time::sleep(Duration::from_secs(20)).await;
        highlight.replace(topics(&["B"]));

        // First window would have ended at 30s
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(highlight.topics(), vec!["B"]);

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(highlight.topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending() {
        let highlight = Highlight::new(Duration::from_secs(30));
        highlight.replace(topics(&["A"]));
        highlight.clear();
        assert!(highlight.topics().is_empty());

        highlight.replace(topics(&["C"]));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(highlight.topics(), vec!["C"]);
    }
}
