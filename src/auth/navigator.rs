use std::sync::Mutex;

/// Where the session sends the user next.
///
/// A browser front end performs a full-page navigation; a CLI prints the
/// location; tests record it.
pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &str);
}

/// Navigator that remembers every location it was sent to.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent location, if any.
    pub fn last(&self) -> Option<String> {
        self.visits.lock().ok()?.last().cloned()
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .map(|visits| visits.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, location: &str) {
        tracing::debug!(location, "Navigating");
        if let Ok(mut visits) = self.visits.lock() {
            visits.push(location.to_string());
        }
    }
}
