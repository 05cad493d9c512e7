use tokio::sync::broadcast;

use super::{ApplicationStatus, ProgressReporter};

/// Broadcast progress publisher for UI observers
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    sender: broadcast::Sender<PublishedProgress>,
}

/// Progress update that has been published
#[derive(Debug, Clone)]
pub struct PublishedProgress {
    pub status: ApplicationStatus,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl ProgressPublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedProgress> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ProgressReporter for ProgressPublisher {
    fn report(&self, status: ApplicationStatus) {
        let update = PublishedProgress {
            status,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is listening, which is fine for progress
        let _ = self.sender.send(update);
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
