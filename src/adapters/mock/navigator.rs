//! Navigator that records targets instead of opening them.

use std::sync::{Arc, Mutex};

use crate::traits::{NavigationError, Navigator};

#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    targets: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every target navigated to, in order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.targets.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.targets.lock().unwrap().len()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: &str) -> Result<(), NavigationError> {
        self.targets.lock().unwrap().push(target.to_string());
        Ok(())
    }
}
