//! Terminal front-end state that never reaches the coordinator

use std::time::Instant;

/// UI state for the application
#[derive(Clone, Debug)]
pub struct UiState {
    pub selected: usize,
    /// Uncommitted drag-to-seek value, only present while the user is seeking
    pub seek_intent: Option<f64>,
    pub show_help_popup: bool,
    pub error_message: Option<String>,
    pub error_timestamp: Option<Instant>,
    pub should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            selected: 0,
            seek_intent: None,
            show_help_popup: false,
            error_message: None,
            error_timestamp: None,
            should_quit: false,
        }
    }
}

impl UiState {
    pub fn move_selection_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_selection_down(&mut self, item_count: usize) {
        if self.selected < item_count.saturating_sub(1) {
            self.selected += 1;
        }
    }

    pub fn set_error(&mut self, message: String) {
        self.error_message = Some(message);
        self.error_timestamp = Some(Instant::now());
    }

    pub fn auto_clear_old_errors(&mut self) {
        if let Some(timestamp) = self.error_timestamp {
            if timestamp.elapsed().as_secs() > 5 {
                self.error_message = None;
                self.error_timestamp = None;
            }
        }
    }
}
