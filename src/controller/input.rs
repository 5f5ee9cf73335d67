//! Key event handling

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::model::{clamp_position, PlaybackState};
use super::AppController;

const VOLUME_STEP: f32 = 0.05;

impl AppController {
    pub fn handle_key_event(&mut self, key: KeyEvent, playback: &PlaybackState) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.ui.should_quit = true;
            return;
        }

        // Handle help popup
        if self.ui.show_help_popup {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('H')) {
                self.ui.show_help_popup = false;
            }
            return;
        }

        // Interactive seek: arrows move the intent, nothing reaches the adapter until commit
        if let Some(intent) = self.ui.seek_intent {
            match key.code {
                KeyCode::Left => self.move_seek_intent(intent - self.seek_step, playback),
                KeyCode::Right => self.move_seek_intent(intent + self.seek_step, playback),
                KeyCode::Enter | KeyCode::Esc | KeyCode::Char('s') | KeyCode::Char('S') => {
                    self.ui.seek_intent = None;
                    self.player.end_user_seek(intent);
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.ui.should_quit = true;
            }
            KeyCode::Esc => {
                self.ui.error_message = None;
                self.ui.error_timestamp = None;
            }
            KeyCode::Up => {
                self.ui.move_selection_up();
            }
            KeyCode::Down => {
                self.ui.move_selection_down(self.tracks.len());
            }
            KeyCode::Enter => {
                if let Some(track) = self.tracks.get(self.ui.selected) {
                    self.player.select_track(track.clone());
                }
            }
            // Play/Pause toggle
            KeyCode::Char(' ') => {
                self.player.play_pause();
            }
            KeyCode::Left => {
                self.player.seek_relative(-self.seek_step);
            }
            KeyCode::Right => {
                self.player.seek_relative(self.seek_step);
            }
            // Jump to a tenth of the track
            KeyCode::Char(digit @ '0'..='9') => {
                if playback.current_track.is_some() {
                    let tenths = f64::from(digit as u8 - b'0');
                    self.player.seek_absolute(playback.duration * tenths / 10.0);
                }
            }
            // Start an interactive seek from the published position
            KeyCode::Char('s') | KeyCode::Char('S') => {
                if playback.current_track.is_some() {
                    self.ui.seek_intent = Some(playback.seek_position);
                    self.player.begin_user_seek();
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.player.next();
            }
            KeyCode::Char('p') | KeyCode::Char('P') => {
                self.player.previous();
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.player.set_volume(playback.volume + VOLUME_STEP);
            }
            KeyCode::Char('-') => {
                self.player.set_volume(playback.volume - VOLUME_STEP);
            }
            KeyCode::Char('h') | KeyCode::Char('H') => {
                self.ui.show_help_popup = true;
            }
            _ => {}
        }
    }

    fn move_seek_intent(&mut self, position: f64, playback: &PlaybackState) {
        self.ui.seek_intent = Some(clamp_position(position, playback.duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{mpsc, watch};
    use crate::config::AppConfig;
    use crate::controller::{Command, PlayerHandle};
    use crate::model::{Track, TrackSource};

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: id.to_string(),
            artist: String::new(),
            source: TrackSource::RemoteSdk,
            locator: format!("spotify:track:{id}"),
            duration_ms: 100_000,
        }
    }

    fn controller() -> (AppController, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(PlaybackState::default());
        let handle = PlayerHandle::new(tx, state_rx);
        let config = AppConfig::default();
        (AppController::new(handle, vec![track("a"), track("b")], &config), rx)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn playing(position: f64) -> PlaybackState {
        let mut state = PlaybackState::default();
        state.begin_track(track("a"), true);
        state.set_seek_position(position);
        state
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Command>) -> Vec<Command> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn enter_selects_highlighted_track() {
        let (mut controller, mut rx) = controller();
        let state = PlaybackState::default();

        controller.handle_key_event(press(KeyCode::Down), &state);
        controller.handle_key_event(press(KeyCode::Down), &state);
        controller.handle_key_event(press(KeyCode::Enter), &state);

        assert_eq!(drain(&mut rx), vec![Command::SelectTrack(track("b"))]);
    }

    #[test]
    fn interactive_seek_only_commits_on_enter() {
        let (mut controller, mut rx) = controller();
        let state = playing(40.0);

        controller.handle_key_event(press(KeyCode::Char('s')), &state);
        controller.handle_key_event(press(KeyCode::Right), &state);
        controller.handle_key_event(press(KeyCode::Right), &state);
        assert_eq!(controller.ui_state().seek_intent, Some(60.0));
        assert_eq!(drain(&mut rx), vec![Command::BeginUserSeek]);

        controller.handle_key_event(press(KeyCode::Enter), &state);
        assert_eq!(drain(&mut rx), vec![Command::EndUserSeek(60.0)]);
        assert_eq!(controller.ui_state().seek_intent, None);
    }

    #[test]
    fn seek_intent_stays_inside_track() {
        let (mut controller, _rx) = controller();
        let state = playing(5.0);

        controller.handle_key_event(press(KeyCode::Char('s')), &state);
        controller.handle_key_event(press(KeyCode::Left), &state);
        assert_eq!(controller.ui_state().seek_intent, Some(0.0));
    }

    #[test]
    fn arrows_seek_relative_outside_interactive_seek() {
        let (mut controller, mut rx) = controller();
        let state = playing(5.0);

        controller.handle_key_event(press(KeyCode::Left), &state);
        controller.handle_key_event(press(KeyCode::Right), &state);

        assert_eq!(
            drain(&mut rx),
            vec![Command::SeekRelative(-10.0), Command::SeekRelative(10.0)]
        );
    }

    #[test]
    fn digits_jump_to_fraction_of_track() {
        let (mut controller, mut rx) = controller();

        controller.handle_key_event(press(KeyCode::Char('3')), &PlaybackState::default());
        assert!(drain(&mut rx).is_empty());

        let state = playing(5.0);
        controller.handle_key_event(press(KeyCode::Char('3')), &state);
        controller.handle_key_event(press(KeyCode::Char('0')), &state);
        assert_eq!(
            drain(&mut rx),
            vec![Command::SeekAbsolute(30.0), Command::SeekAbsolute(0.0)]
        );
    }

    #[test]
    fn ctrl_c_quits() {
        let (mut controller, _rx) = controller();
        controller.handle_key_event(
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
            &PlaybackState::default(),
        );
        assert!(controller.should_quit());
    }
}
