//! Keyboard handling for the display.
//!
//! The terminal is in raw mode while the face is shown, so Ctrl+C arrives
//! as a key event rather than a signal and is treated as a quit key.

use std::thread;
use std::time::Duration;

use crossterm::event::{ self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers };
use tokio::sync::watch;


/// How often the input thread checks whether it should exit.
const POLL_INTERVAL: Duration = Duration::from_millis( 100 );


/// Returns true if the key should stop the display.
pub fn is_quit_key( key: &KeyEvent ) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char( 'q' ) => true,
        KeyCode::Char( 'c' ) => key.modifiers.contains( KeyModifiers::CONTROL ),
        _ => false,
    }
}


/// Spawns a thread that sets `quit` when a quit key is pressed.
///
/// The thread exits on its own once every receiver of `quit` is gone.
pub fn spawn_quit_listener( quit: watch::Sender<bool> ) -> thread::JoinHandle<()> {
    thread::spawn( move || {
        while !quit.is_closed() {
            match event::poll( POLL_INTERVAL ) {
                Ok( false ) => {}
                Ok( true ) => match event::read() {
                    Ok( Event::Key( key ) ) if is_quit_key( &key ) => {
                        tracing::info!( "Quit key pressed" );
                        let _ = quit.send( true );
                        break;
                    }
                    Ok( _ ) => {}
                    Err( e ) => {
                        tracing::warn!( "Failed to read terminal event: {}", e );
                        break;
                    }
                },
                Err( e ) => {
                    tracing::warn!( "Failed to poll terminal events: {}", e );
                    break;
                }
            }
        }
        tracing::debug!( "Input thread exiting" );
    })
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_quit_keys() {
        assert!( is_quit_key( &KeyEvent::new( KeyCode::Esc, KeyModifiers::NONE ) ) );
        assert!( is_quit_key( &KeyEvent::new( KeyCode::Char( 'q' ), KeyModifiers::NONE ) ) );
        assert!( is_quit_key( &KeyEvent::new( KeyCode::Char( 'c' ), KeyModifiers::CONTROL ) ) );
    }


    #[test]
    fn test_other_keys_ignored() {
        assert!( !is_quit_key( &KeyEvent::new( KeyCode::Char( 'c' ), KeyModifiers::NONE ) ) );
        assert!( !is_quit_key( &KeyEvent::new( KeyCode::Enter, KeyModifiers::NONE ) ) );

        let mut release = KeyEvent::new( KeyCode::Esc, KeyModifiers::NONE );
        release.kind = KeyEventKind::Release;
        assert!( !is_quit_key( &release ) );
    }
}
