//! Expression playback state machine
//!
//! The Player owns the active expression and frame position. Each tick it
//! applies at most one pending command and then advances the loop.

use std::sync::Arc;
use std::time::{ Duration, Instant };

use crate::channel::CommandReceiver;
use crate::command::{ self, CommandError };
use crate::frame::Frame;
use crate::library::ExpressionLibrary;


/// Current playback state.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum PlaybackState {
    /// No expression has been selected yet; nothing is shown.
    Uninitialized,

    /// Looping `expression`. `frame_index` is always in range for it.
    Playing {
        expression: String,
        frame_index: usize,
        last_advance: Instant,
    },
}


/// Outcome of applying one command.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Transition {
    /// First expression selected from `Uninitialized`.
    Started { expression: String },

    /// Active expression replaced; playback restarts at frame 0.
    Switched { from: String, to: String },

    /// Command named the active expression; playback continues untouched.
    Repeated { expression: String },

    /// Command could not be applied; state unchanged.
    Rejected { error: CommandError },
}


/// Drives frame selection for the display.
pub struct Player {
    library: Arc<ExpressionLibrary>,
    commands: CommandReceiver,
    frame_interval: Duration,
    state: PlaybackState,
}


impl Player {
    /// Creates a player in the `Uninitialized` state.
    pub fn new(
        library: Arc<ExpressionLibrary>,
        commands: CommandReceiver,
        frame_interval: Duration,
    ) -> Self {
        Self {
            library,
            commands,
            frame_interval,
            state: PlaybackState::Uninitialized,
        }
    }


    /// Starts playing `name` immediately, without waiting for a command.
    ///
    /// Falls back to the lexically first expression if `name` is not in
    /// the library.
    pub fn start_with_default( &mut self, name: &str, now: Instant ) -> Transition {
        let name = match command::normalize( name ) {
            Some( n ) if self.library.contains( n ) => n.to_string(),
            _ => {
                let Some( fallback ) = self.library.first_name() else {
                    return Transition::Rejected { error: CommandError::Unknown( name.to_string() ) };
                };
                tracing::warn!( "Default expression '{}' not found, using '{}'", name, fallback );
                fallback.to_string()
            }
        };
        self.apply( &name, now )
    }


    /// Applies one expression command.
    pub fn apply( &mut self, name: &str, now: Instant ) -> Transition {
        let name = match command::validate_name( name ) {
            Ok( name ) => name,
            Err( error ) => {
                tracing::warn!( "Rejected command: {}", error );
                return Transition::Rejected { error };
            }
        };

        if !self.library.contains( name ) {
            tracing::warn!( "Unknown expression '{}' ignored", name );
            return Transition::Rejected { error: CommandError::Unknown( name.to_string() ) };
        }

        let transition = match &self.state {
            PlaybackState::Playing { expression, .. } if expression == name => {
                tracing::debug!( "Expression '{}' already playing", name );
                return Transition::Repeated { expression: name.to_string() };
            }
            PlaybackState::Playing { expression, .. } => {
                tracing::info!( "Switching expression: {} -> {}", expression, name );
                Transition::Switched { from: expression.clone(), to: name.to_string() }
            }
            PlaybackState::Uninitialized => {
                tracing::info!( "Starting expression: {}", name );
                Transition::Started { expression: name.to_string() }
            }
        };

        self.state = PlaybackState::Playing {
            expression: name.to_string(),
            frame_index: 0,
            last_advance: now,
        };
        transition
    }


    /// Runs one cycle and returns the frame to display, if any.
    ///
    /// A tick that starts or switches an expression shows its first frame;
    /// any other tick advances the loop once a full frame interval has
    /// passed since the last advance.
    pub fn tick( &mut self, now: Instant ) -> Option<&Frame> {
        let transition = self.commands
            .take_pending()
            .map( |name| self.apply( &name, now ) );

        let restarted = matches!(
            transition,
            Some( Transition::Started { .. } | Transition::Switched { .. } )
        );
        if !restarted {
            self.advance( now );
        }

        self.current_frame()
    }


    /// Moves to the next frame if the interval has elapsed, wrapping at the end.
    fn advance( &mut self, now: Instant ) {
        let PlaybackState::Playing { expression, frame_index, last_advance } = &mut self.state else {
            return;
        };

        if now.saturating_duration_since( *last_advance ) < self.frame_interval {
            return;
        }

        let len = self.library.lookup( expression ).map( |s| s.len() ).unwrap_or( 1 );
        *frame_index = ( *frame_index + 1 ) % len;
        *last_advance = now;
    }


    /// Gets the frame for the current state.
    pub fn current_frame( &self ) -> Option<&Frame> {
        match &self.state {
            PlaybackState::Playing { expression, frame_index, .. } => self.library
                .lookup( expression )
                .and_then( |s| s.frame( *frame_index ) ),
            PlaybackState::Uninitialized => None,
        }
    }


    /// Gets the current playback state.
    pub fn state( &self ) -> &PlaybackState {
        &self.state
    }


    /// Gets the active expression name, if any.
    pub fn active_expression( &self ) -> Option<&str> {
        match &self.state {
            PlaybackState::Playing { expression, .. } => Some( expression ),
            PlaybackState::Uninitialized => None,
        }
    }


    /// Gets the current frame index, if playing.
    pub fn frame_index( &self ) -> Option<usize> {
        match &self.state {
            PlaybackState::Playing { frame_index, .. } => Some( *frame_index ),
            PlaybackState::Uninitialized => None,
        }
    }


    pub fn frame_interval( &self ) -> Duration {
        self.frame_interval
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::channel::{ command_slot, CommandSender };
    use crate::library::FrameSequence;


    const INTERVAL: Duration = Duration::from_millis( 100 );


    /// Frame `i` of every sequence is tagged with width `i + 1`.
    fn sequence( name: &str, frames: u32 ) -> FrameSequence {
        let frames = ( 0..frames ).map( |i| Frame::solid( i + 1, 1, [ 0, 0, 0, 255 ] ) ).collect();
        FrameSequence::new( name, frames ).unwrap()
    }


    /// Player over happy (4 frames), sad (3) and blank (2), plus a clock.
    struct Harness {
        player: Player,
        tx: CommandSender,
        start: Instant,
        ticks: u32,
    }


    impl Harness {
        fn new() -> Self {
            let library = ExpressionLibrary::from_sequences([
                sequence( "happy", 4 ),
                sequence( "sad", 3 ),
                sequence( "blank", 2 ),
            ]).unwrap();
            let ( tx, rx ) = command_slot();
            Self {
                player: Player::new( Arc::new( library ), rx, INTERVAL ),
                tx,
                start: Instant::now(),
                ticks: 0,
            }
        }


        /// Ticks one full interval after the previous tick.
        fn tick( &mut self ) -> Option<u32> {
            let now = self.start + INTERVAL * self.ticks;
            self.ticks += 1;
            self.player.tick( now ).map( Frame::width )
        }


        fn send( &self, name: &str ) {
            self.tx.on_message( name );
        }


        fn playing( &self ) -> Option<( &str, usize )> {
            Some(( self.player.active_expression()?, self.player.frame_index()? ))
        }
    }


    #[test]
    fn test_starts_uninitialized_and_blank() {
        let mut h = Harness::new();
        assert_eq!( h.tick(), None );
        assert_eq!( h.tick(), None );
        assert_eq!( h.player.state(), &PlaybackState::Uninitialized );
    }


    #[test]
    fn test_first_command_starts_at_frame_zero() {
        let mut h = Harness::new();
        h.tick();
        h.send( "happy" );
        assert_eq!( h.tick(), Some( 1 ) );
        assert_eq!( h.playing(), Some(( "happy", 0 )) );
    }


    #[test]
    fn test_repeat_command_does_not_restart() {
        let mut h = Harness::new();
        h.send( "happy" );
        h.tick();
        h.tick();
        h.tick();
        assert_eq!( h.playing(), Some(( "happy", 2 )) );

        h.send( "happy" );
        h.tick();
        assert_eq!( h.playing(), Some(( "happy", 3 )) );
    }


    #[test]
    fn test_repeated_publish_keeps_looping() {
        let mut h = Harness::new();
        h.send( "happy" );
        h.tick();

        let mut seen = Vec::new();
        for _ in 0..5 {
            h.send( "happy" );
            seen.push( h.tick() );
        }
        assert_eq!( seen, vec![ Some( 2 ), Some( 3 ), Some( 4 ), Some( 1 ), Some( 2 ) ] );
    }


    #[test]
    fn test_switch_resets_to_first_frame() {
        let mut h = Harness::new();
        h.send( "happy" );
        for _ in 0..4 {
            h.tick();
        }
        assert_eq!( h.playing(), Some(( "happy", 3 )) );

        h.send( "sad" );
        assert_eq!( h.tick(), Some( 1 ) );
        assert_eq!( h.playing(), Some(( "sad", 0 )) );

        // The next advance comes one full interval after the switch
        h.tick();
        assert_eq!( h.playing(), Some(( "sad", 1 )) );
    }


    #[test]
    fn test_unknown_command_is_ignored() {
        let mut h = Harness::new();
        h.send( "happy" );
        h.tick();
        h.tick();
        assert_eq!( h.playing(), Some(( "happy", 1 )) );

        h.send( "angry" );
        h.tick();
        assert_eq!( h.playing(), Some(( "happy", 2 )) );

        h.send( "angry" );
        h.tick();
        assert_eq!( h.playing(), Some(( "happy", 3 )) );
    }


    #[test]
    fn test_unknown_command_while_uninitialized() {
        let mut h = Harness::new();
        h.send( "angry" );
        assert_eq!( h.tick(), None );
        assert_eq!( h.player.state(), &PlaybackState::Uninitialized );

        h.send( "sad" );
        assert_eq!( h.tick(), Some( 1 ) );
        assert_eq!( h.playing(), Some(( "sad", 0 )) );
    }


    #[test]
    fn test_loops_forever() {
        let mut h = Harness::new();
        h.send( "happy" );

        let frames: Vec<usize> = ( 0..40 )
            .map( |_| {
                h.tick();
                h.player.frame_index().unwrap()
            })
            .collect();

        let expected: Vec<usize> = ( 0..40 ).map( |i| i % 4 ).collect();
        assert_eq!( frames, expected );
        assert_eq!( frames.iter().filter( |&&i| i == 0 ).count(), 10 );
    }


    #[test]
    fn test_commands_coalesce_between_ticks() {
        let mut h = Harness::new();
        h.send( "happy" );
        h.tick();

        h.send( "sad" );
        h.send( "blank" );
        h.tick();
        assert_eq!( h.playing(), Some(( "blank", 0 )) );

        // "sad" was dropped, not deferred
        h.tick();
        assert_eq!( h.playing(), Some(( "blank", 1 )) );
    }


    #[test]
    fn test_no_advance_before_interval() {
        let mut h = Harness::new();
        h.send( "happy" );
        let start = h.start;
        h.player.tick( start );
        h.player.tick( start + INTERVAL / 2 );
        assert_eq!( h.player.frame_index(), Some( 0 ) );

        h.player.tick( start + INTERVAL );
        assert_eq!( h.player.frame_index(), Some( 1 ) );
    }


    #[test]
    fn test_one_frame_per_tick_after_stall() {
        let mut h = Harness::new();
        h.send( "happy" );
        let start = h.start;
        h.player.tick( start );
        h.player.tick( start + INTERVAL * 10 );
        assert_eq!( h.player.frame_index(), Some( 1 ) );
    }


    #[test]
    fn test_apply_reports_transitions() {
        let mut h = Harness::new();
        let now = h.start;

        assert_eq!(
            h.player.apply( "happy", now ),
            Transition::Started { expression: "happy".into() }
        );
        assert_eq!(
            h.player.apply( " happy ", now ),
            Transition::Repeated { expression: "happy".into() }
        );
        assert_eq!(
            h.player.apply( "sad", now ),
            Transition::Switched { from: "happy".into(), to: "sad".into() }
        );
        assert_eq!(
            h.player.apply( "angry", now ),
            Transition::Rejected { error: CommandError::Unknown( "angry".into() ) }
        );
        assert_eq!( h.player.apply( "", now ), Transition::Rejected { error: CommandError::Empty } );

        let long = "a".repeat( command::MAX_NAME_LENGTH + 1 );
        assert_eq!(
            h.player.apply( &long, now ),
            Transition::Rejected { error: CommandError::TooLong( long.len() ) }
        );
        assert_eq!( h.player.active_expression(), Some( "sad" ) );
    }


    #[test]
    fn test_default_expression() {
        let mut h = Harness::new();
        let transition = h.player.start_with_default( "sad", h.start );
        assert_eq!( transition, Transition::Started { expression: "sad".into() } );
        assert_eq!( h.tick(), Some( 1 ) );
    }


    #[test]
    fn test_missing_default_falls_back_to_first() {
        let mut h = Harness::new();
        h.player.start_with_default( "neutral", h.start );
        assert_eq!( h.playing(), Some(( "blank", 0 )) );
    }
}
