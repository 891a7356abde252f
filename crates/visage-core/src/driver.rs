//! Render loop
//!
//! The Driver ticks the player at a fixed cadence and hands each result to
//! a render sink until the shutdown future resolves.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::frame::Frame;
use crate::player::Player;


/// Errors reported by a render sink.
#[derive( Debug, Error )]
pub enum RenderError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Render backend error: {0}" )]
    Backend( String ),
}


/// Display surface that receives one frame per tick.
pub trait RenderSink {
    /// Shows `frame`, or a blank screen when `None`.
    fn present( &mut self, frame: Option<&Frame> ) -> Result<(), RenderError>;
}


/// Converts frames-per-second into a tick interval.
///
/// Returns `None` unless `fps` is finite and positive.
pub fn frame_interval( fps: f64 ) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64( 1.0 / fps ).ok()
}


/// Owns the player and the sink for the lifetime of the render loop.
pub struct Driver<S: RenderSink> {
    player: Player,
    sink: S,
}


impl<S: RenderSink> Driver<S> {
    pub fn new( player: Player, sink: S ) -> Self {
        Self { player, sink }
    }


    /// Runs until `shutdown` resolves and returns the number of ticks.
    ///
    /// Shutdown is checked before every tick and interrupts the wait for
    /// the next one. Sink failures are logged and never stop the loop.
    /// The player, its library and the sink are dropped on return.
    pub async fn run<F>( mut self, shutdown: F ) -> u64
    where
        F: Future<Output = ()>,
    {
        // tokio intervals cannot have a zero period
        let period = self.player.frame_interval().max( Duration::from_millis( 1 ) );
        let mut ticker = tokio::time::interval( period );
        ticker.set_missed_tick_behavior( MissedTickBehavior::Skip );

        tokio::pin!( shutdown );

        let mut ticks: u64 = 0;
        let mut sink_failing = false;

        tracing::info!( "Render loop started: {:?} per frame", period );

        loop {
            let scheduled = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                instant = ticker.tick() => instant,
            };

            let frame = self.player.tick( scheduled.into_std() );
            match self.sink.present( frame ) {
                Ok(()) => {
                    if sink_failing {
                        tracing::info!( "Render sink recovered" );
                        sink_failing = false;
                    }
                }
                Err( e ) if !sink_failing => {
                    tracing::warn!( "Render sink failed: {}", e );
                    sink_failing = true;
                }
                Err( e ) => tracing::debug!( "Render sink still failing: {}", e ),
            }

            ticks += 1;
        }

        tracing::info!( "Render loop stopped after {} ticks", ticks );
        ticks
    }
}


#[cfg( test )]
mod tests {
    use std::sync::{ Arc, Mutex };

    use super::*;
    use crate::channel::command_slot;
    use crate::library::{ ExpressionLibrary, FrameSequence };


    /// Records the width tag of every presented frame.
    #[derive( Clone, Default )]
    struct RecordingSink {
        shown: Arc<Mutex<Vec<Option<u32>>>>,
        fail: bool,
    }


    impl RenderSink for RecordingSink {
        fn present( &mut self, frame: Option<&Frame> ) -> Result<(), RenderError> {
            self.shown.lock().unwrap().push( frame.map( Frame::width ) );
            if self.fail {
                return Err( RenderError::Backend( "display unplugged".into() ) );
            }
            Ok(())
        }
    }


    fn player( interval: Duration ) -> ( Player, crate::channel::CommandSender ) {
        let frames = ( 0..3 ).map( |i| Frame::solid( i + 1, 1, [ 0, 0, 0, 255 ] ) ).collect();
        let library = ExpressionLibrary::from_sequences([
            FrameSequence::new( "happy", frames ).unwrap(),
        ]).unwrap();
        let ( tx, rx ) = command_slot();
        ( Player::new( Arc::new( library ), rx, interval ), tx )
    }


    #[test]
    fn test_frame_interval() {
        assert_eq!( frame_interval( 12.5 ), Some( Duration::from_millis( 80 ) ) );
        assert_eq!( frame_interval( 0.0 ), None );
        assert_eq!( frame_interval( -1.0 ), None );
        assert_eq!( frame_interval( f64::NAN ), None );
    }


    #[tokio::test( start_paused = true )]
    async fn test_presents_every_tick() {
        let ( player, tx ) = player( Duration::from_millis( 100 ) );
        let sink = RecordingSink::default();
        let shown = Arc::clone( &sink.shown );

        tx.on_message( "happy" );
        let ticks = Driver::new( player, sink )
            .run( tokio::time::sleep( Duration::from_millis( 450 ) ) )
            .await;

        assert_eq!( ticks, 5 );
        assert_eq!(
            *shown.lock().unwrap(),
            vec![ Some( 1 ), Some( 2 ), Some( 3 ), Some( 1 ), Some( 2 ) ]
        );
    }


    #[tokio::test( start_paused = true )]
    async fn test_blank_until_first_command() {
        let ( player, tx ) = player( Duration::from_millis( 100 ) );
        let sink = RecordingSink::default();
        let shown = Arc::clone( &sink.shown );

        let driver = Driver::new( player, sink );
        let publisher = async move {
            tokio::time::sleep( Duration::from_millis( 250 ) ).await;
            tx.on_message( "happy" );
            tokio::time::sleep( Duration::from_millis( 200 ) ).await;
        };
        driver.run( publisher ).await;

        assert_eq!(
            *shown.lock().unwrap(),
            vec![ None, None, None, Some( 1 ), Some( 2 ) ]
        );
    }


    #[tokio::test( start_paused = true )]
    async fn test_shutdown_before_first_tick() {
        let ( player, _tx ) = player( Duration::from_millis( 100 ) );
        let ticks = Driver::new( player, RecordingSink::default() )
            .run( std::future::ready( () ) )
            .await;
        assert_eq!( ticks, 0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_sink_failure_does_not_stop_loop() {
        let ( player, tx ) = player( Duration::from_millis( 100 ) );
        let sink = RecordingSink { fail: true, ..Default::default() };
        let shown = Arc::clone( &sink.shown );

        tx.on_message( "happy" );
        let ticks = Driver::new( player, sink )
            .run( tokio::time::sleep( Duration::from_millis( 350 ) ) )
            .await;

        assert_eq!( ticks, 4 );
        assert_eq!( shown.lock().unwrap().len(), 4 );
    }
}
