//! Single-slot command inbox shared between the transport and the driver.
//!
//! The transport pushes names with [`CommandSender::on_message`] from any
//! thread; the driver pulls at most one name per tick with
//! [`CommandReceiver::take_pending`]. Commands are not queued: a new
//! arrival overwrites any command the driver has not taken yet.

use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::{ Arc, Mutex, PoisonError };

use crate::command;


/// Shared slot. The lock is only held for a swap, never across I/O.
#[derive( Debug, Default )]
struct Slot {
    pending: Mutex<Option<String>>,
    received: AtomicU64,
    coalesced: AtomicU64,
}


/// Creates a connected sender/receiver pair around one empty slot.
pub fn command_slot() -> ( CommandSender, CommandReceiver ) {
    let slot = Arc::new( Slot::default() );
    ( CommandSender { slot: Arc::clone( &slot ) }, CommandReceiver { slot } )
}


/// Producer half, cloned into every transport callback.
#[derive( Debug, Clone )]
pub struct CommandSender {
    slot: Arc<Slot>,
}


impl CommandSender {
    /// Stores `raw` as the pending command, replacing any unconsumed one.
    ///
    /// Returns false when the payload is blank or too long and was discarded.
    pub fn on_message( &self, raw: &str ) -> bool {
        let name = match command::validate_name( raw ) {
            Ok( name ) => name,
            Err( e ) => {
                tracing::debug!( "Discarding command: {}", e );
                return false;
            }
        };

        let previous = self.slot.pending
            .lock()
            .unwrap_or_else( PoisonError::into_inner )
            .replace( name.to_string() );

        self.slot.received.fetch_add( 1, Ordering::Relaxed );
        if let Some( previous ) = previous {
            self.slot.coalesced.fetch_add( 1, Ordering::Relaxed );
            tracing::debug!( "Command '{}' replaced by '{}' before it was taken", previous, name );
        }
        true
    }
}


/// Consumer half, owned by the player.
#[derive( Debug )]
pub struct CommandReceiver {
    slot: Arc<Slot>,
}


impl CommandReceiver {
    /// Takes the pending command, leaving the slot empty.
    pub fn take_pending( &self ) -> Option<String> {
        self.slot.pending
            .lock()
            .unwrap_or_else( PoisonError::into_inner )
            .take()
    }


    /// Number of accepted commands so far.
    pub fn received( &self ) -> u64 {
        self.slot.received.load( Ordering::Relaxed )
    }


    /// Number of commands overwritten before they were taken.
    pub fn coalesced( &self ) -> u64 {
        self.slot.coalesced.load( Ordering::Relaxed )
    }
}


#[cfg( test )]
mod tests {
    use std::thread;

    use super::*;


    #[test]
    fn test_take_clears_slot() {
        let ( tx, rx ) = command_slot();
        assert!( tx.on_message( "happy" ) );
        assert_eq!( rx.take_pending().as_deref(), Some( "happy" ) );
        assert_eq!( rx.take_pending(), None );
    }


    #[test]
    fn test_last_command_wins() {
        let ( tx, rx ) = command_slot();
        tx.on_message( "sad" );
        tx.on_message( "blank" );

        assert_eq!( rx.take_pending().as_deref(), Some( "blank" ) );
        assert_eq!( rx.received(), 2 );
        assert_eq!( rx.coalesced(), 1 );
    }


    #[test]
    fn test_blank_payload_keeps_pending() {
        let ( tx, rx ) = command_slot();
        tx.on_message( " happy " );
        assert!( !tx.on_message( "  \n" ) );

        assert_eq!( rx.take_pending().as_deref(), Some( "happy" ) );
    }


    #[test]
    fn test_long_payload_is_discarded() {
        let ( tx, rx ) = command_slot();
        tx.on_message( "happy" );
        assert!( !tx.on_message( &"a".repeat( command::MAX_NAME_LENGTH + 1 ) ) );

        assert_eq!( rx.take_pending().as_deref(), Some( "happy" ) );
        assert_eq!( rx.received(), 1 );
    }


    #[test]
    fn test_senders_on_other_threads() {
        let ( tx, rx ) = command_slot();

        let handles: Vec<_> = ( 0..4 )
            .map( |i| {
                let tx = tx.clone();
                thread::spawn( move || {
                    for _ in 0..100 {
                        tx.on_message( &format!( "expr{}", i ) );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let last = rx.take_pending().unwrap();
        assert!( last.starts_with( "expr" ) );
        assert_eq!( rx.received(), 400 );
        assert_eq!( rx.coalesced(), 399 );
        assert_eq!( rx.take_pending(), None );
    }
}
