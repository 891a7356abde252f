//! Line-based TCP transport for expression commands.
//!
//! Publishers connect and write `<topic> <payload>` lines. A subscription
//! forwards payloads for its topic into a [`CommandSender`]; everything
//! else is dropped. Delivery is best effort. A publisher that sends a
//! line longer than [`MAX_LINE_LENGTH`] is disconnected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{ TcpListener, TcpStream };
use tokio::task::{ JoinHandle, JoinSet };
use tokio_util::codec::{ FramedRead, LinesCodec, LinesCodecError };

use crate::channel::CommandSender;
use crate::command::{ CommandError, Message };


/// Longest accepted wire line in bytes, not counting the newline.
pub const MAX_LINE_LENGTH: usize = 1024;


/// Errors that can occur in the transport.
#[derive( Debug, Error )]
pub enum TransportError {
    #[error( "Failed to bind {addr}: {source}" )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error( "Failed to connect to {addr}: {source}" )]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// Listening socket that has not been subscribed yet.
pub struct TcpSubscriber {
    listener: TcpListener,
}


impl TcpSubscriber {
    /// Binds the listening socket.
    pub async fn bind( addr: &str ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind( addr )
            .await
            .map_err( |source| TransportError::Bind { addr: addr.to_string(), source } )?;
        Ok( Self { listener } )
    }


    pub fn local_addr( &self ) -> Result<SocketAddr, TransportError> {
        Ok( self.listener.local_addr()? )
    }


    /// Starts delivering `topic` payloads to `sender`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn try_subscribe( self, topic: &str, sender: CommandSender ) -> Subscription {
        let topic: Arc<str> = Arc::from( topic );
        tracing::info!(
            "Subscribed to '{}' on {:?}",
            topic,
            self.listener.local_addr().ok()
        );

        let task = tokio::spawn( accept_loop( self.listener, Arc::clone( &topic ), sender ) );
        Subscription { topic, task }
    }
}


/// Active subscription. Dropping it closes the listener and every
/// publisher connection.
#[derive( Debug )]
pub struct Subscription {
    topic: Arc<str>,
    task: JoinHandle<()>,
}


impl Subscription {
    pub fn topic( &self ) -> &str {
        &self.topic
    }


    /// Stops delivery.
    pub fn close( self ) {
        drop( self );
    }
}


impl Drop for Subscription {
    fn drop( &mut self ) {
        self.task.abort();
        tracing::debug!( "Unsubscribed from '{}'", self.topic );
    }
}


async fn accept_loop( listener: TcpListener, topic: Arc<str>, sender: CommandSender ) {
    // Connections live in the set so aborting this task ends them too
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(( stream, peer )) => {
                    tracing::debug!( "Publisher connected: {}", peer );
                    connections.spawn( read_lines( stream, peer, Arc::clone( &topic ), sender.clone() ) );
                }
                Err( e ) => {
                    tracing::warn!( "Accept failed: {}", e );
                    tokio::time::sleep( Duration::from_millis( 100 ) ).await;
                }
            },
            Some( _ ) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}


async fn read_lines( stream: TcpStream, peer: SocketAddr, topic: Arc<str>, sender: CommandSender ) {
    let mut lines = FramedRead::new( stream, LinesCodec::new_with_max_length( MAX_LINE_LENGTH ) );

    while let Some( line ) = lines.next().await {
        match line {
            Ok( line ) => deliver( &line, &topic, &sender, peer ),
            Err( LinesCodecError::MaxLineLengthExceeded ) => {
                tracing::warn!( "Closing {}: line exceeds {} bytes", peer, MAX_LINE_LENGTH );
                break;
            }
            Err( LinesCodecError::Io( e ) ) => {
                tracing::warn!( "Connection {} failed: {}", peer, e );
                break;
            }
        }
    }

    tracing::debug!( "Publisher disconnected: {}", peer );
}


fn deliver( line: &str, topic: &str, sender: &CommandSender, peer: SocketAddr ) {
    match Message::parse( line ) {
        Ok( message ) if message.topic == topic => {
            sender.on_message( &message.payload );
        }
        Ok( message ) => tracing::trace!( "Ignoring message for topic '{}'", message.topic ),
        Err( CommandError::Empty ) => {}
        Err( e ) => tracing::warn!( "Bad message from {}: {}", peer, e ),
    }
}


/// Client side used to publish commands to a running display.
pub struct Publisher {
    stream: TcpStream,
}


impl Publisher {
    pub async fn connect( addr: &str ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect( addr )
            .await
            .map_err( |source| TransportError::Connect { addr: addr.to_string(), source } )?;
        Ok( Self { stream } )
    }


    /// Writes one message.
    pub async fn publish( &mut self, message: &Message ) -> Result<(), TransportError> {
        self.stream.write_all( message.encode().as_bytes() ).await?;
        Ok(())
    }


    /// Flushes and closes the connection.
    pub async fn finish( mut self ) -> Result<(), TransportError> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::channel::{ command_slot, CommandReceiver };


    async fn wait_for_pending( rx: &CommandReceiver ) -> Option<String> {
        for _ in 0..200 {
            if let Some( name ) = rx.take_pending() {
                return Some( name );
            }
            tokio::time::sleep( Duration::from_millis( 10 ) ).await;
        }
        None
    }


    async fn subscribe( topic: &str ) -> ( Subscription, CommandReceiver, String ) {
        let subscriber = TcpSubscriber::bind( "127.0.0.1:0" ).await.unwrap();
        let addr = subscriber.local_addr().unwrap().to_string();
        let ( tx, rx ) = command_slot();
        ( subscriber.try_subscribe( topic, tx ), rx, addr )
    }


    #[tokio::test]
    async fn test_delivers_topic_payload() {
        let ( subscription, rx, addr ) = subscribe( "/robot_face" ).await;
        assert_eq!( subscription.topic(), "/robot_face" );

        let mut publisher = Publisher::connect( &addr ).await.unwrap();
        publisher.publish( &Message::new( "/robot_face", "happy" ) ).await.unwrap();
        publisher.finish().await.unwrap();

        assert_eq!( wait_for_pending( &rx ).await.as_deref(), Some( "happy" ) );
    }


    #[tokio::test]
    async fn test_ignores_other_topics_and_garbage() {
        let ( _subscription, rx, addr ) = subscribe( "/robot_face" ).await;

        let mut stream = TcpStream::connect( &addr ).await.unwrap();
        stream
            .write_all( b"/other angry\nnonsense\n\n/robot_face sad\n" )
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!( wait_for_pending( &rx ).await.as_deref(), Some( "sad" ) );
        assert_eq!( rx.received(), 1 );
    }


    #[tokio::test]
    async fn test_oversized_line_closes_connection() {
        let ( _subscription, rx, addr ) = subscribe( "/robot_face" ).await;

        let mut stream = TcpStream::connect( &addr ).await.unwrap();
        let line = format!( "/robot_face {}\n/robot_face sad\n", "a".repeat( MAX_LINE_LENGTH * 4 ) );
        let _ = stream.write_all( line.as_bytes() ).await;

        // The subscriber hangs up instead of buffering the rest
        let mut buf = [ 0u8; 16 ];
        let closed = tokio::time::timeout( Duration::from_secs( 2 ), stream.read( &mut buf ) ).await;
        assert!( matches!( closed, Ok( Ok( 0 ) ) | Ok( Err( _ ) ) ) );
        assert_eq!( rx.received(), 0 );

        let mut publisher = Publisher::connect( &addr ).await.unwrap();
        publisher.publish( &Message::new( "/robot_face", "happy" ) ).await.unwrap();
        publisher.finish().await.unwrap();

        assert_eq!( wait_for_pending( &rx ).await.as_deref(), Some( "happy" ) );
        assert_eq!( rx.received(), 1 );
    }


    #[tokio::test]
    async fn test_multiple_publishers() {
        let ( _subscription, rx, addr ) = subscribe( "/robot_face" ).await;

        for name in [ "happy", "sad" ] {
            let mut publisher = Publisher::connect( &addr ).await.unwrap();
            publisher.publish( &Message::new( "/robot_face", name ) ).await.unwrap();
            publisher.finish().await.unwrap();
            assert_eq!( wait_for_pending( &rx ).await.as_deref(), Some( name ) );
        }
    }


    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let ( subscription, rx, addr ) = subscribe( "/robot_face" ).await;
        subscription.close();
        tokio::time::sleep( Duration::from_millis( 50 ) ).await;

        if let Ok( mut publisher ) = Publisher::connect( &addr ).await {
            let _ = publisher.publish( &Message::new( "/robot_face", "happy" ) ).await;
            let _ = publisher.finish().await;
        }
        tokio::time::sleep( Duration::from_millis( 100 ) ).await;
        assert_eq!( rx.take_pending(), None );
    }


    #[tokio::test]
    async fn test_connect_failure() {
        let subscriber = TcpSubscriber::bind( "127.0.0.1:0" ).await.unwrap();
        let addr = subscriber.local_addr().unwrap().to_string();
        drop( subscriber );

        let result = Publisher::connect( &addr ).await;
        assert!( matches!( result, Err( TransportError::Connect { .. } ) ) );
    }
}
