//! Visage CLI - Full-screen robot face expression player

mod cli;
mod input;
mod settings;
mod terminal;

use std::fmt::Display;
use std::fs::{ self, OpenOptions };
use std::future::Future;
use std::path::PathBuf;
use std::sync::{ Arc, Mutex };
use std::time::Instant;

use anyhow::{ Context, Result };
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::filter::LevelFilter;

use cli::{ Args, Commands, LogLevel };
use settings::Settings;
use terminal::TerminalSink;

use visage_core::{
    command_slot, Driver, ExpressionLibrary, Message, Player, Publisher, TcpSubscriber,
};


/// Returns the default log file location.
fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map( |p| p.join( "visage" ).join( "visage.log" ) )
}


/// Installs the global subscriber, writing to a file since the display
/// owns the terminal.
fn init_logging( level: LogLevel, path: Option<PathBuf> ) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level( LevelFilter::from( level ) )
        .with_ansi( false );

    match path.or_else( default_log_path ) {
        Some( path ) => {
            if let Some( parent ) = path.parent() {
                fs::create_dir_all( parent )
                    .with_context( || format!( "Failed to create log directory {:?}", parent ) )?;
            }
            let file = OpenOptions::new()
                .create( true )
                .append( true )
                .open( &path )
                .with_context( || format!( "Failed to open log file {:?}", path ) )?;
            builder.with_writer( Mutex::new( file ) ).init();
        }
        None => builder.with_writer( std::io::sink ).init(),
    }

    Ok(())
}


/// Waits on one signal listener. A listener that fails never resolves,
/// so the display keeps running on the remaining shutdown sources.
async fn wait_for_signal<F, E>( name: &str, listener: F )
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    if let Err( e ) = listener.await {
        tracing::warn!( "Not listening for {}: {}", name, e );
        std::future::pending::<()>().await;
    }
}


/// Waits for either `Ctrl+C` or `SIGTERM` (on Unix).
async fn shutdown_signal() {
    let ctrl_c = wait_for_signal( "Ctrl+C", tokio::signal::ctrl_c() );

    #[cfg( unix )]
    let terminate = wait_for_signal( "SIGTERM", async {
        use tokio::signal::unix::{ signal, SignalKind };

        let mut term = signal( SignalKind::terminate() )?;
        term.recv()
            .await
            .ok_or_else( || std::io::Error::other( "signal stream closed" ) )
    });
    #[cfg( not( unix ) )]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!( "Shutdown signal received" );
}


/// Publishes `name` to a running display.
async fn send( settings: &Settings, name: &str, repeat: u32 ) -> Result<()> {
    settings.check_topic()?;
    let name = visage_core::command::validate_name( name )?;
    let message = Message::new( settings.topic.as_str(), name );
    let mut publisher = Publisher::connect( &settings.listen ).await?;
    for _ in 0..repeat {
        publisher.publish( &message ).await?;
    }
    publisher.finish().await?;

    tracing::info!( "Published '{}' to {} x{}", name, settings.topic, repeat );
    Ok(())
}


/// Loads the library and runs the display until shutdown.
async fn display( settings: &Settings, list_only: bool ) -> Result<()> {
    let frame_interval = settings.validate()?;

    let library = ExpressionLibrary::load( &settings.expressions_dir )
        .with_context( || format!( "Failed to load expressions from {:?}", settings.expressions_dir ) )?;

    if list_only {
        for name in library.names() {
            let frames = library.lookup( name ).map( |s| s.len() ).unwrap_or( 0 );
            println!( "{}\t{} frames", name, frames );
        }
        return Ok(());
    }

    let ( sender, receiver ) = command_slot();
    let subscription = TcpSubscriber::bind( &settings.listen )
        .await?
        .try_subscribe( &settings.topic, sender );

    let mut player = Player::new( Arc::new( library ), receiver, frame_interval );
    if let Some( name ) = &settings.default_expression {
        player.start_with_default( name, Instant::now() );
    }

    let sink = TerminalSink::enter().context( "Failed to set up terminal" )?;

    let ( quit_tx, mut quit_rx ) = watch::channel( false );
    let input = input::spawn_quit_listener( quit_tx );

    let quit_key = async move {
        // A dead input thread must not stop the display
        if quit_rx.wait_for( |quit| *quit ).await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let shutdown = async move {
        tokio::select! {
            _ = shutdown_signal() => {},
            _ = quit_key => {},
        }
    };

    // Drops the sink on return, which restores the terminal
    Driver::new( player, sink ).run( shutdown ).await;

    subscription.close();
    let _ = tokio::task::spawn_blocking( move || input.join() ).await;
    Ok(())
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging( args.log_level, args.log_file.clone() )?;

    let mut settings = Settings::load( args.settings.as_deref() );
    settings.apply_args( &args );
    tracing::debug!( "Settings: {:?}", settings );

    match &args.command {
        Some( Commands::Send { name, repeat } ) => send( &settings, name, *repeat ).await,
        None => display( &settings, args.list ).await,
    }
}


#[cfg( test )]
mod tests {
    use std::time::Duration;

    use super::*;


    #[tokio::test( start_paused = true )]
    async fn test_failed_listener_never_resolves() {
        let listener = std::future::ready( Err::<(), _>( "no signal support" ) );
        let waited = tokio::time::timeout(
            Duration::from_secs( 3600 ),
            wait_for_signal( "test", listener ),
        ).await;
        assert!( waited.is_err() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_listener_resolves_on_signal() {
        let listener = async {
            tokio::time::sleep( Duration::from_secs( 1 ) ).await;
            Ok::<(), std::io::Error>(())
        };
        let waited = tokio::time::timeout(
            Duration::from_secs( 5 ),
            wait_for_signal( "test", listener ),
        ).await;
        assert!( waited.is_ok() );
    }
}
