//! Command-line argument parsing for Visage.

use std::path::PathBuf;

use clap::{ Parser, Subcommand, ValueEnum };
use tracing_subscriber::filter::LevelFilter;


/// Visage - A full-screen robot face expression player.
#[derive( Parser, Debug )]
#[command( name = "visage" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Directory containing one subfolder per expression.
    #[arg( short, long )]
    pub path: Option<PathBuf>,

    /// Animation speed in frames per second.
    #[arg( short, long )]
    pub fps: Option<f64>,

    /// Topic carrying expression names.
    #[arg( short, long, global = true )]
    pub topic: Option<String>,

    /// Address the command listener binds to (or `send` connects to).
    #[arg( short, long, global = true )]
    pub listen: Option<String>,

    /// Expression to show before the first command arrives.
    #[arg( short, long )]
    pub default_expression: Option<String>,

    /// Settings file to use instead of the per-user one.
    #[arg( long )]
    pub settings: Option<PathBuf>,

    /// Print the available expressions and exit.
    #[arg( long )]
    pub list: bool,

    /// Log verbosity.
    #[arg( long, value_enum, default_value_t = LogLevel::Info, global = true )]
    pub log_level: LogLevel,

    /// Log file (defaults to the user cache directory).
    #[arg( long, global = true )]
    pub log_file: Option<PathBuf>,

    #[command( subcommand )]
    pub command: Option<Commands>,
}


#[derive( Subcommand, Debug )]
pub enum Commands {
    /// Publish an expression command to a running display.
    Send {
        /// Expression name.
        name: String,

        /// How many times to publish it.
        #[arg( short = 'n', long, default_value_t = 1 )]
        repeat: u32,
    },
}


/// Log verbosity levels.
#[derive( Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum )]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}


impl From<LogLevel> for LevelFilter {
    fn from( level: LogLevel ) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_run_flags() {
        let args = Args::parse_from([ "visage", "-p", "faces", "-f", "24", "-d", "blank" ]);
        assert_eq!( args.path, Some( PathBuf::from( "faces" ) ) );
        assert_eq!( args.fps, Some( 24.0 ) );
        assert_eq!( args.default_expression.as_deref(), Some( "blank" ) );
        assert!( args.command.is_none() );
    }


    #[test]
    fn test_parse_send() {
        let args = Args::parse_from([ "visage", "send", "happy", "-n", "5", "--topic", "/face" ]);
        assert_eq!( args.topic.as_deref(), Some( "/face" ) );
        match args.command {
            Some( Commands::Send { name, repeat } ) => {
                assert_eq!( name, "happy" );
                assert_eq!( repeat, 5 );
            }
            other => panic!( "unexpected command: {:?}", other ),
        }
    }


    #[test]
    fn test_log_level() {
        let args = Args::parse_from([ "visage", "--log-level", "debug" ]);
        assert_eq!( LevelFilter::from( args.log_level ), LevelFilter::DEBUG );
    }
}
