//! Application settings management
//!
//! Settings come from built-in defaults, then an optional JSON file,
//! then command-line flags. They are fixed once the display starts.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use anyhow::{ bail, Result };
use serde::{ Deserialize, Serialize };

use crate::cli::Args;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Directory containing one subfolder per expression
    pub expressions_dir: PathBuf,

    /// Animation speed in frames per second
    pub fps: f64,

    /// Topic carrying expression names
    pub topic: String,

    /// Address of the command listener
    pub listen: String,

    /// Expression shown before the first command, if any
    pub default_expression: Option<String>,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            expressions_dir: PathBuf::from( "expressions" ),
            fps: 12.5,
            topic: "/robot_face".to_string(),
            listen: "127.0.0.1:7447".to_string(),
            default_expression: None,
        }
    }
}


impl Settings {
    /// Returns the path to the per-user settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "visage" ).join( "settings.json" ) )
    }


    /// Loads settings from `path` (or the per-user file), or returns
    /// defaults if not found.
    pub fn load( path: Option<&Path> ) -> Self {
        let path = match path.map( Path::to_path_buf ).or_else( Self::settings_path ) {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::from_json( &contents ).unwrap_or_else( |e| {
                tracing::warn!( "Invalid settings in {:?}: {}", path, e );
                Self::default()
            }),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Parses settings from JSON; missing fields take their defaults.
    pub fn from_json( contents: &str ) -> Result<Self, serde_json::Error> {
        serde_json::from_str( contents )
    }


    /// Overrides settings with any flags given on the command line.
    pub fn apply_args( &mut self, args: &Args ) {
        if let Some( path ) = &args.path {
            self.expressions_dir = path.clone();
        }
        if let Some( fps ) = args.fps {
            self.fps = fps;
        }
        if let Some( topic ) = &args.topic {
            self.topic = topic.clone();
        }
        if let Some( listen ) = &args.listen {
            self.listen = listen.clone();
        }
        if let Some( name ) = &args.default_expression {
            self.default_expression = Some( name.clone() );
        }
    }


    /// Checks every setting and returns the frame interval.
    pub fn validate( &self ) -> Result<Duration> {
        self.check_topic()?;
        self.frame_interval()
    }


    /// Fails unless the topic is a single non-empty word.
    pub fn check_topic( &self ) -> Result<()> {
        if self.topic.is_empty() || self.topic.contains( char::is_whitespace ) {
            bail!( "Invalid topic '{}': must be non-empty without spaces", self.topic );
        }
        Ok(())
    }


    /// Converts the configured frame rate into a tick interval.
    pub fn frame_interval( &self ) -> Result<Duration> {
        match visage_core::frame_interval( self.fps ) {
            Some( interval ) => Ok( interval ),
            None => bail!( "Invalid frame rate {}: must be a positive number", self.fps ),
        }
    }
}


#[cfg( test )]
mod tests {
    use clap::Parser;

    use super::*;


    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json( r#"{ "fps": 24.0, "topic": "/face" }"# ).unwrap();
        assert_eq!( settings.fps, 24.0 );
        assert_eq!( settings.topic, "/face" );
        assert_eq!( settings.listen, Settings::default().listen );
    }


    #[test]
    fn test_args_override_file() {
        let mut settings = Settings::from_json( r#"{ "fps": 24.0 }"# ).unwrap();
        let args = Args::parse_from([ "visage", "--fps", "5", "--path", "/srv/faces" ]);
        settings.apply_args( &args );

        assert_eq!( settings.fps, 5.0 );
        assert_eq!( settings.expressions_dir, PathBuf::from( "/srv/faces" ) );
        assert_eq!( settings.topic, "/robot_face" );
    }


    #[test]
    fn test_default_interval_is_80ms() {
        let interval = Settings::default().validate().unwrap();
        assert_eq!( interval, Duration::from_millis( 80 ) );
    }


    #[test]
    fn test_rejects_bad_fps() {
        let settings = Settings { fps: 0.0, ..Settings::default() };
        assert!( settings.frame_interval().is_err() );
        assert!( settings.check_topic().is_ok() );
        assert!( settings.validate().is_err() );
    }


    #[test]
    fn test_rejects_bad_topic() {
        let settings = Settings { topic: "robot face".into(), ..Settings::default() };
        assert!( settings.check_topic().is_err() );
        assert!( settings.validate().is_err() );

        // The interval does not depend on the topic
        assert_eq!( settings.frame_interval().unwrap(), Duration::from_millis( 80 ) );

        let settings = Settings { topic: String::new(), ..Settings::default() };
        assert!( settings.check_topic().is_err() );
    }


    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load( Some( dir.path().join( "missing.json" ).as_path() ) );
        assert_eq!( settings, Settings::default() );
    }


    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "default_expression": "blank" }"# ).unwrap();

        let settings = Settings::load( Some( path.as_path() ) );
        assert_eq!( settings.default_expression.as_deref(), Some( "blank" ) );
    }
}
