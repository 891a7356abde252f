//! Expression library scanning and lookup
//!
//! An expression library is a directory whose immediate subdirectories
//! are expressions. Each expression directory holds the still frames of
//! one looping animation; frames play in lexical filename order, so
//! zero-padded names (`000.jpg`, `001.jpg`, ...) are recommended.

use std::collections::HashMap;
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::frame::{ DecodeError, Frame, FrameDecoder, ImageDecoder };


/// Supported image file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "bmp", "gif", "webp",
];


/// Errors that can occur while loading the expression library.
///
/// All of these are fatal at startup.
#[derive( Debug, Error )]
pub enum LoadError {
    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "Not a directory: {0}" )]
    NotADirectory( PathBuf ),

    #[error( "Unreadable directory {path}: {source}" )]
    UnreadableDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error( "No expressions found in {0}" )]
    NoExpressions( PathBuf ),

    #[error( "Expression '{0}' has no usable frames" )]
    EmptyExpression( String ),

    #[error( "Failed to decode {path}: {source}" )]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}


/// One named expression and its frames in playback order.
#[derive( Debug, Clone )]
pub struct FrameSequence {
    name: String,
    frames: Vec<Frame>,
}


impl FrameSequence {
    /// Creates a sequence, rejecting one without frames.
    pub fn new( name: impl Into<String>, frames: Vec<Frame> ) -> Result<Self, LoadError> {
        let name = name.into();
        if frames.is_empty() {
            return Err( LoadError::EmptyExpression( name ) );
        }
        Ok( Self { name, frames } )
    }


    /// Gets the expression name.
    pub fn name( &self ) -> &str {
        &self.name
    }


    /// Gets all frames in playback order.
    pub fn frames( &self ) -> &[Frame] {
        &self.frames
    }


    /// Gets a single frame.
    pub fn frame( &self, index: usize ) -> Option<&Frame> {
        self.frames.get( index )
    }


    /// Number of frames; never zero.
    pub fn len( &self ) -> usize {
        self.frames.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.frames.is_empty()
    }
}


/// Immutable name -> sequence mapping built once at startup.
#[derive( Debug, Clone )]
pub struct ExpressionLibrary {
    expressions: HashMap<String, FrameSequence>,
}


impl ExpressionLibrary {
    /// Scans `root` and decodes every frame with the `image` crate.
    pub fn load( root: &Path ) -> Result<Self, LoadError> {
        Self::load_with( root, &ImageDecoder )
    }


    /// Scans `root`, decoding frames with the given decoder.
    pub fn load_with( root: &Path, decoder: &dyn FrameDecoder ) -> Result<Self, LoadError> {
        let metadata = match std::fs::metadata( root ) {
            Ok( m ) => m,
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err( LoadError::NotFound( root.to_path_buf() ) );
            }
            Err( e ) => {
                return Err( LoadError::UnreadableDirectory { path: root.to_path_buf(), source: e } );
            }
        };
        if !metadata.is_dir() {
            return Err( LoadError::NotADirectory( root.to_path_buf() ) );
        }

        tracing::info!( "Scanning expressions: {:?}", root );

        let mut sequences = Vec::new();
        for ( name, dir ) in list_entries( root, |p| p.is_dir() )? {
            let files = list_entries( &dir, |p| p.is_file() && is_image_file( p ) )?;
            if files.is_empty() {
                return Err( LoadError::EmptyExpression( name ) );
            }

            let mut frames = Vec::with_capacity( files.len() );
            for ( _, path ) in files {
                let frame = decoder.decode( &path )
                    .map_err( |source| LoadError::Decode { path: path.clone(), source } )?;
                frames.push( frame );
            }

            tracing::debug!( "Expression '{}': {} frames", name, frames.len() );
            sequences.push( FrameSequence::new( name, frames )? );
        }

        if sequences.is_empty() {
            return Err( LoadError::NoExpressions( root.to_path_buf() ) );
        }

        let library = Self::from_sequences( sequences )?;
        tracing::info!( "Found {} expressions: {:?}", library.len(), library.names() );
        Ok( library )
    }


    /// Builds a library from already-decoded sequences.
    ///
    /// A later sequence with a duplicate name replaces the earlier one.
    pub fn from_sequences(
        sequences: impl IntoIterator<Item = FrameSequence>,
    ) -> Result<Self, LoadError> {
        let expressions: HashMap<String, FrameSequence> = sequences
            .into_iter()
            .map( |s| ( s.name.clone(), s ) )
            .collect();

        if expressions.is_empty() {
            return Err( LoadError::NoExpressions( PathBuf::new() ) );
        }
        Ok( Self { expressions } )
    }


    /// Looks up an expression by exact name.
    pub fn lookup( &self, name: &str ) -> Option<&FrameSequence> {
        self.expressions.get( name )
    }


    pub fn contains( &self, name: &str ) -> bool {
        self.expressions.contains_key( name )
    }


    /// Gets all expression names in lexical order.
    pub fn names( &self ) -> Vec<&str> {
        let mut names: Vec<&str> = self.expressions.keys().map( String::as_str ).collect();
        names.sort_unstable();
        names
    }


    /// Gets the lexically first expression name.
    pub fn first_name( &self ) -> Option<&str> {
        self.expressions.keys().map( String::as_str ).min()
    }


    /// Number of expressions; never zero.
    pub fn len( &self ) -> usize {
        self.expressions.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.expressions.is_empty()
    }
}


/// Lists visible entries of `dir` accepted by `keep`, sorted by name.
///
/// Entries whose names are not valid UTF-8 are skipped.
fn list_entries(
    dir: &Path,
    keep: impl Fn( &Path ) -> bool,
) -> Result<Vec<( String, PathBuf )>, LoadError> {
    let unreadable = |source| LoadError::UnreadableDirectory { path: dir.to_path_buf(), source };
    let entries = std::fs::read_dir( dir ).map_err( unreadable )?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err( unreadable )?;
        let path = entry.path();

        let Some( name ) = entry.file_name().to_str().map( str::to_owned ) else {
            tracing::warn!( "Skipping non UTF-8 entry: {:?}", path );
            continue;
        };
        if name.starts_with( '.' ) || !keep( &path ) {
            continue;
        }
        found.push(( name, path ));
    }

    found.sort_by( |a, b| a.0.cmp( &b.0 ) );
    Ok( found )
}


/// Checks if a file has a supported image extension.
fn is_image_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use std::fs;

    use super::*;


    /// Tags each frame with its file stem: `007.png` decodes to width 8.
    struct StemDecoder;


    impl FrameDecoder for StemDecoder {
        fn decode( &self, path: &Path ) -> Result<Frame, DecodeError> {
            let stem: u32 = path.file_stem()
                .and_then( |s| s.to_str() )
                .and_then( |s| s.parse().ok() )
                .ok_or( DecodeError::Empty )?;
            Ok( Frame::solid( stem + 1, 1, [ 0, 0, 0, 255 ] ) )
        }
    }


    fn touch( dir: &Path, names: &[&str] ) {
        fs::create_dir_all( dir ).unwrap();
        for name in names {
            fs::write( dir.join( name ), b"" ).unwrap();
        }
    }


    fn widths( sequence: &FrameSequence ) -> Vec<u32> {
        sequence.frames().iter().map( Frame::width ).collect()
    }


    #[test]
    fn test_load_indexes_every_expression() {
        let root = tempfile::tempdir().unwrap();
        touch( &root.path().join( "happy" ), &[ "000.jpg", "001.jpg" ] );
        touch( &root.path().join( "sad" ), &[ "000.png" ] );
        touch( &root.path().join( "blank" ), &[ "000.JPG" ] );

        let library = ExpressionLibrary::load_with( root.path(), &StemDecoder ).unwrap();
        assert_eq!( library.names(), vec![ "blank", "happy", "sad" ] );
        assert_eq!( library.lookup( "happy" ).unwrap().len(), 2 );
        assert_eq!( library.lookup( "sad" ).unwrap().len(), 1 );
        assert!( library.lookup( "angry" ).is_none() );
        assert_eq!( library.first_name(), Some( "blank" ) );
    }


    #[test]
    fn test_frames_follow_lexical_order() {
        let root = tempfile::tempdir().unwrap();
        touch( &root.path().join( "happy" ), &[ "010.png", "002.png", "000.png", "001.png" ] );

        let library = ExpressionLibrary::load_with( root.path(), &StemDecoder ).unwrap();
        assert_eq!( widths( library.lookup( "happy" ).unwrap() ), vec![ 1, 2, 3, 11 ] );
    }


    #[test]
    fn test_non_image_files_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        touch( &root.path().join( "happy" ), &[ "000.png", "notes.txt", ".001.png", "002" ] );
        touch( root.path(), &[ "README.md" ] );

        let library = ExpressionLibrary::load_with( root.path(), &StemDecoder ).unwrap();
        assert_eq!( library.len(), 1 );
        assert_eq!( widths( library.lookup( "happy" ).unwrap() ), vec![ 1 ] );
    }


    #[test]
    fn test_empty_expression_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        touch( &root.path().join( "happy" ), &[ "000.png" ] );
        touch( &root.path().join( "sad" ), &[ "readme.txt" ] );

        let result = ExpressionLibrary::load_with( root.path(), &StemDecoder );
        assert!( matches!( result, Err( LoadError::EmptyExpression( ref name ) ) if name == "sad" ) );
    }


    #[test]
    fn test_root_without_expressions_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        touch( root.path(), &[ "000.png" ] );

        let result = ExpressionLibrary::load_with( root.path(), &StemDecoder );
        assert!( matches!( result, Err( LoadError::NoExpressions( _ ) ) ) );
    }


    #[test]
    fn test_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join( "nope" );

        let result = ExpressionLibrary::load_with( &missing, &StemDecoder );
        assert!( matches!( result, Err( LoadError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_root_must_be_directory() {
        let root = tempfile::tempdir().unwrap();
        touch( root.path(), &[ "file.png" ] );

        let result = ExpressionLibrary::load_with( &root.path().join( "file.png" ), &StemDecoder );
        assert!( matches!( result, Err( LoadError::NotADirectory( _ ) ) ) );
    }


    #[cfg( unix )]
    #[test]
    fn test_root_below_a_file_is_unreadable() {
        let root = tempfile::tempdir().unwrap();
        touch( root.path(), &[ "file.png" ] );
        let path = root.path().join( "file.png" ).join( "sub" );

        let result = ExpressionLibrary::load_with( &path, &StemDecoder );
        match result {
            Err( LoadError::UnreadableDirectory { path: reported, .. } ) => assert_eq!( reported, path ),
            other => panic!( "expected UnreadableDirectory, got {:?}", other.map( |l| l.len() ) ),
        }
    }


    #[test]
    fn test_decode_failure_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        touch( &root.path().join( "happy" ), &[ "000.png", "oops.png" ] );

        let result = ExpressionLibrary::load_with( root.path(), &StemDecoder );
        assert!( matches!( result, Err( LoadError::Decode { .. } ) ) );
    }


    #[test]
    fn test_load_decodes_real_images() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join( "blink" );
        fs::create_dir_all( &dir ).unwrap();
        image::RgbaImage::from_pixel( 4, 4, image::Rgba( [ 255, 0, 0, 255 ] ) )
            .save( dir.join( "000.png" ) )
            .unwrap();
        image::RgbImage::from_pixel( 4, 4, image::Rgb( [ 0, 0, 255 ] ) )
            .save( dir.join( "001.jpg" ) )
            .unwrap();

        let library = ExpressionLibrary::load( root.path() ).unwrap();
        let blink = library.lookup( "blink" ).unwrap();
        assert_eq!( blink.len(), 2 );
        assert_eq!( blink.frame( 0 ).unwrap().pixel( 0, 0 ), [ 255, 0, 0, 255 ] );
    }


    #[test]
    fn test_sequence_requires_frames() {
        assert!( matches!(
            FrameSequence::new( "blank", Vec::new() ),
            Err( LoadError::EmptyExpression( _ ) )
        ));
    }
}
