//! Still-image frames and frame decoding
//!
//! Frames are decoded once while the expression library is built and
//! are shared read-only with the render sink afterwards.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;


/// Errors that can occur while decoding a frame.
#[derive( Debug, Error )]
pub enum DecodeError {
    #[error( "Failed to open image: {0}" )]
    Open( #[from] std::io::Error ),

    #[error( "Unsupported image: {0}" )]
    Unsupported( String ),

    #[error( "Image has no pixels" )]
    Empty,

    #[error( "Pixel buffer is {actual} bytes, expected {expected}" )]
    Size { expected: usize, actual: usize },
}


/// A decoded RGBA8 bitmap.
///
/// Cloning is cheap: the pixel data is reference counted.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}


impl Frame {
    /// Creates a frame from tightly packed RGBA8 pixels, row-major.
    pub fn from_rgba( width: u32, height: u32, pixels: Vec<u8> ) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err( DecodeError::Empty );
        }

        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err( DecodeError::Size { expected, actual: pixels.len() } );
        }

        Ok( Self { width, height, pixels: Arc::from( pixels ) } )
    }


    /// Creates a frame filled with a single colour.
    pub fn solid( width: u32, height: u32, rgba: [u8; 4] ) -> Self {
        let count = width.max( 1 ) as usize * height.max( 1 ) as usize;
        let pixels: Vec<u8> = rgba.iter().copied().cycle().take( count * 4 ).collect();
        Self {
            width: width.max( 1 ),
            height: height.max( 1 ),
            pixels: Arc::from( pixels ),
        }
    }


    /// Gets the width in pixels.
    pub fn width( &self ) -> u32 {
        self.width
    }


    /// Gets the height in pixels.
    pub fn height( &self ) -> u32 {
        self.height
    }


    /// Gets the raw RGBA8 pixel data.
    pub fn pixels( &self ) -> &[u8] {
        &self.pixels
    }


    /// Gets the pixel at (x, y), clamped to the frame bounds.
    pub fn pixel( &self, x: u32, y: u32 ) -> [u8; 4] {
        let x = x.min( self.width - 1 ) as usize;
        let y = y.min( self.height - 1 ) as usize;
        let offset = ( y * self.width as usize + x ) * 4;
        [
            self.pixels[ offset ],
            self.pixels[ offset + 1 ],
            self.pixels[ offset + 2 ],
            self.pixels[ offset + 3 ],
        ]
    }
}


/// Turns an image file into a displayable frame.
pub trait FrameDecoder {
    fn decode( &self, path: &Path ) -> Result<Frame, DecodeError>;
}


/// Decoder backed by the `image` crate.
#[derive( Debug, Clone, Copy, Default )]
pub struct ImageDecoder;


impl FrameDecoder for ImageDecoder {
    fn decode( &self, path: &Path ) -> Result<Frame, DecodeError> {
        let image = image::open( path ).map_err( |e| match e {
            image::ImageError::IoError( io ) => DecodeError::Open( io ),
            other => DecodeError::Unsupported( other.to_string() ),
        })?;

        let rgba = image.into_rgba8();
        let ( width, height ) = rgba.dimensions();
        Frame::from_rgba( width, height, rgba.into_raw() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_from_rgba_checks_length() {
        let result = Frame::from_rgba( 2, 2, vec![ 0; 15 ] );
        assert!( matches!( result, Err( DecodeError::Size { expected: 16, actual: 15 } ) ) );
    }


    #[test]
    fn test_from_rgba_rejects_empty() {
        assert!( matches!( Frame::from_rgba( 0, 4, Vec::new() ), Err( DecodeError::Empty ) ) );
    }


    #[test]
    fn test_pixel_lookup() {
        let pixels = vec![
            1, 2, 3, 255,   4, 5, 6, 255,
            7, 8, 9, 255,   10, 11, 12, 128,
        ];
        let frame = Frame::from_rgba( 2, 2, pixels ).unwrap();
        assert_eq!( frame.pixel( 1, 0 ), [ 4, 5, 6, 255 ] );
        assert_eq!( frame.pixel( 1, 1 ), [ 10, 11, 12, 128 ] );
        // Out of range coordinates clamp to the edge
        assert_eq!( frame.pixel( 9, 9 ), [ 10, 11, 12, 128 ] );
    }


    #[test]
    fn test_image_decoder_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "000.png" );
        let mut img = image::RgbaImage::new( 3, 2 );
        img.put_pixel( 2, 1, image::Rgba( [ 200, 100, 50, 255 ] ) );
        img.save( &path ).unwrap();

        let frame = ImageDecoder.decode( &path ).unwrap();
        assert_eq!( ( frame.width(), frame.height() ), ( 3, 2 ) );
        assert_eq!( frame.pixel( 2, 1 ), [ 200, 100, 50, 255 ] );
    }


    #[test]
    fn test_image_decoder_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "broken.png" );
        std::fs::write( &path, b"not an image" ).unwrap();

        assert!( matches!( ImageDecoder.decode( &path ), Err( DecodeError::Unsupported( _ ) ) ) );
    }
}
