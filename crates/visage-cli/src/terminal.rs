//! Full-screen terminal render sink.
//!
//! Each character cell shows two vertically stacked pixels using the
//! upper half block glyph: the foreground colour is the top pixel and
//! the background colour is the bottom one. Frames are scaled to fill the
//! whole terminal with nearest-neighbour sampling.

use std::io::{ self, Stdout };

use crossterm::{
    cursor::{ Hide, Show },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    prelude::CrosstermBackend,
    style::Color,
    widgets::Widget,
    Terminal,
};

use visage_core::{ Frame, RenderError, RenderSink };


const UPPER_HALF_BLOCK: &str = "\u{2580}";


/// Paints a frame (or black when there is none) over the whole area.
pub struct FrameWidget<'a> {
    frame: Option<&'a Frame>,
}


impl<'a> FrameWidget<'a> {
    pub fn new( frame: Option<&'a Frame> ) -> Self {
        Self { frame }
    }
}


impl Widget for FrameWidget<'_> {
    fn render( self, area: Rect, buf: &mut Buffer ) {
        let rows = u32::from( area.height ) * 2;
        let cols = u32::from( area.width );

        for y in 0..area.height {
            for x in 0..area.width {
                let ( top, bottom ) = match self.frame {
                    Some( frame ) => {
                        let sx = u32::from( x ) * frame.width() / cols;
                        let top_y = u32::from( y ) * 2 * frame.height() / rows;
                        let bottom_y = ( u32::from( y ) * 2 + 1 ) * frame.height() / rows;
                        ( to_color( frame.pixel( sx, top_y ) ), to_color( frame.pixel( sx, bottom_y ) ) )
                    }
                    None => ( Color::Black, Color::Black ),
                };

                if let Some( cell ) = buf.cell_mut(( area.x + x, area.y + y )) {
                    cell.set_symbol( UPPER_HALF_BLOCK ).set_fg( top ).set_bg( bottom );
                }
            }
        }
    }
}


/// Converts an RGBA pixel to a terminal colour, blending alpha onto black.
fn to_color( [ r, g, b, a ]: [u8; 4] ) -> Color {
    let blend = |c: u8| ( u16::from( c ) * u16::from( a ) / 255 ) as u8;
    Color::Rgb( blend( r ), blend( g ), blend( b ) )
}


/// Render sink that owns the terminal while the display runs.
///
/// The terminal is restored when the sink is dropped.
pub struct TerminalSink {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}


impl TerminalSink {
    /// Switches to the alternate screen in raw mode.
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        io::stdout().execute( EnterAlternateScreen )?;
        io::stdout().execute( Hide )?;

        let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;
        terminal.clear()?;
        Ok( Self { terminal } )
    }
}


impl RenderSink for TerminalSink {
    fn present( &mut self, frame: Option<&Frame> ) -> Result<(), RenderError> {
        self.terminal.draw( |f| {
            let area = f.area();
            f.render_widget( FrameWidget::new( frame ), area );
        })?;
        Ok(())
    }
}


impl Drop for TerminalSink {
    fn drop( &mut self ) {
        let _ = io::stdout().execute( Show );
        let _ = io::stdout().execute( LeaveAlternateScreen );
        let _ = disable_raw_mode();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn render( frame: Option<&Frame>, width: u16, height: u16 ) -> Buffer {
        let area = Rect::new( 0, 0, width, height );
        let mut buf = Buffer::empty( area );
        FrameWidget::new( frame ).render( area, &mut buf );
        buf
    }


    #[test]
    fn test_blank_frame_is_black() {
        let buf = render( None, 3, 2 );
        let cell = &buf[( 2, 1 )];
        assert_eq!( cell.fg, Color::Black );
        assert_eq!( cell.bg, Color::Black );
    }


    #[test]
    fn test_half_blocks_map_two_rows() {
        // Top row red, bottom row blue
        let pixels = [
            [ 255, 0, 0, 255 ], [ 255, 0, 0, 255 ],
            [ 0, 0, 255, 255 ], [ 0, 0, 255, 255 ],
        ].concat();
        let frame = Frame::from_rgba( 2, 2, pixels ).unwrap();

        let buf = render( Some( &frame ), 2, 1 );
        let cell = &buf[( 0, 0 )];
        assert_eq!( cell.symbol(), UPPER_HALF_BLOCK );
        assert_eq!( cell.fg, Color::Rgb( 255, 0, 0 ) );
        assert_eq!( cell.bg, Color::Rgb( 0, 0, 255 ) );
    }


    #[test]
    fn test_scales_to_fill_area() {
        let frame = Frame::solid( 1, 1, [ 10, 20, 30, 255 ] );
        let buf = render( Some( &frame ), 8, 4 );
        assert_eq!( buf[( 7, 3 )].bg, Color::Rgb( 10, 20, 30 ) );
    }


    #[test]
    fn test_alpha_blends_onto_black() {
        assert_eq!( to_color( [ 255, 255, 255, 0 ] ), Color::Rgb( 0, 0, 0 ) );
        assert_eq!( to_color( [ 200, 100, 50, 255 ] ), Color::Rgb( 200, 100, 50 ) );
    }
}
