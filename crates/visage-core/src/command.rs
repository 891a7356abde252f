//! Expression command messages.
//!
//! A command is a bare expression name. On the wire each message is one
//! line of the form `<topic> <payload>`, e.g. `/robot_face happy`.

use thiserror::Error;


/// Longest accepted expression name, in bytes.
pub const MAX_NAME_LENGTH: usize = 256;


/// Errors that can occur while parsing or applying a command.
///
/// None of these are fatal: the rejected command is logged and dropped.
#[derive( Debug, Clone, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown expression: {0}" )]
    Unknown( String ),

    #[error( "Empty command" )]
    Empty,

    #[error( "Malformed message: {0}" )]
    Malformed( String ),

    #[error( "Expression name is {0} bytes, limit is {MAX_NAME_LENGTH}" )]
    TooLong( usize ),
}


/// One message carried by the line transport.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Message {
    pub topic: String,
    pub payload: String,
}


impl Message {
    /// Creates a message for `topic`.
    pub fn new( topic: impl Into<String>, payload: impl Into<String> ) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }


    /// Parses a single wire line (without the trailing newline).
    ///
    /// @param line - The line to parse, `<topic> <payload>`
    ///
    /// @returns The parsed message or an error
    pub fn parse( line: &str ) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err( CommandError::Empty );
        }

        let ( topic, payload ) = line
            .split_once( char::is_whitespace )
            .ok_or_else( || CommandError::Malformed( format!( "missing payload in '{}'", line ) ) )?;
        let payload = validate_name( payload )?;

        Ok( Self::new( topic, payload ) )
    }


    /// Encodes the message as a wire line, including the newline.
    pub fn encode( &self ) -> String {
        format!( "{} {}\n", self.topic, self.payload.trim() )
    }
}


/// Trims a raw payload and checks it can be an expression name.
pub fn validate_name( raw: &str ) -> Result<&str, CommandError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err( CommandError::Empty );
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err( CommandError::TooLong( name.len() ) );
    }
    Ok( name )
}


/// Normalizes a raw payload into an expression name.
///
/// Surrounding whitespace is removed; a blank or over-long payload
/// yields `None`.
pub fn normalize( raw: &str ) -> Option<&str> {
    validate_name( raw ).ok()
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_message() {
        let msg = Message::parse( "/robot_face happy" ).unwrap();
        assert_eq!( msg, Message::new( "/robot_face", "happy" ) );
    }


    #[test]
    fn test_parse_trims_payload() {
        let msg = Message::parse( "  /robot_face   sad  \r" ).unwrap();
        assert_eq!( msg.payload, "sad" );
    }


    #[test]
    fn test_parse_keeps_inner_spaces() {
        let msg = Message::parse( "/robot_face very happy" ).unwrap();
        assert_eq!( msg.payload, "very happy" );
    }


    #[test]
    fn test_parse_missing_payload() {
        let result = Message::parse( "/robot_face" );
        assert!( matches!( result, Err( CommandError::Malformed( _ ) ) ) );
    }


    #[test]
    fn test_parse_empty() {
        assert_eq!( Message::parse( "   " ), Err( CommandError::Empty ) );
    }


    #[test]
    fn test_encode_matches_parse() {
        let msg = Message::new( "/robot_face", " blank " );
        assert_eq!( msg.encode(), "/robot_face blank\n" );
        assert_eq!( Message::parse( &msg.encode() ).unwrap().payload, "blank" );
    }


    #[test]
    fn test_parse_rejects_long_payload() {
        let line = format!( "/robot_face {}", "a".repeat( MAX_NAME_LENGTH + 1 ) );
        assert_eq!( Message::parse( &line ), Err( CommandError::TooLong( MAX_NAME_LENGTH + 1 ) ) );

        let line = format!( "/robot_face {}", "a".repeat( MAX_NAME_LENGTH ) );
        assert!( Message::parse( &line ).is_ok() );
    }


    #[test]
    fn test_normalize() {
        assert_eq!( normalize( " happy\n" ), Some( "happy" ) );
        assert_eq!( normalize( "\t " ), None );
        assert_eq!( normalize( &"x".repeat( MAX_NAME_LENGTH + 1 ) ), None );
    }
}
