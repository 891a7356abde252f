//! Visage Core - Expression playback engine
//!
//! This crate provides the core functionality for showing looping facial
//! expressions, including library scanning, command delivery, playback
//! state and the render loop.

pub mod channel;
pub mod command;
pub mod driver;
pub mod frame;
pub mod library;
pub mod player;
pub mod transport;

pub use channel::{ command_slot, CommandReceiver, CommandSender };
pub use command::{ CommandError, Message };
pub use driver::{ frame_interval, Driver, RenderError, RenderSink };
pub use frame::{ DecodeError, Frame, FrameDecoder, ImageDecoder };
pub use library::{ ExpressionLibrary, FrameSequence, LoadError };
pub use player::{ PlaybackState, Player, Transition };
pub use transport::{ Publisher, Subscription, TcpSubscriber, TransportError };
