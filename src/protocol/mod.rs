pub mod codec;
pub mod message;
pub mod status;

pub use codec::{decode, decode_frame, encode, Incoming, Reply, Request};
pub use status::{Notification, StatusCode};
