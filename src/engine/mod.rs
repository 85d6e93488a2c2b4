// Sloganforge Engine — streaming chat pipeline
// Bytes from the generation endpoint flow decoder → conversation → renderer,
// all driven by one cancellable request cycle.

pub mod config;
pub mod conversation;
pub mod prompt;
pub mod render;
pub mod request;
pub mod signing;
pub mod stream;
pub mod transport;
