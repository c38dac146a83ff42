pub mod callback;
pub mod download;
pub mod imaging;
pub mod inference;
pub mod limiter;
pub mod parser;
pub mod pipeline;
pub mod queue;
pub mod router;
pub mod worker;
