pub mod chan;
mod http;
pub mod reddit;

pub use chan::ChanClient;
pub use reddit::{RedditClient, RedditConfig};
