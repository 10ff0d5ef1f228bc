pub mod handler;
pub mod subscriber;

pub use handler::serve;
pub use subscriber::WsSubscriber;
