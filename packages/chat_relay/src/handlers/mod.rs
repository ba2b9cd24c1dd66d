mod health;
mod websocket;

pub use health::{
    health_handler, health_live_handler, health_ready_handler, metrics_handler, root_handler,
};
pub use websocket::websocket_handler;
