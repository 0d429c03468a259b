mod inbound;
mod outbound;
mod pool;

pub use inbound::InboundBuffer;
pub use outbound::OutboundBuffer;
pub use pool::ArrayPool;
