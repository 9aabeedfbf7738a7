/// OneBot protocol adapter modules
pub mod client;
pub mod normalize;
pub mod pending;
pub mod protocol;
pub mod reader;
pub mod transport;

pub use client::OneBotClient;
pub use pending::{PendingRequest, PendingTable};
pub use reader::ReaderState;
pub use transport::{memory_pair, FrameSink, FrameSource, MemoryPeer};
