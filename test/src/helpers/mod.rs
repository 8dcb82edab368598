pub mod recording_handler;
pub mod shared_buffer;
pub mod test_pair;

pub use recording_handler::{HandlerCall, HandlerLog, RecordingHandler};
pub use shared_buffer::SharedBuffer;
pub use test_pair::{PairOptions, TestPair, TICK_MS};
