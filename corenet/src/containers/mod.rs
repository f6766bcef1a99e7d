pub mod buffer;
pub mod chunk;
pub mod chunk_pool;
pub mod header_map;

pub use buffer::Buffer;
pub use chunk::Chunk;
pub use chunk_pool::ChunkPool;
pub use header_map::HeaderMap;
