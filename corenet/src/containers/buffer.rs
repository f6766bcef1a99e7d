use super::chunk::Chunk;
use super::chunk_pool::ChunkPool;
use std::collections::VecDeque;
use std::io;

/// Dynamically sized, double-ended, buffered FIFO byte queue. Data is appended
/// at the head and read from the tail. Used for per-connection rx/tx queues.
pub struct Buffer {
    chunks: VecDeque<Chunk>,
    pool: ChunkPool,
}

impl Buffer {
    #[inline]
    pub fn new() -> Buffer {
        let mut chunks = VecDeque::new();
        chunks.push_back(Chunk::new());
        Buffer {
            chunks,
            pool: ChunkPool::new(),
        }
    }

    /// True if the buffer holds no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.chunks.len() == 1 && self.chunks[0].remaining_data() == 0
    }

    /// Total bytes currently queued.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Chunk::remaining_data).sum()
    }

    /// Write the data from the buffer to the supplied writer. Returns `Ok` with
    /// the number of bytes written once all data is flushed or the next write
    /// would block.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut total_count = 0usize;

        loop {
            match self.write_front(&mut writer) {
                Ok(write_count) => {
                    total_count += write_count;

                    if self.chunks.len() > 1 {
                        self.pool.reclaim(self.chunks.pop_front().unwrap());
                    } else {
                        return Ok(total_count);
                    }
                }
                Err(e) => {
                    if e.kind() == io::ErrorKind::WouldBlock {
                        return Ok(total_count);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Read data from the reader into the buffer until it would block or EOF.
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut total_count = 0usize;

        loop {
            match self.read_back(&mut reader) {
                Ok(read_count) => {
                    total_count += read_count;
                    self.chunks.push_back(self.pool.alloc());

                    if read_count == 0 {
                        return Ok(total_count);
                    }
                }
                Err(e) => {
                    if e.kind() == io::ErrorKind::WouldBlock {
                        return Ok(total_count);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Append raw bytes, growing the chunk chain as needed. Never blocks.
    pub fn push(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let chunk = self.chunks.back_mut().unwrap();
            let capacity = chunk.capacity();

            if capacity == 0 {
                self.chunks.push_back(self.pool.alloc());
                continue;
            }

            let take = capacity.min(data.len());
            chunk.write(&data[..take]);
            data = &data[take..];
        }
    }

    #[inline]
    fn write_front<W: io::Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        let mut total_count = 0usize;
        let chunk = self.chunks.front_mut().unwrap();

        loop {
            let write_count = writer.write(chunk.readable_slice())?;
            total_count += write_count;

            if write_count == 0 && chunk.remaining_data() > 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            chunk.advance(write_count);

            if chunk.remaining_data() == 0 {
                return Ok(total_count);
            }
        }
    }

    #[inline]
    fn read_back<R: io::Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let mut total_count = 0usize;
        let chunk = self.chunks.back_mut().unwrap();

        loop {
            let read_count = reader.read(chunk.writeable_slice())?;
            total_count += read_count;

            // Ok(0) is EOF, not "no data yet" (that case is WouldBlock) - stop here.
            if read_count == 0 {
                return Ok(total_count);
            }

            chunk.expand(read_count);

            if chunk.capacity() == 0 {
                return Ok(total_count);
            }
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

impl io::Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.egress(buf)
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ingress(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::chunk::CHUNK_SIZE;
    use std::cmp::min;
    use std::io::Cursor;

    struct MockChannel {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        max_size: usize,
    }

    impl MockChannel {
        fn new(data: Vec<u8>, chunk: usize, max_size: usize) -> MockChannel {
            MockChannel {
                data,
                cursor: 0,
                chunk,
                max_size,
            }
        }

        fn clear(&mut self) {
            self.data.clear();
            self.cursor = 0;
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(self.chunk, buf.len());
            buf[0..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    impl io::Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() == self.max_size {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(self.chunk, buf.len());
            self.data.extend(&buf[0..count]);
            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_roundtrip() {
        let mock_data: Vec<_> = (0..(CHUNK_SIZE * 3)).map(|item| item as u8).collect();
        let mut channel = MockChannel::new(mock_data.clone(), 500, mock_data.len());

        let mut buffer = Buffer::new();
        buffer.ingress(&mut channel).unwrap();
        channel.clear();

        assert_eq!(buffer.len(), mock_data.len());

        buffer.egress(&mut channel).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(channel.data[..], mock_data[..]);
    }

    #[test]
    fn test_no_err() {
        let mut cursor = Cursor::new(vec![1, 2, 3]);

        let mut buffer = Buffer::new();
        buffer.ingress(&mut cursor).unwrap();

        assert_eq!(buffer.len(), 3);

        let mut cursor = Cursor::new(Vec::<u8>::new());
        buffer.egress(&mut cursor).unwrap();

        assert!(buffer.is_empty());
        assert_eq!(&cursor.get_ref()[..], &vec![1, 2, 3][..]);
    }

    #[test]
    fn test_push_across_chunk_boundary() {
        let mut buffer = Buffer::new();
        let data = vec![7u8; CHUNK_SIZE + 10];

        buffer.push(&data);

        assert_eq!(buffer.len(), data.len());
    }
}
