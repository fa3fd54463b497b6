use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads exactly-sized PCM frames from a byte source
pub struct FrameReader<R> {
    reader: R,
    frame_size: usize,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, frame_size: usize) -> Self {
        Self {
            reader,
            frame_size,
            buffer: vec![0u8; frame_size],
        }
    }

    /// Read a single frame
    ///
    /// Returns `Ok(None)` on a clean end of input and `UnexpectedEof` when the
    /// input stops partway through a frame.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut filled = 0;

        while filled < self.frame_size {
            let n = self.reader.read(&mut self.buffer[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("input ended after {} of {} frame bytes", filled, self.frame_size),
                ));
            }
            filled += n;
        }

        // Hand out a copy so the internal buffer can be reused
        Ok(Some(self.buffer.clone()))
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_whole_frames_then_none() {
        let data: Vec<u8> = (0..12u8).collect();
        let mut reader = FrameReader::new(&data[..], 4);

        assert_eq!(reader.read_frame().await.unwrap(), Some(vec![0, 1, 2, 3]));
        assert_eq!(reader.read_frame().await.unwrap(), Some(vec![4, 5, 6, 7]));
        assert_eq!(reader.read_frame().await.unwrap(), Some(vec![8, 9, 10, 11]));
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trailing_partial_frame_is_an_error() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = FrameReader::new(&data[..], 4);

        assert!(reader.read_frame().await.unwrap().is_some());
        let err = reader.read_frame().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
