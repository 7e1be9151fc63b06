use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::source::{ImageBuffer, PAYLOAD_LEN};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadFrameError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("short read: got {received} bytes")]
    Short { received: usize },
}

/// Reads and writes whole images. The wire format has no framing: one frame
/// is exactly [`PAYLOAD_LEN`] raw bytes.
pub struct FrameCodec<T> {
    inner: T,
}

impl<T> FrameCodec<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> FrameCodec<T>
where
    T: Read,
{
    /// Reads one frame, giving up once `timeout` has elapsed, the inner
    /// reader times out, or the stream ends.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<ImageBuffer, ReadFrameError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; PAYLOAD_LEN];
        let mut received = 0;

        while received < PAYLOAD_LEN {
            match self.inner.read(&mut buf[received..]) {
                Ok(0) => break,
                Ok(n) => {
                    log::trace!("read {} bytes ({}/{})", n, received + n, PAYLOAD_LEN);
                    received += n;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break
                }
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        if received < PAYLOAD_LEN {
            return Err(ReadFrameError::Short { received });
        }
        Ok(ImageBuffer::new(buf))
    }
}

impl<T> FrameCodec<T>
where
    T: Write,
{
    pub fn write_frame(&mut self, frame: &ImageBuffer) -> Result<(), std::io::Error> {
        log::trace!("writing {} bytes", PAYLOAD_LEN);
        self.inner.write_all(frame.as_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), std::io::Error> {
        self.inner.flush()
    }
}
