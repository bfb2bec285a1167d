/// Byte-oriented duplex channel the transport layer speaks DAP framing
/// over. Concrete factories (a spawned adapter's stdio, a TCP socket with
/// a stderr connect-condition scanner) are out of scope per spec.md §6.2
/// — the core only consumes a channel that is already connected.
pub trait Channel: Send {
    /// Read up to `buf.len()` bytes, returning the number read. `0` means
    /// EOF — the transport treats this as peer disconnection.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write the full contents of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// In-memory channel pairing two byte pipes, used by tests to simulate an
/// adapter without spawning a real process or socket.
pub mod memory {
    use super::Channel;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Pipe(Arc<Mutex<VecDeque<u8>>>);

    impl Pipe {
        fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut q = self.0.lock().unwrap();
            let n = buf.len().min(q.len());
            for slot in buf.iter_mut().take(n) {
                *slot = q.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write(&self, bytes: &[u8]) -> io::Result<()> {
            self.0.lock().unwrap().extend(bytes.iter().copied());
            Ok(())
        }
    }

    /// One end of an in-process, two-pipe loopback channel pair. Reads
    /// drain `inbound`; writes append to `outbound`. `new_pair` returns
    /// both ends so a test can drive "the adapter's" side directly.
    ///
    /// `read` on an empty pipe returns `Ok(0)`, which `FrameReader`
    /// treats as EOF — tests must queue all bytes for one frame before
    /// reading it rather than trickling bytes in over time.
    pub struct MemoryChannel {
        inbound: Pipe,
        outbound: Pipe,
    }

    impl MemoryChannel {
        pub fn new_pair() -> (MemoryChannel, MemoryChannel) {
            let a = Pipe::default();
            let b = Pipe::default();
            (
                MemoryChannel {
                    inbound: a.clone(),
                    outbound: b.clone(),
                },
                MemoryChannel {
                    inbound: b,
                    outbound: a,
                },
            )
        }
    }

    impl Channel for MemoryChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inbound.read(buf)
        }

        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.outbound.write(bytes)
        }
    }
}
