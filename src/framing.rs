use heapless::Vec;
use static_assertions::const_assert;
use thiserror::Error;

/// End-of-packet token terminating every frame on the serial link.
pub const SENTINEL: &[u8] = b"GOAT";

// Largest frame the device has ever produced is ~200 bytes; leave generous room
// for line noise before the start marker.
pub const MAX_FRAME_SIZE: usize = 4096;

const_assert!(MAX_FRAME_SIZE > SENTINEL.len());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("frame buffer overflow: no sentinel within {capacity} bytes, discarded {discarded} bytes")]
    BufferOverflow { capacity: usize, discarded: usize },
}

/// One sentinel-terminated chunk of the serial stream, sentinel included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket(alloc::vec::Vec<u8>);

impl RawPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy text view; the device speaks ASCII but line noise does not.
    pub fn to_text(&self) -> alloc::borrow::Cow<'_, str> {
        alloc::string::String::from_utf8_lossy(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramingStats {
    pub packets_emitted: u64,
    pub overflows: u32,
    pub bytes_discarded: u64,
}

/// Accumulates serial bytes until the sentinel shows up.
///
/// The buffer is checked after every byte, so the first sentinel occurrence
/// always ends at the byte just pushed and nothing is left over once a packet
/// is cut. The capacity is fixed at compile time; a device that never sends
/// the sentinel costs at most `N` bytes before the pending data is dropped.
#[derive(Debug)]
pub struct FrameAssembler<const N: usize = MAX_FRAME_SIZE> {
    buffer: Vec<u8, N>,
    stats: FramingStats,
}

impl FrameAssembler<MAX_FRAME_SIZE> {
    pub fn new() -> Self {
        Self::bounded()
    }
}

impl Default for FrameAssembler<MAX_FRAME_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameAssembler<N> {
    pub fn bounded() -> Self {
        Self {
            buffer: Vec::new(),
            stats: FramingStats::default(),
        }
    }

    /// Feed a single byte. Returns the completed packet when this byte closes
    /// the sentinel.
    pub fn push(&mut self, byte: u8) -> Result<Option<RawPacket>, FramingError> {
        if self.buffer.push(byte).is_err() {
            let discarded = self.buffer.len() + 1;
            self.buffer.clear();
            self.stats.overflows = self.stats.overflows.saturating_add(1);
            self.stats.bytes_discarded += discarded as u64;
            return Err(FramingError::BufferOverflow {
                capacity: N,
                discarded,
            });
        }

        if !self.buffer.ends_with(SENTINEL) {
            return Ok(None);
        }

        let packet = RawPacket(self.buffer.to_vec());
        self.buffer.clear();
        self.stats.packets_emitted += 1;
        Ok(Some(packet))
    }

    /// Lazily frame a chunk of bytes. Packets (and overflow errors) are
    /// produced as the iterator is driven; bytes not yet consumed stay in the
    /// chunk, bytes of an unfinished packet stay in the assembler.
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> Feed<'a, N> {
        Feed {
            assembler: self,
            bytes: bytes.iter(),
        }
    }

    /// Bytes of the partial packet waiting for its sentinel.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn stats(&self) -> FramingStats {
        self.stats
    }
}

pub struct Feed<'a, const N: usize> {
    assembler: &'a mut FrameAssembler<N>,
    bytes: core::slice::Iter<'a, u8>,
}

impl<'a, const N: usize> Iterator for Feed<'a, N> {
    type Item = Result<RawPacket, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        for &byte in self.bytes.by_ref() {
            match self.assembler.push(byte) {
                Ok(Some(packet)) => return Some(Ok(packet)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_packets<const N: usize>(assembler: &mut FrameAssembler<N>, bytes: &[u8]) -> alloc::vec::Vec<RawPacket> {
        assembler
            .feed(bytes)
            .filter_map(Result::ok)
            .collect()
    }

    #[test]
    fn test_single_packet_emitted_and_buffer_cleared() {
        let mut assembler = FrameAssembler::new();
        let packets = collect_packets(&mut assembler, b"2078,00:01:02,1,F,LAUNCH_PAD,GOAT");

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].as_bytes(), b"2078,00:01:02,1,F,LAUNCH_PAD,GOAT");
        assert!(assembler.is_empty());
        assert_eq!(assembler.stats().packets_emitted, 1);
    }

    #[test]
    fn test_no_packet_until_sentinel_completes() {
        let mut assembler = FrameAssembler::new();

        for &byte in b"2078,A,GOA" {
            assert_eq!(assembler.push(byte), Ok(None));
        }
        assert_eq!(assembler.pending(), b"2078,A,GOA");

        let packet = assembler.push(b'T').unwrap().expect("sentinel completed");
        assert_eq!(packet.as_bytes(), b"2078,A,GOAT");
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_back_to_back_packets_split_on_first_sentinel() {
        let mut assembler = FrameAssembler::new();
        let packets = collect_packets(&mut assembler, b"2078,A,GOAT2078,B,GOAT2078,C");

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].to_text(), "2078,A,GOAT");
        assert_eq!(packets[1].to_text(), "2078,B,GOAT");
        assert_eq!(assembler.pending(), b"2078,C");
    }

    #[test]
    fn test_packet_spanning_chunks() {
        let mut assembler = FrameAssembler::new();

        assert!(collect_packets(&mut assembler, b"~}3AA2078,1,2").is_empty());
        let packets = collect_packets(&mut assembler, b",3,GO");
        assert!(packets.is_empty());
        let packets = collect_packets(&mut assembler, b"AT");

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].to_text(), "~}3AA2078,1,2,3,GOAT");
    }

    #[test]
    fn test_feed_is_lazy() {
        let mut assembler = FrameAssembler::new();
        let bytes = b"A,GOATB,GOATC,";

        let mut feed = assembler.feed(bytes);
        assert_eq!(feed.next().unwrap().unwrap().to_text(), "A,GOAT");
        drop(feed);

        // Only the first packet's bytes were consumed.
        assert!(assembler.is_empty());
        assert_eq!(assembler.stats().packets_emitted, 1);
    }

    #[test]
    fn test_overflow_discards_pending_bytes_and_recovers() {
        let mut assembler = FrameAssembler::<8>::bounded();

        let results: alloc::vec::Vec<_> = assembler.feed(b"xxxxxxxxx").collect();
        assert_eq!(
            results,
            vec![Err(FramingError::BufferOverflow { capacity: 8, discarded: 9 })]
        );
        assert!(assembler.is_empty());

        let packets = collect_packets(&mut assembler, b"1,GOAT");
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].to_text(), "1,GOAT");

        let stats = assembler.stats();
        assert_eq!(stats.overflows, 1);
        assert_eq!(stats.bytes_discarded, 9);
    }

    #[test]
    fn test_packet_filling_capacity_exactly() {
        let mut assembler = FrameAssembler::<6>::bounded();
        let packets = collect_packets(&mut assembler, b"12GOAT");

        assert_eq!(packets.len(), 1);
        assert_eq!(assembler.stats().overflows, 0);
    }

    #[test]
    fn test_non_utf8_bytes_survive_framing() {
        let mut assembler = FrameAssembler::new();
        let packets = collect_packets(&mut assembler, &[0xFF, b'2', b'0', b'7', b'8', b'G', b'O', b'A', b'T']);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 9);
        assert!(packets[0].to_text().ends_with("2078GOAT"));
    }
}
