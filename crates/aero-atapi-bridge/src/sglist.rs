//! Back-end scatter buffer.
//!
//! The back end hands its response over as an ordered list of byte segments. The bridge only
//! ever needs the total size and contiguous copies in and out of it.

/// Ordered byte segments with a cached total size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScatterList {
    segments: Vec<Vec<u8>>,
    size: usize,
}

impl ScatterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<Vec<u8>>) -> Self {
        let size = segments.iter().map(Vec::len).sum();
        Self { segments, size }
    }

    pub fn push(&mut self, segment: Vec<u8>) {
        self.size += segment.len();
        self.segments.push(segment);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Copy bytes starting at `offset` into `dst`. Returns the number of bytes copied.
    pub fn copy_to_buf(&self, offset: usize, dst: &mut [u8]) -> usize {
        let mut skip = offset;
        let mut copied = 0;
        for seg in &self.segments {
            if copied == dst.len() {
                break;
            }
            if skip >= seg.len() {
                skip -= seg.len();
                continue;
            }
            let src = &seg[skip..];
            skip = 0;
            let n = src.len().min(dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&src[..n]);
            copied += n;
        }
        copied
    }

    /// Copy `src` into the list starting at `offset`. Returns the number of bytes copied.
    pub fn copy_from_buf(&mut self, offset: usize, src: &[u8]) -> usize {
        let mut skip = offset;
        let mut copied = 0;
        for seg in &mut self.segments {
            if copied == src.len() {
                break;
            }
            if skip >= seg.len() {
                skip -= seg.len();
                continue;
            }
            let dst = &mut seg[skip..];
            skip = 0;
            let n = dst.len().min(src.len() - copied);
            dst[..n].copy_from_slice(&src[copied..copied + n]);
            copied += n;
        }
        copied
    }

    /// Resize the list to exactly `len` bytes, dropping trailing bytes or zero-filling a new
    /// tail segment.
    pub fn resize(&mut self, len: usize) {
        if len >= self.size {
            if len > self.size {
                self.push(vec![0; len - self.size]);
            }
            return;
        }

        let mut keep = len;
        let mut kept_segments = 0;
        for seg in &mut self.segments {
            if keep == 0 {
                break;
            }
            if seg.len() > keep {
                seg.truncate(keep);
            }
            keep -= seg.len();
            kept_segments += 1;
        }
        self.segments.truncate(kept_segments);
        self.size = len;
    }
}

impl From<Vec<u8>> for ScatterList {
    fn from(buf: Vec<u8>) -> Self {
        Self::from_segments(vec![buf])
    }
}
