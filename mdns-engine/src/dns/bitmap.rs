use crate::error::WireError;

/// Block 0 of an NSEC "types present" bitmap.
///
/// Bit `n` (most significant bit of byte 0 first) is set when record type `n`
/// exists. The value is immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bitmap {
    data: Vec<u8>,
}

impl Bitmap {
    pub const MAX_LENGTH: usize = 32;

    pub fn new(data: &[u8]) -> Result<Self, WireError> {
        if data.len() > Self::MAX_LENGTH {
            return Err(WireError::BitmapTooLong(data.len()));
        }
        Ok(Self { data: data.to_vec() })
    }

    /// Build a bitmap with a bit set for each type. Types >= 256 live outside
    /// block 0 and are ignored.
    pub fn from_types(types: &[u16]) -> Self {
        let mut data = Vec::new();
        for &rtype in types.iter().filter(|&&t| t < 256) {
            let index = (rtype / 8) as usize;
            if data.len() <= index {
                data.resize(index + 1, 0);
            }
            data[index] |= 0x80 >> (rtype % 8);
        }
        Self { data }
    }

    pub fn contains(&self, rtype: u16) -> bool {
        let index = (rtype / 8) as usize;
        rtype < 256 && index < self.data.len() && self.data[index] & (0x80 >> (rtype % 8)) != 0
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
