use eio::FromBytes;
use std::io::Result;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> Result<T> {
        use eio::ReadExt;
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    /// Decode the first `N` bytes of `slice`, or `None` when it is too short.
    pub fn decode_slice<const N: usize, T: FromBytes<N>>(&self, slice: &[u8]) -> Option<T> {
        let arr: [u8; N] = slice.get(..N)?.try_into().ok()?;
        self.decode(arr).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_orders() {
        let bytes = [0x01, 0x02];
        let le: u16 = Endian::Little.decode(bytes).unwrap();
        let be: u16 = Endian::Big.decode(bytes).unwrap();
        assert_eq!(le, 0x0201);
        assert_eq!(be, 0x0102);
    }

    #[test]
    fn decode_slice_rejects_short_input() {
        assert_eq!(Endian::Little.decode_slice::<4, u32>(&[1, 2]), None);
        assert_eq!(
            Endian::Little.decode_slice::<4, u32>(&[1, 0, 0, 0, 9]),
            Some(1)
        );
    }
}
