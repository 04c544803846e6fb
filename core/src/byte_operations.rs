// Helper macros for reading network-order (big-endian) values at a running offset.
// Callers check the length up front; the macros index directly.
#[macro_export]
macro_rules! read_u8 {
    ($bytes:expr, $offset:expr) => {{
        let val = $bytes[$offset];
        $offset += 1;
        val
    }};
}

#[macro_export]
macro_rules! read_u16 {
    ($bytes:expr, $offset:expr) => {{
        let val = u16::from_be_bytes([$bytes[$offset], $bytes[$offset + 1]]);
        $offset += 2;
        val
    }};
}

#[macro_export]
macro_rules! read_u32 {
    ($bytes:expr, $offset:expr) => {{
        let val = u32::from_be_bytes([
            $bytes[$offset],
            $bytes[$offset + 1],
            $bytes[$offset + 2],
            $bytes[$offset + 3],
        ]);
        $offset += 4;
        val
    }};
}

/// Bounds-checked single byte read.
#[inline]
pub fn get_u8(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset).copied()
}

/// Bounds-checked network-order `u16` read.
#[inline]
pub fn get_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes(
        bytes.get(offset..offset + 2)?.try_into().ok()?,
    ))
}

/// Bounds-checked network-order `u32` read.
#[inline]
pub fn get_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(
        bytes.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u8() {
        let bytes = [42u8, 100, 200];
        let mut offset = 0;

        assert_eq!(read_u8!(bytes, offset), 42);
        assert_eq!(offset, 1);
        assert_eq!(read_u8!(bytes, offset), 100);
        assert_eq!(offset, 2);
        assert_eq!(read_u8!(bytes, offset), 200);
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_read_u16() {
        // Network order: 0x0102
        let bytes = [0x01, 0x02, 0xFF, 0xFF];
        let mut offset = 0;

        assert_eq!(read_u16!(bytes, offset), 0x0102);
        assert_eq!(offset, 2);
        assert_eq!(read_u16!(bytes, offset), 0xFFFF);
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_read_u32() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut offset = 0;

        assert_eq!(read_u32!(bytes, offset), 0x01020304);
        assert_eq!(offset, 4);
        assert_eq!(read_u32!(bytes, offset), 0xFFFFFFFF);
        assert_eq!(offset, 8);
    }

    #[test]
    fn test_mixed_reads() {
        let bytes = [
            0x42, // u8: 66
            0x12, 0x34, // u16: 0x1234
            0x12, 0x34, 0x56, 0x78, // u32: 0x12345678
        ];
        let mut offset = 0;

        assert_eq!(read_u8!(bytes, offset), 66);
        assert_eq!(read_u16!(bytes, offset), 0x1234);
        assert_eq!(read_u32!(bytes, offset), 0x12345678);
        assert_eq!(offset, 7);
    }

    #[test]
    fn checked_reads_stop_at_buffer_end() {
        let bytes = [0xAB, 0xCD, 0xEF];
        assert_eq!(get_u8(&bytes, 2), Some(0xEF));
        assert_eq!(get_u8(&bytes, 3), None);
        assert_eq!(get_u16(&bytes, 1), Some(0xCDEF));
        assert_eq!(get_u16(&bytes, 2), None);
        assert_eq!(get_u32(&bytes, 0), None);
        assert_eq!(get_u32(&[0, 0, 1, 0], 0), Some(256));
    }
}
