//! `multipart/x-mixed-replace` framing
//!
//! Browsers render a sequence of JPEG parts in this content type as live
//! video. Each part replaces the previous one.

use bytes::{BufMut, Bytes, BytesMut};

/// Part boundary
pub const BOUNDARY: &str = "frame";

/// Content type of the whole response
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frame one JPEG as a multipart part
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );

    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_layout() {
        let part = encode_part(&[0xFF, 0xD8, 0xFF, 0xD9]);

        let expected_header = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n";
        assert!(part.starts_with(expected_header));
        assert_eq!(&part[expected_header.len()..], &[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']);
    }

    #[test]
    fn test_content_type_names_boundary() {
        assert!(MULTIPART_CONTENT_TYPE.ends_with(&format!("boundary={}", BOUNDARY)));
    }
}
