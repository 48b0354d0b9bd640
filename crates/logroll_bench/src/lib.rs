//! Benchmark helpers for logroll.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Creates a log line of exactly `size` bytes, newline-terminated.
#[must_use]
pub fn log_line(size: usize) -> Vec<u8> {
    let mut line: Vec<u8> = (0..size).map(|i| b'a' + (i % 26) as u8).collect();
    if let Some(last) = line.last_mut() {
        *last = b'\n';
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_has_requested_size() {
        let line = log_line(64);
        assert_eq!(line.len(), 64);
        assert_eq!(line[63], b'\n');
        assert!(log_line(0).is_empty());
    }
}
