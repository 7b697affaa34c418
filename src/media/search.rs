//! Delimiter search over accumulated stream bytes

/// Find the first occurrence of `target` in `data` at or after `start`
///
/// Scans for the first delimiter byte, then compares the whole sequence at each
/// candidate. Delimiters are 2-3 bytes long, which keeps this cheap.
///
/// Returns `None` if `start >= data.len()`, if `target` is empty, or if the
/// delimiter does not occur at or after `start`.
pub fn find(data: &[u8], target: &[u8], start: usize) -> Option<usize> {
    let (&first, _) = target.split_first()?;
    if start >= data.len() {
        return None;
    }

    let mut idx = start;
    while let Some(offset) = data[idx..].iter().position(|&b| b == first) {
        let candidate = idx + offset;
        if candidate + target.len() > data.len() {
            return None;
        }
        if &data[candidate..candidate + target.len()] == target {
            return Some(candidate);
        }
        idx = candidate + 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straightforward reference used to cross-check `find`
    fn find_reference(data: &[u8], target: &[u8], start: usize) -> Option<usize> {
        if target.is_empty() || start >= data.len() {
            return None;
        }
        data[start..]
            .windows(target.len())
            .position(|w| w == target)
            .map(|p| p + start)
    }

    #[test]
    fn test_not_found() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(find(&data, &[0x09, 0x0A], 0), None);
    }

    #[test]
    fn test_found() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(find(&data, &[0x05, 0x06], 0), Some(4));
    }

    #[test]
    fn test_start_at_or_past_end() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(find(&data, &[0x05, 0x06], data.len()), None);
        assert_eq!(find(&data, &[0x05, 0x06], data.len() + 1), None);
        assert_eq!(find(&[], &[0x05], 0), None);
    }

    #[test]
    fn test_respects_start() {
        let data = [0xFF, 0xD9, 0x00, 0xFF, 0xD9];
        assert_eq!(find(&data, &[0xFF, 0xD9], 0), Some(0));
        assert_eq!(find(&data, &[0xFF, 0xD9], 1), Some(3));
        assert_eq!(find(&data, &[0xFF, 0xD9], 4), None);
    }

    #[test]
    fn test_partial_match_at_tail() {
        // First byte matches at the very end, but the sequence is cut off
        let data = [0x00, 0x00, 0xFF, 0xD8];
        assert_eq!(find(&data, &[0xFF, 0xD8, 0xFF], 0), None);
    }

    #[test]
    fn test_repeated_first_byte() {
        let data = [0xFF, 0xFF, 0xFF, 0xD8, 0xFF];
        assert_eq!(find(&data, &[0xFF, 0xD8, 0xFF], 0), Some(2));
    }

    #[test]
    fn test_empty_target() {
        assert_eq!(find(&[1, 2, 3], &[], 0), None);
    }

    #[test]
    fn test_matches_reference_over_many_inputs() {
        // Small alphabet so delimiters occur often and overlap
        let data: Vec<u8> = (0..300u32).map(|i| ((i * 7 + i / 5) % 4) as u8).collect();
        let targets: [&[u8]; 5] = [&[0], &[1, 2], &[3, 3], &[0, 1, 2], &[2, 0, 3]];

        for target in targets {
            for start in 0..=data.len() + 1 {
                assert_eq!(
                    find(&data, target, start),
                    find_reference(&data, target, start),
                    "target {:?} start {}",
                    target,
                    start
                );
            }
        }
    }
}
