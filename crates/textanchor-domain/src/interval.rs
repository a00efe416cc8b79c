//! Character interval module - the shared coordinate system

use std::fmt;

/// Half-open `[start_offset, end_offset)` range into a document's text
///
/// Offsets are UTF-8 byte offsets and always fall on `char` boundaries of the
/// text they were produced from, so slicing with them never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharInterval {
    /// Inclusive start offset
    pub start_offset: usize,
    /// Exclusive end offset
    pub end_offset: usize,
}

impl CharInterval {
    /// Create a new interval
    ///
    /// # Panics
    /// Panics if `start_offset > end_offset`
    ///
    /// # Examples
    ///
    /// ```
    /// use textanchor_domain::CharInterval;
    ///
    /// let interval = CharInterval::new(0, 5);
    /// assert_eq!(interval.len(), 5);
    /// ```
    pub fn new(start_offset: usize, end_offset: usize) -> Self {
        assert!(
            start_offset <= end_offset,
            "Interval start must be <= end"
        );

        Self {
            start_offset,
            end_offset,
        }
    }

    /// Length of the interval in bytes
    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Whether the interval covers nothing
    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }

    /// Translate the interval by `offset` (chunk-local to document-global)
    pub fn shift(&self, offset: usize) -> Self {
        Self {
            start_offset: self.start_offset + offset,
            end_offset: self.end_offset + offset,
        }
    }

    /// Borrow the covered text, if the interval is valid for `text`
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start_offset..self.end_offset)
    }
}

impl fmt::Display for CharInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_offset, self.end_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_creation() {
        let interval = CharInterval::new(3, 8);
        assert_eq!(interval.start_offset, 3);
        assert_eq!(interval.end_offset, 8);
        assert_eq!(interval.len(), 5);
        assert!(!interval.is_empty());
    }

    #[test]
    fn test_empty_interval() {
        let interval = CharInterval::new(4, 4);
        assert!(interval.is_empty());
        assert_eq!(interval.len(), 0);
    }

    #[test]
    #[should_panic]
    fn test_invalid_bounds() {
        CharInterval::new(9, 2);
    }

    #[test]
    fn test_shift_and_slice() {
        let text = "ROMEO. But soft!";
        let local = CharInterval::new(0, 3);
        let global = local.shift(7);
        assert_eq!(global, CharInterval::new(7, 10));
        assert_eq!(global.slice(text), Some("But"));
    }

    #[test]
    fn test_slice_rejects_non_boundary() {
        let text = "café";
        // 'é' is two bytes starting at offset 3
        assert_eq!(CharInterval::new(0, 4).slice(text), None);
        assert_eq!(CharInterval::new(0, 5).slice(text), Some("café"));
    }

    #[test]
    fn test_display() {
        assert_eq!(CharInterval::new(1, 2).to_string(), "[1, 2)");
    }
}
