//! Coordinate transformation between normalized placement space and PDF page space
//!
//! Clients describe placements as percentages of the page dimensions with
//! the origin at the top-left (y grows downward). PDF user space has its
//! origin at the bottom-left (y grows upward). The mapping stretches the
//! normalized rectangle onto the physical page; values outside 0-100 are
//! accepted and simply land off-page.

use serde::{Deserialize, Serialize};

/// A rectangle in normalized placement space: each field is a percentage
/// (0-100) of the page dimensions, origin at the page top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A rectangle in page space: points, origin at the page bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    /// Map onto a page of the given physical dimensions (points).
    ///
    /// The vertical axis flips: the input y measures down from the page
    /// top, the output y measures up from the page bottom to the lower
    /// edge of the rectangle.
    pub fn to_page_rect(&self, page_width: f64, page_height: f64) -> PageRect {
        let width = self.width * page_width / 100.0;
        let height = self.height * page_height / 100.0;
        let x = self.x * page_width / 100.0;
        let y = page_height - (self.y * page_height / 100.0) - height;
        PageRect {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER_W: f64 = 612.0;
    const LETTER_H: f64 = 792.0;

    #[test]
    fn test_top_left_corner() {
        let rect = NormalizedRect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        let mapped = rect.to_page_rect(LETTER_W, LETTER_H);
        assert!((mapped.x - 0.0).abs() < 0.001);
        // Top of the page minus the rectangle height
        assert!((mapped.y - (LETTER_H - 79.2)).abs() < 0.001);
    }

    #[test]
    fn test_bottom_right_corner() {
        let rect = NormalizedRect {
            x: 90.0,
            y: 90.0,
            width: 10.0,
            height: 10.0,
        };
        let mapped = rect.to_page_rect(LETTER_W, LETTER_H);
        assert!((mapped.x - 550.8).abs() < 0.001);
        assert!((mapped.y - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_full_page_rect_covers_page() {
        let rect = NormalizedRect {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        let mapped = rect.to_page_rect(LETTER_W, LETTER_H);
        assert_eq!(mapped.x, 0.0);
        assert_eq!(mapped.y, 0.0);
        assert_eq!(mapped.width, LETTER_W);
        assert_eq!(mapped.height, LETTER_H);
    }

    #[test]
    fn test_off_page_values_not_clamped() {
        let rect = NormalizedRect {
            x: 120.0,
            y: -10.0,
            width: 50.0,
            height: 50.0,
        };
        let mapped = rect.to_page_rect(100.0, 100.0);
        assert_eq!(mapped.x, 120.0);
        // y = 100 - (-10) - 50 = 60
        assert_eq!(mapped.y, 60.0);
    }

    #[test]
    fn test_y_axis_flip() {
        // A rectangle 25% down the page with 25% height sits with its
        // lower edge at half the page height.
        let rect = NormalizedRect {
            x: 0.0,
            y: 25.0,
            width: 10.0,
            height: 25.0,
        };
        let mapped = rect.to_page_rect(200.0, 400.0);
        assert_eq!(mapped.y, 200.0);
        assert_eq!(mapped.height, 100.0);
    }
}
