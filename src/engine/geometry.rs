use crate::model::PageRectangle;

pub const DEFAULT_STAMP_WIDTH: f64 = 100.0;
pub const DEFAULT_STAMP_HEIGHT: f64 = 50.0;

/// Fraction of a candidate's area that must sit inside the stamp before it is dropped.
const STAMP_OVERLAP_LIMIT: f64 = 0.5;

impl PageRectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn intersection(&self, other: &PageRectangle) -> Option<PageRectangle> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(PageRectangle::from_corners(x0, y0, x1, y1))
    }
}

/// Reserved region in a page's top-right corner where control-number stamps land.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampRegion {
    pub width: f64,
    pub height: f64,
}

impl Default for StampRegion {
    fn default() -> Self {
        Self {
            width: DEFAULT_STAMP_WIDTH,
            height: DEFAULT_STAMP_HEIGHT,
        }
    }
}

impl StampRegion {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Anchors the region at the top-right corner of `page`.
    pub fn anchored(&self, page: &PageRectangle) -> PageRectangle {
        let width = self.width.min(page.width);
        let height = self.height.min(page.height);
        PageRectangle::new(page.right() - width, page.y, width, height)
    }
}

/// True when more than half of a positive-area `rect` lies inside `stamp`.
pub fn is_excluded(rect: &PageRectangle, stamp: &PageRectangle) -> bool {
    let area = rect.area();
    if area <= 0.0 {
        return false;
    }

    let overlap = rect
        .intersection(stamp)
        .map(|shared| shared.area())
        .unwrap_or(0.0);

    overlap / area > STAMP_OVERLAP_LIMIT
}
