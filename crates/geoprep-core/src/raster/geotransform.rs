//! Affine pixel/world transform.

/// Affine coefficients mapping pixel space to world coordinates:
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(col, row)` are pixel-corner coordinates, so `(0, 0)` is the upper-left
/// corner of the upper-left pixel. North-up rasters have no rotation and a
/// negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X of the upper-left corner
    pub origin_x: f64,
    /// Y of the upper-left corner
    pub origin_y: f64,
    /// Pixel width in world units
    pub pixel_width: f64,
    /// Pixel height in world units, usually negative
    pub pixel_height: f64,
    /// Row rotation term
    pub row_rotation: f64,
    /// Column rotation term
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform.
    #[must_use]
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// From GDAL ordering `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    #[must_use]
    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    /// GDAL ordering of the coefficients.
    #[must_use]
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// World coordinates of a fractional pixel position.
    #[must_use]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// World coordinates of the centre of pixel `(col, row)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position of a world coordinate.
    ///
    /// Returns `None` for a degenerate transform.
    #[must_use]
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let diagonal = self.pixel_width * self.pixel_height;
        let skew = self.row_rotation * self.col_rotation;
        let det = diagonal - skew;
        if !det.is_finite() || det.abs() <= f64::EPSILON * (diagonal.abs() + skew.abs()) {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        Some((
            (self.pixel_height * dx - self.row_rotation * dy) / det,
            (-self.col_rotation * dx + self.pixel_width * dy) / det,
        ))
    }

    /// Whether the raster is north-up without rotation.
    #[must_use]
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0 && self.pixel_height < 0.0
    }

    /// Absolute pixel size `(x, y)`.
    #[must_use]
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.pixel_width.hypot(self.col_rotation),
            self.pixel_height.hypot(self.row_rotation),
        )
    }

    /// `(min_x, min_y, max_x, max_y)` of a `width` x `height` raster.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
