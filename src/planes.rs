//! Contains the PlaneMapper struct, which describes a relationship
//! between a rectangle on the integral plane with an origin at 0,0,
//! and a window onto the complex plane given by its center and the
//! distance between neighbouring pixels.
use num::Complex;

/// Describes the width and height of an integral plane that is assumed to start at
/// 0,0 and all values are assumed to be non-negative integers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntegralPlane(pub u32, pub u32);

/// Describes the column, row of a pixel in the integral plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub u32, pub u32);

/// Maps pixels of an image onto points of the complex plane.  The
/// center of the image lands on `center`; each step of one pixel
/// moves `scale` along the real or imaginary axis.  Row zero holds
/// the smallest imaginary values.
#[derive(Debug, Clone)]
pub struct PlaneMapper {
    /// The size of the integral plane.
    pub integral_plane: IntegralPlane,
    /// The point under the center pixel.
    pub center: Complex<f64>,
    /// Complex-plane distance between adjacent pixels.
    pub scale: f64,
    // Integer half-extents; the center pixel is (half.0, half.1).
    half: (i64, i64),
}

impl PlaneMapper {
    /// Constructor.  Takes the integral plane's size, the point it is
    /// centered on, and the per-pixel scale.
    pub fn new(width: u32, height: u32, center: Complex<f64>, scale: f64) -> PlaneMapper {
        PlaneMapper {
            integral_plane: IntegralPlane(width, height),
            center,
            scale,
            half: (i64::from(width / 2), i64::from(height / 2)),
        }
    }

    /// The total number of points in the integral grid.
    pub fn len(&self) -> usize {
        self.integral_plane.0 as usize * self.integral_plane.1 as usize
    }

    /// Describes that the integral plane is of a size.
    pub fn is_empty(&self) -> bool {
        self.integral_plane.0 == 0 || self.integral_plane.1 == 0
    }

    /// The imaginary coordinate shared by every pixel of a row.
    #[inline]
    pub fn row_to_im(&self, row: u32) -> f64 {
        self.center.im + ((i64::from(row) - self.half.1) as f64) * self.scale
    }

    /// The real coordinate shared by every pixel of a column.
    #[inline]
    pub fn column_to_re(&self, column: u32) -> f64 {
        self.center.re + ((i64::from(column) - self.half.0) as f64) * self.scale
    }

    /// Given a pixel on the integral cartesian plane, map that to a
    /// point on the complex cartesian plane.
    pub fn pixel_to_point(&self, pixel: &Pixel) -> Complex<f64> {
        Complex::new(self.column_to_re(pixel.0), self.row_to_im(pixel.1))
    }
}
