// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Escape-time rendering of the Mandelbrot set.
//!
//! Every pixel is mapped to a point `c` on the complex plane, and `z`
//! is repeatedly squared and offset by `c`.  Points whose orbit leaves
//! the circle of radius two within the iteration budget are colored by
//! how many steps that took; points still inside when the budget runs
//! out are taken to be members of the set and painted black.

use image::{Rgb, RgbImage};
use num::Complex;

use crate::cancellation::Cancellation;
use crate::colormap::Colormap;
use crate::planes::{Pixel, PlaneMapper};

/// `|z|²` past which an orbit is known to diverge.
pub const ESCAPE_RADIUS_SQR: f64 = 4.0;

const INTERIOR: Rgb<u8> = Rgb([0, 0, 0]);

/// The iteration budget of a refinement pass: 96 for the first pass,
/// roughly four times as many for each pass after it.
pub fn iteration_budget(pass: u32) -> u32 {
    (1 << (2 * pass + 6)) + 32
}

/// Iterate `z ← z² + c` starting from `z = c`.  Returns the step at
/// which the orbit escaped, or `None` if it had not escaped before the
/// step count reached `limit`.
#[inline]
pub fn escape_time(c: Complex<f64>, limit: u32) -> Option<u32> {
    let mut z = c;
    for n in 1..limit {
        z = z * z + c;
        if z.norm_sqr() > ESCAPE_RADIUS_SQR {
            return Some(n);
        }
    }
    None
}

/// How a pass ended.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PassOutcome {
    /// Every row was rendered.  `escaped` counts the pixels that were
    /// not interior.
    Complete {
        /// Number of pixels colored from the colormap.
        escaped: usize,
    },
    /// The pass was abandoned part way; the image is incomplete.
    Cancelled,
}

/// Renders one pass of the set over a plane at a fixed iteration
/// budget.
pub struct EscapeTimeRenderer<'a> {
    plane: &'a PlaneMapper,
    limit: u32,
}

impl<'a> EscapeTimeRenderer<'a> {
    /// Requires the plane to render and the per-point iteration
    /// budget.
    pub fn new(plane: &'a PlaneMapper, limit: u32) -> Self {
        EscapeTimeRenderer { plane, limit }
    }

    /// Color a single pixel.
    pub fn pixel(&self, pixel: &Pixel, colormap: &Colormap) -> Option<Rgb<u8>> {
        escape_time(self.plane.pixel_to_point(pixel), self.limit).map(|n| colormap.color(n))
    }

    /// Render every pixel of the plane into `image`, which must have
    /// the plane's dimensions.  `cancel` is consulted before each row;
    /// a row that has started is always finished.
    pub fn render<C: Cancellation>(
        &self,
        colormap: &Colormap,
        image: &mut RgbImage,
        cancel: &C,
    ) -> PassOutcome {
        let (width, height) = (self.plane.integral_plane.0, self.plane.integral_plane.1);
        debug_assert_eq!(image.dimensions(), (width, height));

        let mut escaped = 0;
        for row in 0..height {
            if cancel.is_cancelled() {
                return PassOutcome::Cancelled;
            }
            let im = self.plane.row_to_im(row);
            for column in 0..width {
                let c = Complex::new(self.plane.column_to_re(column), im);
                let color = match escape_time(c, self.limit) {
                    Some(n) => {
                        escaped += 1;
                        colormap.color(n)
                    }
                    None => INTERIOR,
                };
                image.put_pixel(column, row, color);
            }
        }
        PassOutcome::Complete { escaped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::{CancelToken, NeverCancel};
    use std::cell::Cell;

    #[test]
    fn budgets_grow_by_four() {
        let budgets: Vec<u32> = (0..5).map(iteration_budget).collect();
        assert_eq!(budgets, vec![96, 288, 1056, 4128, 16416]);
    }

    #[test]
    fn origin_never_escapes() {
        assert_eq!(escape_time(Complex::new(0.0, 0.0), 10_000), None);
        assert_eq!(escape_time(Complex::new(-1.0, 0.0), 10_000), None);
    }

    #[test]
    fn distant_points_escape_immediately() {
        assert_eq!(escape_time(Complex::new(2.0, 2.0), 96), Some(1));
    }

    #[test]
    fn escape_counts_steps_after_the_seed() {
        // c = 1: z goes 1 -> 2 -> 5, escaping on the second step.
        assert_eq!(escape_time(Complex::new(1.0, 0.0), 96), Some(2));
        // A budget that stops before the escaping step calls it interior.
        assert_eq!(escape_time(Complex::new(1.0, 0.0), 2), None);
    }

    #[test]
    fn renders_interior_black_and_exterior_from_colormap() {
        let plane = PlaneMapper::new(16, 16, Complex::new(-0.5, 0.0), 0.25);
        let colormap = Colormap::new(0x40_80_c0);
        let mut image = RgbImage::new(16, 16);
        let renderer = EscapeTimeRenderer::new(&plane, 96);

        let outcome = renderer.render(&colormap, &mut image, &NeverCancel);
        let escaped = match outcome {
            PassOutcome::Complete { escaped } => escaped,
            PassOutcome::Cancelled => panic!("pass should not be cancelled"),
        };
        assert!(escaped > 0 && escaped < plane.len());

        // The center pixel sits on -0.5, inside the main cardioid.
        assert_eq!(*image.get_pixel(8, 8), INTERIOR);
        // The corner sits on (-2.5, -2.0), far outside.
        assert_eq!(
            Some(*image.get_pixel(0, 0)),
            renderer.pixel(&Pixel(0, 0), &colormap)
        );
    }

    #[test]
    fn deep_interior_has_nothing_escaping() {
        let plane = PlaneMapper::new(8, 8, Complex::new(-0.1, 0.0), 1e-6);
        let mut image = RgbImage::new(8, 8);
        let outcome = EscapeTimeRenderer::new(&plane, 96).render(
            &Colormap::new(0),
            &mut image,
            &NeverCancel,
        );
        assert_eq!(outcome, PassOutcome::Complete { escaped: 0 });
    }

    #[test]
    fn cancelled_token_stops_before_the_first_row() {
        let plane = PlaneMapper::new(8, 8, Complex::new(-0.5, 0.0), 0.5);
        let mut image = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let token = CancelToken::new();
        token.cancel();
        let outcome = EscapeTimeRenderer::new(&plane, 96).render(
            &Colormap::new(0),
            &mut image,
            &token,
        );
        assert_eq!(outcome, PassOutcome::Cancelled);
        assert!(image.pixels().all(|p| *p == Rgb([1, 2, 3])));
    }

    struct AfterRows(Cell<u32>);

    impl Cancellation for AfterRows {
        fn is_cancelled(&self) -> bool {
            let left = self.0.get();
            if left == 0 {
                return true;
            }
            self.0.set(left - 1);
            false
        }
    }

    #[test]
    fn cancellation_is_checked_per_row() {
        let plane = PlaneMapper::new(4, 4, Complex::new(3.0, 3.0), 0.1);
        let mut image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let outcome = EscapeTimeRenderer::new(&plane, 96).render(
            &Colormap::new(0),
            &mut image,
            &AfterRows(Cell::new(2)),
        );
        assert_eq!(outcome, PassOutcome::Cancelled);
        // Two whole rows were written, the rest untouched.
        assert!((0..4).all(|x| *image.get_pixel(x, 1) != Rgb([1, 2, 3])));
        assert!((0..4).all(|x| *image.get_pixel(x, 2) == Rgb([1, 2, 3])));
    }
}
