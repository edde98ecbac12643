// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The palette used to color escaped points.  Each entry is the
//! color of a wavelength of visible light, walked from violet (380nm)
//! to deep red (780nm), with the job's tint supplying whatever a
//! wavelength band leaves unset.

use image::Rgb;
use std::ops::Index;

/// Number of entries in every colormap.
pub const COLORMAP_SIZE: usize = 512;

const WAVE_MIN: f64 = 380.0;
const WAVE_SPAN: f64 = 400.0;
const GAMMA: f64 = 0.8;

/// Split a packed `0xRRGGBB` value into a pixel.  Anything above the
/// low 24 bits is ignored.
pub fn unpack_rgb(packed: u32) -> Rgb<u8> {
    Rgb([
        ((packed >> 16) & 0xff) as u8,
        ((packed >> 8) & 0xff) as u8,
        (packed & 0xff) as u8,
    ])
}

/// Map a wavelength in nanometers to a color.  Inside each band one
/// channel is fixed at full intensity and another ramps; the remaining
/// channel keeps its value from `tint`.
pub fn rgb_from_wavelength(wave: f64, tint: Rgb<u8>) -> Rgb<u8> {
    let mut r = f64::from(tint[0]) / 255.0;
    let mut g = f64::from(tint[1]) / 255.0;
    let mut b = f64::from(tint[2]) / 255.0;

    if wave >= 380.0 && wave <= 440.0 {
        r = -(wave - 440.0) / (440.0 - 380.0);
        b = 1.0;
    } else if wave >= 440.0 && wave <= 490.0 {
        g = (wave - 440.0) / (490.0 - 440.0);
        b = 1.0;
    } else if wave >= 490.0 && wave <= 510.0 {
        g = 1.0;
        b = -(wave - 510.0) / (510.0 - 490.0);
    } else if wave >= 510.0 && wave <= 580.0 {
        r = (wave - 510.0) / (580.0 - 510.0);
        g = 1.0;
    } else if wave >= 580.0 && wave <= 645.0 {
        r = 1.0;
        g = -(wave - 645.0) / (645.0 - 580.0);
    } else if wave >= 645.0 && wave <= 780.0 {
        r = 1.0;
    }

    // The eye is less sensitive at both ends of the spectrum.
    let intensity = if wave > 700.0 {
        0.3 + 0.7 * (780.0 - wave) / (780.0 - 700.0)
    } else if wave < 420.0 {
        0.3 + 0.7 * (wave - 380.0) / (420.0 - 380.0)
    } else {
        1.0
    };

    let channel = |v: f64| {
        let v = (v * intensity).max(0.0).powf(GAMMA).min(1.0);
        (v * 255.0) as u8
    };
    Rgb([channel(r), channel(g), channel(b)])
}

/// A fixed-size palette derived from a tint.  Built once per job and
/// shared read-only by every pass of that job.
#[derive(Clone, Debug, PartialEq)]
pub struct Colormap {
    entries: Vec<Rgb<u8>>,
}

impl Colormap {
    /// Build the palette for a packed `0xRRGGBB` tint.
    pub fn new(tint: u32) -> Colormap {
        let tint = unpack_rgb(tint);
        let entries = (0..COLORMAP_SIZE)
            .map(|i| {
                let wave = WAVE_MIN + (i as f64) * WAVE_SPAN / (COLORMAP_SIZE as f64);
                rgb_from_wavelength(wave, tint)
            })
            .collect();
        Colormap { entries }
    }

    /// The color for a point that escaped after `iterations` steps.
    #[inline]
    pub fn color(&self, iterations: u32) -> Rgb<u8> {
        self.entries[iterations as usize % COLORMAP_SIZE]
    }

    /// Always `COLORMAP_SIZE`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true; present for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Index<usize> for Colormap {
    type Output = Rgb<u8>;

    fn index(&self, index: usize) -> &Rgb<u8> {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_rgb_channels() {
        assert_eq!(unpack_rgb(0x12_34_56), Rgb([0x12, 0x34, 0x56]));
        assert_eq!(unpack_rgb(0xff_00_00_ff), Rgb([0, 0, 0xff]));
    }

    #[test]
    fn band_channels_ignore_the_tint() {
        // At 440nm red has ramped to zero and blue is full.
        for tint in &[Rgb([0, 0, 0]), Rgb([255, 255, 255])] {
            let c = rgb_from_wavelength(440.0, *tint);
            assert_eq!(c[0], 0);
            assert_eq!(c[2], 255);
            assert_eq!(c[1], tint[1]);
        }
    }

    #[test]
    fn untouched_channel_comes_from_the_tint() {
        // The violet band sets red and blue, leaving green to the tint.
        let dark = rgb_from_wavelength(430.0, Rgb([0, 0, 0]));
        let bright = rgb_from_wavelength(430.0, Rgb([0, 255, 0]));
        assert_eq!(dark[1], 0);
        assert_eq!(bright[1], 255);
        assert_eq!(dark[0], bright[0]);
        assert_eq!(dark[2], bright[2]);
    }

    #[test]
    fn spectrum_ends_are_dimmed() {
        let edge = rgb_from_wavelength(380.0, Rgb([0, 0, 0]));
        let middle = rgb_from_wavelength(440.0, Rgb([0, 0, 0]));
        assert!(edge[2] < middle[2]);
    }

    #[test]
    fn colormap_is_deterministic_and_wraps() {
        let a = Colormap::new(0x33_66_99);
        let b = Colormap::new(0x33_66_99);
        assert_eq!(a, b);
        assert_eq!(a.len(), COLORMAP_SIZE);
        assert_eq!(a.color(3), a.color(3 + COLORMAP_SIZE as u32));
        assert_eq!(a.color(0), a[0]);
    }

    #[test]
    fn different_tints_give_different_maps() {
        assert_ne!(Colormap::new(0x00_00_00), Colormap::new(0xff_ff_ff));
    }
}
