use rayon::prelude::*;
use thiserror::Error;

use super::{Frame, Rect};
use crate::models::{Color, LedCoordinate, LedMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("LED region {region} is empty once scaled and clipped to the frame")]
    DegenerateRegion { region: Rect },
}

/// Colors computed from one frame, in strip order
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedFrame {
    pub colors: Vec<Color>,
    /// Number of LEDs whose region was degenerate and kept their previous color
    pub degenerate: usize,
}

/// Reduces LED regions of a frame to gamma-corrected mean colors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAverager {
    os_scale: f64,
    inv_gamma: f64,
}

impl ColorAverager {
    pub fn new(os_scale: f64, gamma: f64) -> Self {
        Self {
            os_scale,
            inv_gamma: 1. / gamma,
        }
    }

    fn correct(&self, sum: u64, count: u64) -> u8 {
        let mean = sum as f64 / count as f64;
        (255. * (mean / 255.).powf(self.inv_gamma))
            .round()
            .clamp(0., 255.) as u8
    }

    /// Mean color of the frame pixels covered by `led`
    pub fn average_color(&self, frame: &Frame, led: &LedCoordinate) -> Result<Color, ReduceError> {
        let region = led.scaled(self.os_scale).intersect(&frame.bounds());
        if region.is_empty() {
            return Err(ReduceError::DegenerateRegion {
                region: led.scaled(self.os_scale),
            });
        }

        let image = frame.image();
        let (x, width) = (region.x as usize, region.width as usize);

        let mut r_acc = 0u64;
        let mut g_acc = 0u64;
        let mut b_acc = 0u64;

        for y in region.y as usize..(region.y as usize + region.height as usize) {
            for px in image.row(y, x, width).chunks_exact(3) {
                r_acc += u64::from(px[0]);
                g_acc += u64::from(px[1]);
                b_acc += u64::from(px[2]);
            }
        }

        let count = u64::from(region.width) * u64::from(region.height);

        Ok(Color::new(
            self.correct(r_acc, count),
            self.correct(g_acc, count),
            self.correct(b_acc, count),
        ))
    }

    fn reduce_led(&self, frame: &Frame, led: &LedCoordinate, previous: Option<&Color>) -> (Color, bool) {
        match self.average_color(frame, led) {
            Ok(color) => (color, false),
            Err(_) => (previous.copied().unwrap_or_default(), true),
        }
    }

    fn collect(results: impl Iterator<Item = (Color, bool)>, capacity: usize) -> ReducedFrame {
        let mut colors = Vec::with_capacity(capacity);
        let mut degenerate = 0;

        for (color, failed) in results {
            colors.push(color);
            degenerate += failed as usize;
        }

        ReducedFrame { colors, degenerate }
    }

    /// Compute the colors of every LED in `matrix`, one LED after the other
    ///
    /// LEDs with a degenerate region keep their color from `previous`, or
    /// black if there is none.
    pub fn reduce(&self, frame: &Frame, matrix: &LedMatrix, previous: &[Color]) -> ReducedFrame {
        Self::collect(
            matrix
                .as_slice()
                .iter()
                .enumerate()
                .map(|(i, led)| self.reduce_led(frame, led, previous.get(i))),
            matrix.len(),
        )
    }

    /// Same as [`ColorAverager::reduce`], spreading LEDs over the current rayon pool
    ///
    /// The result is in strip order regardless of the number of threads.
    pub fn par_reduce(&self, frame: &Frame, matrix: &LedMatrix, previous: &[Color]) -> ReducedFrame {
        let results: Vec<(Color, bool)> = matrix
            .as_slice()
            .par_iter()
            .enumerate()
            .map(|(i, led)| self.reduce_led(frame, led, previous.get(i)))
            .collect();

        Self::collect(results.into_iter(), matrix.len())
    }
}
