use std::convert::TryFrom;

use thiserror::Error;

use crate::models::Color;

mod mapper;
pub use mapper::*;

mod reducer;
pub use reducer::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RawImageError {
    #[error("invalid data ({data} bytes) for the given dimensions ({width} x {height} x {channels} = {expected})")]
    InvalidData {
        data: usize,
        width: usize,
        height: usize,
        channels: usize,
        expected: usize,
    },
    #[error("region {region} is outside of the {width} x {height} image")]
    OutOfBounds {
        region: Rect,
        width: usize,
        height: usize,
    },
}

/// Rectangle in screen or frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, parse_display::Display)]
#[display("{width}x{height}+{x}+{y}")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Divide every component by `scale`, truncating towards zero
    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            x: (f64::from(self.x) / scale) as i32,
            y: (f64::from(self.y) / scale) as i32,
            width: (f64::from(self.width) / scale) as u32,
            height: (f64::from(self.height) / scale) as u32,
        }
    }

    /// Overlapping area of two rectangles, empty if they do not intersect
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = i64::from(self.x).max(i64::from(other.x));
        let y0 = i64::from(self.y).max(i64::from(other.y));
        let x1 = (i64::from(self.x) + i64::from(self.width))
            .min(i64::from(other.x) + i64::from(other.width));
        let y1 = (i64::from(self.y) + i64::from(self.height))
            .min(i64::from(other.y) + i64::from(other.height));

        Rect {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }
}

/// Raw 8-bit RGB image, row-major
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl RawImage {
    pub const CHANNELS: usize = 3;

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGB bytes of the pixels `x..x + len` on row `y`
    pub fn row(&self, y: usize, x: usize, len: usize) -> &[u8] {
        let start = (y * self.width + x) * Self::CHANNELS;
        &self.data[start..start + len * Self::CHANNELS]
    }

    #[cfg(test)]
    pub fn color_at(&self, x: usize, y: usize) -> Option<Color> {
        if x < self.width && y < self.height {
            let px = self.row(y, x, 1);
            Some(Color::new(px[0], px[1], px[2]))
        } else {
            None
        }
    }

    /// Build an image of a single color
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let (r, g, b) = color.into_components();
        let data = [r, g, b].repeat(width as usize * height as usize);

        Self {
            data,
            width: width as usize,
            height: height as usize,
        }
    }

    /// Fill a region of this image with a single color
    pub fn fill(&mut self, region: Rect, color: Color) -> Result<(), RawImageError> {
        let region = self.check_bounds(region)?;
        let (r, g, b) = color.into_components();

        for y in region.y as usize..(region.y as usize + region.height as usize) {
            let start = (y * self.width + region.x as usize) * Self::CHANNELS;
            let end = start + region.width as usize * Self::CHANNELS;
            for px in self.data[start..end].chunks_exact_mut(Self::CHANNELS) {
                px.copy_from_slice(&[r, g, b]);
            }
        }

        Ok(())
    }

    /// Copy a region of this image
    pub fn crop(&self, region: Rect) -> Result<RawImage, RawImageError> {
        let region = self.check_bounds(region)?;
        let (x, width) = (region.x as usize, region.width as usize);

        let mut data = Vec::with_capacity(width * region.height as usize * Self::CHANNELS);
        for y in region.y as usize..(region.y as usize + region.height as usize) {
            data.extend_from_slice(self.row(y, x, width));
        }

        Ok(Self {
            data,
            width,
            height: region.height as usize,
        })
    }

    fn check_bounds(&self, region: Rect) -> Result<Rect, RawImageError> {
        let bounds = Rect::new(0, 0, self.width as u32, self.height as u32);
        if region.x < 0 || region.y < 0 || bounds.intersect(&region) != region {
            return Err(RawImageError::OutOfBounds {
                region,
                width: self.width,
                height: self.height,
            });
        }

        Ok(region)
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("RawImage");
        f.field("width", &self.width);
        f.field("height", &self.height);

        if self.data.len() > 32 {
            f.field("data", &format!("[{} bytes]", self.data.len()));
        } else {
            f.field("data", &self.data);
        }

        f.finish()
    }
}

impl TryFrom<(Vec<u8>, u32, u32)> for RawImage {
    type Error = RawImageError;

    fn try_from((data, width, height): (Vec<u8>, u32, u32)) -> Result<Self, Self::Error> {
        let channels = Self::CHANNELS;
        let width = width as usize;
        let height = height as usize;
        let expected = width * height * channels;

        if data.len() != expected {
            return Err(RawImageError::InvalidData {
                data: data.len(),
                width,
                height,
                channels,
                expected,
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }
}

/// Captured screen content
///
/// The image covers `region`, so pixel (0, 0) of the image is the top-left
/// corner of the capture rectangle.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RawImage,
    region: Rect,
}

impl Frame {
    pub fn new(image: RawImage, region: Rect) -> Result<Self, RawImageError> {
        if image.width() != region.width as usize || image.height() != region.height as usize {
            return Err(RawImageError::InvalidData {
                data: image.data().len(),
                width: region.width as usize,
                height: region.height as usize,
                channels: RawImage::CHANNELS,
                expected: region.width as usize * region.height as usize * RawImage::CHANNELS,
            });
        }

        Ok(Self {
            image,
            region,
        })
    }

    pub fn image(&self) -> &RawImage {
        &self.image
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    /// Frame-local bounds, for clipping LED regions
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.region.width, self.region.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_invalid_dimensions() {
        assert!(RawImage::try_from((vec![0; 11], 2, 2)).is_err());
        assert!(RawImage::try_from((vec![0; 12], 2, 2)).is_ok());
    }

    #[test]
    fn crop_and_fill() {
        let mut image = RawImage::solid(4, 4, Color::new(0, 0, 0));
        image
            .fill(Rect::new(2, 2, 2, 2), Color::new(255, 0, 0))
            .unwrap();

        let cropped = image.crop(Rect::new(1, 1, 2, 2)).unwrap();
        assert_eq!(cropped.color_at(0, 0), Some(Color::new(0, 0, 0)));
        assert_eq!(cropped.color_at(1, 1), Some(Color::new(255, 0, 0)));
        assert_eq!(cropped.color_at(2, 0), None);

        assert!(image.crop(Rect::new(3, 3, 2, 2)).is_err());
        assert!(image.crop(Rect::new(-1, 0, 1, 1)).is_err());
    }

    #[test]
    fn scale_and_intersect() {
        let rect = Rect::new(30, 60, 300, 3).scaled(1.5);
        assert_eq!(rect, Rect::new(20, 40, 200, 2));

        let clipped = Rect::new(-10, -10, 20, 20).intersect(&Rect::new(0, 0, 5, 5));
        assert_eq!(clipped, Rect::new(0, 0, 5, 5));
        assert!(Rect::new(10, 10, 5, 5)
            .intersect(&Rect::new(0, 0, 5, 5))
            .is_empty());
    }

    #[test]
    fn frame_must_match_region() {
        let image = RawImage::solid(2, 2, Color::new(1, 2, 3));
        assert!(Frame::new(image.clone(), Rect::new(10, 10, 2, 2)).is_ok());
        assert!(Frame::new(image, Rect::new(0, 0, 3, 2)).is_err());
    }
}
