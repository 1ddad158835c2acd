use serde_derive::{Deserialize, Serialize};
use validator::Validate;

use super::ConfigError;
use crate::image::Rect;

/// Screen area covered by one LED, in unscaled screen coordinates relative to
/// the monitor origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCoordinate {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl LedCoordinate {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region to read from a frame captured under the given OS scale factor
    pub fn scaled(&self, os_scale: f64) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height).scaled(os_scale)
    }
}

/// Entry of an explicit LED list
///
/// The index is optional; when present it must match the entry position
/// (1-based), since the list order is the wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(flatten)]
    pub coordinate: LedCoordinate,
}

impl From<LedCoordinate> for LedEntry {
    fn from(coordinate: LedCoordinate) -> Self {
        Self {
            index: None,
            coordinate,
        }
    }
}

/// Ordered LED to screen region mapping
///
/// Position `i` in this matrix is LED `i + 1`, in physical strip order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedMatrix {
    leds: Vec<LedCoordinate>,
}

impl LedMatrix {
    pub fn new(leds: Vec<LedCoordinate>) -> Result<Self, ConfigError> {
        if leds.is_empty() {
            return Err(ConfigError::Inconsistent("the LED matrix is empty".to_owned()));
        }

        Ok(Self { leds })
    }

    pub fn len(&self) -> usize {
        self.leds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leds.is_empty()
    }

    pub fn as_slice(&self) -> &[LedCoordinate] {
        &self.leds
    }

    /// Get a LED by its 1-based index
    pub fn get(&self, index: u32) -> Option<&LedCoordinate> {
        index
            .checked_sub(1)
            .and_then(|i| self.leds.get(i as usize))
    }

    /// Iterate over `(index, coordinate)` pairs, in strip order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &LedCoordinate)> + '_ {
        self.leds
            .iter()
            .enumerate()
            .map(|(i, led)| (i as u32 + 1, led))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// Trait for converting a LED layout to a LED matrix
pub trait ToLedMatrix {
    fn to_led_matrix(&self, screen: &ScreenGeometry) -> Result<LedMatrix, ConfigError>;
}

/// Largest strip an Adalight frame can address
pub const MAX_LED_COUNT: u32 = 65536;

/// LEDs around the four screen edges, numbered clockwise from the bottom-left
/// corner
///
/// Edges are laid out independently: horizontal edges span the whole screen
/// width, so corner regions overlap the ends of the vertical edges. Offsets
/// move the top and bottom edges vertically and the left and right edges
/// horizontally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassicLayout {
    #[validate(range(max = 65536))]
    pub top: u32,
    #[validate(range(max = 65536))]
    pub right: u32,
    #[validate(range(max = 65536))]
    pub bottom: u32,
    #[validate(range(max = 65536))]
    pub left: u32,
    /// Thickness of each region, in screen pixels
    #[validate(range(min = 1))]
    pub depth: u32,
}

impl Default for ClassicLayout {
    fn default() -> Self {
        Self {
            top: 32,
            right: 18,
            bottom: 32,
            left: 18,
            depth: 200,
        }
    }
}

impl ClassicLayout {
    pub fn led_count(&self) -> Result<u32, ConfigError> {
        [self.right, self.bottom, self.left]
            .iter()
            .try_fold(self.top, |count, &edge| count.checked_add(edge))
            .filter(|&count| count <= MAX_LED_COUNT)
            .ok_or_else(|| {
                ConfigError::Inconsistent(format!(
                    "the classic layout has more than {} LEDs",
                    MAX_LED_COUNT
                ))
            })
    }

    /// Bounds of the `i`-th of `count` segments over `length` pixels
    fn segment(i: u32, count: u32, length: u32) -> (i64, i64) {
        let length = i64::from(length);
        let (i, count) = (i64::from(i), i64::from(count));
        (i * length / count, (i + 1) * length / count)
    }
}

impl ToLedMatrix for ClassicLayout {
    fn to_led_matrix(&self, screen: &ScreenGeometry) -> Result<LedMatrix, ConfigError> {
        let width = i64::from(screen.width);
        let height = i64::from(screen.height);
        let depth = i64::from(self.depth);
        let ox = i64::from(screen.offset_x);
        let oy = i64::from(screen.offset_y);

        let mut leds = Vec::with_capacity(self.led_count()? as usize);
        let mut push = |x: i64, y: i64, w: i64, h: i64| {
            leds.push(LedCoordinate::new(
                x as i32,
                y as i32,
                w.max(0) as u32,
                h.max(0) as u32,
            ));
        };

        // Left edge, upwards
        for i in 0..self.left {
            let (start, end) = Self::segment(i, self.left, screen.height);
            push(ox, height - end, depth, end - start);
        }

        // Top edge, left to right
        for i in 0..self.top {
            let (start, end) = Self::segment(i, self.top, screen.width);
            push(start, oy, end - start, depth);
        }

        // Right edge, downwards
        for i in 0..self.right {
            let (start, end) = Self::segment(i, self.right, screen.height);
            push(width - ox - depth, start, depth, end - start);
        }

        // Bottom edge, right to left
        for i in 0..self.bottom {
            let (start, end) = Self::segment(i, self.bottom, screen.width);
            push(width - end, height - oy - depth, end - start, depth);
        }

        LedMatrix::new(leds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "layout")]
pub enum LedLayout {
    Explicit { leds: Vec<LedEntry> },
    Classic(ClassicLayout),
}

impl Default for LedLayout {
    fn default() -> Self {
        Self::Classic(ClassicLayout::default())
    }
}

impl Validate for LedLayout {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            LedLayout::Explicit { .. } => Ok(()),
            LedLayout::Classic(classic) => classic.validate(),
        }
    }
}

impl LedLayout {
    /// Check that LED indices are dense, unique and in strip order
    pub fn check(&self) -> Result<(), ConfigError> {
        match self {
            LedLayout::Explicit { leds } => {
                if leds.is_empty() {
                    return Err(ConfigError::Inconsistent(
                        "the LED matrix is empty".to_owned(),
                    ));
                }

                for (position, entry) in leds.iter().enumerate() {
                    let expected = position as u32 + 1;
                    if let Some(index) = entry.index {
                        if index != expected {
                            return Err(ConfigError::Inconsistent(format!(
                                "LED at position {} has index {}, LED indices must be dense and ordered from 1",
                                expected, index
                            )));
                        }
                    }
                }

                Ok(())
            }
            LedLayout::Classic(classic) => {
                if classic.led_count()? == 0 {
                    Err(ConfigError::Inconsistent(
                        "the LED matrix is empty".to_owned(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl ToLedMatrix for LedLayout {
    fn to_led_matrix(&self, screen: &ScreenGeometry) -> Result<LedMatrix, ConfigError> {
        self.check()?;

        match self {
            LedLayout::Explicit { leds } => {
                LedMatrix::new(leds.iter().map(|entry| entry.coordinate).collect())
            }
            LedLayout::Classic(classic) => classic.to_led_matrix(screen),
        }
    }
}
