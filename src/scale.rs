//! Scrollbar-to-logical coordinate mapping.
//!
//! A table with millions of rows is logically taller than any element a
//! rendering surface will lay out. The scale maps the bounded scrollbar
//! coordinate space ("canvas space") onto the unbounded logical content
//! height ("virtual space") with a linear factor, chosen so that both
//! ranges end together: dragging the scrollbar to its physical bottom
//! lands on the last row.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VgridError};

/// Tallest element mainstream rendering engines will lay out, in pixels.
///
/// Hosts that probe their surface's real limit should pass their own value.
pub const DEFAULT_MAX_ELEMENT_HEIGHT: f64 = 33_554_400.0;

/// Geometry of the scrollable table. Immutable per scale computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleParameters {
    /// Inner height of the scrolling viewport in pixels
    pub client_height: f64,
    /// Height of the sticky header row in pixels
    pub header_height: f64,
    /// Uniform data-row height in pixels
    pub row_height: f64,
    /// Number of data rows in the table
    pub num_rows: u32,
    /// Tallest scrollable element the rendering surface supports
    pub max_element_height: f64,
}

impl ScaleParameters {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("clientHeight", self.client_height),
            ("headerHeight", self.header_height),
            ("rowHeight", self.row_height),
            ("maxElementHeight", self.max_element_height),
        ] {
            if !value.is_finite() {
                return Err(VgridError::Configuration(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.header_height <= 0.0 {
            return Err(VgridError::Configuration(format!(
                "headerHeight must be positive, got {}",
                self.header_height
            )));
        }
        if self.row_height <= 0.0 {
            return Err(VgridError::Configuration(format!(
                "rowHeight must be positive, got {}",
                self.row_height
            )));
        }
        if self.max_element_height <= 0.0 {
            return Err(VgridError::Configuration(format!(
                "maxElementHeight must be positive, got {}",
                self.max_element_height
            )));
        }
        if self.max_element_height <= self.client_height {
            return Err(VgridError::Configuration(format!(
                "maxElementHeight ({}) must exceed clientHeight ({})",
                self.max_element_height, self.client_height
            )));
        }
        Ok(())
    }

    /// Logical content height: header plus every data row.
    #[must_use]
    pub fn virtual_canvas_height(&self) -> f64 {
        self.header_height + f64::from(self.num_rows) * self.row_height
    }
}

/// The derived scrollbar-to-logical mapping. Immutable.
///
/// `factor == 1.0` means the content fits the surface and both spaces
/// coincide; `factor > 1.0` means canvas space is compressed and
/// [`Scale::to_virtual`] / [`Scale::from_virtual`] convert between the two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    factor: f64,
    canvas_height: f64,
    virtual_canvas_height: f64,
    parameters: ScaleParameters,
}

impl Scale {
    /// Build the mapping for the given geometry.
    ///
    /// # Errors
    ///
    /// `Configuration` if the geometry is malformed: non-positive heights,
    /// `maxElementHeight` not above `clientHeight`, or any non-finite
    /// pixel value.
    pub fn new(parameters: ScaleParameters) -> Result<Self> {
        parameters.validate()?;

        let virtual_canvas_height = parameters.virtual_canvas_height();
        if virtual_canvas_height <= parameters.max_element_height {
            // Content fits the surface: identity mapping.
            return Ok(Self {
                factor: 1.0,
                canvas_height: virtual_canvas_height,
                virtual_canvas_height,
                parameters,
            });
        }

        let canvas_height = parameters.max_element_height;
        // Both scrollable ranges lose one viewport height; equating the
        // remainders makes the bottoms of the two spaces coincide.
        let factor = (virtual_canvas_height - parameters.client_height)
            / (canvas_height - parameters.client_height);

        Ok(Self {
            factor,
            canvas_height,
            virtual_canvas_height,
            parameters,
        })
    }

    /// Canvas-space position to virtual-space position.
    #[must_use]
    pub fn to_virtual(&self, canvas_pos: f64) -> f64 {
        canvas_pos * self.factor
    }

    /// Virtual-space position back to canvas space.
    #[must_use]
    pub fn from_virtual(&self, virtual_pos: f64) -> f64 {
        virtual_pos / self.factor
    }

    /// Compression ratio between virtual and canvas space (`>= 1`).
    #[must_use]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// True when no compression is in effect.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.factor <= 1.0
    }

    /// Height the host should give the scrollable element.
    #[must_use]
    pub fn canvas_height(&self) -> f64 {
        self.canvas_height
    }

    /// Logical content height (may exceed what the surface can address).
    #[must_use]
    pub fn virtual_canvas_height(&self) -> f64 {
        self.virtual_canvas_height
    }

    /// The geometry this scale was computed from.
    #[must_use]
    pub fn parameters(&self) -> &ScaleParameters {
        &self.parameters
    }

    /// Largest valid scrollbar position: `canvasHeight − clientHeight`,
    /// floored at zero for viewports taller than their content.
    #[must_use]
    pub fn max_scroll_top(&self) -> f64 {
        (self.canvas_height - self.parameters.client_height).max(0.0)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;

    fn params(num_rows: u32) -> ScaleParameters {
        ScaleParameters {
            client_height: 1000.0,
            header_height: 50.0,
            row_height: 30.0,
            num_rows,
            max_element_height: 10_000.0,
        }
    }

    #[test]
    fn small_table_is_identity() {
        let scale = Scale::new(params(100)).unwrap();
        assert_eq!(scale.factor(), 1.0);
        assert!(scale.is_identity());
        assert_eq!(scale.canvas_height(), 50.0 + 100.0 * 30.0);
        assert_eq!(scale.to_virtual(123.0), 123.0);
        assert_eq!(scale.from_virtual(123.0), 123.0);
    }

    #[test]
    fn large_table_is_compressed() {
        let scale = Scale::new(params(20_000)).unwrap();
        assert!(scale.factor() > 1.0);
        assert_eq!(scale.canvas_height(), 10_000.0);
        assert_eq!(scale.virtual_canvas_height(), 600_050.0);
        // Bottoms of both ranges coincide.
        let bottom = scale.canvas_height() - 1000.0;
        let virtual_bottom = scale.virtual_canvas_height() - 1000.0;
        assert!((scale.to_virtual(bottom) - virtual_bottom).abs() < 1e-6);
    }

    #[test]
    fn zero_rows_is_header_only() {
        let scale = Scale::new(ScaleParameters {
            client_height: 400.0,
            header_height: 24.0,
            row_height: 30.0,
            num_rows: 0,
            max_element_height: 10_000.0,
        })
        .unwrap();
        assert_eq!(scale.virtual_canvas_height(), 24.0);
        assert_eq!(scale.factor(), 1.0);
        assert_eq!(scale.max_scroll_top(), 0.0);
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut p = params(10);
        p.row_height = 0.0;
        assert!(Scale::new(p).is_err());

        let mut p = params(10);
        p.header_height = -1.0;
        assert!(Scale::new(p).is_err());

        let mut p = params(10);
        p.max_element_height = 900.0; // below clientHeight
        assert!(Scale::new(p).is_err());

        let mut p = params(10);
        p.client_height = f64::NAN;
        assert!(Scale::new(p).is_err());
    }
}
