use crate::types::{HampError, HampResult};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Affine placement of a regular lat/lon grid, north-up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridTransform {
    /// Western edge of the first column (degrees east)
    pub top_left_lon: f64,
    /// Column width in degrees
    pub pixel_width: f64,
    /// Northern edge of the first row (degrees north)
    pub top_left_lat: f64,
    /// Row height in degrees, negative for north-up grids
    pub pixel_height: f64,
}

/// Surface type underneath a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Surface {
    Sea,
    Land,
    /// Position missing or outside the mask
    Unknown,
}

/// Gridded land flags; nonzero cells are land
#[derive(Debug, Clone)]
pub struct SeaLandMask {
    land: Array2<u8>,
    transform: GridTransform,
}

impl SeaLandMask {
    pub fn new(land: Array2<u8>, transform: GridTransform) -> HampResult<Self> {
        if land.is_empty() {
            return Err(HampError::Configuration("sea/land mask is empty".to_string()));
        }
        if transform.pixel_width == 0.0 || transform.pixel_height == 0.0 {
            return Err(HampError::Configuration(
                "sea/land mask has zero pixel size".to_string(),
            ));
        }
        Ok(Self { land, transform })
    }

    /// Mask with every cell of one surface type
    pub fn uniform(surface: Surface, transform: GridTransform, shape: (usize, usize)) -> HampResult<Self> {
        let fill = u8::from(surface == Surface::Land);
        Self::new(Array2::from_elem(shape, fill), transform)
    }

    pub fn transform(&self) -> &GridTransform {
        &self.transform
    }

    /// Nearest-cell lookup
    pub fn surface_at(&self, lat: f64, lon: f64) -> Surface {
        if !lat.is_finite() || !lon.is_finite() {
            return Surface::Unknown;
        }
        let col = ((lon - self.transform.top_left_lon) / self.transform.pixel_width).floor();
        let row = ((lat - self.transform.top_left_lat) / self.transform.pixel_height).floor();
        let (rows, cols) = self.land.dim();
        if row < 0.0 || col < 0.0 || row >= rows as f64 || col >= cols as f64 {
            return Surface::Unknown;
        }
        if self.land[[row as usize, col as usize]] != 0 {
            Surface::Land
        } else {
            Surface::Sea
        }
    }

    pub fn classify(&self, lat: ArrayView1<f64>, lon: ArrayView1<f64>) -> Vec<Surface> {
        lat.iter()
            .zip(lon.iter())
            .map(|(&la, &lo)| self.surface_at(la, lo))
            .collect()
    }

    /// True where a sample is known to be over sea
    pub fn sea_mask(&self, lat: ArrayView1<f64>, lon: ArrayView1<f64>) -> Vec<bool> {
        self.classify(lat, lon)
            .into_iter()
            .map(|s| s == Surface::Sea)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn atlantic() -> SeaLandMask {
        // 2x2 one-degree cells north of 12N west of 38W, land in the north-east
        let land = array![[0u8, 1], [0, 0]];
        let transform = GridTransform {
            top_left_lon: -40.0,
            pixel_width: 1.0,
            top_left_lat: 12.0,
            pixel_height: -1.0,
        };
        SeaLandMask::new(land, transform).unwrap()
    }

    #[test]
    fn test_lookup() {
        let mask = atlantic();
        assert_eq!(mask.surface_at(11.5, -39.5), Surface::Sea);
        assert_eq!(mask.surface_at(11.5, -38.5), Surface::Land);
        assert_eq!(mask.surface_at(10.5, -38.5), Surface::Sea);
        assert_eq!(mask.surface_at(9.5, -39.5), Surface::Unknown);
        assert_eq!(mask.surface_at(f64::NAN, -39.5), Surface::Unknown);
    }

    #[test]
    fn test_sea_mask_excludes_unknown() {
        let mask = atlantic();
        let lat = array![11.5, 11.5, f64::NAN];
        let lon = array![-39.5, -38.5, -39.5];
        assert_eq!(mask.sea_mask(lat.view(), lon.view()), vec![true, false, false]);
    }
}
