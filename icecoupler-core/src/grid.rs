//! GCM grid geometry, map projections and elevation classes.
//!
//! GCM cells are polygons given in longitude/latitude (degrees). Each ice sheet
//! lives on its own projected plane, and the "true" area of a GCM cell as seen
//! from an ice sheet is the area of the cell polygon projected into that
//! sheet's [`MapProjection`].
//!
//! Elevation space splits every GCM cell into height classes. A value in
//! elevation space is addressed by `i1hc = hc * n1 + i1` (see [`HcIndex`]).

use crate::errors::{CouplingError, CouplingResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;

/// WGS84 semi-major axis (m)
pub const WGS84_RADIUS: f64 = 6_378_137.0;

/// A `(lon, lat)` vertex in degrees, or `(x, y)` for planar grids
pub type Vertex = (f64, f64);

/// GCM grid: one polygon per cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcmGrid {
    pub cells: Vec<Vec<Vertex>>,
}

impl GcmGrid {
    pub fn new(cells: Vec<Vec<Vertex>>) -> Self {
        Self { cells }
    }

    /// Regular lon/lat grid with `nlon * nlat` cells, cell index `j * nlon + i`
    pub fn lonlat(lon0: f64, lon1: f64, nlon: usize, lat0: f64, lat1: f64, nlat: usize) -> Self {
        let dlon = (lon1 - lon0) / nlon as f64;
        let dlat = (lat1 - lat0) / nlat as f64;
        let mut cells = Vec::with_capacity(nlon * nlat);
        for j in 0..nlat {
            for i in 0..nlon {
                let (w, e) = (lon0 + i as f64 * dlon, lon0 + (i + 1) as f64 * dlon);
                let (s, n) = (lat0 + j as f64 * dlat, lat0 + (j + 1) as f64 * dlat);
                cells.push(vec![(w, s), (e, s), (e, n), (w, n)]);
            }
        }
        Self { cells }
    }

    /// Number of GCM cells
    pub fn n1(&self) -> usize {
        self.cells.len()
    }

    pub fn polygon(&self, i1: usize) -> CouplingResult<&[Vertex]> {
        self.cells
            .get(i1)
            .map(Vec::as_slice)
            .ok_or(CouplingError::IndexOutOfBounds {
                what: "GCM grid".to_string(),
                index: i1,
                extent: self.cells.len(),
            })
    }
}

/// Projection from lon/lat onto an ice sheet's plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MapProjection {
    /// Vertices are already planar coordinates (m)
    Planar,
    /// Spherical polar stereographic, true to scale at `lat_ts`
    PolarStereographic {
        lon_0: f64,
        /// +90 or -90
        lat_0: f64,
        lat_ts: f64,
        radius: f64,
    },
}

impl MapProjection {
    /// Parse a proj4-style string such as
    /// `+proj=stere +lon_0=-39 +lat_0=90 +lat_ts=71.0 +ellps=WGS84`.
    ///
    /// Ellipsoids are approximated by a sphere of their semi-major axis.
    pub fn from_proj_str(spec: &str) -> CouplingResult<Self> {
        let invalid = |details: String| CouplingError::InvalidSpec {
            spec: spec.to_string(),
            details,
        };

        let mut proj = None;
        let (mut lon_0, mut lat_0, mut lat_ts) = (0.0, None, None);
        let mut radius = WGS84_RADIUS;
        for token in spec.split_whitespace() {
            let token = token.trim_start_matches('+');
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            let number = || {
                value
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("'{key}' is not a number: '{value}'")))
            };
            match key {
                "proj" => proj = Some(value.to_string()),
                "lon_0" => lon_0 = number()?,
                "lat_0" => lat_0 = Some(number()?),
                "lat_ts" => lat_ts = Some(number()?),
                "R" | "a" => radius = number()?,
                "ellps" if value == "WGS84" => radius = WGS84_RADIUS,
                "ellps" => return Err(invalid(format!("unsupported ellipsoid '{value}'"))),
                "units" | "no_defs" | "x_0" | "y_0" | "k" | "datum" => {}
                _ => return Err(invalid(format!("unsupported parameter '{key}'"))),
            }
        }

        match proj.as_deref() {
            Some("stere") => {
                let lat_0 = lat_0.ok_or_else(|| invalid("missing lat_0".to_string()))?;
                if (lat_0.abs() - 90.0).abs() > 1e-9 {
                    return Err(invalid("only polar aspects are supported".to_string()));
                }
                Ok(MapProjection::PolarStereographic {
                    lon_0,
                    lat_0,
                    lat_ts: lat_ts.unwrap_or(lat_0),
                    radius,
                })
            }
            Some(other) => Err(invalid(format!("unsupported projection '{other}'"))),
            None => Err(invalid("missing +proj".to_string())),
        }
    }

    /// Project a vertex onto the plane.
    pub fn project(&self, (lon, lat): Vertex) -> (f64, f64) {
        match *self {
            MapProjection::Planar => (lon, lat),
            MapProjection::PolarStereographic {
                lon_0,
                lat_0,
                lat_ts,
                radius,
            } => {
                // Work in the northern aspect; the southern one is its mirror
                let south = lat_0 < 0.0;
                let sign = if south { -1.0 } else { 1.0 };
                let phi = (sign * lat).to_radians();
                let phi_c = (sign * lat_ts).to_radians();
                let dlambda = (lon - lon_0).to_radians();

                let t = (FRAC_PI_4 - phi / 2.0).tan();
                let t_c = (FRAC_PI_4 - phi_c / 2.0).tan();
                let scale = if t_c.abs() < 1e-12 {
                    2.0
                } else {
                    phi_c.cos() / t_c
                };
                let rho = radius * scale * t;
                (rho * dlambda.sin(), -sign * rho * dlambda.cos())
            }
        }
    }
}

/// Area of a polygon after projecting its vertices.
///
/// Edges are straight lines in the projected plane.
pub fn area_of_proj_polygon(polygon: &[Vertex], proj: &MapProjection) -> f64 {
    let projected: Vec<(f64, f64)> = polygon.iter().map(|&v| proj.project(v)).collect();
    let n = projected.len();
    if n < 3 {
        return 0.0;
    }
    let twice_area: f64 = (0..n)
        .map(|k| {
            let (x0, y0) = projected[k];
            let (x1, y1) = projected[(k + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    (twice_area / 2.0).abs()
}

/// Encodes (GCM cell, height class) pairs into elevation-space indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HcIndex {
    pub n1: usize,
}

impl HcIndex {
    pub fn new(n1: usize) -> Self {
        Self { n1 }
    }

    pub fn ik_to_index(&self, i1: usize, hc: usize) -> usize {
        hc * self.n1 + i1
    }

    /// Inverse of [`Self::ik_to_index`], as `(i1, hc)`
    pub fn index_to_ik(&self, i1hc: usize) -> (usize, usize) {
        (i1hc % self.n1, i1hc / self.n1)
    }
}

/// Height points and the height classes around them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ElevationClassesData")]
pub struct ElevationClasses {
    hpdefs: Vec<f64>,
    hcmax: Vec<f64>,
}

/// Serialised form of [`ElevationClasses`], checked on the way in
#[derive(Deserialize)]
struct ElevationClassesData {
    hpdefs: Vec<f64>,
    #[serde(default)]
    hcmax: Option<Vec<f64>>,
}

impl TryFrom<ElevationClassesData> for ElevationClasses {
    type Error = CouplingError;

    fn try_from(value: ElevationClassesData) -> Result<Self, Self::Error> {
        Self::new(value.hpdefs, value.hcmax)
    }
}

impl ElevationClasses {
    /// `hcmax` defaults to the midpoints between height points, with the
    /// top class unbounded.
    pub fn new(hpdefs: Vec<f64>, hcmax: Option<Vec<f64>>) -> CouplingResult<Self> {
        if hpdefs.is_empty() {
            return Err(CouplingError::InvalidGeometry(
                "at least one height point is required".to_string(),
            ));
        }
        if hpdefs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CouplingError::InvalidGeometry(
                "height points must be strictly increasing".to_string(),
            ));
        }
        let hcmax = match hcmax {
            Some(hcmax) => {
                if hcmax.len() != hpdefs.len() {
                    return Err(CouplingError::ShapeMismatch {
                        what: "hcmax".to_string(),
                        expected: hpdefs.len(),
                        found: hcmax.len(),
                    });
                }
                hcmax
            }
            None => hpdefs
                .windows(2)
                .map(|w| 0.5 * (w[0] + w[1]))
                .chain(std::iter::once(f64::INFINITY))
                .collect(),
        };
        Ok(Self { hpdefs, hcmax })
    }

    pub fn nhc(&self) -> usize {
        self.hpdefs.len()
    }

    pub fn hpdefs(&self) -> &[f64] {
        &self.hpdefs
    }

    pub fn hcmax(&self) -> &[f64] {
        &self.hcmax
    }

    /// Height class containing `elevation`
    pub fn class_of(&self, elevation: f64) -> usize {
        self.hcmax
            .iter()
            .position(|&max| elevation < max)
            .unwrap_or(self.nhc() - 1)
    }

    /// Height points bracketing `elevation` with linear interpolation weights.
    ///
    /// Elevations outside the height points are clamped to the end points.
    pub fn interpolation_weights(&self, elevation: f64) -> Vec<(usize, f64)> {
        let last = self.nhc() - 1;
        if elevation <= self.hpdefs[0] {
            return vec![(0, 1.0)];
        }
        if elevation >= self.hpdefs[last] {
            return vec![(last, 1.0)];
        }
        let upper = self.hpdefs.partition_point(|&hp| hp <= elevation);
        let lower = upper - 1;
        let ratio = (elevation - self.hpdefs[lower]) / (self.hpdefs[upper] - self.hpdefs[lower]);
        [(lower, 1.0 - ratio), (upper, ratio)]
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .collect()
    }
}
