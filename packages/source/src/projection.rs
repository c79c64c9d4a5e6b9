//! Coordinate projection service.
//!
//! Two jurisdictions record crash locations as grid coordinates. The
//! harmoniser hands those to a [`CoordinateProjector`] and gets WGS84
//! degrees back.

use crash_etl_source_models::LatLong;
use proj4rs::proj::Proj;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::ProjectionError;

const WGS84: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

/// A named source grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectionName {
    /// South Australian Lambert conformal conic.
    SaLambert,
    /// Australian Map Grid on the Australian National Spheroid, as used by
    /// the Victorian extract.
    VicAmg,
}

impl ProjectionName {
    #[must_use]
    pub const fn proj_string(self) -> &'static str {
        match self {
            Self::SaLambert => {
                "+proj=lcc +lon_0=135 +lat_0=-32 +lat_1=-28 +lat_2=-36 +x_0=1000000 +y_0=2000000"
            }
            Self::VicAmg => {
                "+proj=tmerc +lat_0=0 +lon_0=145 +k=1 +x_0=2500000 +y_0=6596534.558457338 \
                 +a=6378160 +b=6356774.719 +no_defs"
            }
        }
    }
}

/// Projects grid coordinates to geographic latitude/longitude.
pub trait CoordinateProjector: Send + Sync {
    /// Projects each `(x, y)` pair from `projection` to WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the projection cannot be built or a
    /// point cannot be transformed.
    fn project(
        &self,
        projection: ProjectionName,
        points: &[(f64, f64)],
    ) -> Result<Vec<LatLong>, ProjectionError>;
}

/// [`CoordinateProjector`] backed by `proj4rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Proj4Projector;

fn build(name: &str, definition: &str) -> Result<Proj, ProjectionError> {
    Proj::from_proj_string(definition).map_err(|e| ProjectionError::Definition {
        name: name.to_string(),
        message: e.to_string(),
    })
}

impl CoordinateProjector for Proj4Projector {
    fn project(
        &self,
        projection: ProjectionName,
        points: &[(f64, f64)],
    ) -> Result<Vec<LatLong>, ProjectionError> {
        let src = build(projection.as_ref(), projection.proj_string())?;
        let dst = build("wgs84", WGS84)?;

        points
            .iter()
            .map(|&(x, y)| {
                let mut point = (x, y, 0.0);
                proj4rs::transform::transform(&src, &dst, &mut point).map_err(|e| {
                    ProjectionError::Transform {
                        name: projection.to_string(),
                        x,
                        y,
                        message: e.to_string(),
                    }
                })?;
                Ok(LatLong {
                    latitude: point.1.to_degrees(),
                    longitude: point.0.to_degrees(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: LatLong, latitude: f64, longitude: f64) {
        assert!(
            (actual.latitude - latitude).abs() < 1e-4,
            "latitude {} != {latitude}",
            actual.latitude
        );
        assert!(
            (actual.longitude - longitude).abs() < 1e-4,
            "longitude {} != {longitude}",
            actual.longitude
        );
    }

    #[test]
    fn sa_false_origin_maps_to_projection_origin() {
        let out = Proj4Projector
            .project(ProjectionName::SaLambert, &[(1_000_000.0, 2_000_000.0)])
            .unwrap();
        assert_close(out[0], -32.0, 135.0);
    }

    #[test]
    fn vic_false_origin_maps_to_central_meridian() {
        let out = Proj4Projector
            .project(ProjectionName::VicAmg, &[(2_500_000.0, 6_596_534.558_457_338)])
            .unwrap();
        assert_close(out[0], 0.0, 145.0);
    }

    #[test]
    fn sa_points_east_of_origin_have_greater_longitude() {
        let out = Proj4Projector
            .project(
                ProjectionName::SaLambert,
                &[(1_000_000.0, 2_000_000.0), (1_100_000.0, 2_000_000.0)],
            )
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[1].longitude > out[0].longitude);
        assert!(out[1].latitude < 0.0);
    }

    #[test]
    fn names_parse_from_config() {
        assert_eq!("sa_lambert".parse::<ProjectionName>().unwrap(), ProjectionName::SaLambert);
        assert_eq!(ProjectionName::VicAmg.to_string(), "vic_amg");
    }
}
