use std::sync::Arc;

use geo::{Coord, MapCoords};
use proj::Proj;
use shrinkwraprs::Shrinkwrap;

use crate::errors::Result;

/// Geometry tagged with the coordinate reference system its
/// coordinates are expressed in.
#[derive(Shrinkwrap, Debug, Clone, PartialEq)]
pub struct CrsGeometry<G> {
    crs: Arc<str>,
    #[shrinkwrap(main_field)]
    geometry: G,
}

impl<G> CrsGeometry<G> {
    pub fn new(crs: Arc<str>, geometry: G) -> Self {
        Self { crs, geometry }
    }

    pub fn crs(&self) -> &str {
        self.crs.as_ref()
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }
}

impl<G> CrsGeometry<G>
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    /// Clones if crs is same.
    pub fn projected_geometry(&self, crs: &str) -> Result<G> {
        if self.crs().ne(crs) {
            let proj = Proj::new_known_crs(self.crs(), crs, None)?;
            Ok(project(&proj, &self.geometry)?)
        } else {
            Ok(self.geometry.clone())
        }
    }

    pub fn with_crs(self, crs: &str) -> Result<Self> {
        let geometry = self.projected_geometry(crs)?;
        Ok(Self {
            crs: Arc::from(crs),
            geometry,
        })
    }
}

/// Apply `proj` to every coordinate of `geometry`.
pub(crate) fn project<G>(proj: &Proj, geometry: &G) -> std::result::Result<G, proj::ProjError>
where
    G: MapCoords<f64, f64, Output = G>,
{
    geometry.try_map_coords(|coord| {
        proj.convert((coord.x, coord.y))
            .map(|(x, y)| Coord { x, y })
    })
}
