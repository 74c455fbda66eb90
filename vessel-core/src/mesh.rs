//! Detection of segments leaving a closed triangulated surface.

use glam::DVec3;

use crate::{
    enforcer::{Detection, Detector},
    error::{EnforceError, EnforceResult},
    mesh_crossing::{MeshCrossing, TriangleHit},
    segment::Segment,
    spatial::{SpatialIndex, UniformGrid},
    tree::Network,
    triangle::Triangle,
    types::NetworkId,
};

/// Flags segments that cross a bounding surface from inside to outside.
///
/// Triangle normals must face outwards.
pub struct MeshDetector {
    triangles: Vec<Triangle>,
    grid: UniformGrid<usize>,
}

impl MeshDetector {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let grid = UniformGrid::from_items(triangles.iter().enumerate().map(|(i, t)| (t.bounds(), i)));
        Self { triangles, grid }
    }

    /// Builds the detector from an indexed mesh.
    ///
    /// Fails if a face refers to a missing vertex or has zero area.
    pub fn from_mesh(vertices: &[DVec3], faces: &[[usize; 3]]) -> EnforceResult<Self> {
        let vertex = |i: usize| {
            vertices.get(i).copied().ok_or(EnforceError::DegenerateGeometry {
                reason: "face refers to a missing vertex",
            })
        };
        let triangles = faces
            .iter()
            .map(|&[a, b, c]| Triangle::new(vertex(a)?, vertex(b)?, vertex(c)?))
            .collect::<EnforceResult<Vec<_>>>()?;
        Ok(Self::new(triangles))
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Collects every hit of `segment`'s centre line against the surface.
    pub fn crossing(&self, segment: &Segment) -> MeshCrossing {
        let mut crossing = MeshCrossing::new(*segment);
        let origin = segment.start.position;
        let dir = segment.direction();
        self.grid.query(&segment.line_bounds(), &mut |&i| {
            let tri = &self.triangles[i];
            if let Some(fraction) = tri.test_ray(origin, dir) {
                crossing.add(TriangleHit::new(segment, i, tri.normal, fraction));
            }
        });
        crossing
    }
}

impl<N: Network> Detector<N> for MeshDetector {
    type Violation = MeshCrossing;

    fn detect(&self, networks: &[N], index: NetworkId) -> Detection<MeshCrossing> {
        let violations = networks
            .get(index)
            .map(|net| {
                net.segments(index)
                    .iter()
                    .map(|s| self.crossing(s))
                    .filter(MeshCrossing::crosses_out)
                    .collect()
            })
            .unwrap_or_default();
        Detection {
            violations,
            degenerate: 0,
        }
    }
}
