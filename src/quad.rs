//! # Quad Fast Path
//!
//! Rectangles and other four-corner regions are the most common polygons the
//! workspace sees. [`QuadEncoder`] writes them straight into a blob of known
//! size without building a ring list, an intermediate [`Geometry`] or a
//! flattening pass.
//!
//! The output is byte-identical to the general codec for the same corners
//! closed into a ring:
//!
//! ```text
//! encode(Polygon[a, b, c, d, a]) == QuadEncoder::encode([a, b, c, d])
//! ```
//!
//! [`Geometry`]: crate::Geometry

use crate::codec::{class_type, Writer, BLOCK_END, HEADER_SIZE};
use crate::geometry::{Coord, Envelope};
use crate::types::{Dimension, GeometryType, Srid};

/// Encoder for closed 4-vertex single-ring polygons.
#[derive(Debug, Clone, Copy)]
pub struct QuadEncoder {
    dimension: Dimension,
    srid: Srid,
    size: usize,
}

impl QuadEncoder {
    pub fn new(dimension: Dimension, srid: Srid) -> Self {
        // header, ring count, point count, 5 points, terminator
        let size = HEADER_SIZE + 4 + 4 + 5 * dimension.point_size() + 1;
        Self {
            dimension,
            srid,
            size,
        }
    }

    /// Exact blob size for this dimension: 132 bytes for XY, 172 for XYZ.
    pub fn blob_size(&self) -> usize {
        self.size
    }

    /// Encodes the ring `a, b, c, d, a`.
    pub fn encode(&self, corners: &[Coord; 4]) -> Vec<u8> {
        let [a, b, c, d] = corners;
        let ring = [a, b, c, d, a];
        let mbr = Envelope::of_coords(ring).unwrap_or_default();

        let mut w = Writer::with_capacity(self.size);
        w.header(self.srid, &mbr, class_type(GeometryType::Polygon, self.dimension));
        w.i32(1);
        w.i32(5);
        for corner in ring {
            w.coord(corner, self.dimension);
        }
        w.u8(BLOCK_END);

        let blob = w.finish();
        debug_assert_eq!(blob.len(), self.size);
        blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::geometry::{Geometry, LineString, Polygon};
    use proptest::prelude::*;

    fn general(corners: &[Coord; 4], dimension: Dimension) -> Vec<u8> {
        let ring = LineString::new(corners.to_vec()).closed();
        encode(
            &Geometry::Polygon(Polygon::new(ring, vec![])),
            dimension,
            Srid::WGS84,
        )
    }

    #[test]
    fn test_sizes() {
        assert_eq!(QuadEncoder::new(Dimension::Xy, Srid::WGS84).blob_size(), 132);
        assert_eq!(QuadEncoder::new(Dimension::Xyz, Srid::WGS84).blob_size(), 172);
    }

    #[test]
    fn test_rectangle_matches_general_path() {
        let corners = [
            Coord::xy(-1.0, -1.0),
            Coord::xy(1.0, -1.0),
            Coord::xy(1.0, 1.0),
            Coord::xy(-1.0, 1.0),
        ];
        let quad = QuadEncoder::new(Dimension::Xy, Srid::WGS84).encode(&corners);
        assert_eq!(quad, general(&corners, Dimension::Xy));

        let Geometry::Polygon(p) = decode(&quad).unwrap() else {
            panic!("quad decodes as a polygon");
        };
        assert_eq!(p.rings[0].points.len(), 5);
    }

    fn arb_corner() -> impl Strategy<Value = Coord> {
        (-180.0..180.0f64, -90.0..90.0f64, -500.0..500.0f64)
            .prop_map(|(x, y, z)| Coord::xyz(x, y, z))
    }

    proptest! {
        #[test]
        fn prop_quad_matches_general_path(
            a in arb_corner(), b in arb_corner(), c in arb_corner(), d in arb_corner(),
            three_d in any::<bool>(),
        ) {
            // Distinct first and last corners so closing adds exactly one point.
            prop_assume!(a != d);
            let dimension = if three_d { Dimension::Xyz } else { Dimension::Xy };
            let corners = [a, b, c, d];
            let quad = QuadEncoder::new(dimension, Srid::WGS84).encode(&corners);
            prop_assert_eq!(quad, general(&corners, dimension));
        }
    }
}
