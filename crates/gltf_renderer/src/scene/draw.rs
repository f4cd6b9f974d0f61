//! Primitive ranges and the single scene draw

/// A primitive's slice of the flattened scene buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    /// First vertex in the scene vertex buffer
    pub vertex_start: u32,
    /// Number of vertices
    pub vertex_count: u32,
    /// First index in the scene index buffer, when indexed
    pub index_start: u32,
    /// Number of indices; zero means the primitive is not indexed
    pub index_count: u32,
    /// Material index, `None` when the primitive has none
    pub material: Option<usize>,
}

impl Primitive {
    /// Whether the primitive carries its own indices
    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }
}

/// How the whole scene is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    /// Nothing to draw
    Empty,
    /// One `vkCmdDraw` over every vertex
    Vertices {
        /// Total vertex count
        vertex_count: u32,
    },
    /// One `vkCmdDrawIndexed` over every index
    Indexed {
        /// Total index count
        index_count: u32,
    },
}

/// Decide the scene draw and make the index buffer cover every primitive
///
/// When at least one primitive is indexed, non-indexed primitives get
/// sequential indices so a single indexed draw covers the scene. Primitive
/// index ranges are rewritten to point into the returned buffer.
pub fn plan_scene_draw(primitives: &mut [Primitive], indices: &[u32], vertex_count: u32) -> (DrawCall, Vec<u32>) {
    if !primitives.iter().any(Primitive::is_indexed) {
        let draw = if vertex_count == 0 {
            DrawCall::Empty
        } else {
            DrawCall::Vertices { vertex_count }
        };
        return (draw, Vec::new());
    }

    let mut merged = Vec::with_capacity(indices.len());
    for primitive in primitives.iter_mut() {
        let start = merged.len() as u32;
        if primitive.is_indexed() {
            let range = primitive.index_start as usize..(primitive.index_start + primitive.index_count) as usize;
            merged.extend_from_slice(&indices[range]);
        } else {
            merged.extend(primitive.vertex_start..primitive.vertex_start + primitive.vertex_count);
        }
        primitive.index_start = start;
        primitive.index_count = merged.len() as u32 - start;
    }

    let index_count = merged.len() as u32;
    (DrawCall::Indexed { index_count }, merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primitive(vertex_start: u32, vertex_count: u32, index_start: u32, index_count: u32) -> Primitive {
        Primitive {
            vertex_start,
            vertex_count,
            index_start,
            index_count,
            material: None,
        }
    }

    #[test]
    fn test_unindexed_scene_draws_vertices() {
        let mut primitives = [primitive(0, 3, 0, 0), primitive(3, 6, 0, 0)];
        let (draw, indices) = plan_scene_draw(&mut primitives, &[], 9);
        assert_eq!(draw, DrawCall::Vertices { vertex_count: 9 });
        assert!(indices.is_empty());
    }

    #[test]
    fn test_empty_scene_draws_nothing() {
        let (draw, _) = plan_scene_draw(&mut [], &[], 0);
        assert_eq!(draw, DrawCall::Empty);
    }

    #[test]
    fn test_mixed_scene_synthesizes_indices() {
        // Indexed quad at vertices 0..4, then an unindexed triangle at 4..7
        let mut primitives = [primitive(0, 4, 0, 6), primitive(4, 3, 0, 0)];
        let quad = [0, 1, 2, 2, 3, 0];
        let (draw, indices) = plan_scene_draw(&mut primitives, &quad, 7);

        assert_eq!(draw, DrawCall::Indexed { index_count: 9 });
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0, 4, 5, 6]);
        assert_eq!((primitives[1].index_start, primitives[1].index_count), (6, 3));
    }
}
