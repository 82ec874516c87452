//! Marching squares over a boolean cell mask.
//!
//! Each 2x2 block of cells is classified by which corners are inside:
//!
//! ```text
//!   TL(1) ---- T ---- TR(2)
//!     |               |
//!     L               R
//!     |               |
//!   BL(8) ---- B ---- BR(4)
//! ```
//!
//! Edge points sit halfway between corners. All vertices share one height,
//! so the output is a flat polygon covering the inside corners.

use std::ops::Range;

use crate::mesh::{TriangleList, UP};

/// Case index for one block.
#[inline]
pub fn case_index(tl: bool, tr: bool, br: bool, bl: bool) -> u8 {
    (tl as u8) | (tr as u8) << 1 | (br as u8) << 2 | (bl as u8) << 3
}

/// Block corner and edge positions in the horizontal plane.
struct Block {
    x0: f32,
    z0: f32,
    x1: f32,
    z1: f32,
    y: f32,
}

impl Block {
    fn tl(&self) -> [f32; 3] {
        [self.x0, self.y, self.z0]
    }
    fn tr(&self) -> [f32; 3] {
        [self.x1, self.y, self.z0]
    }
    fn br(&self) -> [f32; 3] {
        [self.x1, self.y, self.z1]
    }
    fn bl(&self) -> [f32; 3] {
        [self.x0, self.y, self.z1]
    }
    fn t(&self) -> [f32; 3] {
        [(self.x0 + self.x1) / 2.0, self.y, self.z0]
    }
    fn r(&self) -> [f32; 3] {
        [self.x1, self.y, (self.z0 + self.z1) / 2.0]
    }
    fn b(&self) -> [f32; 3] {
        [(self.x0 + self.x1) / 2.0, self.y, self.z1]
    }
    fn l(&self) -> [f32; 3] {
        [self.x0, self.y, (self.z0 + self.z1) / 2.0]
    }
}

fn triangle(mesh: &mut TriangleList, p: [[f32; 3]; 3]) {
    let a = mesh.add_vertex(p[0], UP);
    let b = mesh.add_vertex(p[1], UP);
    let c = mesh.add_vertex(p[2], UP);
    mesh.add_triangle(a, b, c);
}

fn quad(mesh: &mut TriangleList, p: [[f32; 3]; 4]) {
    let a = mesh.add_vertex(p[0], UP);
    let b = mesh.add_vertex(p[1], UP);
    let c = mesh.add_vertex(p[2], UP);
    let d = mesh.add_vertex(p[3], UP);
    mesh.add_quad(a, b, c, d);
}

/// Emit the geometry for one block whose top-left corner is at `(x0, z0)`.
pub fn emit_case(case: u8, x0: f32, z0: f32, tile: f32, y: f32, mesh: &mut TriangleList) {
    let b = Block { x0, z0, x1: x0 + tile, z1: z0 + tile, y };
    match case {
        0 => {}
        1 => triangle(mesh, [b.tl(), b.t(), b.l()]),
        2 => triangle(mesh, [b.t(), b.tr(), b.r()]),
        4 => triangle(mesh, [b.r(), b.br(), b.b()]),
        8 => triangle(mesh, [b.l(), b.b(), b.bl()]),
        3 => quad(mesh, [b.tl(), b.tr(), b.r(), b.l()]),
        6 => quad(mesh, [b.t(), b.tr(), b.br(), b.b()]),
        12 => quad(mesh, [b.l(), b.r(), b.br(), b.bl()]),
        9 => quad(mesh, [b.tl(), b.t(), b.b(), b.bl()]),
        // saddles: the two corners stay separate
        5 => {
            triangle(mesh, [b.tl(), b.t(), b.l()]);
            triangle(mesh, [b.r(), b.br(), b.b()]);
        }
        10 => {
            triangle(mesh, [b.t(), b.tr(), b.r()]);
            triangle(mesh, [b.l(), b.b(), b.bl()]);
        }
        // three corners: cut along the diagonal opposite the missing one
        7 => triangle(mesh, [b.tl(), b.tr(), b.br()]),
        11 => triangle(mesh, [b.tl(), b.tr(), b.bl()]),
        13 => triangle(mesh, [b.tl(), b.br(), b.bl()]),
        14 => triangle(mesh, [b.tr(), b.br(), b.bl()]),
        _ => quad(mesh, [b.tl(), b.tr(), b.br(), b.bl()]),
    }
}

/// Run every block whose top-left cell lies in `xs` x `zs`.
/// `inside(x, z)` is only asked about cells in `xs.start..=xs.end` x `zs.start..=zs.end`.
pub fn march<F>(inside: F, xs: Range<usize>, zs: Range<usize>, tile: f32, y: f32, mesh: &mut TriangleList)
where
    F: Fn(usize, usize) -> bool,
{
    for z in zs {
        for x in xs.clone() {
            let case = case_index(inside(x, z), inside(x + 1, z), inside(x + 1, z + 1), inside(x, z + 1));
            emit_case(case, x as f32 * tile, z as f32 * tile, tile, y, mesh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(case: u8) -> f32 {
        let mut mesh = TriangleList::new();
        emit_case(case, 0.0, 0.0, 2.0, 1.0, &mut mesh);
        mesh.projected_area()
    }

    #[test]
    fn test_case_bits() {
        assert_eq!(case_index(true, false, false, false), 1);
        assert_eq!(case_index(false, true, false, false), 2);
        assert_eq!(case_index(false, false, true, false), 4);
        assert_eq!(case_index(false, false, false, true), 8);
        assert_eq!(case_index(true, true, true, true), 15);
    }

    #[test]
    fn test_case_areas() {
        // 2x2 block: full area 4
        assert_eq!(area(0), 0.0);
        for case in [1, 2, 4, 8] {
            assert_eq!(area(case), 0.5, "case {}", case);
        }
        for case in [3, 6, 9, 12] {
            assert_eq!(area(case), 2.0, "case {}", case);
        }
        for case in [5, 10] {
            assert_eq!(area(case), 1.0, "case {}", case);
        }
        for case in [7, 11, 13, 14] {
            assert_eq!(area(case), 2.0, "case {}", case);
        }
        assert_eq!(area(15), 4.0);
    }

    #[test]
    fn test_triangle_counts() {
        let counts: Vec<usize> = (0..16u8)
            .map(|case| {
                let mut mesh = TriangleList::new();
                emit_case(case, 0.0, 0.0, 1.0, 0.0, &mut mesh);
                mesh.triangle_count()
            })
            .collect();
        assert_eq!(counts, vec![0, 1, 1, 2, 1, 2, 2, 1, 1, 2, 2, 1, 2, 1, 1, 2]);
    }

    #[test]
    fn test_all_vertices_at_surface_height() {
        let mut mesh = TriangleList::new();
        march(|x, z| (x + z) % 2 == 0, 0..3, 0..3, 1.0, 7.5, &mut mesh);
        assert!(!mesh.is_empty());
        assert!(mesh.vertices.iter().all(|v| v[1] == 7.5));
    }

    #[test]
    fn test_consistent_winding() {
        for case in 1..16u8 {
            let mut mesh = TriangleList::new();
            emit_case(case, 0.0, 0.0, 1.0, 0.0, &mut mesh);
            for t in mesh.indices.chunks_exact(3) {
                let a = mesh.vertices[t[0] as usize];
                let b = mesh.vertices[t[1] as usize];
                let c = mesh.vertices[t[2] as usize];
                let signed = (b[0] - a[0]) * (c[2] - a[2]) - (c[0] - a[0]) * (b[2] - a[2]);
                assert!(signed > 0.0, "case {} winds the wrong way", case);
            }
        }
    }
}
