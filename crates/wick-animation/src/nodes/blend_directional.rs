//! Bilinear blend over nine children arranged on a 3x3 directional grid.

use std::sync::Arc;

use glam::Vec2;
use wick_core::{blend_poses4, Pose};

use crate::context::EvalContext;
use crate::node::AnimNode;
use crate::skeleton::Skeleton;
use crate::variables::VariantMap;

/// The child IDs occupying each cell of the grid:
///
/// ```text
/// +----------+------+-----------+
/// | up-left  |  up  | up-right  |
/// +----------+------+-----------+
/// |   left   |center|   right   |
/// +----------+------+-----------+
/// |down-left | down | down-right|
/// +----------+------+-----------+
/// ```
#[derive(Debug, Clone)]
pub struct DirectionalGrid {
    pub center: String,
    pub up: String,
    pub down: String,
    pub left: String,
    pub right: String,
    pub up_left: String,
    pub up_right: String,
    pub down_left: String,
    pub down_right: String,
}

/// Given a 2-D alpha in [-1, 1]^2, selects the quadrant's four corner
/// children and blends them bilinearly. Exactly nine children expected.
#[derive(Debug)]
pub struct BlendDirectional {
    pub(crate) id: String,
    pub(crate) children: Vec<AnimNode>,
    #[allow(dead_code)]
    skeleton: Option<Arc<Skeleton>>,
    poses: Vec<Pose>,
    alpha: Vec2,
    grid: DirectionalGrid,
    alpha_var: String,
    // children indices in grid order, row 0 = up; resolved lazily
    child_indices: Option<[[usize; 3]; 3]>,
    warned_bad_grid: bool,
}

impl BlendDirectional {
    pub fn new(id: impl Into<String>, alpha: Vec2, grid: DirectionalGrid) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
            skeleton: None,
            poses: Vec::new(),
            alpha,
            grid,
            alpha_var: String::new(),
            child_indices: None,
            warned_bad_grid: false,
        }
    }

    pub fn set_alpha_var(&mut self, var: impl Into<String>) {
        self.alpha_var = var.into();
    }

    pub fn evaluate(
        &mut self,
        vars: &VariantMap,
        ctx: &EvalContext,
        dt: f32,
        triggers_out: &mut VariantMap,
    ) -> &[Pose] {
        let alpha3 = vars.lookup_vec3(
            &self.alpha_var,
            glam::Vec3::new(self.alpha.x, self.alpha.y, 0.0),
        );
        self.alpha = Vec2::new(alpha3.x, alpha3.y);

        if self.children.len() != 9 {
            if !self.warned_bad_grid {
                log::warn!(
                    "BlendDirectional {:?} needs exactly 9 children, has {}",
                    self.id,
                    self.children.len()
                );
                self.warned_bad_grid = true;
            }
            for pose in &mut self.poses {
                *pose = Pose::IDENTITY;
            }
            return &self.poses;
        }

        if self.child_indices.is_none() {
            self.child_indices = self.lookup_child_indices();
        }
        let Some(grid) = self.child_indices else {
            return &self.poses;
        };

        // pick the quadrant's four corners, counter-clockwise from the
        // most-positive corner, and shift alpha into (0, 1)^2
        let mut alpha = self.alpha;
        let corners = if self.alpha.x > 0.0 {
            if self.alpha.y > 0.0 {
                [grid[0][2], grid[0][1], grid[1][1], grid[1][2]]
            } else {
                alpha.y += 1.0;
                [grid[1][2], grid[1][1], grid[2][1], grid[2][2]]
            }
        } else if self.alpha.y > 0.0 {
            alpha.x += 1.0;
            [grid[0][1], grid[0][0], grid[1][0], grid[1][1]]
        } else {
            alpha.x += 1.0;
            alpha.y += 1.0;
            [grid[1][1], grid[1][0], grid[2][0], grid[2][1]]
        };

        let alphas = [
            alpha.x * alpha.y,
            (1.0 - alpha.x) * alpha.y,
            (1.0 - alpha.x) * (1.0 - alpha.y),
            alpha.x * (1.0 - alpha.y),
        ];

        // evaluate the four corner children
        let mut corner_poses: [Vec<Pose>; 4] = Default::default();
        for (slot, &child_index) in corners.iter().enumerate() {
            corner_poses[slot] = self.children[child_index]
                .evaluate(vars, ctx, dt, triggers_out)
                .to_vec();
        }

        let min_size = corner_poses.iter().map(Vec::len).min().unwrap_or(0);
        self.poses.resize(min_size, Pose::IDENTITY);
        if min_size > 0 {
            blend_poses4(
                &corner_poses[0],
                &corner_poses[1],
                &corner_poses[2],
                &corner_poses[3],
                alphas,
                &mut self.poses,
            );
        }
        &self.poses
    }

    fn lookup_child_indices(&mut self) -> Option<[[usize; 3]; 3]> {
        let find = |id: &str| self.children.iter().position(|child| child.id() == id);
        let grid = [
            [
                find(&self.grid.up_left)?,
                find(&self.grid.up)?,
                find(&self.grid.up_right)?,
            ],
            [
                find(&self.grid.left)?,
                find(&self.grid.center)?,
                find(&self.grid.right)?,
            ],
            [
                find(&self.grid.down_left)?,
                find(&self.grid.down)?,
                find(&self.grid.down_right)?,
            ],
        ];
        Some(grid)
    }

    pub(crate) fn set_skeleton_internal(&mut self, skeleton: &Arc<Skeleton>) {
        self.skeleton = Some(skeleton.clone());
    }
}
