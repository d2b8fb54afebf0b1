//! Headless renderer that logs each command it receives.

use glam::{Mat4, Vec2, Vec3};
use log::{debug, info};
use lumen_label::{RenderCommand, Renderer};

/// Orthographic viewport that culls by bounding box and logs submissions.
pub struct LogRenderer {
    viewport: Vec2,
    frame: u64,
    submitted: usize,
    culled: usize,
}

impl LogRenderer {
    pub fn new(viewport: Vec2) -> Self {
        Self { viewport, frame: 0, submitted: 0, culled: 0 }
    }

    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.submitted = 0;
        self.culled = 0;
    }

    pub fn end_frame(&self) {
        info!("frame {}: {} commands, {} culled checks", self.frame, self.submitted, self.culled);
    }
}

impl Renderer for LogRenderer {
    fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh(0.0, self.viewport.x, 0.0, self.viewport.y, -1.0, 1.0)
    }

    fn check_visibility(&mut self, transform: &Mat4, size: Vec2) -> bool {
        let min = transform.transform_point3(Vec3::ZERO).truncate();
        let max = transform.transform_point3(size.extend(0.0)).truncate();
        let visible = max.x >= 0.0 && max.y >= 0.0 && min.x <= self.viewport.x && min.y <= self.viewport.y;
        if !visible {
            self.culled += 1;
        }
        visible
    }

    fn add_command(&mut self, command: RenderCommand<'_>) {
        self.submitted += 1;
        match command {
            RenderCommand::Custom(cmd) => {
                let program = cmd.program_state().map(|state| state.program());
                info!(
                    "  custom  z={:<4} program={program:?} quads={} indices={}",
                    cmd.global_z(),
                    cmd.vertices().len(),
                    cmd.index_count()
                );
            }
            RenderCommand::Quad(cmd) => {
                info!("  quad    z={:<4} texture={:?} quads={}", cmd.global_z, cmd.texture, cmd.quads.len());
            }
            RenderCommand::Sprite(cmd) => {
                info!("  sprite  z={:<4} texture={:?} blend={:?}", cmd.global_z, cmd.texture, cmd.blend);
            }
            RenderCommand::Line(cmd) => {
                info!("  lines   z={:<4} segments={} width={}", cmd.global_z, cmd.segments.len(), cmd.width);
                for (from, to) in &cmd.segments {
                    debug!("    {from} -> {to}");
                }
            }
        }
    }
}
