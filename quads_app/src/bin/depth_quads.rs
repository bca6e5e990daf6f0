//! Two overlapping textured quads resolved with a depth buffer

use std::process::ExitCode;

use quad_renderer::app::launch;
use quad_renderer::config::Variant;

fn main() -> ExitCode {
    launch(Variant::DepthQuads)
}
