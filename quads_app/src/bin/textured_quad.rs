//! One textured quad with a single mip level

use std::process::ExitCode;

use quad_renderer::app::launch;
use quad_renderer::config::Variant;

fn main() -> ExitCode {
    launch(Variant::TexturedQuad)
}
