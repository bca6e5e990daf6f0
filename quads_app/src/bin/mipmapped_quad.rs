//! One textured quad sampled from a GPU-generated mip chain

use std::process::ExitCode;

use quad_renderer::app::launch;
use quad_renderer::config::Variant;

fn main() -> ExitCode {
    launch(Variant::MipmappedQuad)
}
